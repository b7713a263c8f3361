//! This crate contains the association negotiation logic
//! of a DICOM network node.
//!
//! Given the configuration of a local application entity,
//! it decides which presentation contexts, roles
//! and extended negotiation options are acceptable
//! for an incoming association request,
//! and it prepares outbound association requests
//! before handing them to the upper layer protocol.
//!
//! - The [`capability`] module
//!   describes the SOP classes supported by an application entity,
//!   in which role and through which transfer syntaxes.
//! - The [`registry`] module
//!   keeps the transfer capabilities of an application entity
//!   and resolves them for a requested abstract syntax.
//! - The [`negotiation`] module
//!   resolves each proposed presentation context
//!   into an association acceptance.
//! - The [`entity`] module
//!   holds the [`ApplicationEntity`],
//!   the owner of the configuration and entry point for negotiation,
//!   which lives on a [`Device`] and is reachable through
//!   one or more [`Connection`]s.
//! - The [`pdu`] module
//!   provides in-memory representations of the association
//!   request, acceptance and rejection.
//!
//! Encoding of protocol data units,
//! the upper layer state machine
//! and the DIMSE message exchange
//! are left to other crates,
//! which plug in through the [`AssociationRequestor`]
//! and [`DimseRequestHandler`] traits.
//!
//! ## Features
//! * `async`: Enables asynchronous connection establishment
//!   with `ApplicationEntity::connect_async`
//!   and `ApplicationEntity::connect_to_async`.

pub mod association;
pub mod capability;
pub mod connection;
pub mod device;
pub mod dimse;
pub mod entity;
pub mod error;
pub mod negotiation;
pub mod pdu;
pub mod registry;

mod uid;

/// The implementation class UID announced in association acceptances.
///
/// Automatically generated as per the standard, part 5, section B.2.
///
/// This UID may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.250137936711307425960238735473851392467";

/// The implementation version name announced in association acceptances.
///
/// This name may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_VERSION_NAME: &str = "DICOM-NET 0.1.0";

// re-exports

#[cfg(feature = "async")]
pub use association::AsyncAssociationRequestor;
pub use association::{AssociationRequestor, HandshakeError};
pub use capability::{QueryOptions, Role, StorageOptions, TransferCapability};
pub use connection::Connection;
pub use device::Device;
pub use dimse::DimseRequestHandler;
pub use entity::{ApplicationEntity, Installed};
pub use error::{Error, ErrorKind, Result};
pub use negotiation::{RoleSelectionPolicy, UserIdentityNegotiator};
pub use registry::CapabilityRegistry;
