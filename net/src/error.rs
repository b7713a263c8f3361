//! Error types for application entity configuration,
//! association negotiation and connection establishment.
use snafu::{Backtrace, Snafu};

use crate::association::HandshakeError;
use crate::pdu::{AbortRQServiceProviderReason, AssociationRJ};

/// A type-erased error, as produced by user-provided collaborators.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Type alias for a result from this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// AE title cannot be empty
    EmptyAeTitle { backtrace: Backtrace },

    #[snafu(display("application entity `{}` is already owned by device `{}`", ae_title, device))]
    AlreadyOwned {
        ae_title: String,
        device: String,
        backtrace: Backtrace,
    },

    #[snafu(display("AE title `{}` is already in use on device `{}`", ae_title, device))]
    DuplicateAeTitle {
        ae_title: String,
        device: String,
        backtrace: Backtrace,
    },

    #[snafu(display("owning device `{}` is not installed", device))]
    DeviceNotInstalled { device: String, backtrace: Backtrace },

    #[snafu(display("application entity `{}` is not attached to a device", ae_title))]
    NotAttached { ae_title: String, backtrace: Backtrace },

    #[snafu(display("application entity `{}` is not installed", ae_title))]
    NotInstalled { ae_title: String, backtrace: Backtrace },

    #[snafu(display("association rejected: {}", association_rj))]
    Rejected {
        association_rj: AssociationRJ,
        backtrace: Backtrace,
    },

    #[snafu(display("no compatible connection to {} available on {}", remote, ae_title))]
    IncompatibleConnection {
        remote: String,
        ae_title: String,
        backtrace: Backtrace,
    },

    #[snafu(display("association aborted by service provider: {}", reason))]
    Aborted {
        reason: AbortRQServiceProviderReason,
        backtrace: Backtrace,
    },

    #[snafu(display("remote connection {} is not listening on any port", remote))]
    NotListening { remote: String, backtrace: Backtrace },

    #[snafu(display("TLS transport to {} is not available", remote))]
    TlsUnavailable { remote: String, backtrace: Backtrace },

    #[snafu(display("could not resolve address of {}", remote))]
    ResolveAddress {
        remote: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("could not connect to {}", remote))]
    Connect {
        remote: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("connection to {} timed out", remote))]
    ConnectTimeout { remote: String, backtrace: Backtrace },

    /// could not set socket options
    SocketOptions {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// association handshake failed
    Handshake {
        #[snafu(backtrace)]
        source: HandshakeError,
    },

    /// DIMSE request handler failed
    Dispatch { source: BoxedError },
}

/// The broad category of an [`Error`].
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// malformed configuration input
    Validation,
    /// ownership or installed-state invariant violation
    Conflict,
    /// operation attempted while its preconditions are unmet
    State,
    /// protocol-level association rejection
    Reject,
    /// no usable transport pairing
    IncompatibleConnection,
    /// provider-initiated abort of an established association
    Abort,
    /// socket or handshake failure
    Transport,
    /// a DIMSE request handler failed
    Dispatch,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyAeTitle { .. } => ErrorKind::Validation,
            Error::AlreadyOwned { .. }
            | Error::DuplicateAeTitle { .. }
            | Error::DeviceNotInstalled { .. } => ErrorKind::Conflict,
            Error::NotAttached { .. } | Error::NotInstalled { .. } => ErrorKind::State,
            Error::Rejected { .. } => ErrorKind::Reject,
            Error::Handshake {
                source: HandshakeError::Rejected { .. },
            } => ErrorKind::Reject,
            Error::IncompatibleConnection { .. } => ErrorKind::IncompatibleConnection,
            Error::Aborted { .. } => ErrorKind::Abort,
            Error::NotListening { .. }
            | Error::TlsUnavailable { .. }
            | Error::ResolveAddress { .. }
            | Error::Connect { .. }
            | Error::ConnectTimeout { .. }
            | Error::SocketOptions { .. }
            | Error::Handshake { .. } => ErrorKind::Transport,
            Error::Dispatch { .. } => ErrorKind::Dispatch,
        }
    }

    /// Retrieve the rejection descriptor,
    /// if this error is an association rejection.
    pub fn association_rj(&self) -> Option<&AssociationRJ> {
        match self {
            Error::Rejected { association_rj, .. } => Some(association_rj),
            Error::Handshake {
                source: HandshakeError::Rejected { association_rj, .. },
            } => Some(association_rj),
            _ => None,
        }
    }
}
