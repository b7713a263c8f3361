//! Hand-off to the association state machine.
//!
//! Once an application entity has opened a transport
//! and built its association request,
//! an [`AssociationRequestor`] performs the actual handshake on the wire
//! and yields the established association.
//! Implementations are provided by upper layer protocol crates.
use std::net::TcpStream;

use snafu::{Backtrace, Snafu};

use crate::error::BoxedError;
use crate::pdu::{AbortRQSource, AssociationRJ, AssociationRQ};

/// An error raised while performing the association handshake.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub))]
pub enum HandshakeError {
    #[snafu(display("association rejected by peer: {}", association_rj))]
    Rejected {
        association_rj: AssociationRJ,
        backtrace: Backtrace,
    },

    #[snafu(display("association aborted by peer: {:?}", abort_source))]
    Aborted {
        abort_source: AbortRQSource,
        backtrace: Backtrace,
    },

    /// association handshake failed
    Failed {
        source: BoxedError,
        backtrace: Backtrace,
    },
}

/// The association requester side of the upper layer state machine.
///
/// This trait is implemented for closures taking the transport
/// and the association request.
pub trait AssociationRequestor {
    /// The established association
    type Association;

    /// Send the association request over the given transport
    /// and wait for the peer's response.
    fn establish(
        &self,
        transport: TcpStream,
        rq: AssociationRQ,
    ) -> Result<Self::Association, HandshakeError>;
}

impl<F, A> AssociationRequestor for F
where
    F: Fn(TcpStream, AssociationRQ) -> Result<A, HandshakeError>,
{
    type Association = A;

    fn establish(&self, transport: TcpStream, rq: AssociationRQ) -> Result<A, HandshakeError> {
        self(transport, rq)
    }
}

/// The asynchronous counterpart of [`AssociationRequestor`].
#[cfg(feature = "async")]
pub trait AsyncAssociationRequestor {
    type Association;

    fn establish_async(
        &self,
        transport: tokio::net::TcpStream,
        rq: AssociationRQ,
    ) -> impl std::future::Future<Output = Result<Self::Association, HandshakeError>> + Send;
}
