//! Dispatch of DIMSE messages received over an established association.
//!
//! The message exchange itself is handled elsewhere.
//! This module only defines the hook through which
//! an application entity hands incoming requests to the application,
//! and how the handler in charge is resolved.
use std::io::Read;
use std::sync::Arc;

use crate::device::Device;
use crate::error::BoxedError;
use crate::pdu::{AssociationAC, PresentationContextResult};

/// A handler of DIMSE requests received by an application entity.
pub trait DimseRequestHandler: Send + Sync {
    /// Handle one DIMSE request
    /// received through the given presentation context.
    ///
    /// `command` holds the encoded command set,
    /// and `data` yields the data set following it, if any.
    fn on_request(
        &self,
        association: &AssociationAC,
        pc: &PresentationContextResult,
        command: &[u8],
        data: &mut dyn Read,
    ) -> Result<(), BoxedError>;

    /// Called once the association is released or aborted.
    fn on_close(&self, _association: &AssociationAC) {}
}

/// Resolve the handler in charge of DIMSE requests:
/// the application entity's own handler if set,
/// otherwise the one of its device.
pub fn resolve_handler(
    entity_handler: Option<&Arc<dyn DimseRequestHandler>>,
    device: Option<&Device>,
) -> Option<Arc<dyn DimseRequestHandler>> {
    entity_handler
        .cloned()
        .or_else(|| device.and_then(Device::dimse_handler))
}
