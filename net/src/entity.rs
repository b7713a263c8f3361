//! Network application entities.
//!
//! An [`ApplicationEntity`] owns the configuration and policy
//! through which a DICOM node takes part in associations:
//! its AE title, the connections it is reachable through,
//! its transfer capabilities and its acceptance rules.
//! It is the entry point for negotiating inbound association requests
//! ([`negotiate`](ApplicationEntity::negotiate))
//! and for requesting outbound associations
//! ([`connect`](ApplicationEntity::connect),
//! [`connect_to`](ApplicationEntity::connect_to)).
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use snafu::{ensure, OptionExt, ResultExt};
use tracing::{debug, error, warn};

use crate::association::AssociationRequestor;
use crate::capability::{Role, TransferCapability};
use crate::connection::Connection;
use crate::device::Device;
use crate::dimse::{resolve_handler, DimseRequestHandler};
use crate::error::{
    AbortedSnafu, AlreadyOwnedSnafu, DeviceNotInstalledSnafu, DispatchSnafu, EmptyAeTitleSnafu,
    HandshakeSnafu, IncompatibleConnectionSnafu, NotAttachedSnafu, NotInstalledSnafu,
    RejectedSnafu, Result,
};
use crate::negotiation::{self, RoleSelectionPolicy, UserIdentityNegotiator};
use crate::pdu::{
    AbortRQServiceProviderReason, AssociationAC, AssociationRJ, AssociationRJResult,
    AssociationRJServiceProviderPresentationReason, AssociationRJServiceUserReason,
    AssociationRJSource, AssociationRQ, PresentationContextResult, UserVariableItem,
    DEFAULT_MAX_OPS,
};
use crate::registry::CapabilityRegistry;

/// Whether an application entity is installed on the network.
///
/// The effective installed state of an application entity
/// also depends on its device:
/// see [`ApplicationEntity::is_installed`].
#[derive(Debug, Copy, Clone, Default, Eq, Hash, PartialEq)]
pub enum Installed {
    Yes,
    No,
    /// same as the owning device
    #[default]
    Inherit,
}

impl From<bool> for Installed {
    fn from(installed: bool) -> Self {
        if installed {
            Installed::Yes
        } else {
            Installed::No
        }
    }
}

impl From<Option<bool>> for Installed {
    fn from(installed: Option<bool>) -> Self {
        installed.map(Installed::from).unwrap_or_default()
    }
}

/// A DICOM network application entity.
///
/// # Example
///
/// ```
/// # use std::sync::Arc;
/// # use dicom_net::{ApplicationEntity, Connection, Device, Role, TransferCapability};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let device = Arc::new(Device::new("archive"));
/// let conn = Arc::new(Connection::new("127.0.0.1").with_port(11112));
///
/// let mut ae = ApplicationEntity::new("STORESCP")?;
/// ae.set_device(Some(device.clone()))?;
/// ae.add_connection(conn);
/// ae.add_transfer_capability(TransferCapability::new(
///     "1.2.840.10008.1.1",
///     Role::Scp,
///     ["1.2.840.10008.1.2"],
/// ));
///
/// assert!(ae.is_installed());
/// assert!(device.contains_ae_title("STORESCP"));
/// # Ok(())
/// # }
/// ```
pub struct ApplicationEntity {
    ae_title: String,
    description: Option<String>,
    vendor_data: Vec<Vec<u8>>,
    application_clusters: Vec<String>,
    preferred_called_ae_titles: Vec<String>,
    preferred_calling_ae_titles: Vec<String>,
    supported_character_sets: Vec<String>,
    check_calling_ae_title: bool,
    acceptor: bool,
    initiator: bool,
    installed: Installed,
    role_selection_policy: RoleSelectionPolicy,
    connections: Vec<Arc<Connection>>,
    transfer_capabilities: CapabilityRegistry,
    user_identity_negotiator: Option<Arc<dyn UserIdentityNegotiator>>,
    dimse_handler: Option<Arc<dyn DimseRequestHandler>>,
    properties: HashMap<String, String>,
    device: Option<Arc<Device>>,
}

impl ApplicationEntity {
    /// Create a detached application entity
    /// acting both as association acceptor and requester.
    pub fn new(ae_title: impl Into<String>) -> Result<Self> {
        let ae_title = ae_title.into();
        ensure!(!ae_title.trim().is_empty(), EmptyAeTitleSnafu);
        Ok(ApplicationEntity {
            ae_title,
            description: None,
            vendor_data: Vec::new(),
            application_clusters: Vec::new(),
            preferred_called_ae_titles: Vec::new(),
            preferred_calling_ae_titles: Vec::new(),
            supported_character_sets: Vec::new(),
            check_calling_ae_title: false,
            acceptor: true,
            initiator: true,
            installed: Installed::Inherit,
            role_selection_policy: RoleSelectionPolicy::default(),
            connections: Vec::new(),
            transfer_capabilities: CapabilityRegistry::new(),
            user_identity_negotiator: None,
            dimse_handler: None,
            properties: HashMap::new(),
            device: None,
        })
    }

    pub fn ae_title(&self) -> &str {
        &self.ae_title
    }

    /// Change the AE title of this application entity,
    /// re-indexing it on its device if attached.
    pub fn set_ae_title(&mut self, ae_title: impl Into<String>) -> Result<()> {
        let ae_title = ae_title.into();
        ensure!(!ae_title.trim().is_empty(), EmptyAeTitleSnafu);
        if ae_title == self.ae_title {
            return Ok(());
        }
        if let Some(device) = &self.device {
            device.register_ae_title(&ae_title)?;
            device.unregister_ae_title(&self.ae_title);
        }
        self.ae_title = ae_title;
        Ok(())
    }

    pub fn device(&self) -> Option<&Arc<Device>> {
        self.device.as_ref()
    }

    /// Attach this application entity to a device,
    /// or detach it with `None`.
    ///
    /// Fails if the entity is already owned by another device,
    /// or if its AE title is already taken on the new device.
    pub fn set_device(&mut self, device: Option<Arc<Device>>) -> Result<()> {
        match (&self.device, device) {
            (Some(current), Some(device)) if Arc::ptr_eq(current, &device) => Ok(()),
            (Some(current), Some(_)) => AlreadyOwnedSnafu {
                ae_title: &self.ae_title,
                device: current.name(),
            }
            .fail(),
            (Some(current), None) => {
                current.unregister_ae_title(&self.ae_title);
                self.device = None;
                Ok(())
            }
            (None, Some(device)) => {
                device.register_ae_title(&self.ae_title)?;
                self.device = Some(device);
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    pub fn installed(&self) -> Installed {
        self.installed
    }

    /// Set whether this application entity is installed.
    ///
    /// Fails if installing explicitly while the owning device
    /// is not installed.
    pub fn set_installed(&mut self, installed: impl Into<Installed>) -> Result<()> {
        let installed = installed.into();
        if let (Installed::Yes, Some(device)) = (installed, &self.device) {
            ensure!(
                device.is_installed(),
                DeviceNotInstalledSnafu {
                    device: device.name()
                }
            );
        }
        self.installed = installed;
        Ok(())
    }

    /// Whether this application entity is effectively installed:
    /// it must be attached to an installed device
    /// and not be explicitly uninstalled.
    pub fn is_installed(&self) -> bool {
        match &self.device {
            Some(device) => device.is_installed() && self.installed != Installed::No,
            None => false,
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    pub fn vendor_data(&self) -> &[Vec<u8>] {
        &self.vendor_data
    }

    pub fn set_vendor_data(&mut self, vendor_data: Vec<Vec<u8>>) {
        self.vendor_data = vendor_data;
    }

    pub fn application_clusters(&self) -> &[String] {
        &self.application_clusters
    }

    pub fn set_application_clusters(&mut self, clusters: Vec<String>) {
        self.application_clusters = clusters;
    }

    pub fn preferred_called_ae_titles(&self) -> &[String] {
        &self.preferred_called_ae_titles
    }

    pub fn set_preferred_called_ae_titles(&mut self, ae_titles: Vec<String>) {
        self.preferred_called_ae_titles = ae_titles;
    }

    pub fn preferred_calling_ae_titles(&self) -> &[String] {
        &self.preferred_calling_ae_titles
    }

    pub fn set_preferred_calling_ae_titles(&mut self, ae_titles: Vec<String>) {
        self.preferred_calling_ae_titles = ae_titles;
    }

    pub fn supported_character_sets(&self) -> &[String] {
        &self.supported_character_sets
    }

    pub fn set_supported_character_sets(&mut self, character_sets: Vec<String>) {
        self.supported_character_sets = character_sets;
    }

    pub fn check_calling_ae_title(&self) -> bool {
        self.check_calling_ae_title
    }

    /// Only accept association requests
    /// from the preferred calling AE titles.
    pub fn set_check_calling_ae_title(&mut self, check: bool) {
        self.check_calling_ae_title = check;
    }

    pub fn is_acceptor(&self) -> bool {
        self.acceptor
    }

    pub fn set_acceptor(&mut self, acceptor: bool) {
        self.acceptor = acceptor;
    }

    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    pub fn set_initiator(&mut self, initiator: bool) {
        self.initiator = initiator;
    }

    pub fn role_selection_policy(&self) -> RoleSelectionPolicy {
        self.role_selection_policy
    }

    pub fn set_role_selection_policy(&mut self, policy: RoleSelectionPolicy) {
        self.role_selection_policy = policy;
    }

    pub fn connections(&self) -> &[Arc<Connection>] {
        &self.connections
    }

    pub fn add_connection(&mut self, connection: Arc<Connection>) {
        self.connections.push(connection);
    }

    /// Remove a connection from this application entity,
    /// returning whether it was there.
    pub fn remove_connection(&mut self, connection: &Arc<Connection>) -> bool {
        let len = self.connections.len();
        self.connections.retain(|c| !Arc::ptr_eq(c, connection));
        self.connections.len() != len
    }

    /// Register a transfer capability,
    /// returning the one it replaced for the same role and SOP class.
    pub fn add_transfer_capability(
        &self,
        tc: TransferCapability,
    ) -> Option<Arc<TransferCapability>> {
        self.transfer_capabilities.add(tc)
    }

    pub fn remove_transfer_capability(
        &self,
        role: Role,
        sop_class: &str,
    ) -> Option<Arc<TransferCapability>> {
        self.transfer_capabilities.remove(role, sop_class)
    }

    /// All transfer capabilities, SCP entries first.
    pub fn transfer_capabilities(&self) -> Vec<Arc<TransferCapability>> {
        self.transfer_capabilities.list_all()
    }

    pub fn transfer_capability_for(
        &self,
        role: Role,
        sop_class: &str,
    ) -> Option<Arc<TransferCapability>> {
        self.transfer_capabilities.get(role, sop_class)
    }

    pub fn capability_registry(&self) -> &CapabilityRegistry {
        &self.transfer_capabilities
    }

    pub fn set_user_identity_negotiator(
        &mut self,
        negotiator: Option<Arc<dyn UserIdentityNegotiator>>,
    ) {
        self.user_identity_negotiator = negotiator;
    }

    pub fn dimse_handler(&self) -> Option<&Arc<dyn DimseRequestHandler>> {
        self.dimse_handler.as_ref()
    }

    pub fn set_dimse_handler(&mut self, handler: Option<Arc<dyn DimseRequestHandler>>) {
        self.dimse_handler = handler;
    }

    /// Retrieve a property of this application entity,
    /// falling back to the properties of its device.
    pub fn property(&self, key: &str) -> Option<String> {
        self.properties
            .get(key)
            .cloned()
            .or_else(|| self.device.as_ref().and_then(|d| d.property(key)))
    }

    pub fn set_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.properties.insert(key.into(), value.into())
    }

    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        self.properties.remove(key)
    }

    /// Negotiate an association request received through the given connection.
    ///
    /// On success, the returned acceptance
    /// holds the outcome of every proposed presentation context.
    /// If the association cannot be accepted at all,
    /// an error of kind [`Reject`](crate::error::ErrorKind::Reject)
    /// carrying the rejection descriptor is returned.
    pub fn negotiate(
        &self,
        connection: &Arc<Connection>,
        rq: &AssociationRQ,
    ) -> Result<AssociationAC> {
        if !self.is_installed()
            || !self.acceptor
            || !self.connections.iter().any(|c| Arc::ptr_eq(c, connection))
        {
            debug!(
                "{}: rejecting association from {}: not accepting through {}",
                self.ae_title, rq.calling_ae_title, connection
            );
            return self.reject(AssociationRJ::permanent(
                AssociationRJServiceUserReason::CalledAETitleNotRecognized,
            ));
        }

        if self.check_calling_ae_title {
            let calling_ae_title = rq.calling_ae_title.trim();
            if !self
                .preferred_calling_ae_titles
                .iter()
                .any(|ae_title| ae_title == calling_ae_title)
            {
                debug!(
                    "{}: rejecting association from unknown calling AE title {}",
                    self.ae_title, calling_ae_title
                );
                return self.reject(AssociationRJ::permanent(
                    AssociationRJServiceUserReason::CallingAETitleNotRecognized,
                ));
            }
        }

        let user_identity_response = match &self.user_identity_negotiator {
            Some(negotiator) => match negotiator.negotiate(rq, rq.user_identity()) {
                Ok(response) => response,
                Err(association_rj) => {
                    warn!(
                        "{}: user identity of {} refused",
                        self.ae_title, rq.calling_ae_title
                    );
                    return self.reject(association_rj);
                }
            },
            None => None,
        };

        if self
            .device
            .as_ref()
            .map_or(false, |d| d.is_limit_of_open_associations_exceeded())
        {
            return self.reject(AssociationRJ {
                result: AssociationRJResult::Transient,
                source: AssociationRJSource::ServiceProviderPresentation(
                    AssociationRJServiceProviderPresentationReason::LocalLimitExceeded,
                ),
            });
        }

        let ac = negotiation::accept(
            connection,
            &self.transfer_capabilities.read(),
            self.role_selection_policy,
            rq,
            user_identity_response,
        );
        debug!(
            "{}: accepted association from {}, {} of {} presentation contexts",
            self.ae_title,
            rq.calling_ae_title,
            ac.presentation_contexts
                .iter()
                .filter(|pc| pc.is_accepted())
                .count(),
            ac.presentation_contexts.len()
        );
        Ok(ac)
    }

    fn reject<T>(&self, association_rj: AssociationRJ) -> Result<T> {
        debug!("{}: association rejected: {}", self.ae_title, association_rj);
        RejectedSnafu { association_rj }.fail()
    }

    fn ensure_ready(&self) -> Result<()> {
        ensure!(
            self.device.is_some(),
            NotAttachedSnafu {
                ae_title: &self.ae_title
            }
        );
        ensure!(
            self.is_installed(),
            NotInstalledSnafu {
                ae_title: &self.ae_title
            }
        );
        Ok(())
    }

    /// Complete an outbound association request
    /// with the parameters of the local connection.
    fn prepare_request(&self, local: &Connection, rq: &mut AssociationRQ) {
        if rq.calling_ae_title.trim().is_empty() {
            rq.calling_ae_title = self.ae_title.clone();
        }
        let window = (local.max_ops_invoked(), local.max_ops_performed());
        if window == (DEFAULT_MAX_OPS, DEFAULT_MAX_OPS) {
            rq.user_variables
                .retain(|item| !matches!(item, UserVariableItem::AsyncOperationsWindow { .. }));
        } else {
            rq.set_async_operations_window(window.0, window.1);
        }
        rq.set_max_pdu_length(local.receive_pdu_length());
    }

    /// Request an association from the local connection
    /// to the remote connection.
    ///
    /// The calling AE title of the request is filled in if empty,
    /// and the operations window and maximum PDU length
    /// are taken from the local connection.
    /// The handshake itself is performed by the given requestor
    /// over the newly opened transport.
    pub fn connect<R>(
        &self,
        local: &Connection,
        remote: &Connection,
        mut rq: AssociationRQ,
        requestor: &R,
    ) -> Result<R::Association>
    where
        R: AssociationRequestor,
    {
        self.ensure_ready()?;
        ensure!(
            local.is_compatible(remote),
            IncompatibleConnectionSnafu {
                remote: remote.to_string(),
                ae_title: &self.ae_title,
            }
        );
        self.prepare_request(local, &mut rq);
        let transport = local.open(remote)?;
        debug!(
            "{}: requesting association with {} through {}",
            self.ae_title, rq.called_ae_title, remote
        );
        requestor.establish(transport, rq).context(HandshakeSnafu)
    }

    /// Find the first local connection compatible with the remote one.
    pub fn find_compatible_connection(&self, remote: &Connection) -> Result<&Arc<Connection>> {
        self.connections
            .iter()
            .find(|local| local.is_compatible(remote))
            .context(IncompatibleConnectionSnafu {
                remote: remote.to_string(),
                ae_title: &self.ae_title,
            })
    }

    /// Pick the first compatible pair of connections,
    /// trying each remote connection in turn against every local one.
    fn find_compatible_pair<'a>(
        &'a self,
        remote: &'a ApplicationEntity,
    ) -> Result<(&'a Arc<Connection>, &'a Arc<Connection>)> {
        remote
            .connections
            .iter()
            .find_map(|remote_conn| {
                self.connections
                    .iter()
                    .find(|local| local.is_compatible(remote_conn))
                    .map(|local| (local, remote_conn))
            })
            .context(IncompatibleConnectionSnafu {
                remote: &remote.ae_title,
                ae_title: &self.ae_title,
            })
    }

    /// Request an association with a remote application entity,
    /// through the first compatible pair of connections.
    ///
    /// The called AE title of the request is filled in if empty.
    pub fn connect_to<R>(
        &self,
        remote: &ApplicationEntity,
        mut rq: AssociationRQ,
        requestor: &R,
    ) -> Result<R::Association>
    where
        R: AssociationRequestor,
    {
        let (local, remote_conn) = self.find_compatible_pair(remote)?;
        if rq.called_ae_title.trim().is_empty() {
            rq.called_ae_title = remote.ae_title.clone();
        }
        self.connect(local, remote_conn, rq, requestor)
    }

    /// Request an association from the local connection
    /// to the remote connection asynchronously.
    ///
    /// See [`connect`](Self::connect).
    #[cfg(feature = "async")]
    pub async fn connect_async<R>(
        &self,
        local: &Connection,
        remote: &Connection,
        mut rq: AssociationRQ,
        requestor: &R,
    ) -> Result<R::Association>
    where
        R: crate::association::AsyncAssociationRequestor,
    {
        self.ensure_ready()?;
        ensure!(
            local.is_compatible(remote),
            IncompatibleConnectionSnafu {
                remote: remote.to_string(),
                ae_title: &self.ae_title,
            }
        );
        self.prepare_request(local, &mut rq);
        let transport = local.open_async(remote).await?;
        debug!(
            "{}: requesting association with {} through {}",
            self.ae_title, rq.called_ae_title, remote
        );
        requestor
            .establish_async(transport, rq)
            .await
            .context(HandshakeSnafu)
    }

    /// Request an association with a remote application entity asynchronously.
    ///
    /// See [`connect_to`](Self::connect_to).
    #[cfg(feature = "async")]
    pub async fn connect_to_async<R>(
        &self,
        remote: &ApplicationEntity,
        mut rq: AssociationRQ,
        requestor: &R,
    ) -> Result<R::Association>
    where
        R: crate::association::AsyncAssociationRequestor,
    {
        let (local, remote_conn) = self.find_compatible_pair(remote)?;
        if rq.called_ae_title.trim().is_empty() {
            rq.called_ae_title = remote.ae_title.clone();
        }
        self.connect_async(local, remote_conn, rq, requestor).await
    }

    /// Hand a DIMSE request received over an accepted association
    /// to the handler of this application entity,
    /// or to the one of its device.
    ///
    /// If no handler is configured,
    /// the association is to be aborted by the service provider.
    pub fn on_dimse_request(
        &self,
        association: &AssociationAC,
        pc: &PresentationContextResult,
        command: &[u8],
        data: &mut dyn Read,
    ) -> Result<()> {
        let Some(handler) = resolve_handler(self.dimse_handler.as_ref(), self.device.as_deref())
        else {
            error!("{}: no DIMSE request handler configured", self.ae_title);
            return AbortedSnafu {
                reason: AbortRQServiceProviderReason::ReasonNotSpecified,
            }
            .fail();
        };
        handler
            .on_request(association, pc, command, data)
            .context(DispatchSnafu)
    }

    /// Notify the DIMSE request handler that an association was closed.
    pub fn on_close(&self, association: &AssociationAC) {
        if let Some(handler) = resolve_handler(self.dimse_handler.as_ref(), self.device.as_deref())
        {
            handler.on_close(association);
        }
    }
}

impl Drop for ApplicationEntity {
    fn drop(&mut self) {
        if let Some(device) = &self.device {
            device.unregister_ae_title(&self.ae_title);
        }
    }
}

impl fmt::Debug for ApplicationEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationEntity")
            .field("ae_title", &self.ae_title)
            .field("description", &self.description)
            .field("acceptor", &self.acceptor)
            .field("initiator", &self.initiator)
            .field("installed", &self.installed)
            .field("check_calling_ae_title", &self.check_calling_ae_title)
            .field("role_selection_policy", &self.role_selection_policy)
            .field("connections", &self.connections)
            .field("transfer_capabilities", &self.transfer_capabilities)
            .field("device", &self.device.as_ref().map(|d| d.name()))
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ApplicationEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ApplicationEntity[{}", self.ae_title)?;
        if let Some(description) = &self.description {
            writeln!(f, "  desc: {}", description)?;
        }
        writeln!(f, "  acceptor: {}", self.acceptor)?;
        writeln!(f, "  initiator: {}", self.initiator)?;
        writeln!(f, "  installed: {:?}", self.installed)?;
        for conn in &self.connections {
            writeln!(f, "  {}", conn)?;
        }
        for tc in self.transfer_capabilities.read().iter() {
            writeln!(f, "  {}", tc)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn empty_ae_title_is_invalid() {
        assert_eq!(
            ApplicationEntity::new("").unwrap_err().kind(),
            ErrorKind::Validation
        );
        let mut ae = ApplicationEntity::new("ANY-SCP").unwrap();
        assert_eq!(ae.set_ae_title("  ").unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(ae.ae_title(), "ANY-SCP");
    }

    #[test]
    fn title_change_reindexes_on_device() {
        let device = Arc::new(Device::new("device"));
        let mut ae = ApplicationEntity::new("OLD").unwrap();
        ae.set_device(Some(device.clone())).unwrap();
        ae.set_ae_title("NEW").unwrap();
        assert_eq!(device.ae_titles(), vec!["NEW".to_string()]);

        let mut other = ApplicationEntity::new("OTHER").unwrap();
        other.set_device(Some(device.clone())).unwrap();
        let err = other.set_ae_title("NEW").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(other.ae_title(), "OTHER");

        drop(ae);
        assert_eq!(device.ae_titles(), vec!["OTHER".to_string()]);
    }

    #[test]
    fn single_owner() {
        let first = Arc::new(Device::new("first"));
        let second = Arc::new(Device::new("second"));
        let mut ae = ApplicationEntity::new("SCP").unwrap();
        ae.set_device(Some(first.clone())).unwrap();
        ae.set_device(Some(first.clone())).unwrap();

        let err = ae.set_device(Some(second.clone())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        ae.set_device(None).unwrap();
        assert!(!first.contains_ae_title("SCP"));
        ae.set_device(Some(second.clone())).unwrap();
        assert!(second.contains_ae_title("SCP"));
    }

    #[test]
    fn cannot_install_on_uninstalled_device() {
        let device = Arc::new(Device::new("device").with_installed(false));
        let mut ae = ApplicationEntity::new("SCP").unwrap();
        ae.set_device(Some(device)).unwrap();
        let err = ae.set_installed(true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        ae.set_installed(false).unwrap();
        ae.set_installed(Installed::Inherit).unwrap();
        assert_eq!(ae.installed(), Installed::Inherit);
    }

    #[test]
    fn properties_fall_back_to_device() {
        let device = Arc::new(Device::new("device"));
        device.set_property("institution", "General Hospital");
        device.set_property("station", "DEVICE");
        let mut ae = ApplicationEntity::new("SCP").unwrap();
        assert_eq!(ae.property("institution"), None);

        ae.set_device(Some(device)).unwrap();
        ae.set_property("station", "AE");
        assert_eq!(ae.property("station").as_deref(), Some("AE"));
        assert_eq!(
            ae.property("institution").as_deref(),
            Some("General Hospital")
        );
    }

    #[test]
    fn display_lists_capabilities() {
        let mut ae = ApplicationEntity::new("SCP").unwrap();
        ae.set_description(Some("test node".to_string()));
        ae.add_connection(Arc::new(Connection::new("127.0.0.1").with_port(104)));
        ae.add_transfer_capability(TransferCapability::new("1.2.3", Role::Scu, ["TS1"]));
        ae.add_transfer_capability(TransferCapability::new("1.2.3", Role::Scp, ["TS1"]));

        let listing = ae.to_string();
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines[0], "ApplicationEntity[SCP");
        assert_eq!(lines[1], "  desc: test node");
        assert_eq!(lines[4], "  installed: Inherit");
        assert_eq!(lines[5], "  Connection[dicom://127.0.0.1:104]");
        assert!(lines[6].contains("role: SCP"));
        assert!(lines[7].contains("role: SCU"));
        assert_eq!(lines[8], "]");

        ae.set_installed(Installed::No).unwrap();
        assert_eq!(ae.to_string().lines().nth(4), Some("  installed: No"));
    }

    #[test]
    fn missing_dimse_handler_aborts() {
        let ae = ApplicationEntity::new("SCP").unwrap();
        let ac = AssociationAC {
            protocol_version: 1,
            calling_ae_title: "SCU".to_string(),
            called_ae_title: "SCP".to_string(),
            application_context_name: crate::pdu::DICOM_APPLICATION_CONTEXT_NAME.to_string(),
            presentation_contexts: vec![],
            user_variables: vec![],
        };
        let pc = PresentationContextResult {
            id: 1,
            reason: crate::pdu::PresentationContextResultReason::Acceptance,
            transfer_syntax: "1.2.840.10008.1.2".to_string(),
        };
        let err = ae
            .on_dimse_request(&ac, &pc, &[], &mut std::io::empty())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Abort);
    }
}
