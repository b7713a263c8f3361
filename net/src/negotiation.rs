//! Association negotiation engine.
//!
//! Given an association request
//! and the transfer capabilities of the local application entity,
//! this module decides the outcome of each proposed presentation context,
//! resolving the roles of both sides
//! and merging SOP class extended negotiation options.
//!
//! The pre-checks deciding whether an association is accepted at all
//! live in [`ApplicationEntity::negotiate`](crate::entity::ApplicationEntity::negotiate),
//! which is the main entry point to this logic.
use std::sync::Arc;

use tracing::trace;

use crate::capability::{Role, TransferCapability};
use crate::connection::Connection;
use crate::pdu::{
    AssociationAC, AssociationRJ, AssociationRQ, PresentationContextProposed,
    PresentationContextResult, PresentationContextResultReason, RoleSelection, UserIdentity,
    UserVariableItem, DEFAULT_MAX_OPS,
};
use crate::registry::CapabilityTables;
use crate::uid::trim_uid;
use crate::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME};

/// Combine two operation limits where `0` stands for "unlimited".
///
/// If either value is zero, the other one is returned.
/// Otherwise, the smallest of the two is returned.
///
/// ```
/// # use dicom_net::negotiation::min_zero_as_max;
/// assert_eq!(min_zero_as_max(0, 5), 5);
/// assert_eq!(min_zero_as_max(3, 7), 3);
/// ```
pub fn min_zero_as_max(a: u32, b: u32) -> u32 {
    match (a, b) {
        (0, b) => b,
        (a, 0) => a,
        (a, b) => a.min(b),
    }
}

/// Which capability wins when the requester proposes to take both roles
/// for a SOP class and the local application entity
/// could serve either of them.
#[derive(Debug, Copy, Clone, Default, Eq, Hash, PartialEq)]
pub enum RoleSelectionPolicy {
    /// Let the requester act as SCU,
    /// serving the SOP class through the local SCP capability.
    #[default]
    PreferPeerScu,
    /// Let the requester act as SCP,
    /// using the SOP class through the local SCU capability.
    PreferPeerScp,
}

/// A negotiator of user identities proposed in association requests.
///
/// Returning `Ok(Some(response))` accepts the user identity
/// and sends the given server response back to the requester.
/// `Ok(None)` accepts the association without a server response.
/// An `Err` rejects the association with the given descriptor.
///
/// This trait is implemented for closures of the same signature:
///
/// ```
/// # use std::sync::Arc;
/// # use dicom_net::negotiation::UserIdentityNegotiator;
/// # use dicom_net::pdu::{AssociationRJ, AssociationRJServiceUserReason, AssociationRQ, UserIdentity};
/// let negotiator: Arc<dyn UserIdentityNegotiator> = Arc::new(
///     |_: &AssociationRQ,
///      identity: Option<&UserIdentity>|
///      -> Result<Option<Vec<u8>>, AssociationRJ> {
///         match identity {
///             Some(_) => Ok(None),
///             None => Err(AssociationRJ::permanent(
///                 AssociationRJServiceUserReason::NoReasonGiven,
///             )),
///         }
///     },
/// );
/// # let _ = negotiator;
/// ```
pub trait UserIdentityNegotiator: Send + Sync {
    fn negotiate(
        &self,
        rq: &AssociationRQ,
        user_identity: Option<&UserIdentity>,
    ) -> Result<Option<Vec<u8>>, AssociationRJ>;
}

impl<F> UserIdentityNegotiator for F
where
    F: Fn(&AssociationRQ, Option<&UserIdentity>) -> Result<Option<Vec<u8>>, AssociationRJ>
        + Send
        + Sync,
{
    fn negotiate(
        &self,
        rq: &AssociationRQ,
        user_identity: Option<&UserIdentity>,
    ) -> Result<Option<Vec<u8>>, AssociationRJ> {
        self(rq, user_identity)
    }
}

/// Build the association acceptance for a request
/// which passed all association-level checks.
///
/// Each proposed presentation context is resolved in request order
/// against the given capability tables.
pub(crate) fn accept(
    connection: &Connection,
    tables: &CapabilityTables,
    policy: RoleSelectionPolicy,
    rq: &AssociationRQ,
    user_identity_response: Option<Vec<u8>>,
) -> AssociationAC {
    let mut ac = AssociationAC {
        protocol_version: rq.protocol_version,
        calling_ae_title: rq.calling_ae_title.clone(),
        called_ae_title: rq.called_ae_title.clone(),
        application_context_name: rq.application_context_name.clone(),
        presentation_contexts: Vec::with_capacity(rq.presentation_contexts.len()),
        user_variables: vec![
            UserVariableItem::MaxLength(connection.receive_pdu_length()),
            UserVariableItem::ImplementationClassUID(IMPLEMENTATION_CLASS_UID.to_string()),
            UserVariableItem::ImplementationVersionName(IMPLEMENTATION_VERSION_NAME.to_string()),
        ],
    };

    let max_ops_invoked = min_zero_as_max(rq.max_ops_invoked(), connection.max_ops_performed());
    let max_ops_performed = min_zero_as_max(rq.max_ops_performed(), connection.max_ops_invoked());
    if (max_ops_invoked, max_ops_performed) != (DEFAULT_MAX_OPS, DEFAULT_MAX_OPS) {
        ac.set_async_operations_window(max_ops_invoked, max_ops_performed);
    }

    for pc in &rq.presentation_contexts {
        let result = negotiate_presentation_context(tables, policy, rq, pc, &mut ac);
        ac.presentation_contexts.push(result);
    }

    if let Some(response) = user_identity_response {
        ac.set_user_identity_response(response);
    }
    ac
}

/// Decide the outcome of a single proposed presentation context.
///
/// Role selection and extended negotiation answers
/// are recorded into `ac` as a side effect.
pub fn negotiate_presentation_context(
    tables: &CapabilityTables,
    policy: RoleSelectionPolicy,
    rq: &AssociationRQ,
    pc: &PresentationContextProposed,
    ac: &mut AssociationAC,
) -> PresentationContextResult {
    let abstract_syntax = trim_uid(pc.abstract_syntax.as_str());
    let first_ts = pc
        .transfer_syntaxes
        .first()
        .map(|ts| trim_uid(ts.as_str()).into_owned())
        .unwrap_or_default();

    let Some(tc) = select_capability(tables, policy, rq, &abstract_syntax, ac) else {
        trace!(
            "Presentation context #{}: abstract syntax {} not supported",
            pc.id,
            abstract_syntax
        );
        return PresentationContextResult {
            id: pc.id,
            reason: PresentationContextResultReason::AbstractSyntaxNotSupported,
            transfer_syntax: first_ts,
        };
    };

    let chosen = pc
        .transfer_syntaxes
        .iter()
        .map(|ts| trim_uid(ts.as_str()))
        .find(|ts| tc.contains_transfer_syntax(ts));

    match chosen {
        Some(ts) => {
            if let (Some(proposed), Some(ext_neg)) = (
                rq.extended_negotiation_for(&abstract_syntax),
                tc.extended_negotiation(),
            ) {
                ac.add_extended_negotiation(&*abstract_syntax, ext_neg.negotiate(proposed));
            }
            trace!(
                "Presentation context #{}: accepted {} with {} as {}",
                pc.id,
                abstract_syntax,
                ts,
                tc.role()
            );
            PresentationContextResult {
                id: pc.id,
                reason: PresentationContextResultReason::Acceptance,
                transfer_syntax: ts.into_owned(),
            }
        }
        None => {
            trace!(
                "Presentation context #{}: no transfer syntax supported for {}",
                pc.id,
                abstract_syntax
            );
            PresentationContextResult {
                id: pc.id,
                reason: PresentationContextResultReason::TransferSyntaxesNotSupported,
                transfer_syntax: first_ts,
            }
        }
    }
}

/// Resolve the local transfer capability serving the given abstract syntax,
/// answering the requester's role selection proposal if there is one.
fn select_capability<'t>(
    tables: &'t CapabilityTables,
    policy: RoleSelectionPolicy,
    rq: &AssociationRQ,
    abstract_syntax: &str,
    ac: &mut AssociationAC,
) -> Option<&'t Arc<TransferCapability>> {
    let hint = rq.common_extended_negotiation_for(abstract_syntax);
    let lookup = |role: Role| tables.lookup(role, abstract_syntax, hint);

    let Some(proposed) = rq.role_selection_for(abstract_syntax) else {
        return lookup(Role::Scp);
    };

    // a context for an abstract syntax already answered
    // follows the roles granted then
    if let Some(answered) = ac.role_selection_for(abstract_syntax) {
        return granted_role(policy, answered.scu, answered.scp).and_then(lookup);
    }

    let scp_tc = lookup(Role::Scp);
    let scu_tc = lookup(Role::Scu);
    let scu = proposed.scu && scp_tc.is_some();
    let scp = proposed.scp && scu_tc.is_some();
    trace!(
        "Role selection for {}: proposed SCU={} SCP={}, granted SCU={} SCP={}",
        abstract_syntax,
        proposed.scu,
        proposed.scp,
        scu,
        scp
    );
    ac.add_role_selection(RoleSelection::new(abstract_syntax, scu, scp));

    match granted_role(policy, scu, scp)? {
        Role::Scp => scp_tc,
        Role::Scu => scu_tc,
    }
}

/// The local role to serve a SOP class in,
/// given the roles granted to the requester.
/// No role is available if none was granted.
fn granted_role(policy: RoleSelectionPolicy, scu: bool, scp: bool) -> Option<Role> {
    match policy {
        RoleSelectionPolicy::PreferPeerScu if scu => Some(Role::Scp),
        RoleSelectionPolicy::PreferPeerScu if scp => Some(Role::Scu),
        RoleSelectionPolicy::PreferPeerScp if scp => Some(Role::Scu),
        RoleSelectionPolicy::PreferPeerScp if scu => Some(Role::Scp),
        _ => None,
    }
}
