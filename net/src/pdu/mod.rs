//! Association descriptor module
//!
//! This module comprises the in-memory representations
//! of the association request, acceptance and rejection messages
//! exchanged during association negotiation,
//! along with their variable items and user information sub-items.
//!
//! Encoding these structures to the wire
//! is the responsibility of the upper layer protocol implementation.
use std::fmt::Display;

use crate::uid::trim_uid;

/// The default maximum PDU length, in bytes.
pub const DEFAULT_MAX_PDU: u32 = 16_384;

/// The default maximum number of outstanding operations
/// when no asynchronous operations window is negotiated.
pub const DEFAULT_MAX_OPS: u32 = 1;

/// The DICOM application context name.
pub const DICOM_APPLICATION_CONTEXT_NAME: &str = "1.2.840.10008.3.1.1.1";

/// Message component for a proposed presentation context.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PresentationContextProposed {
    /// the presentation context identifier
    pub id: u8,
    /// the expected abstract syntax UID
    /// (commonly referrering to the expected SOP class)
    pub abstract_syntax: String,
    /// a list of transfer syntax UIDs to support in this interaction
    pub transfer_syntaxes: Vec<String>,
}

/// Message component for the outcome of a proposed presentation context.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PresentationContextResult {
    /// the presentation context identifier
    pub id: u8,
    /// the result of the negotiation
    pub reason: PresentationContextResultReason,
    /// the accepted transfer syntax,
    /// or an echo of the first one proposed if not accepted
    pub transfer_syntax: String,
}

impl PresentationContextResult {
    /// Whether this presentation context was accepted.
    pub fn is_accepted(&self) -> bool {
        self.reason == PresentationContextResultReason::Acceptance
    }
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PresentationContextResultReason {
    Acceptance = 0,
    UserRejection = 1,
    NoReason = 2,
    AbstractSyntaxNotSupported = 3,
    TransferSyntaxesNotSupported = 4,
}

impl Display for PresentationContextResultReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            PresentationContextResultReason::Acceptance => "acceptance",
            PresentationContextResultReason::UserRejection => "user rejection",
            PresentationContextResultReason::NoReason => "no reason",
            PresentationContextResultReason::AbstractSyntaxNotSupported => {
                "abstract syntax not supported"
            }
            PresentationContextResultReason::TransferSyntaxesNotSupported => {
                "transfer syntaxes not supported"
            }
        };
        f.write_str(msg)
    }
}

#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJResult {
    Permanent = 1,
    Transient = 2,
}

impl Display for AssociationRJResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssociationRJResult::Permanent => f.write_str("rejected-permanent"),
            AssociationRJResult::Transient => f.write_str("rejected-transient"),
        }
    }
}

/// The source of an association rejection, along with its reason.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJSource {
    ServiceUser(AssociationRJServiceUserReason),
    ServiceProviderASCE(AssociationRJServiceProviderASCEReason),
    ServiceProviderPresentation(AssociationRJServiceProviderPresentationReason),
}

impl Display for AssociationRJSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssociationRJSource::ServiceUser(r) => Display::fmt(r, f),
            AssociationRJSource::ServiceProviderASCE(r) => Display::fmt(r, f),
            AssociationRJSource::ServiceProviderPresentation(r) => Display::fmt(r, f),
        }
    }
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceUserReason {
    NoReasonGiven,
    ApplicationContextNameNotSupported,
    CallingAETitleNotRecognized,
    CalledAETitleNotRecognized,
    Reserved(u8),
}

impl Display for AssociationRJServiceUserReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssociationRJServiceUserReason::NoReasonGiven => f.write_str("no reason given"),
            AssociationRJServiceUserReason::ApplicationContextNameNotSupported => {
                f.write_str("application context name not supported")
            }
            AssociationRJServiceUserReason::CallingAETitleNotRecognized => {
                f.write_str("calling AE title not recognized")
            }
            AssociationRJServiceUserReason::CalledAETitleNotRecognized => {
                f.write_str("called AE title not recognized")
            }
            AssociationRJServiceUserReason::Reserved(code) => write!(f, "reserved code {}", code),
        }
    }
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceProviderASCEReason {
    NoReasonGiven,
    ProtocolVersionNotSupported,
}

impl Display for AssociationRJServiceProviderASCEReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssociationRJServiceProviderASCEReason::NoReasonGiven => f.write_str("no reason given"),
            AssociationRJServiceProviderASCEReason::ProtocolVersionNotSupported => {
                f.write_str("protocol version not supported")
            }
        }
    }
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceProviderPresentationReason {
    TemporaryCongestion,
    LocalLimitExceeded,
    Reserved(u8),
}

impl Display for AssociationRJServiceProviderPresentationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssociationRJServiceProviderPresentationReason::TemporaryCongestion => {
                f.write_str("temporary congestion")
            }
            AssociationRJServiceProviderPresentationReason::LocalLimitExceeded => {
                f.write_str("local limit exceeded")
            }
            AssociationRJServiceProviderPresentationReason::Reserved(code) => {
                write!(f, "reserved code {}", code)
            }
        }
    }
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AbortRQSource {
    ServiceUser,
    ServiceProvider(AbortRQServiceProviderReason),
    Reserved,
}

/// An enumeration of supported A-ABORT PDU provider reasons.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AbortRQServiceProviderReason {
    /// Reason Not Specified
    ReasonNotSpecified,
    /// Unrecognized PDU
    UnrecognizedPdu,
    /// Unexpected PDU
    UnexpectedPdu,
    /// Reserved
    Reserved,
    /// Unrecognized PDU parameter
    UnrecognizedPduParameter,
    /// Unexpected PDU parameter
    UnexpectedPduParameter,
    /// Invalid PDU parameter
    InvalidPduParameter,
}

impl Display for AbortRQServiceProviderReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            AbortRQServiceProviderReason::ReasonNotSpecified => "reason not specified",
            AbortRQServiceProviderReason::UnrecognizedPdu => "unrecognized PDU",
            AbortRQServiceProviderReason::UnexpectedPdu => "unexpected PDU",
            AbortRQServiceProviderReason::Reserved => "reserved code",
            AbortRQServiceProviderReason::UnrecognizedPduParameter => "unrecognized PDU parameter",
            AbortRQServiceProviderReason::UnexpectedPduParameter => "unexpected PDU parameter",
            AbortRQServiceProviderReason::InvalidPduParameter => "invalid PDU parameter",
        };
        f.write_str(msg)
    }
}

/// SCP/SCU role selection sub-item.
///
/// In a request, the flags state which roles the requester proposes
/// to take for the SOP class.
/// In an acceptance, they state which of those roles were granted.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct RoleSelection {
    /// the SOP class UID this role selection applies to
    pub sop_class_uid: String,
    /// the association requester acts as service class user
    pub scu: bool,
    /// the association requester acts as service class provider
    pub scp: bool,
}

impl RoleSelection {
    pub fn new(sop_class_uid: impl Into<String>, scu: bool, scp: bool) -> Self {
        RoleSelection {
            sop_class_uid: sop_class_uid.into(),
            scu,
            scp,
        }
    }
}

/// SOP class common extended negotiation sub-item.
///
/// Relates a SOP class to its service class
/// and to more general SOP classes it specializes.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct CommonExtendedNegotiation {
    pub sop_class_uid: String,
    pub service_class_uid: String,
    pub related_general_sop_class_uids: Vec<String>,
}

impl CommonExtendedNegotiation {
    pub fn new(
        sop_class_uid: impl Into<String>,
        service_class_uid: impl Into<String>,
        related_general_sop_class_uids: Vec<String>,
    ) -> Self {
        CommonExtendedNegotiation {
            sop_class_uid: sop_class_uid.into(),
            service_class_uid: service_class_uid.into(),
            related_general_sop_class_uids,
        }
    }
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum UserVariableItem {
    Unknown(u8, Vec<u8>),
    MaxLength(u32),
    ImplementationClassUID(String),
    ImplementationVersionName(String),
    AsyncOperationsWindow {
        max_ops_invoked: u32,
        max_ops_performed: u32,
    },
    RoleSelection(RoleSelection),
    SopClassExtendedNegotiationSubItem(String, Vec<u8>),
    SopClassCommonExtendedNegotiationSubItem(CommonExtendedNegotiation),
    UserIdentityItem(UserIdentity),
    /// user identity server response (acceptance only)
    UserIdentityResponse(Vec<u8>),
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct UserIdentity {
    positive_response_requested: bool,
    identity_type: UserIdentityType,
    primary_field: Vec<u8>,
    secondary_field: Vec<u8>,
}
impl UserIdentity {
    pub fn new(
        positive_response_requested: bool,
        identity_type: UserIdentityType,
        primary_field: Vec<u8>,
        secondary_field: Vec<u8>,
    ) -> Self {
        UserIdentity {
            positive_response_requested,
            identity_type,
            primary_field,
            secondary_field,
        }
    }

    pub fn positive_response_requested(&self) -> bool {
        self.positive_response_requested
    }

    pub fn identity_type(&self) -> UserIdentityType {
        self.identity_type.clone()
    }

    pub fn primary_field(&self) -> &[u8] {
        &self.primary_field
    }

    pub fn secondary_field(&self) -> &[u8] {
        &self.secondary_field
    }
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
#[non_exhaustive]
pub enum UserIdentityType {
    Username,
    UsernamePassword,
    KerberosServiceTicket,
    SamlAssertion,
    Jwt,
}
/// Replace the first item matching `pred` in place,
/// or append the new item if none matches.
fn upsert_item<F>(items: &mut Vec<UserVariableItem>, item: UserVariableItem, pred: F)
where
    F: Fn(&UserVariableItem) -> bool,
{
    match items.iter_mut().find(|it| pred(it)) {
        Some(slot) => *slot = item,
        None => items.push(item),
    }
}

fn max_length_of(items: &[UserVariableItem]) -> Option<u32> {
    items.iter().find_map(|item| match item {
        UserVariableItem::MaxLength(len) => Some(*len),
        _ => None,
    })
}

fn async_ops_window_of(items: &[UserVariableItem]) -> (u32, u32) {
    items
        .iter()
        .find_map(|item| match item {
            UserVariableItem::AsyncOperationsWindow {
                max_ops_invoked,
                max_ops_performed,
            } => Some((*max_ops_invoked, *max_ops_performed)),
            _ => None,
        })
        .unwrap_or((DEFAULT_MAX_OPS, DEFAULT_MAX_OPS))
}

fn role_selection_of<'a>(items: &'a [UserVariableItem], uid: &str) -> Option<&'a RoleSelection> {
    items.iter().find_map(|item| match item {
        UserVariableItem::RoleSelection(rs) if trim_uid(&rs.sop_class_uid) == trim_uid(uid) => {
            Some(rs)
        }
        _ => None,
    })
}

fn extended_negotiation_of<'a>(items: &'a [UserVariableItem], uid: &str) -> Option<&'a [u8]> {
    items.iter().find_map(|item| match item {
        UserVariableItem::SopClassExtendedNegotiationSubItem(sop_class, info)
            if trim_uid(sop_class) == trim_uid(uid) =>
        {
            Some(info.as_slice())
        }
        _ => None,
    })
}

/// An in-memory representation of an association request
#[derive(Debug, Clone, Eq, Hash, PartialEq, PartialOrd)]
pub struct AssociationRQ {
    pub protocol_version: u16,
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub application_context_name: String,
    pub presentation_contexts: Vec<PresentationContextProposed>,
    pub user_variables: Vec<UserVariableItem>,
}

impl Default for AssociationRQ {
    fn default() -> Self {
        AssociationRQ {
            protocol_version: 1,
            calling_ae_title: String::new(),
            called_ae_title: String::new(),
            application_context_name: DICOM_APPLICATION_CONTEXT_NAME.to_string(),
            presentation_contexts: Vec::new(),
            user_variables: Vec::new(),
        }
    }
}

impl AssociationRQ {
    /// The maximum PDU length the requester is willing to receive,
    /// if stated.
    pub fn max_pdu_length(&self) -> Option<u32> {
        max_length_of(&self.user_variables)
    }

    /// Set the maximum PDU length the requester is willing to receive.
    pub fn set_max_pdu_length(&mut self, max_pdu_length: u32) {
        upsert_item(
            &mut self.user_variables,
            UserVariableItem::MaxLength(max_pdu_length),
            |it| matches!(it, UserVariableItem::MaxLength(_)),
        );
    }

    /// The maximum number of operations the requester may invoke
    /// asynchronously (`0` means unlimited).
    pub fn max_ops_invoked(&self) -> u32 {
        async_ops_window_of(&self.user_variables).0
    }

    /// The maximum number of operations the requester may perform
    /// asynchronously (`0` means unlimited).
    pub fn max_ops_performed(&self) -> u32 {
        async_ops_window_of(&self.user_variables).1
    }

    /// Set the asynchronous operations window proposed by the requester.
    pub fn set_async_operations_window(&mut self, max_ops_invoked: u32, max_ops_performed: u32) {
        upsert_item(
            &mut self.user_variables,
            UserVariableItem::AsyncOperationsWindow {
                max_ops_invoked,
                max_ops_performed,
            },
            |it| matches!(it, UserVariableItem::AsyncOperationsWindow { .. }),
        );
    }

    /// Retrieve the role selection proposed for the given abstract syntax.
    pub fn role_selection_for(&self, abstract_syntax: &str) -> Option<&RoleSelection> {
        role_selection_of(&self.user_variables, abstract_syntax)
    }

    /// Retrieve the SOP class extended negotiation information
    /// proposed for the given abstract syntax.
    pub fn extended_negotiation_for(&self, abstract_syntax: &str) -> Option<&[u8]> {
        extended_negotiation_of(&self.user_variables, abstract_syntax)
    }

    /// Retrieve the SOP class common extended negotiation
    /// for the given abstract syntax.
    pub fn common_extended_negotiation_for(
        &self,
        abstract_syntax: &str,
    ) -> Option<&CommonExtendedNegotiation> {
        self.user_variables.iter().find_map(|item| match item {
            UserVariableItem::SopClassCommonExtendedNegotiationSubItem(cen)
                if trim_uid(&cen.sop_class_uid) == trim_uid(abstract_syntax) =>
            {
                Some(cen)
            }
            _ => None,
        })
    }

    /// Retrieve the user identity proposed by the requester.
    pub fn user_identity(&self) -> Option<&UserIdentity> {
        self.user_variables.iter().find_map(|item| match item {
            UserVariableItem::UserIdentityItem(user_identity) => Some(user_identity),
            _ => None,
        })
    }
}

/// An in-memory representation of an association acknowledgement
#[derive(Debug, Clone, Eq, Hash, PartialEq, PartialOrd)]
pub struct AssociationAC {
    pub protocol_version: u16,
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub application_context_name: String,
    pub presentation_contexts: Vec<PresentationContextResult>,
    pub user_variables: Vec<UserVariableItem>,
}

impl AssociationAC {
    /// The maximum PDU length the acceptor is willing to receive,
    /// if stated.
    pub fn max_pdu_length(&self) -> Option<u32> {
        max_length_of(&self.user_variables)
    }

    pub fn set_max_pdu_length(&mut self, max_pdu_length: u32) {
        upsert_item(
            &mut self.user_variables,
            UserVariableItem::MaxLength(max_pdu_length),
            |it| matches!(it, UserVariableItem::MaxLength(_)),
        );
    }

    /// The negotiated maximum number of operations invoked
    /// by the requester.
    pub fn max_ops_invoked(&self) -> u32 {
        async_ops_window_of(&self.user_variables).0
    }

    /// The negotiated maximum number of operations performed
    /// by the requester.
    pub fn max_ops_performed(&self) -> u32 {
        async_ops_window_of(&self.user_variables).1
    }

    pub fn set_async_operations_window(&mut self, max_ops_invoked: u32, max_ops_performed: u32) {
        upsert_item(
            &mut self.user_variables,
            UserVariableItem::AsyncOperationsWindow {
                max_ops_invoked,
                max_ops_performed,
            },
            |it| matches!(it, UserVariableItem::AsyncOperationsWindow { .. }),
        );
    }

    /// Retrieve the role selection answered for the given abstract syntax.
    pub fn role_selection_for(&self, abstract_syntax: &str) -> Option<&RoleSelection> {
        role_selection_of(&self.user_variables, abstract_syntax)
    }

    /// Iterate over all role selection answers, in emission order.
    pub fn role_selections(&self) -> impl Iterator<Item = &RoleSelection> {
        self.user_variables.iter().filter_map(|item| match item {
            UserVariableItem::RoleSelection(rs) => Some(rs),
            _ => None,
        })
    }

    /// Record a role selection answer,
    /// replacing any previous answer for the same SOP class.
    pub fn add_role_selection(&mut self, role_selection: RoleSelection) {
        let uid = role_selection.sop_class_uid.clone();
        upsert_item(
            &mut self.user_variables,
            UserVariableItem::RoleSelection(role_selection),
            |it| matches!(it, UserVariableItem::RoleSelection(rs) if rs.sop_class_uid == uid),
        );
    }

    /// Retrieve the extended negotiation answer for the given abstract syntax.
    pub fn extended_negotiation_for(&self, abstract_syntax: &str) -> Option<&[u8]> {
        extended_negotiation_of(&self.user_variables, abstract_syntax)
    }

    /// Record an extended negotiation answer,
    /// replacing any previous answer for the same SOP class.
    pub fn add_extended_negotiation(&mut self, sop_class_uid: impl Into<String>, info: Vec<u8>) {
        let uid = sop_class_uid.into();
        let item = UserVariableItem::SopClassExtendedNegotiationSubItem(uid.clone(), info);
        upsert_item(&mut self.user_variables, item, |it| {
            matches!(it, UserVariableItem::SopClassExtendedNegotiationSubItem(sop_class, _) if *sop_class == uid)
        });
    }

    /// Retrieve the user identity server response, if any.
    pub fn user_identity_response(&self) -> Option<&[u8]> {
        self.user_variables.iter().find_map(|item| match item {
            UserVariableItem::UserIdentityResponse(response) => Some(response.as_slice()),
            _ => None,
        })
    }

    pub fn set_user_identity_response(&mut self, server_response: Vec<u8>) {
        upsert_item(
            &mut self.user_variables,
            UserVariableItem::UserIdentityResponse(server_response),
            |it| matches!(it, UserVariableItem::UserIdentityResponse(_)),
        );
    }
}

/// An in-memory representation of an association rejection.
#[derive(Debug, Clone, Eq, Hash, PartialEq, PartialOrd)]
pub struct AssociationRJ {
    pub result: AssociationRJResult,
    pub source: AssociationRJSource,
}

impl AssociationRJ {
    /// Create a permanent rejection issued by the service user.
    pub fn permanent(reason: AssociationRJServiceUserReason) -> Self {
        AssociationRJ {
            result: AssociationRJResult::Permanent,
            source: AssociationRJSource::ServiceUser(reason),
        }
    }
}

impl Display for AssociationRJ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.result, self.source)
    }
}
