//! Transfer capabilities of a network application entity.
//!
//! A [`TransferCapability`] states that the application entity
//! supports one SOP class in one role ([SCU](Role::Scu) or [SCP](Role::Scp)),
//! through the listed transfer syntaxes,
//! optionally with a SOP class extended negotiation payload.
use std::fmt;

use dicom_encoding::transfer_syntax::TransferSyntaxIndex;
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;

use crate::uid::trim_uid;

/// Wildcard token matching any SOP class or transfer syntax.
///
/// As a SOP class, it matches any SOP class not otherwise registered.
/// As a transfer syntax,
/// it matches any transfer syntax supported by the main
/// [transfer syntax registry](dicom_transfer_syntax_registry).
pub const ANY: &str = "*";

/// The role of an application entity for a SOP class.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum Role {
    /// Service class user
    Scu,
    /// Service class provider
    Scp,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Scu => f.write_str("SCU"),
            Role::Scp => f.write_str("SCP"),
        }
    }
}

/// Level of storage support, as per PS3.4 B.3.1.
#[derive(Debug, Copy, Clone, Default, Eq, Hash, PartialEq)]
pub enum LevelOfSupport {
    Level0 = 0,
    Level1 = 1,
    Level2 = 2,
    #[default]
    Unspecified = 3,
}

impl LevelOfSupport {
    fn from_u8(code: u8) -> Self {
        match code {
            0 => LevelOfSupport::Level0,
            1 => LevelOfSupport::Level1,
            2 => LevelOfSupport::Level2,
            _ => LevelOfSupport::Unspecified,
        }
    }
}

/// Level of digital signature support, as per PS3.4 B.3.1.
#[derive(Debug, Copy, Clone, Default, Eq, Hash, PartialEq)]
pub enum DigitalSignatureSupport {
    #[default]
    Unspecified = 0,
    Level1 = 1,
    Level2 = 2,
    Level3 = 3,
}

impl DigitalSignatureSupport {
    fn from_u8(code: u8) -> Self {
        match code {
            1 => DigitalSignatureSupport::Level1,
            2 => DigitalSignatureSupport::Level2,
            3 => DigitalSignatureSupport::Level3,
            _ => DigitalSignatureSupport::Unspecified,
        }
    }
}

/// Whether the storage SCP may coerce data elements, as per PS3.4 B.3.1.
#[derive(Debug, Copy, Clone, Default, Eq, Hash, PartialEq)]
pub enum ElementCoercion {
    No = 0,
    Yes = 1,
    #[default]
    Unspecified = 2,
}

impl ElementCoercion {
    fn from_u8(code: u8) -> Self {
        match code {
            0 => ElementCoercion::No,
            1 => ElementCoercion::Yes,
            _ => ElementCoercion::Unspecified,
        }
    }
}

/// Storage service class extended negotiation options.
#[derive(Debug, Copy, Clone, Default, Eq, Hash, PartialEq)]
pub struct StorageOptions {
    pub level_of_support: LevelOfSupport,
    pub digital_signature_support: DigitalSignatureSupport,
    pub element_coercion: ElementCoercion,
}

impl StorageOptions {
    pub fn new(
        level_of_support: LevelOfSupport,
        digital_signature_support: DigitalSignatureSupport,
        element_coercion: ElementCoercion,
    ) -> Self {
        StorageOptions {
            level_of_support,
            digital_signature_support,
            element_coercion,
        }
    }

    /// Decode storage options from
    /// SOP class extended negotiation information.
    /// Missing fields are taken as unspecified.
    pub fn from_extended_negotiation_information(info: &[u8]) -> Self {
        let byte = |i: usize| info.get(i).copied();
        StorageOptions {
            level_of_support: byte(0)
                .map(LevelOfSupport::from_u8)
                .unwrap_or_default(),
            digital_signature_support: byte(2)
                .map(DigitalSignatureSupport::from_u8)
                .unwrap_or_default(),
            element_coercion: byte(4)
                .map(ElementCoercion::from_u8)
                .unwrap_or_default(),
        }
    }

    /// Encode these options as
    /// SOP class extended negotiation information.
    pub fn to_extended_negotiation_information(&self) -> Vec<u8> {
        vec![
            self.level_of_support as u8,
            0,
            self.digital_signature_support as u8,
            0,
            self.element_coercion as u8,
            0,
        ]
    }
}

bitflags::bitflags! {
    /// Query/retrieve service class extended negotiation options.
    ///
    /// Each flag corresponds to one byte
    /// of the extended negotiation information,
    /// in declaration order.
    #[derive(Debug, Copy, Clone, Default, Eq, Hash, PartialEq)]
    pub struct QueryOptions: u8 {
        /// relational queries
        const RELATIONAL = 0b0001;
        /// combined date and time range matching
        const DATETIME = 0b0010;
        /// fuzzy semantic matching of person names
        const FUZZY = 0b0100;
        /// timezone query adjustment
        const TIMEZONE = 0b1000;
    }
}

impl QueryOptions {
    const BYTE_ORDER: [QueryOptions; 4] = [
        QueryOptions::RELATIONAL,
        QueryOptions::DATETIME,
        QueryOptions::FUZZY,
        QueryOptions::TIMEZONE,
    ];

    /// Decode query options from
    /// SOP class extended negotiation information.
    pub fn from_extended_negotiation_information(info: &[u8]) -> Self {
        Self::BYTE_ORDER
            .iter()
            .zip(info)
            .filter(|(_, byte)| **byte != 0)
            .fold(QueryOptions::empty(), |acc, (flag, _)| acc | *flag)
    }

    /// Encode these options as
    /// SOP class extended negotiation information.
    pub fn to_extended_negotiation_information(&self) -> Vec<u8> {
        let len = if self.contains(QueryOptions::TIMEZONE) {
            4
        } else if self.intersects(QueryOptions::FUZZY | QueryOptions::DATETIME) {
            3
        } else {
            1
        };
        Self::BYTE_ORDER[..len]
            .iter()
            .map(|flag| u8::from(self.contains(*flag)))
            .collect()
    }
}

/// The SOP class extended negotiation payload
/// declared by a transfer capability.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub enum ExtendedNegotiation {
    Storage(StorageOptions),
    Query(QueryOptions),
}

impl ExtendedNegotiation {
    /// Produce the extended negotiation answer to the requester's proposal.
    ///
    /// Storage options are returned as configured.
    /// Query options are intersected with the proposed ones,
    /// so that the outcome never exceeds what either side supports.
    pub fn negotiate(&self, proposed: &[u8]) -> Vec<u8> {
        match self {
            ExtendedNegotiation::Storage(options) => options.to_extended_negotiation_information(),
            ExtendedNegotiation::Query(options) => {
                let common = QueryOptions::from_extended_negotiation_information(proposed) & *options;
                common.to_extended_negotiation_information()
            }
        }
    }
}

/// Description of one SOP class supported in one role,
/// along with the transfer syntaxes accepted for it.
///
/// # Example
///
/// ```
/// # use dicom_net::capability::{Role, TransferCapability};
/// let tc = TransferCapability::new(
///     "1.2.840.10008.1.1",
///     Role::Scp,
///     ["1.2.840.10008.1.2.1", "1.2.840.10008.1.2"],
/// );
/// assert!(tc.contains_transfer_syntax("1.2.840.10008.1.2"));
/// assert!(!tc.contains_transfer_syntax("1.2.840.10008.1.2.4.50"));
/// ```
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct TransferCapability {
    common_name: Option<String>,
    sop_class: String,
    role: Role,
    transfer_syntaxes: Vec<String>,
    extended_negotiation: Option<ExtendedNegotiation>,
}

impl TransferCapability {
    /// Create a transfer capability for the given SOP class and role.
    ///
    /// Duplicate transfer syntaxes are discarded,
    /// retaining the order of first occurrence.
    pub fn new<S, I, T>(sop_class: S, role: Role, transfer_syntaxes: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut tss: Vec<String> = Vec::new();
        for ts in transfer_syntaxes {
            let ts: String = ts.into();
            let ts = trim_uid(ts).into_owned();
            if !tss.contains(&ts) {
                tss.push(ts);
            }
        }
        let sop_class: String = sop_class.into();
        TransferCapability {
            common_name: None,
            sop_class: trim_uid(sop_class).into_owned(),
            role,
            transfer_syntaxes: tss,
            extended_negotiation: None,
        }
    }

    /// Set a human readable name for this capability.
    pub fn with_common_name(mut self, common_name: impl Into<String>) -> Self {
        self.common_name = Some(common_name.into());
        self
    }

    /// Declare storage options for extended negotiation,
    /// replacing any query options previously declared.
    pub fn with_storage_options(mut self, options: StorageOptions) -> Self {
        self.extended_negotiation = Some(ExtendedNegotiation::Storage(options));
        self
    }

    /// Declare query options for extended negotiation,
    /// replacing any storage options previously declared.
    pub fn with_query_options(mut self, options: QueryOptions) -> Self {
        self.extended_negotiation = Some(ExtendedNegotiation::Query(options));
        self
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    pub fn sop_class(&self) -> &str {
        &self.sop_class
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The accepted transfer syntaxes, in registration order.
    pub fn transfer_syntaxes(&self) -> &[String] {
        &self.transfer_syntaxes
    }

    pub fn extended_negotiation(&self) -> Option<&ExtendedNegotiation> {
        self.extended_negotiation.as_ref()
    }

    pub fn storage_options(&self) -> Option<&StorageOptions> {
        match &self.extended_negotiation {
            Some(ExtendedNegotiation::Storage(options)) => Some(options),
            _ => None,
        }
    }

    pub fn query_options(&self) -> Option<QueryOptions> {
        match &self.extended_negotiation {
            Some(ExtendedNegotiation::Query(options)) => Some(*options),
            _ => None,
        }
    }

    /// Check whether the given transfer syntax is accepted.
    ///
    /// If the capability lists the wildcard [`ANY`],
    /// any transfer syntax supported by the main registry is accepted.
    pub fn contains_transfer_syntax(&self, ts: &str) -> bool {
        let ts = trim_uid(ts);
        self.transfer_syntaxes.iter().any(|t| *t == ts)
            || (self.transfer_syntaxes.iter().any(|t| t == ANY) && is_supported(&ts))
    }
}

impl fmt::Display for TransferCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferCapability[cn: ")?;
        match &self.common_name {
            Some(cn) => f.write_str(cn)?,
            None => f.write_str("-")?,
        }
        write!(
            f,
            ", role: {}, as: {}, ts: [{}]",
            self.role,
            self.sop_class,
            self.transfer_syntaxes.join(", ")
        )?;
        match &self.extended_negotiation {
            Some(ExtendedNegotiation::Storage(options)) => write!(f, ", {:?}", options)?,
            Some(ExtendedNegotiation::Query(options)) => write!(f, ", {:?}", options)?,
            None => {}
        }
        f.write_str("]")
    }
}

/// Whether the main transfer syntax registry
/// can decode data sets in the given transfer syntax.
fn is_supported(ts_uid: &str) -> bool {
    TransferSyntaxRegistry
        .get(ts_uid)
        .filter(|ts| !ts.is_unsupported())
        .is_some()
}
