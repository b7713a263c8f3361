//! Registry of the transfer capabilities of an application entity.
//!
//! Capabilities are kept in two tables keyed by SOP class UID,
//! one per [role](Role).
//! The tables are guarded by a read-write lock,
//! so that configuration changes are serialized
//! against concurrent association negotiations,
//! each of which works over a consistent [`CapabilityTables`] view
//! obtained through [`CapabilityRegistry::read`].
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use crate::capability::{Role, TransferCapability, ANY};
use crate::pdu::CommonExtendedNegotiation;
use crate::uid::trim_uid;

type Table = BTreeMap<String, Arc<TransferCapability>>;

/// The SCU and SCP transfer capability tables.
#[derive(Debug, Default, Clone)]
pub struct CapabilityTables {
    scu: Table,
    scp: Table,
}

impl CapabilityTables {
    fn table(&self, role: Role) -> &Table {
        match role {
            Role::Scu => &self.scu,
            Role::Scp => &self.scp,
        }
    }

    fn table_mut(&mut self, role: Role) -> &mut Table {
        match role {
            Role::Scu => &mut self.scu,
            Role::Scp => &mut self.scp,
        }
    }

    /// Retrieve the capability registered
    /// for exactly this role and SOP class.
    pub fn get(&self, role: Role, sop_class: &str) -> Option<&Arc<TransferCapability>> {
        self.table(role).get(&*trim_uid(sop_class))
    }

    /// Resolve the capability to use for a SOP class in the given role.
    ///
    /// The SOP class itself is looked up first.
    /// Failing that, if a common extended negotiation is given,
    /// each of its related general SOP classes is tried in order,
    /// followed by its service class.
    /// The wildcard entry [`ANY`] is the last resort.
    pub fn lookup(
        &self,
        role: Role,
        sop_class: &str,
        common_ext_neg: Option<&CommonExtendedNegotiation>,
    ) -> Option<&Arc<TransferCapability>> {
        let table = self.table(role);
        let get = |uid: &str| table.get(&*trim_uid(uid));

        get(sop_class)
            .or_else(|| {
                let cen = common_ext_neg?;
                cen.related_general_sop_class_uids
                    .iter()
                    .find_map(|uid| get(uid.as_str()))
                    .or_else(|| get(cen.service_class_uid.as_str()))
            })
            .or_else(|| table.get(ANY))
    }

    /// Iterate over all capabilities,
    /// SCP entries first, then SCU entries.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TransferCapability>> {
        self.scp.values().chain(self.scu.values())
    }

    pub fn len(&self) -> usize {
        self.scu.len() + self.scp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scu.is_empty() && self.scp.is_empty()
    }
}

/// A thread safe registry of transfer capabilities.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    tables: RwLock<CapabilityTables>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transfer capability under its role and SOP class,
    /// returning the capability it replaced, if any.
    pub fn add(&self, tc: TransferCapability) -> Option<Arc<TransferCapability>> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables
            .table_mut(tc.role())
            .insert(tc.sop_class().to_string(), Arc::new(tc))
    }

    /// Remove the transfer capability registered
    /// under the given role and SOP class.
    pub fn remove(&self, role: Role, sop_class: &str) -> Option<Arc<TransferCapability>> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.table_mut(role).remove(&*trim_uid(sop_class))
    }

    /// Collect all capabilities, SCP entries first, then SCU entries.
    pub fn list_all(&self) -> Vec<Arc<TransferCapability>> {
        self.read().iter().cloned().collect()
    }

    /// Retrieve the capability registered
    /// for exactly this role and SOP class.
    pub fn get(&self, role: Role, sop_class: &str) -> Option<Arc<TransferCapability>> {
        self.read().get(role, sop_class).cloned()
    }

    /// Resolve the capability to use for a SOP class in the given role,
    /// falling back to related SOP classes and to the wildcard entry.
    /// See [`CapabilityTables::lookup`].
    pub fn lookup(
        &self,
        role: Role,
        sop_class: &str,
        common_ext_neg: Option<&CommonExtendedNegotiation>,
    ) -> Option<Arc<TransferCapability>> {
        self.read().lookup(role, sop_class, common_ext_neg).cloned()
    }

    /// Obtain a read view over the capability tables.
    ///
    /// Registry modifications block until the view is dropped.
    pub fn read(&self) -> RwLockReadGuard<'_, CapabilityTables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a copy of the current capability tables.
    pub fn snapshot(&self) -> CapabilityTables {
        self.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tc(sop_class: &str, role: Role) -> TransferCapability {
        TransferCapability::new(sop_class, role, ["1.2.840.10008.1.2"])
    }

    #[test]
    fn add_replaces_same_role_and_sop_class() {
        let registry = CapabilityRegistry::new();
        assert!(registry.add(tc("1.2.3", Role::Scp)).is_none());
        assert!(registry.add(tc("1.2.3", Role::Scu)).is_none());

        let replacement = tc("1.2.3", Role::Scp).with_common_name("replacement");
        let previous = registry.add(replacement).expect("previous entry");
        assert_eq!(previous.common_name(), None);
        assert_eq!(
            registry.get(Role::Scp, "1.2.3").unwrap().common_name(),
            Some("replacement")
        );
        assert_eq!(registry.list_all().len(), 2);
    }

    #[test]
    fn remove_is_role_scoped() {
        let registry = CapabilityRegistry::new();
        registry.add(tc("1.2.3", Role::Scp));
        registry.add(tc("1.2.3", Role::Scu));

        assert!(registry.remove(Role::Scu, "1.2.3").is_some());
        assert!(registry.remove(Role::Scu, "1.2.3").is_none());
        assert!(registry.get(Role::Scp, "1.2.3").is_some());
    }

    #[test]
    fn list_all_puts_scp_first() {
        let registry = CapabilityRegistry::new();
        registry.add(tc("1.2.1", Role::Scu));
        registry.add(tc("1.2.2", Role::Scp));
        registry.add(tc("1.2.3", Role::Scu));

        let roles: Vec<_> = registry.list_all().iter().map(|tc| tc.role()).collect();
        assert_eq!(roles, vec![Role::Scp, Role::Scu, Role::Scu]);
    }

    #[rstest]
    #[case(&["X", "Y", "Z", "W", "*"], Some("X"))]
    #[case(&["Y", "Z", "W", "*"], Some("Y"))]
    #[case(&["Z", "W", "*"], Some("Z"))]
    #[case(&["W", "*"], Some("W"))]
    #[case(&["*"], Some("*"))]
    #[case(&["V"], None)]
    fn lookup_fallback_chain(#[case] registered: &[&str], #[case] expected: Option<&str>) {
        let registry = CapabilityRegistry::new();
        for uid in registered {
            registry.add(tc(uid, Role::Scp));
        }
        let hint = CommonExtendedNegotiation::new(
            "X",
            "W",
            vec!["Y".to_string(), "Z".to_string()],
        );

        let found = registry.lookup(Role::Scp, "X", Some(&hint));
        assert_eq!(found.as_ref().map(|tc| tc.sop_class()), expected);
        // the other role table never contributes
        assert!(registry.lookup(Role::Scu, "X", Some(&hint)).is_none());
    }

    #[test]
    fn lookup_without_hint_goes_to_wildcard() {
        let registry = CapabilityRegistry::new();
        registry.add(tc("Y", Role::Scp));
        assert!(registry.lookup(Role::Scp, "X", None).is_none());

        registry.add(tc(ANY, Role::Scp));
        assert_eq!(
            registry.lookup(Role::Scp, "X", None).unwrap().sop_class(),
            ANY
        );
    }
}
