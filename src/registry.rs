//! Tenants known to the bot and their runtime flags.
//!
//! Tenants are registered once from config. The enabled flag and the activity
//! counter change at runtime; entries are never removed. The disabled set is
//! kept separately so ids disabled before their tenant exists still apply once
//! it is registered.
use crate::identity::Identity;
use crate::sync::lock_with_recovery;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// Static tenant definition as it appears in config.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TenantSpec {
    pub id: Identity,
    pub sheet: String,
    #[serde(default)]
    pub contact: String,
}

/// Point-in-time copy of one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub identity: Identity,
    pub sheet: String,
    pub contact: String,
    pub enabled: bool,
    pub activity: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    tenants: BTreeMap<Identity, Tenant>,
    disabled: BTreeSet<Identity>,
}

#[derive(Debug, Default)]
pub struct TenantRegistry {
    state: Mutex<RegistryState>,
}

impl TenantRegistry {
    pub fn new(specs: Vec<TenantSpec>, disabled: impl IntoIterator<Item = Identity>) -> Self {
        let registry = TenantRegistry {
            state: Mutex::new(RegistryState {
                tenants: BTreeMap::new(),
                disabled: disabled.into_iter().collect(),
            }),
        };
        for spec in specs {
            registry.register(spec);
        }
        registry
    }

    /// Add a tenant; it starts disabled if its id is in the disabled set.
    pub fn register(&self, spec: TenantSpec) {
        let mut state = lock_with_recovery(&self.state, "registry");
        let enabled = !state.disabled.contains(&spec.id);
        let tenant = Tenant {
            identity: spec.id.clone(),
            sheet: spec.sheet,
            contact: spec.contact,
            enabled,
            activity: 0,
        };
        state.tenants.insert(spec.id, tenant);
    }

    pub fn lookup(&self, identity: &Identity) -> Option<Tenant> {
        let state = lock_with_recovery(&self.state, "registry");
        state.tenants.get(identity).cloned()
    }

    /// Flip a tenant's enabled flag and record it in the disabled set.
    ///
    /// Returns whether a registered tenant matched.
    pub fn set_enabled(&self, identity: &Identity, enabled: bool) -> bool {
        let mut state = lock_with_recovery(&self.state, "registry");
        if enabled {
            state.disabled.remove(identity);
        } else {
            state.disabled.insert(identity.clone());
        }
        match state.tenants.get_mut(identity) {
            Some(tenant) => {
                tenant.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Bump the activity counter, returning the new value.
    pub fn record_activity(&self, identity: &Identity) -> Option<u64> {
        let mut state = lock_with_recovery(&self.state, "registry");
        let tenant = state.tenants.get_mut(identity)?;
        tenant.activity = tenant.activity.saturating_add(1);
        Some(tenant.activity)
    }

    pub fn is_disabled(&self, identity: &Identity) -> bool {
        let state = lock_with_recovery(&self.state, "registry");
        state.disabled.contains(identity)
    }

    pub fn snapshot(&self) -> Vec<Tenant> {
        let state = lock_with_recovery(&self.state, "registry");
        state.tenants.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, sheet: &str) -> TenantSpec {
        TenantSpec {
            id: Identity::new(id),
            sheet: sheet.to_string(),
            contact: "998901112233".to_string(),
        }
    }

    #[test]
    fn initially_disabled_ids_start_disabled() {
        let registry = TenantRegistry::new(
            vec![spec("1", "A"), spec("2", "B")],
            [Identity::new("2")],
        );
        assert!(registry.lookup(&Identity::new("1")).expect("tenant 1").enabled);
        assert!(!registry.lookup(&Identity::new("2")).expect("tenant 2").enabled);
    }

    #[test]
    fn disabling_unknown_id_applies_on_later_registration() {
        let registry = TenantRegistry::new(Vec::new(), []);
        assert!(!registry.set_enabled(&Identity::new("9"), false));
        assert!(registry.is_disabled(&Identity::new("9")));
        registry.register(spec("9", "A"));
        assert!(!registry.lookup(&Identity::new("9")).expect("tenant 9").enabled);
    }

    #[test]
    fn activity_counts_accumulate() {
        let registry = TenantRegistry::new(vec![spec("1", "A")], []);
        let id = Identity::new("1");
        assert_eq!(registry.record_activity(&id), Some(1));
        assert_eq!(registry.record_activity(&id), Some(2));
        registry.set_enabled(&id, false);
        registry.set_enabled(&id, true);
        assert_eq!(registry.lookup(&id).map(|tenant| tenant.activity), Some(2));
        assert_eq!(registry.record_activity(&Identity::new("x")), None);
    }
}
