//! Gatekeeping for every inbound command.
use crate::identity::Identity;
use crate::registry::{Tenant, TenantRegistry};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Denied,
    Admin,
    Tenant(Tenant),
}

#[derive(Debug, Clone)]
pub struct AccessControl {
    admin: Identity,
    registry: Arc<TenantRegistry>,
}

impl AccessControl {
    pub fn new(admin: Identity, registry: Arc<TenantRegistry>) -> Self {
        AccessControl { admin, registry }
    }

    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    /// The admin is never disabled; tenants must be registered and enabled.
    pub fn authorize(&self, identity: &Identity) -> Decision {
        if *identity == self.admin {
            return Decision::Admin;
        }
        match self.registry.lookup(identity) {
            Some(tenant) if tenant.enabled => Decision::Tenant(tenant),
            _ => Decision::Denied,
        }
    }
}
