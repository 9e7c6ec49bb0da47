//! Admin-only runtime controls over the tenant registry.
use crate::access::{AccessControl, Decision};
use crate::audit::mask_tail4;
use crate::identity::Identity;
use crate::registry::Tenant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Enable,
    Disable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    Forbidden,
    /// Applied; `known` is false when no registered tenant matched.
    Toggled { target: Identity, toggle: Toggle, known: bool },
}

pub fn toggle(
    access: &AccessControl,
    caller: &Identity,
    toggle: Toggle,
    target: &Identity,
) -> AdminOutcome {
    if access.authorize(caller) != Decision::Admin {
        return AdminOutcome::Forbidden;
    }
    let enabled = matches!(toggle, Toggle::Enable);
    let registry = access.registry();
    let changed = registry.is_disabled(target) == enabled;
    let known = registry.set_enabled(target, enabled);
    tracing::info!(
        target_id = %mask_tail4(target.as_str()),
        enabled,
        known,
        changed,
        "tenant access toggled"
    );
    AdminOutcome::Toggled {
        target: target.clone(),
        toggle,
        known,
    }
}

/// Tenant listing for the admin, `None` for anyone else.
pub fn stats(access: &AccessControl, caller: &Identity) -> Option<Vec<Tenant>> {
    if access.authorize(caller) != Decision::Admin {
        return None;
    }
    Some(access.registry().snapshot())
}
