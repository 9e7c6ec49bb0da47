//! Bot configuration.
//!
//! A JSON file describes the admin, the tenants and where the sheet export
//! lives. A few environment variables override it at startup so secrets and
//! per-deployment ids stay out of the file.
use crate::identity::Identity;
use crate::registry::TenantSpec;
use crate::table::LoadOptions;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CONTACT_PHONE: &str = "998973040660";
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";
/// Telegram caps long polling at 50 seconds.
const MAX_POLL_TIMEOUT_SECS: u64 = 50;

pub const ENV_BOT_TOKEN: &str = "BOT_TOKEN";
pub const ENV_ADMIN_CHAT_ID: &str = "ADMIN_CHAT_ID";
pub const ENV_CONTACT_PHONE: &str = "MY_PHONE";
pub const ENV_API_URL: &str = "DEBTOR_PAGER_API_URL";

fn default_contact_phone() -> String {
    DEFAULT_CONTACT_PHONE.to_string()
}

fn default_poll_timeout_secs() -> u64 {
    25
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub admin_id: Option<Identity>,
    /// Sheet export, relative to the config file unless absolute.
    pub tables_path: PathBuf,
    /// Sheet the admin browses; without it the admin only administers.
    #[serde(default)]
    pub admin_sheet: Option<String>,
    #[serde(default)]
    pub tenants: Vec<TenantSpec>,
    /// Ids that start out disabled.
    #[serde(default)]
    pub disabled: Vec<Identity>,
    #[serde(default)]
    pub audit_chat_id: Option<Identity>,
    #[serde(default = "default_contact_phone")]
    pub contact_phone: String,
    #[serde(default)]
    pub skip_blank_rows: bool,
    #[serde(default)]
    pub auto_delete_secs: Option<u64>,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

impl BotConfig {
    /// Admin id after overrides; present once the config validated.
    pub fn admin(&self) -> Result<Identity> {
        self.admin_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("admin_id is not set (config or {ENV_ADMIN_CHAT_ID})"))
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            skip_blank_rows: self.skip_blank_rows,
        }
    }

    pub fn auto_delete_after(&self) -> Option<Duration> {
        self.auto_delete_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// `<config dir>/debtor-pager/config.json`.
pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| anyhow!("no config directory for this user"))?;
    Ok(base.join("debtor-pager").join("config.json"))
}

/// Read, override from the process environment, and validate.
pub fn load_config(path: &Path) -> Result<BotConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let mut config: BotConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config)?;
    Ok(config)
}

pub fn apply_env_overrides(config: &mut BotConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(admin) = non_blank(lookup(ENV_ADMIN_CHAT_ID)) {
        config.admin_id = Some(Identity::new(&admin));
    }
    if let Some(phone) = non_blank(lookup(ENV_CONTACT_PHONE)) {
        config.contact_phone = phone.trim().to_string();
    }
}

pub fn validate_config(config: &BotConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    config.admin()?;
    if config.tables_path.as_os_str().is_empty() {
        return Err(anyhow!("tables_path must be non-empty"));
    }
    if config.poll_timeout_secs > MAX_POLL_TIMEOUT_SECS {
        return Err(anyhow!(
            "poll_timeout_secs must be at most {MAX_POLL_TIMEOUT_SECS} (got {})",
            config.poll_timeout_secs
        ));
    }
    let mut seen = BTreeSet::new();
    for tenant in &config.tenants {
        if tenant.id.is_empty() {
            return Err(anyhow!("tenant id must be non-empty"));
        }
        if tenant.sheet.trim().is_empty() {
            return Err(anyhow!("tenant {} has an empty sheet", tenant.id));
        }
        if !seen.insert(&tenant.id) {
            return Err(anyhow!("tenant {} is listed twice", tenant.id));
        }
    }
    Ok(())
}

/// Resolve `tables_path` against the directory holding the config file.
pub fn resolve_tables_path(config_path: &Path, config: &BotConfig) -> PathBuf {
    if config.tables_path.is_absolute() {
        return config.tables_path.clone();
    }
    config_path
        .parent()
        .map(|dir| dir.join(&config.tables_path))
        .unwrap_or_else(|| config.tables_path.clone())
}

/// Transport settings that only come from the environment.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub token: String,
    pub api_url: String,
}

pub fn transport_settings(lookup: impl Fn(&str) -> Option<String>) -> Result<TransportSettings> {
    let token = non_blank(lookup(ENV_BOT_TOKEN))
        .ok_or_else(|| anyhow!("{ENV_BOT_TOKEN} is not set"))?;
    let api_url = non_blank(lookup(ENV_API_URL)).unwrap_or_else(|| DEFAULT_API_URL.to_string());
    Ok(TransportSettings {
        token: token.trim().to_string(),
        api_url: api_url.trim().trim_end_matches('/').to_string(),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
