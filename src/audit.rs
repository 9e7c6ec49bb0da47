//! Masked activity audit.
//!
//! Every successful navigation produces one text record with the tenant's
//! identity, contact and sheet partially masked and the debtor name reduced to
//! surname plus initial. Records go to an [`AuditSink`]; delivery problems are
//! logged here and never reach the chat that triggered them.
use crate::registry::{Tenant, TenantRegistry};
use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Replace all but the last four characters with `*`.
pub fn mask_tail4(value: &str) -> String {
    let len = value.chars().count();
    if len <= 4 {
        return value.to_string();
    }
    value
        .chars()
        .enumerate()
        .map(|(idx, ch)| if idx < len - 4 { '*' } else { ch })
        .collect()
}

/// `"Surname Given"` -> `"Surname G****"`.
pub fn mask_name(full_name: &str) -> String {
    let mut tokens = full_name.split_whitespace();
    let surname = tokens.next().unwrap_or("");
    let given = tokens.next().unwrap_or("");
    let mut chars = given.chars();
    let masked_given = match chars.next() {
        Some(first) => {
            let rest = chars.count();
            let mut masked = String::with_capacity(given.len());
            masked.push(first);
            masked.push_str(&"*".repeat(rest));
            masked
        }
        None => String::new(),
    };
    format!("{surname} {masked_given}")
}

/// Destination for pre-masked audit records.
pub trait AuditSink: Send + Sync {
    /// Hand over one record. Must not block on delivery.
    fn emit(&self, record: String) -> Result<()>;
}

/// Writes records to the `audit` tracing target.
#[derive(Debug, Default)]
pub struct LogSink;

impl AuditSink for LogSink {
    fn emit(&self, record: String) -> Result<()> {
        tracing::info!(target: "audit", "{}", record.replace('\n', " | "));
        Ok(())
    }
}

/// Queues records for a background worker that delivers them one by one.
pub struct QueuedSink {
    tx: Sender<String>,
}

impl QueuedSink {
    /// Start the worker. `deliver` runs on the worker thread for each record;
    /// its errors are logged and the record is dropped.
    pub fn spawn<F>(mut deliver: F) -> Result<(Self, JoinHandle<()>)>
    where
        F: FnMut(&str) -> Result<()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<String>();
        let handle = thread::Builder::new()
            .name("audit-sink".to_string())
            .spawn(move || {
                for record in rx {
                    if let Err(err) = deliver(&record) {
                        tracing::warn!(error = %err, "audit delivery failed");
                    }
                }
                tracing::debug!("audit sink worker stopped");
            })
            .map_err(|err| anyhow!("spawn audit sink worker: {err}"))?;
        Ok((QueuedSink { tx }, handle))
    }
}

impl AuditSink for QueuedSink {
    fn emit(&self, record: String) -> Result<()> {
        self.tx
            .send(record)
            .map_err(|_| anyhow!("audit sink worker is gone"))
    }
}

pub struct Auditor {
    registry: Arc<TenantRegistry>,
    sink: Arc<dyn AuditSink>,
}

impl Auditor {
    pub fn new(registry: Arc<TenantRegistry>, sink: Arc<dyn AuditSink>) -> Self {
        Auditor { registry, sink }
    }

    /// Count the action against the tenant and emit a masked record.
    pub fn audit(&self, tenant: &Tenant, action: &str, subject_name: &str) {
        let activity = self
            .registry
            .record_activity(&tenant.identity)
            .unwrap_or(tenant.activity.saturating_add(1));
        let record = format_record(tenant, action, subject_name, activity);
        if let Err(err) = self.sink.emit(record) {
            tracing::warn!(error = %err, action, "audit record dropped");
        }
    }
}

fn format_record(tenant: &Tenant, action: &str, subject_name: &str, activity: u64) -> String {
    format!(
        "👤 ID: {}\n📞 Tel: {}\n📄 Sheet: {}\n🔁 Action: {}\n🧾 Debtor: {}\n📊 Total actions: {}",
        mask_tail4(tenant.identity.as_str()),
        mask_tail4(&tenant.contact),
        mask_tail4(&tenant.sheet),
        action,
        mask_name(subject_name),
        activity
    )
}
