//! Transport-independent command handling.
//!
//! `Bot::handle` takes one inbound text from one sender and returns what the
//! transport should send back, if anything. Flow for navigation:
//! access gate -> cursor update -> record lookup -> masked audit.
//!
//! # Why No Transport Here
//!
//! Everything in this module depends only on the inbound text and the shared
//! stores. The Telegram loop and the tests drive it the same way, and
//! a failed send can never leave a cursor half-moved.
//!
//! # Inbound Forms
//!
//! - `/start`, `/next`, `/prev`, `/stats`, optionally suffixed `@botname`
//! - `/enable <id>` and `/disable <id>` (admin only)
//! - a bare number, read as a 1-based jump
//!
//! Denied senders get an explicit refusal for commands. Bare numbers from
//! them are ignored, since ordinary chatter would otherwise draw a reply.
//!
//! # Admin Navigation
//!
//! The admin pages through `admin_sheet` when one is configured. Those steps
//! are logged but not audited; audit records belong to tenants.
use crate::access::{AccessControl, Decision};
use crate::admin::{self, AdminOutcome, Toggle};
use crate::audit::Auditor;
use crate::identity::Identity;
use crate::registry::Tenant;
use crate::render::{self, RecordView};
use crate::session::{NavError, SessionStore};
use crate::table::{record_at, RecordField, Table, TableStore};
use regex::Regex;
use std::sync::OnceLock;

/// Parsed inbound text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Start,
    Next,
    Prev,
    /// Bare number typed by the user, 1-based.
    Jump(u64),
    Toggle(Toggle, Option<Identity>),
    Stats,
    Other,
}

fn command_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^/([A-Za-z_]+)(?:@\S*)?(?:\s+(\S+))?").expect("valid command regex")
    })
}

fn number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").expect("valid number regex"))
}

pub fn parse_inbound(text: &str) -> Inbound {
    let text = text.trim();
    if number_pattern().is_match(text) {
        // Too many digits to fit is still just out of range.
        return Inbound::Jump(text.parse().unwrap_or(u64::MAX));
    }
    let Some(caps) = command_pattern().captures(text) else {
        return Inbound::Other;
    };
    let arg = caps.get(2).map(|m| Identity::new(m.as_str()));
    match caps.get(1).map(|m| m.as_str()).unwrap_or_default() {
        "start" => Inbound::Start,
        "next" => Inbound::Next,
        "prev" => Inbound::Prev,
        "enable" => Inbound::Toggle(Toggle::Enable, arg),
        "disable" => Inbound::Toggle(Toggle::Disable, arg),
        "stats" => Inbound::Stats,
        _ => Inbound::Other,
    }
}

/// What the transport should send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Record(RecordView),
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Next,
    Prev,
    Jump(u64),
}

impl Step {
    fn label(&self) -> &'static str {
        match self {
            Step::Next => "next",
            Step::Prev => "prev",
            Step::Jump(_) => "jump",
        }
    }
}

pub struct Bot {
    access: AccessControl,
    tables: TableStore,
    sessions: SessionStore,
    auditor: Auditor,
    admin_sheet: Option<String>,
}

impl Bot {
    pub fn new(
        access: AccessControl,
        tables: TableStore,
        auditor: Auditor,
        admin_sheet: Option<String>,
    ) -> Self {
        Bot {
            access,
            tables,
            sessions: SessionStore::new(),
            auditor,
            admin_sheet,
        }
    }

    /// Handle one inbound text. `None` means stay silent.
    pub fn handle(&self, sender: &Identity, text: &str) -> Option<Reply> {
        let inbound = parse_inbound(text);
        tracing::debug!(?inbound, "inbound parsed");
        match inbound {
            Inbound::Start => Some(self.start(sender)),
            Inbound::Next => Some(self.gated_step(sender, Step::Next)),
            Inbound::Prev => Some(self.gated_step(sender, Step::Prev)),
            Inbound::Jump(number) => {
                // Typed numbers from strangers are ignored without a reply.
                let decision = self.access.authorize(sender);
                if decision == Decision::Denied {
                    return None;
                }
                Some(self.step(sender, &decision, Step::Jump(number)))
            }
            Inbound::Toggle(toggle, target) => Some(self.toggle(sender, toggle, target)),
            Inbound::Stats => Some(match admin::stats(&self.access, sender) {
                Some(tenants) => Reply::Text(render::stats_report(&tenants)),
                None => Reply::Text(render::NOT_ADMIN.to_string()),
            }),
            Inbound::Other => None,
        }
    }

    fn start(&self, sender: &Identity) -> Reply {
        let decision = self.access.authorize(sender);
        if decision == Decision::Denied {
            return Reply::Text(render::ACCESS_DENIED.to_string());
        }
        tracing::debug!(previous = self.sessions.cursor(sender), "session reset");
        self.sessions.reset(sender);
        let total = self.table_for(&decision).map(Table::len).unwrap_or(0);
        Reply::Text(render::greeting(total))
    }

    fn gated_step(&self, sender: &Identity, step: Step) -> Reply {
        let decision = self.access.authorize(sender);
        if decision == Decision::Denied {
            return Reply::Text(render::ACCESS_DENIED.to_string());
        }
        self.step(sender, &decision, step)
    }

    fn step(&self, sender: &Identity, decision: &Decision, step: Step) -> Reply {
        let Some(table) = self.table_for(decision) else {
            tracing::warn!(action = step.label(), "no sheet bound to sender");
            return Reply::Text(render::NO_DATA.to_string());
        };
        let moved = match step {
            Step::Next => self.sessions.advance(sender, table.len()),
            Step::Prev => self.sessions.retreat(sender, table.len()),
            Step::Jump(number) => self.sessions.jump_to(sender, number, table.len()),
        };
        let index = match moved {
            Ok(index) => index,
            Err(NavError::EmptyTable) => return Reply::Text(render::EMPTY_TABLE.to_string()),
            Err(NavError::OutOfRange { min, max }) => {
                return Reply::Text(render::out_of_range(min, max))
            }
        };
        let record = match record_at(table, index) {
            Ok(record) => record.clone(),
            Err(err) => {
                tracing::warn!(error = %err, "cursor outside table");
                return Reply::Text(render::NO_DATA.to_string());
            }
        };

        match decision {
            Decision::Tenant(tenant) => {
                self.auditor
                    .audit(tenant, step.label(), record.field(RecordField::FullName));
            }
            _ => tracing::info!(action = step.label(), index, "admin navigated"),
        }

        Reply::Record(RecordView {
            record,
            index,
            total: table.len(),
        })
    }

    fn toggle(&self, sender: &Identity, toggle: Toggle, target: Option<Identity>) -> Reply {
        let Some(target) = target.filter(|target| !target.is_empty()) else {
            if self.access.authorize(sender) != Decision::Admin {
                return Reply::Text(render::NOT_ADMIN.to_string());
            }
            let command = match toggle {
                Toggle::Enable => "enable",
                Toggle::Disable => "disable",
            };
            return Reply::Text(render::usage(command));
        };
        match admin::toggle(&self.access, sender, toggle, &target) {
            AdminOutcome::Forbidden => Reply::Text(render::NOT_ADMIN.to_string()),
            AdminOutcome::Toggled {
                target,
                toggle,
                known,
            } => Reply::Text(render::toggle_ack(
                target.as_str(),
                toggle == Toggle::Enable,
                known,
            )),
        }
    }

    fn table_for(&self, decision: &Decision) -> Option<&Table> {
        let sheet = match decision {
            Decision::Denied => return None,
            Decision::Admin => self.admin_sheet.as_deref()?,
            Decision::Tenant(Tenant { sheet, .. }) => sheet.as_str(),
        };
        self.tables.table_for(sheet)
    }
}

#[cfg(test)]
#[path = "bot_tests.rs"]
mod tests;
