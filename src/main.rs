use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod access;
mod admin;
mod audit;
mod bot;
mod cleanup;
mod cli;
mod config;
mod identity;
mod registry;
mod render;
mod session;
mod sync;
mod table;
mod telegram;

use access::AccessControl;
use audit::{mask_tail4, AuditSink, Auditor, LogSink, QueuedSink};
use bot::Bot;
use cleanup::DeletionScheduler;
use cli::{CheckArgs, Command, RootArgs, RunArgs};
use config::{BotConfig, TransportSettings};
use registry::TenantRegistry;
use table::TableStore;
use telegram::{PollOptions, TelegramClient};

fn main() -> Result<()> {
    init_tracing();
    let args = RootArgs::parse();

    match args.command {
        Command::Run(args) => cmd_run(args),
        Command::Check(args) => cmd_check(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct Loaded {
    config_path: PathBuf,
    tables_path: PathBuf,
    config: BotConfig,
    tables: TableStore,
}

fn load(config_arg: Option<PathBuf>) -> Result<Loaded> {
    let config_path = match config_arg {
        Some(path) => path,
        None => config::default_config_path()?,
    };
    let config = config::load_config(&config_path)?;
    let tables_path = config::resolve_tables_path(&config_path, &config);
    let tables = TableStore::load(&tables_path, config.load_options())?;
    for warning in sheet_warnings(&config, &tables) {
        tracing::warn!("{warning}");
    }
    Ok(Loaded {
        config_path,
        tables_path,
        config,
        tables,
    })
}

/// Tenants (and the admin) bound to sheets the export does not contain.
fn sheet_warnings(config: &BotConfig, tables: &TableStore) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Some(sheet) = config.admin_sheet.as_deref() {
        if !tables.contains(sheet) {
            warnings.push(format!("admin_sheet {sheet:?} not found in tables"));
        }
    }
    for tenant in &config.tenants {
        if !tables.contains(&tenant.sheet) {
            warnings.push(format!(
                "tenant {} uses sheet {:?} which is not in tables",
                mask_tail4(tenant.id.as_str()),
                tenant.sheet
            ));
        }
    }
    warnings
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let loaded = load(args.config)?;
    let settings = config::transport_settings(|key| std::env::var(key).ok())?;
    let config = loaded.config;
    let client = TelegramClient::new(&settings, Duration::from_secs(config.poll_timeout_secs));
    let me = client.get_me().context("verify bot token")?;
    tracing::info!(
        bot_id = me.id,
        username = me.username.as_deref().unwrap_or("-"),
        config = %loaded.config_path.display(),
        "connected to telegram"
    );

    let registry = Arc::new(TenantRegistry::new(
        config.tenants.clone(),
        config.disabled.clone(),
    ));
    let auditor = Auditor::new(Arc::clone(&registry), audit_sink(&config, &client)?);
    let access = AccessControl::new(config.admin()?, registry);
    let bot = Bot::new(access, loaded.tables, auditor, config.admin_sheet.clone());

    let auto_delete_after = config.auto_delete_after();
    let cleanup = match auto_delete_after {
        Some(_) => Some(DeletionScheduler::spawn(client.clone())?),
        None => None,
    };
    let options = PollOptions {
        timeout_secs: config.poll_timeout_secs,
        contact_phone: config.contact_phone.clone(),
        auto_delete_after,
    };
    telegram::run(&bot, &client, &options, cleanup.as_ref())
}

fn audit_sink(config: &BotConfig, client: &TelegramClient) -> Result<Arc<dyn AuditSink>> {
    let Some(chat) = config.audit_chat_id.clone() else {
        tracing::info!("no audit_chat_id; audit records go to the log");
        return Ok(Arc::new(LogSink));
    };
    let client = client.clone();
    let (sink, _worker) =
        QueuedSink::spawn(move |record| client.send_message(&chat, record).map(|_| ()))?;
    Ok(Arc::new(sink))
}

#[derive(Debug, Serialize)]
struct CheckReport {
    config_path: String,
    tables_path: String,
    admin: String,
    admin_sheet: Option<String>,
    sheets: BTreeMap<String, usize>,
    tenants: Vec<TenantCheck>,
    transport_ready: bool,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TenantCheck {
    id: String,
    sheet: String,
    records: Option<usize>,
    enabled: bool,
}

fn cmd_check(args: CheckArgs) -> Result<()> {
    let loaded = load(args.config)?;
    let report = check_report(&loaded)?;
    if args.json {
        let json = serde_json::to_string_pretty(&report).context("serialize check report")?;
        println!("{json}");
        return Ok(());
    }

    println!("config: {}", report.config_path);
    println!("tables: {}", report.tables_path);
    println!("admin: {}", report.admin);
    for (sheet, records) in &report.sheets {
        println!("sheet {sheet}: {records} records");
    }
    for tenant in &report.tenants {
        let records = tenant
            .records
            .map(|count| count.to_string())
            .unwrap_or_else(|| "missing sheet".to_string());
        let state = if tenant.enabled { "enabled" } else { "disabled" };
        println!(
            "tenant {} -> {} ({records}, {state})",
            tenant.id, tenant.sheet
        );
    }
    if !report.transport_ready {
        println!(
            "note: {} is not set; `run` will refuse to start",
            config::ENV_BOT_TOKEN
        );
    }
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    Ok(())
}

fn check_report(loaded: &Loaded) -> Result<CheckReport> {
    let config = &loaded.config;
    let registry = TenantRegistry::new(config.tenants.clone(), config.disabled.clone());
    let tenants = registry
        .snapshot()
        .into_iter()
        .map(|tenant| TenantCheck {
            id: mask_tail4(tenant.identity.as_str()),
            records: loaded.tables.table_for(&tenant.sheet).map(|table| table.len()),
            sheet: tenant.sheet,
            enabled: tenant.enabled,
        })
        .collect();
    let transport: Result<TransportSettings> =
        config::transport_settings(|key| std::env::var(key).ok());
    Ok(CheckReport {
        config_path: display(&loaded.config_path),
        tables_path: display(&loaded.tables_path),
        admin: mask_tail4(config.admin()?.as_str()),
        admin_sheet: config.admin_sheet.clone(),
        sheets: loaded
            .tables
            .sheets()
            .map(|(sheet, table)| (sheet.to_string(), table.len()))
            .collect(),
        tenants,
        transport_ready: transport.is_ok(),
        warnings: sheet_warnings(config, &loaded.tables),
    })
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
