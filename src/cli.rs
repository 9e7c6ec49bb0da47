//! CLI argument parsing.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "debtor-pager",
    version,
    about = "Telegram bot for paging through per-tenant debtor sheets",
    after_help = "Environment:\n  BOT_TOKEN             Telegram bot token (required for run)\n  ADMIN_CHAT_ID         Overrides admin_id from the config\n  MY_PHONE              Overrides contact_phone from the config\n  DEBTOR_PAGER_API_URL  Bot API base URL (default https://api.telegram.org)\n  RUST_LOG              Log filter (default info)\n\nExamples:\n  debtor-pager check --config ./config.json\n  debtor-pager run --config ./config.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Load config and sheets, then serve chat commands")]
pub struct RunArgs {
    /// Config file (defaults to <config dir>/debtor-pager/config.json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Validate config and sheets without connecting to Telegram")]
pub struct CheckArgs {
    /// Config file (defaults to <config dir>/debtor-pager/config.json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
