//! Argument parsing: one subcommand, `audit <url>`, with the config-file and
//! per-run overrides that matter most on the command line directly, and
//! everything else left to `leakwatch.toml` / `LEAKWATCH_*` env vars.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use leakwatch_protocol::SkipExternal;

#[derive(Debug, Parser)]
#[command(name = "leakwatch", version, about = "Credential-leak auditor for login and registration forms")]
pub struct Cli {
    /// Increase log verbosity (-v, -vv); overridden by RUST_LOG if set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all logging except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a leakwatch.toml config file (default: ./leakwatch.toml if present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Crawl one site, filling and submitting any login/register forms found,
    /// and report where the submitted credentials ended up.
    Audit(AuditArgs),
}

#[derive(Debug, Args)]
pub struct AuditArgs {
    /// The landing URL to start the crawl from.
    pub url: String,

    /// Email address typed into discovered email/username fields.
    #[arg(long)]
    pub email: Option<String>,

    /// Password typed into discovered password fields.
    #[arg(long)]
    pub password: Option<String>,

    /// Maximum number of login/register links to follow from the landing page.
    #[arg(long)]
    pub max_links: Option<usize>,

    /// Maximum number of fields to fill across the whole crawl.
    #[arg(long)]
    pub max_fields: Option<usize>,

    /// Whether to submit discovered forms ("true") or only fill them ("false").
    #[arg(long)]
    pub submit: Option<bool>,

    /// Skip links/frames off the landing page's registrable domain.
    #[arg(long, value_enum)]
    pub skip_external: Option<SkipExternalArg>,

    /// Run the browser with a visible window instead of headless.
    #[arg(long)]
    pub headed: bool,

    /// Write the JSON result to this file instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SkipExternalArg {
    Frames,
    Pages,
    False,
}

impl From<SkipExternalArg> for SkipExternal {
    fn from(value: SkipExternalArg) -> Self {
        match value {
            SkipExternalArg::Frames => SkipExternal::Frames,
            SkipExternalArg::Pages => SkipExternal::Pages,
            SkipExternalArg::False => SkipExternal::Off,
        }
    }
}
