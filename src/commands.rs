//! Command-line interface.
//!
//! ```text
//! userblock block <id>
//! userblock batch-block
//! userblock --grace-period 3600 --format json batch-block
//! ```
//!
//! Every evaluated account produces exactly one status line on stdout. An
//! unknown id produces an error instead and a non-zero exit status.

use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use crossterm::style::Stylize;
use crossterm::tty::IsTty;
use serde::Serialize;
use tracing::{debug, info};

use crate::account::AccountId;
use crate::blocker::{AccountExpiryBlocker, BatchMode, Evaluation, Outcome, Severity};
use crate::clock::SystemClock;
use crate::config::{UserblockConfig, DEFAULT_CONFIG_FILE};
use crate::errors::BlockerResult;
use crate::events::AuditLogObserver;
use crate::logging::init_logging;
use crate::store::database::Database;

/// Block user accounts that stay unconfirmed past their grace period.
#[derive(Debug, Parser)]
#[command(name = "userblock")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Config file to read (extension optional)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Override the grace period, in seconds
    #[arg(long, global = true)]
    pub grace_period: Option<u64>,

    /// Keep going after an account that was not blocked
    #[arg(long, global = true)]
    pub continue_on_skip: bool,

    /// Status line format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Block a single account if its grace period has elapsed
    Block {
        /// Account id
        id: AccountId,
    },
    /// Block every eligible unconfirmed account
    BatchBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct JsonStatus<'a> {
    #[serde(flatten)]
    evaluation: &'a Evaluation,
    message: &'static str,
}

/// Formats status lines.
#[derive(Debug, Clone, Copy)]
pub struct StatusPrinter {
    format: OutputFormat,
    color: bool,
}

impl StatusPrinter {
    pub fn new(format: OutputFormat, color: bool) -> Self {
        Self { format, color }
    }

    /// Render the status line for one evaluation, without trailing newline.
    pub fn render(&self, evaluation: &Evaluation) -> BlockerResult<String> {
        let message = evaluation.outcome.message();

        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string(&JsonStatus {
                evaluation,
                message,
            })
            .map_err(std::io::Error::from)?),
            OutputFormat::Text if !self.color => Ok(message.to_string()),
            OutputFormat::Text => Ok(match evaluation.outcome.severity() {
                Severity::Info => message.blue().to_string(),
                Severity::Warning => message.red().to_string(),
                Severity::Success => message.green().to_string(),
            }),
        }
    }

    pub fn print(&self, out: &mut impl Write, evaluation: &Evaluation) -> BlockerResult<()> {
        writeln!(out, "{}", self.render(evaluation)?)?;
        Ok(())
    }
}

/// Run one command against an already constructed blocker.
///
/// Returns the evaluations that were printed.
pub async fn execute(
    command: Command,
    blocker: &AccountExpiryBlocker,
    printer: &StatusPrinter,
    out: &mut impl Write,
) -> BlockerResult<Vec<Evaluation>> {
    match command {
        Command::Block { id } => {
            let outcome: Outcome = blocker.block_by_id(id).await?;
            let evaluation = Evaluation {
                account_id: id,
                outcome,
            };
            printer.print(out, &evaluation)?;
            Ok(vec![evaluation])
        }
        Command::BatchBlock => {
            let report = blocker
                .block_all_with(|evaluation| printer.print(&mut *out, evaluation))
                .await?;
            Ok(report.evaluations)
        }
    }
}

/// Whether stdout should get ANSI colours.
fn use_color() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_tty()
}

/// Full command run: configuration, logging, database, blocker, output.
pub async fn run(cli: Cli) -> BlockerResult<()> {
    let mut config = UserblockConfig::load_from(&cli.config)?;
    if let Some(secs) = cli.grace_period {
        config.blocker.grace_period_secs = secs;
    }
    if cli.continue_on_skip {
        config.blocker.batch_mode = BatchMode::Continue;
    }
    config.validate()?;

    init_logging(&config.logging)?;
    debug!(
        "Using {} database, config file '{}'",
        config.database.db_type, cli.config
    );

    let db = Database::connect(&config.database).await?;
    let blocker = AccountExpiryBlocker::from_config(db, Arc::new(SystemClock), &config.blocker)?
        .with_observer(Arc::new(AuditLogObserver));

    info!(
        "Running {:?} (grace period {}s, batch mode {:?})",
        cli.command, config.blocker.grace_period_secs, config.blocker.batch_mode
    );

    let printer = StatusPrinter::new(cli.format, use_color());
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(cli.command, &blocker, &printer, &mut out).await?;

    Ok(())
}
