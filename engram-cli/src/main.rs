// engram-cli/src/main.rs
// ============================================================================
// Module: Engram CLI Entry Point
// Description: Command dispatcher for the Capture/Reflect/Curate/Apply
// learning cycle and the bBoN run/judge/adopt workflow.
// Purpose: Give operators and agents a single binary that drives every
// Engram subsystem through a stable JSON envelope.
// Dependencies: clap, engram-core, engram-store, engram-learn,
// engram-providers, engram-bbon, serde_json, thiserror, tokio,
// tracing-subscriber.
// ============================================================================

//! ## Overview
//! Every verb resolves configuration and opens a [`Repository`] the same
//! way, then delegates to a function in [`commands`]. Machine-facing
//! output is exactly one JSON envelope line on stdout (spec §6); all
//! diagnostic logging goes to stderr through `tracing`, gated by
//! `-v`/`--verbose` and `RUST_LOG`, so the two streams never mix.

// ============================================================================
// SECTION: Imports
// ============================================================================

mod commands;
mod config;
mod envelope;
mod error;

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use engram_core::LlmClient;
use engram_providers::HttpLlmClient;
use engram_providers::HttpLlmConfig;
use engram_providers::StubLlmClient;
use engram_store::Repository;

use crate::config::EngramConfig;
use crate::error::CliError;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "engram", disable_help_subcommand = true, arg_required_else_help = true)]
struct Cli {
    /// Path to the SQLite database (default: `.engram/engram.db`).
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Path to the guidance document Apply renders into.
    #[arg(long, global = true, value_name = "PATH", default_value = "AGENTS.md")]
    document: PathBuf,
    /// Project id scoping working-memory rows.
    #[arg(long, global = true, value_name = "ID", default_value = "default")]
    project_id: String,
    /// Path to a configuration file (overrides `ENGRAM_CONFIG` and the
    /// default `.engram/config.toml`).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Emit `debug!`-level tracing to stderr.
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands (spec §6).
#[derive(Subcommand, Debug)]
enum Commands {
    /// One-time setup: creates `.engram/`, migrates the database, and
    /// seeds the guidance document's marker region if absent.
    Init,
    /// Read-only health check: database openable, migration status, and
    /// guidance document marker presence.
    Doctor,
    /// Ingests a trace document from a file, stdin, or a literal argument.
    Capture(CaptureArgs),
    /// Groups failed traces into insight candidates.
    Reflect,
    /// Promotes high-confidence insights into durable knowledge items.
    Curate(CurateArgs),
    /// Renders curated knowledge into the guidance document's region.
    Apply,
    /// Runs Reflect, Curate, and Apply as one cycle.
    Learn(CurateArgs),
    /// Best-of-N attempt fan-out, comparative judging, and adoption.
    Bbon {
        /// Selected bBoN subcommand.
        #[command(subcommand)]
        command: BbonCommand,
    },
}

/// Arguments for the `capture` command.
#[derive(Args, Debug)]
struct CaptureArgs {
    /// Path to a trace document file.
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
    /// A trace document passed directly as a string.
    #[arg(long, value_name = "JSON")]
    literal: Option<String>,
}

/// Arguments shared by `curate` and `learn` (the promotion threshold).
#[derive(Args, Debug)]
struct CurateArgs {
    /// Minimum insight confidence required for promotion.
    #[arg(long, value_name = "TAU", default_value_t = 0.8)]
    tau: f64,
}

/// bBoN subcommands.
#[derive(Subcommand, Debug)]
enum BbonCommand {
    /// Creates a Task and Run, then drives Learn across `n` attempts.
    Run(BbonRunArgs),
    /// Invokes the comparative judge across every pair of completed
    /// attempts in a run.
    Judge(BbonJudgeArgs),
    /// Ranks a run's attempts by judge outcomes and applies the winner.
    Adopt(BbonAdoptArgs),
}

/// Arguments for `bbon run`.
#[derive(Args, Debug)]
pub(crate) struct BbonRunArgs {
    /// What the task is trying to accomplish.
    #[arg(long)]
    pub(crate) goal: String,
    /// The subject this task is performed for, if any.
    #[arg(long, value_name = "ID")]
    pub(crate) subject_id: Option<String>,
    /// A constraint the solution must respect. Repeatable.
    #[arg(long = "constraint", value_name = "TEXT")]
    pub(crate) constraints: Vec<String>,
    /// Path to a JSON file of free-form additional context.
    #[arg(long, value_name = "PATH")]
    pub(crate) context_file: Option<PathBuf>,
    /// Number of attempts to generate (default: 3).
    #[arg(long, value_name = "N")]
    pub(crate) n: Option<u32>,
    /// Seed for attempt generation (default: current wall clock).
    #[arg(long, value_name = "SEED")]
    pub(crate) seed: Option<i64>,
    /// Minimum insight confidence required for promotion, within Learn.
    #[arg(long, value_name = "TAU", default_value_t = 0.8)]
    pub(crate) tau: f64,
}

/// Arguments for `bbon judge`.
#[derive(Args, Debug)]
pub(crate) struct BbonJudgeArgs {
    /// The run to judge.
    #[arg(long, value_name = "ID")]
    pub(crate) run_id: String,
    /// Model identifier to record and request (default: `llm.judgeModel`).
    #[arg(long, value_name = "MODEL")]
    pub(crate) model: Option<String>,
    /// The judge prompt template version.
    #[arg(long, value_name = "VERSION", default_value = "v1")]
    pub(crate) prompt_version: String,
}

/// Arguments for `bbon adopt`.
#[derive(Args, Debug)]
pub(crate) struct BbonAdoptArgs {
    /// The run to adopt.
    #[arg(long, value_name = "ID")]
    pub(crate) run_id: String,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    install_tracing(cli.verbose);
    run(cli).await
}

/// Executes the CLI command dispatcher.
async fn run(cli: Cli) -> ExitCode {
    let cmd_name = command_name(&cli.command);
    let config = match EngramConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return envelope::emit(cmd_name, Err(err)),
    };
    let db_path = cli.db.clone().unwrap_or_else(|| PathBuf::from(".engram/engram.db"));
    let audit_path = PathBuf::from(".engram/snapshots/audit.ndjson");

    let result = dispatch(cli, &config, &db_path, &audit_path).await;
    envelope::emit(cmd_name, result)
}

/// Returns the envelope `cmd` name for a parsed command (spec §6 verb
/// families; `bbon` subcommands are reported as `"bbon <verb>"`).
const fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Init => "init",
        Commands::Doctor => "doctor",
        Commands::Capture(_) => "capture",
        Commands::Reflect => "reflect",
        Commands::Curate(_) => "curate",
        Commands::Apply => "apply",
        Commands::Learn(_) => "learn",
        Commands::Bbon { command: BbonCommand::Run(_) } => "bbon run",
        Commands::Bbon { command: BbonCommand::Judge(_) } => "bbon judge",
        Commands::Bbon { command: BbonCommand::Adopt(_) } => "bbon adopt",
    }
}

/// Routes a parsed command to its implementation in [`commands`].
async fn dispatch(cli: Cli, config: &EngramConfig, db_path: &std::path::Path, audit_path: &std::path::Path) -> Result<serde_json::Value, CliError> {
    match cli.command {
        Commands::Init => commands::core::init(db_path, audit_path, &cli.document),
        Commands::Doctor => commands::core::doctor(db_path, &cli.document),
        Commands::Capture(args) => {
            let repository = open_repository(db_path, audit_path)?;
            commands::core::capture(&repository, args.file.as_deref(), args.literal.as_deref())
        }
        Commands::Reflect => {
            let repository = open_repository(db_path, audit_path)?;
            commands::core::reflect(&repository)
        }
        Commands::Curate(args) => {
            let repository = open_repository(db_path, audit_path)?;
            commands::core::curate(&repository, args.tau)
        }
        Commands::Apply => {
            let repository = open_repository(db_path, audit_path)?;
            commands::core::apply(&repository, &cli.document, &cli.project_id)
        }
        Commands::Learn(args) => {
            let repository = open_repository(db_path, audit_path)?;
            commands::core::learn(&repository, &cli.document, &cli.project_id, args.tau)
        }
        Commands::Bbon { command: BbonCommand::Run(args) } => {
            let repository = open_repository(db_path, audit_path)?;
            commands::bbon::run(&repository, &cli.document, &cli.project_id, args)
        }
        Commands::Bbon { command: BbonCommand::Judge(args) } => {
            let repository = open_repository(db_path, audit_path)?;
            let client = build_llm_client(config)?;
            commands::bbon::judge(&repository, client.as_ref(), config, args).await
        }
        Commands::Bbon { command: BbonCommand::Adopt(args) } => {
            let repository = open_repository(db_path, audit_path)?;
            commands::bbon::adopt(&repository, &cli.document, &cli.project_id, args)
        }
    }
}

// ============================================================================
// SECTION: Shared Helpers
// ============================================================================

/// Opens the repository at `db_path`, applying pending migrations.
fn open_repository(db_path: &std::path::Path, audit_path: &std::path::Path) -> Result<Repository, CliError> {
    Repository::open(db_path, audit_path).map_err(CliError::from)
}

/// Builds the `LlmClient` the judge invokes, per `config.llm.provider`.
fn build_llm_client(config: &EngramConfig) -> Result<Box<dyn LlmClient>, CliError> {
    match config.llm.provider.as_str() {
        "http" => {
            let http_config = HttpLlmConfig {
                endpoint: config.llm.endpoint.clone().unwrap_or_default(),
                api_key: config.llm.api_key.clone(),
                timeout_ms: config.llm.timeout_ms,
            };
            Ok(Box::new(HttpLlmClient::new(http_config)?))
        }
        _ => Ok(Box::new(StubLlmClient::prefer_left())),
    }
}

/// Installs the stderr tracing subscriber, honoring `RUST_LOG` and the
/// `-v`/`--verbose` flag.
fn install_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout. The only CLI output that is ever
/// written here is the JSON envelope; every other message goes through
/// `tracing` to stderr.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use super::*;

    #[test]
    fn command_name_reports_bbon_subcommands_with_their_verb() {
        let run = Commands::Bbon {
            command: BbonCommand::Run(BbonRunArgs { goal: "x".to_owned(), subject_id: None, constraints: vec![], context_file: None, n: None, seed: None, tau: 0.8 }),
        };
        assert_eq!(command_name(&run), "bbon run");
    }
}
