//! Argument parsing, dispatch and output for the `sentinel` binary.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use ops_sentinel::agent::{AgentKind, run_agent_process};
use ops_sentinel::checks::credentials::{Lookup, overlay_lookup, status_report};
use ops_sentinel::checks::resources::ResourceCheck;
use ops_sentinel::checks::{CheckResult, Outcome};
use ops_sentinel::cli::automation::AutomationRunner;
use ops_sentinel::cli::devtools::{dev_status, read_agent_logs};
use ops_sentinel::cli::envcheck::check_env_file;
use ops_sentinel::cli::monitor::{MonitorReading, SystemMonitor};
use ops_sentinel::core::config::Config;
use ops_sentinel::core::envfile::overlay_or_empty;
use ops_sentinel::core::errors::SentinelError;
use ops_sentinel::daemon::signals::SignalHandler;
use ops_sentinel::daemon::supervisor::run_supervisor;
use ops_sentinel::logger::line::LineLogger;
use ops_sentinel::platform::pal::detect_platform;
use ops_sentinel::status::sink::{StatusSink, StatusSnapshot};

/// Ops Sentinel: background agents for credentials, security and resources.
#[derive(Debug, Parser)]
#[command(
    name = "sentinel",
    author,
    version,
    about = "Ops Sentinel - single-host agent supervisor and operational checks",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Start every enabled agent and stop them all on SIGINT/SIGTERM.
    Supervise(SuperviseArgs),
    /// Run one agent loop in the foreground.
    Agent(AgentArgs),
    /// Check or list credentials.
    Credentials(CredentialsArgs),
    /// Load an env file and validate required variables.
    Env(EnvArgs),
    /// Print CPU, memory and disk utilization.
    Monitor(MonitorArgs),
    /// Run the automation tasks once.
    Automate,
    /// Show the latest recorded agent snapshots.
    Status(StatusArgs),
    /// Developer helpers.
    Dev(DevArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct SuperviseArgs {
    /// Write the supervisor PID here instead of `<logs_dir>/supervisor.pid`.
    #[arg(long, value_name = "PATH")]
    pidfile: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct AgentArgs {
    /// Which agent to run.
    #[arg(value_enum)]
    name: AgentKind,
    /// Run a single cycle and exit with the issue count.
    #[arg(long)]
    once: bool,
}

#[derive(Debug, Clone, Args)]
struct CredentialsArgs {
    #[command(subcommand)]
    command: CredentialsCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum CredentialsCommand {
    /// Validate credentials and env-file hygiene; exit status is the issue count.
    Check,
    /// List which credentials are present.
    Status,
}

#[derive(Debug, Clone, Args)]
struct EnvArgs {
    /// Env file to load (defaults to `paths.env_file`).
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct MonitorArgs {
    /// Keep sampling until interrupted.
    #[arg(long)]
    continuous: bool,
    /// Seconds between samples in continuous mode.
    #[arg(long, value_name = "SECS", requires = "continuous")]
    interval: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct StatusArgs {
    /// Only show this agent.
    #[arg(long, value_enum)]
    agent: Option<AgentKind>,
}

#[derive(Debug, Clone, Args)]
struct DevArgs {
    #[command(subcommand)]
    command: DevCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum DevCommand {
    /// Checklist: supervisor, logs directory, env file, config file.
    Status,
    /// Show agent logs.
    Logs(LogsArgs),
    /// Run the credential and security suites once.
    Security,
}

#[derive(Debug, Clone, Args)]
struct LogsArgs {
    /// Agent to show (all agents when omitted).
    #[arg(value_enum)]
    name: Option<AgentKind>,
    /// Only the last N lines of each log.
    #[arg(long, value_name = "N")]
    lines: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// The command ran and the result is negative (missing env file, failed task).
    #[error("{0}")]
    Failed(String),
    /// Checks completed and reported issues.
    #[error("{count} issue(s) found")]
    Issues { count: usize },
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) | Self::Failed(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Issues { count } => i32::try_from((*count).clamp(1, 255)).unwrap_or(255),
        }
    }

    /// Whether `main` should print the error. Issue counts were already shown.
    pub const fn is_reportable(&self) -> bool {
        !matches!(self, Self::Issues { .. } | Self::Failed(_))
    }
}

impl From<SentinelError> for CliError {
    fn from(err: SentinelError) -> Self {
        match err {
            SentinelError::InvalidConfig { .. }
            | SentinelError::MissingConfig { .. }
            | SentinelError::ConfigParse { .. } => Self::User(err.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Supervise(args) => run_supervise(cli, args),
        Command::Agent(args) => run_agent(cli, args),
        Command::Credentials(args) => match args.command {
            CredentialsCommand::Check => run_credentials_check(cli),
            CredentialsCommand::Status => run_credentials_status(cli),
        },
        Command::Env(args) => run_env(cli, args),
        Command::Monitor(args) => run_monitor(cli, args),
        Command::Automate => run_automate(cli),
        Command::Status(args) => run_status(cli, args),
        Command::Dev(args) => match &args.command {
            DevCommand::Status => run_dev_status(cli),
            DevCommand::Logs(logs) => run_dev_logs(cli, logs),
            DevCommand::Security => run_dev_security(cli),
        },
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Ok(Config::load(cli.config.as_deref())?)
}

fn credential_lookup(config: &Config) -> Lookup {
    overlay_lookup(overlay_or_empty(&config.paths.env_file))
}

/// Logger for one-shot commands: file only, the command prints its own output.
fn command_logger(config: &Config, file_name: &str, component: &str) -> LineLogger {
    LineLogger::open(&config.paths.logs_dir.join(file_name), component).with_echo(false)
}

// ──────────────────── supervise / agent ────────────────────

fn run_supervise(cli: &Cli, args: &SuperviseArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let program = std::env::current_exe()
        .map_err(|e| CliError::Runtime(format!("cannot locate sentinel binary: {e}")))?;
    run_supervisor(&config, args.pidfile.as_deref(), &program)?;
    Ok(())
}

fn run_agent(cli: &Cli, args: &AgentArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    if !args.once && !args.name.is_enabled(&config) {
        return Err(CliError::User(format!(
            "{} agent is disabled in {}",
            args.name,
            config.paths.config_file.display()
        )));
    }
    let Some(result) = run_agent_process(args.name, &config, args.once, cli.verbose)? else {
        return Ok(());
    };
    emit_check_result(cli, args.name.title(), &result)?;
    issues_to_exit(result.issue_count())
}

// ──────────────────── credentials / env ────────────────────

fn run_credentials_check(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let suite = AgentKind::Credential.build_suite(&config, credential_lookup(&config), None)?;
    let result = suite.run()?;
    emit_check_result(cli, "Credential security check", &result)?;
    issues_to_exit(result.issue_count())
}

fn run_credentials_status(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let report = status_report(&config.credentials, &credential_lookup(&config));
    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                println!("{}", "Credential Status Report".bold());
                println!("{}", "=".repeat(50));
                for entry in &report {
                    let (mark, state) = if entry.present {
                        ("✓".green(), "Present")
                    } else if entry.required {
                        ("✗".red(), "Missing")
                    } else {
                        ("-".dimmed(), "Missing (optional)")
                    };
                    println!("{mark} {}: {state}", entry.description);
                }
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "credentials status",
            "credentials": report,
        }))?,
    }
    Ok(())
}

fn run_env(cli: &Cli, args: &EnvArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let path = args.file.clone().unwrap_or_else(|| config.paths.env_file.clone());
    let report = check_env_file(&path, &config.credentials)?;

    match output_mode(cli) {
        OutputMode::Human => {
            if !report.found {
                eprintln!("{} Environment file {} not found", "✗".red(), path.display());
            } else if !cli.quiet {
                if let Some(mode) = report.insecure_mode {
                    println!(
                        "{} {} has insecure permissions ({mode:o})",
                        "!".yellow(),
                        path.display()
                    );
                }
                for bad in &report.malformed {
                    println!("{} Invalid format on line {}", "!".yellow(), bad.line);
                }
                for key in &report.loaded {
                    println!("{} Loaded: {key}", "✓".green());
                }
                println!("Loaded {} environment variable(s)", report.loaded.len());
                if report.missing.is_empty() {
                    println!("{} All required environment variables are set", "✓".green());
                }
            }
            if !report.missing.is_empty() {
                eprintln!(
                    "{} Missing required environment variables: {}",
                    "✗".red(),
                    report.missing.join(", ")
                );
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "env",
            "valid": report.is_valid(),
            "report": report,
        }))?,
    }

    if report.is_valid() {
        Ok(())
    } else if report.found {
        Err(CliError::Failed("required environment variables missing".to_string()))
    } else {
        Err(CliError::Failed(format!("{} not found", path.display())))
    }
}

// ──────────────────── monitor / automate ────────────────────

fn run_monitor(cli: &Cli, args: &MonitorArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let platform = detect_platform()?;
    let monitor = SystemMonitor::new(
        ResourceCheck::new(platform, config.resources.clone()),
        command_logger(&config, "system-monitor.log", "system-monitor"),
    );
    let mode = output_mode(cli);

    if args.continuous {
        let interval = Duration::from_secs(args.interval.unwrap_or(config.monitor.interval_secs).max(1));
        let signals = SignalHandler::new();
        let mut write_error = None;
        monitor.monitor_continuous(interval, &signals, |reading| {
            if write_error.is_none()
                && let Err(err) = emit_reading(cli, mode, reading)
            {
                write_error = Some(err);
                signals.request_shutdown();
            }
        });
        return write_error.map_or(Ok(()), Err);
    }

    match monitor.monitor_once() {
        Ok(reading) => emit_reading(cli, mode, &reading),
        Err(err) => Err(CliError::Failed(format!("sampling failed: {err}"))),
    }
}

fn emit_reading(cli: &Cli, mode: OutputMode, reading: &MonitorReading) -> Result<(), CliError> {
    match mode {
        OutputMode::Human => {
            if !cli.quiet {
                println!("{}", reading.sample.summary_line());
            }
            for alert in &reading.alerts {
                println!("{} {alert}", "!".yellow());
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "monitor",
            "reading": reading,
        }))?,
    }
    io::stdout().flush()?;
    Ok(())
}

fn run_automate(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let platform = detect_platform().ok();
    let runner = AutomationRunner::new(
        &config,
        credential_lookup(&config),
        platform,
        command_logger(&config, "automation.log", "automation"),
    );
    let report = runner.run();

    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                for task in &report.tasks {
                    let mark = if task.success { "✓".green() } else { "✗".red() };
                    println!("{mark} {}: {}", task.name, task.detail);
                }
            }
            println!("Automation Summary: {}", report.summary_line());
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "automate",
            "summary": report.summary_line(),
            "tasks": report.tasks,
        }))?,
    }

    if report.all_succeeded() {
        Ok(())
    } else {
        Err(CliError::Failed(report.summary_line()))
    }
}

// ──────────────────── status ────────────────────

/// A snapshot is stale once two run intervals pass without a new one.
fn stale_after(config: &Config, snapshot: &StatusSnapshot) -> Option<Duration> {
    let kind: AgentKind = snapshot.agent.parse().ok()?;
    Some(kind.schedule(config).0.saturating_mul(2))
}

fn run_status(cli: &Cli, args: &StatusArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let sink = StatusSink::new(&config.paths.status_dir);
    let snapshots = match args.agent {
        Some(kind) => sink.read(kind.name())?.into_iter().collect(),
        None => sink.read_all()?,
    };

    match output_mode(cli) {
        OutputMode::Human => {
            if snapshots.is_empty() && !cli.quiet {
                println!("No status recorded in {}", sink.dir().display());
            }
            for snapshot in &snapshots {
                let stale = stale_after(&config, snapshot)
                    .is_some_and(|max_age| snapshot.is_stale(max_age));
                let state = match snapshot.state.as_str() {
                    "ok" => "OK".green(),
                    "warning" => "WARNING".yellow(),
                    other => other.to_uppercase().red(),
                };
                let age = format_duration(snapshot.age());
                let stale_note = if stale { " (stale)".red().to_string() } else { String::new() };
                println!(
                    "{:<12} {state:<8} last check {} ({age} ago){stale_note}",
                    snapshot.agent,
                    snapshot.last_check.format("%Y-%m-%d %H:%M:%S UTC"),
                );
                if cli.quiet {
                    continue;
                }
                for issue in &snapshot.issues {
                    println!("    - {issue}");
                }
                if cli.verbose {
                    for (item, status) in &snapshot.statuses {
                        println!("    {item}: {status}");
                    }
                }
            }
        }
        OutputMode::Json => {
            let agents: Vec<Value> = snapshots
                .iter()
                .map(|snapshot| {
                    let stale = stale_after(&config, snapshot)
                        .is_some_and(|max_age| snapshot.is_stale(max_age));
                    let mut value = serde_json::to_value(snapshot)?;
                    value["stale"] = Value::Bool(stale);
                    Ok(value)
                })
                .collect::<Result<_, serde_json::Error>>()?;
            write_json_line(&json!({
                "command": "status",
                "agents": agents,
            }))?;
        }
    }

    if snapshots.is_empty() {
        Err(CliError::Failed("no status snapshot found".to_string()))
    } else {
        Ok(())
    }
}

// ──────────────────── dev ────────────────────

fn run_dev_status(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let status = dev_status(&config);
    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                for item in &status.items {
                    let mark = if item.ok { "✓".green() } else { "✗".red() };
                    println!("{mark} {}: {}", item.label, item.detail);
                }
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "dev status",
            "failing": status.failing(),
            "items": status.items,
        }))?,
    }
    issues_to_exit(status.failing())
}

fn run_dev_logs(cli: &Cli, args: &LogsArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let views = read_agent_logs(&config.paths.logs_dir, args.name, args.lines)?;
    match output_mode(cli) {
        OutputMode::Human => {
            for view in &views {
                match &view.content {
                    Some(content) if content.trim().is_empty() => {
                        println!("--- {} ---\n(No logs yet)", view.path.display());
                    }
                    Some(content) => {
                        println!("--- {} ---", view.path.display());
                        print!("{content}");
                    }
                    None => println!("{} Log file not found: {}", "✗".red(), view.path.display()),
                }
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "dev logs",
            "logs": views,
        }))?,
    }
    Ok(())
}

fn run_dev_security(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let lookup = credential_lookup(&config);
    let mut results = Vec::new();
    for kind in [AgentKind::Credential, AgentKind::Security] {
        let suite = kind.build_suite(&config, Arc::clone(&lookup), None)?;
        results.push((kind, suite.run()?));
    }
    let total: usize = results.iter().map(|(_, result)| result.issue_count()).sum();

    match output_mode(cli) {
        OutputMode::Human => {
            for (kind, result) in &results {
                emit_human_result(cli, kind.title(), result);
            }
        }
        OutputMode::Json => {
            let suites: Vec<Value> = results
                .iter()
                .map(|(kind, result)| json!({ "agent": kind.name(), "result": result }))
                .collect();
            write_json_line(&json!({
                "command": "dev security",
                "issues": total,
                "suites": suites,
            }))?;
        }
    }

    if total == 0 {
        Ok(())
    } else {
        Err(CliError::Failed(format!("{total} issue(s) found")))
    }
}

// ──────────────────── output helpers ────────────────────

fn issues_to_exit(count: usize) -> Result<(), CliError> {
    if count == 0 {
        Ok(())
    } else {
        Err(CliError::Issues { count })
    }
}

fn emit_check_result(cli: &Cli, title: &str, result: &CheckResult) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            emit_human_result(cli, title, result);
            Ok(())
        }
        OutputMode::Json => write_json_line(&json!({
            "command": title,
            "issue_count": result.issue_count(),
            "result": result,
        })),
    }
}

fn emit_human_result(cli: &Cli, title: &str, result: &CheckResult) {
    match &result.outcome {
        Outcome::Ok => {
            if !cli.quiet {
                println!("{} {title}: all checks passed", "✓".green());
            }
        }
        Outcome::Warning { issues } => {
            println!("{} {title}: found {} issue(s)", "✗".red(), issues.len());
            for issue in issues {
                println!("  - {issue}");
            }
        }
        Outcome::Error { message } => {
            println!("{} {title}: {message}", "✗".red());
        }
    }
    if cli.verbose {
        for (item, status) in &result.statuses {
            println!("    {item}: {status}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("SENTINEL_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
