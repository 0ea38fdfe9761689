//! Process supervisor: one child process per agent, stopped with a shared
//! grace period followed by a force kill.
//!
//! Children are never restarted. A child that exits on its own is logged and
//! its handle is marked not running.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::agent::AgentKind;
use crate::core::config::Config;
use crate::core::envfile::EnvOverlay;
use crate::core::errors::{Result, SentinelError};
use crate::daemon::signals::SignalHandler;
use crate::logger::jsonl::{ActivityEntry, ActivityLog, EventType, Severity};
use crate::logger::line::LineLogger;

/// Poll granularity while waiting for children to exit.
const REAP_POLL: Duration = Duration::from_millis(25);

// ──────────────────── specs and handles ────────────────────

/// How to launch one agent. Immutable once the supervisor starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub interval: Duration,
    pub backoff: Duration,
}

impl AgentSpec {
    /// `<program> agent <name> [--config <file>]` for a built-in agent.
    #[must_use]
    pub fn for_agent(kind: AgentKind, config: &Config, program: &Path) -> Self {
        let mut args = vec!["agent".to_string(), kind.name().to_string()];
        if config.has_config_file() {
            args.push("--config".to_string());
            args.push(config.paths.config_file.display().to_string());
        }
        let (interval, backoff) = kind.schedule(config);
        Self {
            name: kind.name().to_string(),
            program: program.to_path_buf(),
            args,
            interval,
            backoff,
        }
    }

    /// Specs for every enabled agent.
    #[must_use]
    pub fn all_enabled(config: &Config, program: &Path) -> Vec<Self> {
        AgentKind::ALL
            .into_iter()
            .filter(|kind| kind.is_enabled(config))
            .map(|kind| Self::for_agent(kind, config, program))
            .collect()
    }
}

/// A spawned child.
#[derive(Debug)]
pub struct AgentHandle {
    pub spec: AgentSpec,
    pub pid: u32,
    child: Child,
    pub running: bool,
    started_at: Instant,
    /// Set when the child was reaped before `stop`.
    exit_status: Option<ExitStatus>,
}

impl AgentHandle {
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }
}

// ──────────────────── reports ────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartReport {
    /// `(agent, pid)` for every child spawned by this call.
    pub started: Vec<(String, u32)>,
    /// Agents that already had a live child.
    pub already_running: Vec<String>,
    /// `(agent, error)` for every spawn that failed.
    pub failed: Vec<(String, String)>,
}

/// How one child ended during [`Supervisor::stop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    /// Exited within the grace period.
    Exited { code: Option<i32> },
    /// Still alive at the deadline; SIGKILLed and reaped.
    Killed,
    /// Had already exited before the stop began.
    AlreadyExited { code: Option<i32> },
    Failed { error: String },
}

// ──────────────────── supervisor ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub grace_period: Duration,
    pub poll_interval: Duration,
}

impl SupervisorSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            grace_period: config.supervisor.grace_period(),
            poll_interval: config.supervisor.poll_interval(),
        }
    }
}

pub struct Supervisor {
    specs: Vec<AgentSpec>,
    handles: BTreeMap<String, AgentHandle>,
    settings: SupervisorSettings,
    env: EnvOverlay,
    workdir: Option<PathBuf>,
    logger: LineLogger,
    activity: ActivityLog,
}

impl Supervisor {
    #[must_use]
    pub fn new(
        specs: Vec<AgentSpec>,
        settings: SupervisorSettings,
        logger: LineLogger,
        activity: ActivityLog,
    ) -> Self {
        Self {
            specs,
            handles: BTreeMap::new(),
            settings,
            env: EnvOverlay::default(),
            workdir: None,
            logger,
            activity,
        }
    }

    /// Extra environment passed to every child.
    #[must_use]
    pub fn with_env(mut self, env: EnvOverlay) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn specs(&self) -> &[AgentSpec] {
        &self.specs
    }

    /// `(agent, pid)` for every child believed alive.
    #[must_use]
    pub fn running(&self) -> Vec<(&str, u32)> {
        self.handles
            .values()
            .filter(|handle| handle.running)
            .map(|handle| (handle.spec.name.as_str(), handle.pid))
            .collect()
    }

    #[must_use]
    pub fn handle(&self, name: &str) -> Option<&AgentHandle> {
        self.handles.get(name)
    }

    /// Spawn every spec without a live child. Failures do not stop the rest.
    pub fn start(&mut self) -> StartReport {
        let mut report = StartReport::default();
        for spec in self.specs.clone() {
            if self.handles.get(&spec.name).is_some_and(|h| h.running) {
                report.already_running.push(spec.name.clone());
                continue;
            }
            self.logger.info(format!("Starting {} agent...", spec.name));
            match self.spawn(&spec) {
                Ok(child) => {
                    let pid = child.id();
                    self.logger
                        .info(format!("{} agent started (PID: {pid})", spec.name));
                    self.activity.record(
                        &ActivityEntry::new(EventType::AgentSpawned, Severity::Info)
                            .agent(&spec.name)
                            .pid(pid),
                    );
                    report.started.push((spec.name.clone(), pid));
                    self.handles.insert(
                        spec.name.clone(),
                        AgentHandle {
                            spec,
                            pid,
                            child,
                            running: true,
                            started_at: Instant::now(),
                            exit_status: None,
                        },
                    );
                }
                Err(err) => {
                    self.logger
                        .error(format!("Failed to start {} agent: {err}", spec.name));
                    self.activity.record(
                        &ActivityEntry::new(EventType::SpawnFailed, Severity::Critical)
                            .agent(&spec.name)
                            .error(&err),
                    );
                    report.failed.push((spec.name.clone(), err.to_string()));
                }
            }
        }
        report
    }

    fn spawn(&self, spec: &AgentSpec) -> Result<Child> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .envs(self.env.iter());
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        command.spawn().map_err(|source| SentinelError::Spawn {
            agent: spec.name.clone(),
            source,
        })
    }

    /// Reap children that exited on their own. Returns their names.
    pub fn reap_exited(&mut self) -> Vec<String> {
        let mut exited = Vec::new();
        for handle in self.handles.values_mut().filter(|handle| handle.running) {
            match handle.child.try_wait() {
                Ok(Some(status)) => {
                    handle.running = false;
                    handle.exit_status = Some(status);
                    self.logger.warning(format!(
                        "{} agent (PID {}) exited unexpectedly: {}",
                        handle.spec.name,
                        handle.pid,
                        describe_status(status)
                    ));
                    self.activity.record(
                        &ActivityEntry::new(EventType::AgentExited, Severity::Warning)
                            .agent(&handle.spec.name)
                            .pid(handle.pid)
                            .exit_code(status.code())
                            .duration_ms(millis(handle.uptime())),
                    );
                    exited.push(handle.spec.name.clone());
                }
                Ok(None) => {}
                Err(err) => {
                    self.logger.error(format!(
                        "Could not poll {} agent (PID {}): {err}",
                        handle.spec.name, handle.pid
                    ));
                }
            }
        }
        exited
    }

    /// Stop every child: SIGTERM all, wait until one shared deadline, then
    /// SIGKILL and reap whatever is left. Handles are dropped afterwards.
    pub fn stop(&mut self) -> BTreeMap<String, StopOutcome> {
        let started = Instant::now();
        let deadline = started + self.settings.grace_period;
        let mut outcomes = BTreeMap::new();
        let mut pending: Vec<AgentHandle> = Vec::new();

        for (name, mut handle) in std::mem::take(&mut self.handles) {
            if !handle.running {
                let code = handle.exit_status.and_then(|status| status.code());
                outcomes.insert(name, StopOutcome::AlreadyExited { code });
                continue;
            }
            match handle.child.try_wait() {
                Ok(Some(status)) => {
                    outcomes.insert(name, StopOutcome::AlreadyExited { code: status.code() });
                    continue;
                }
                Ok(None) => {}
                Err(err) => {
                    self.logger
                        .error(format!("Could not poll {name} agent: {err}"));
                }
            }
            self.logger.info(format!("Stopping {name} agent..."));
            if let Err(err) = terminate(&handle) {
                // Still pending: the deadline escalation kills it.
                self.logger.error(format!("{err}"));
                self.activity.record(
                    &ActivityEntry::new(EventType::StopFailed, Severity::Warning)
                        .agent(&name)
                        .pid(handle.pid)
                        .error(&err),
                );
            }
            pending.push(handle);
        }

        while !pending.is_empty() {
            let mut still_running = Vec::with_capacity(pending.len());
            for mut handle in pending {
                match handle.child.try_wait() {
                    Ok(Some(status)) => {
                        self.logger
                            .info(format!("{} agent stopped", handle.spec.name));
                        self.activity.record(
                            &ActivityEntry::new(EventType::AgentStopped, Severity::Info)
                                .agent(&handle.spec.name)
                                .pid(handle.pid)
                                .exit_code(status.code())
                                .duration_ms(millis(started.elapsed())),
                        );
                        outcomes.insert(
                            handle.spec.name.clone(),
                            StopOutcome::Exited {
                                code: status.code(),
                            },
                        );
                    }
                    Ok(None) => still_running.push(handle),
                    Err(err) => {
                        self.logger.error(format!(
                            "Error stopping {} agent: {err}",
                            handle.spec.name
                        ));
                        outcomes.insert(
                            handle.spec.name.clone(),
                            StopOutcome::Failed {
                                error: err.to_string(),
                            },
                        );
                    }
                }
            }
            pending = still_running;

            let now = Instant::now();
            if pending.is_empty() || now >= deadline {
                break;
            }
            thread::sleep(REAP_POLL.min(deadline - now));
        }

        for mut handle in pending {
            let name = handle.spec.name.clone();
            self.logger.warning(format!("Force killing {name} agent"));
            let outcome = match handle.child.kill().and_then(|()| handle.child.wait()) {
                Ok(_) => StopOutcome::Killed,
                Err(err) if err.kind() == io::ErrorKind::InvalidInput => {
                    // Exited between the last poll and the kill.
                    match handle.child.wait() {
                        Ok(status) => StopOutcome::Exited {
                            code: status.code(),
                        },
                        Err(err) => StopOutcome::Failed {
                            error: err.to_string(),
                        },
                    }
                }
                Err(err) => StopOutcome::Failed {
                    error: err.to_string(),
                },
            };
            if let StopOutcome::Failed { error } = &outcome {
                self.logger
                    .error(format!("Error stopping {name} agent: {error}"));
            }
            self.activity.record(
                &ActivityEntry::new(EventType::AgentKilled, Severity::Warning)
                    .agent(&name)
                    .pid(handle.pid)
                    .duration_ms(millis(started.elapsed())),
            );
            outcomes.insert(name, outcome);
        }

        outcomes
    }

    /// Block until SIGTERM/SIGINT, reaping children that exit meanwhile,
    /// then stop everything.
    pub fn await_shutdown(&mut self, signals: &SignalHandler) -> BTreeMap<String, StopOutcome> {
        while signals.sleep(self.settings.poll_interval) {
            self.reap_exited();
        }
        self.logger.info("Received shutdown signal...");
        self.activity
            .record(&ActivityEntry::new(EventType::SignalReceived, Severity::Info));
        self.stop()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.handles.values().any(|handle| handle.running) {
            self.stop();
        }
    }
}

#[cfg(unix)]
fn terminate(handle: &AgentHandle) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(handle.pid).map_err(|_| SentinelError::Signal {
        agent: handle.spec.name.clone(),
        pid: handle.pid,
        details: "pid out of range".to_string(),
    })?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(|errno| SentinelError::Signal {
        agent: handle.spec.name.clone(),
        pid: handle.pid,
        details: errno.to_string(),
    })
}

#[cfg(not(unix))]
fn terminate(handle: &AgentHandle) -> Result<()> {
    Err(SentinelError::Signal {
        agent: handle.spec.name.clone(),
        pid: handle.pid,
        details: "graceful termination unsupported; will force kill".to_string(),
    })
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => format!("{status}"),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ──────────────────── pidfile ────────────────────

/// Write the current PID to `path`.
pub fn write_pidfile(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| SentinelError::io(parent, err))?;
    }
    fs::write(path, format!("{}\n", std::process::id())).map_err(|err| SentinelError::io(path, err))
}

/// PID stored in `path`, if any.
pub fn read_pidfile(path: &Path) -> Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|err| SentinelError::Runtime {
                details: format!("invalid pidfile {}: {err}", path.display()),
            }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SentinelError::io(path, err)),
    }
}

/// Whether a process with `pid` exists (sends signal 0).
#[cfg(unix)]
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
#[must_use]
pub fn process_alive(_pid: u32) -> bool {
    false
}

// ──────────────────── entry point ────────────────────

/// Body of `sentinel supervise`: start all agents, wait for a signal, stop.
pub fn run_supervisor(config: &Config, pidfile: Option<&Path>, program: &Path) -> Result<()> {
    let logs_dir = &config.paths.logs_dir;
    fs::create_dir_all(logs_dir).map_err(|err| SentinelError::io(logs_dir, err))?;

    let logger = LineLogger::open(&logs_dir.join("supervisor.log"), "supervisor");
    let mut activity = ActivityLog::open(&logs_dir.join("supervisor.jsonl"));
    let pidfile = pidfile.map_or_else(|| config.pidfile(), Path::to_path_buf);

    if let Some(pid) = read_pidfile(&pidfile).ok().flatten()
        && pid != std::process::id()
        && process_alive(pid)
    {
        return Err(SentinelError::Runtime {
            details: format!("supervisor already running (PID {pid}, {})", pidfile.display()),
        });
    }
    write_pidfile(&pidfile)?;

    let signals = SignalHandler::new();
    let overlay = crate::core::envfile::overlay_or_empty(&config.paths.env_file);
    let specs = AgentSpec::all_enabled(config, program);
    logger.info(format!(
        "Starting background agents ({} configured, config hash {})",
        specs.len(),
        config.stable_hash()?
    ));
    activity.record(
        &ActivityEntry::new(EventType::SupervisorStart, Severity::Info)
            .pid(std::process::id())
            .details(format!("agents={}", specs.len())),
    );

    let mut supervisor = Supervisor::new(
        specs,
        SupervisorSettings::from_config(config),
        logger.clone(),
        activity,
    )
    .with_env(overlay)
    .with_workdir(&config.paths.project_root);

    let report = supervisor.start();
    if report.failed.is_empty() {
        logger.info("All agents started successfully!");
    } else {
        logger.warning(format!(
            "{} of {} agents failed to start",
            report.failed.len(),
            supervisor.specs().len()
        ));
    }

    let outcomes = supervisor.await_shutdown(&signals);
    let killed = outcomes
        .values()
        .filter(|outcome| matches!(outcome, StopOutcome::Killed))
        .count();
    logger.info(format!(
        "All agents stopped ({} total, {killed} force-killed)",
        outcomes.len()
    ));
    supervisor.activity.record(
        &ActivityEntry::new(EventType::SupervisorStop, Severity::Info).pid(std::process::id()),
    );

    if let Err(err) = fs::remove_file(&pidfile)
        && err.kind() != io::ErrorKind::NotFound
    {
        logger.warning(format!("Could not remove {}: {err}", pidfile.display()));
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn settings(grace: Duration) -> SupervisorSettings {
        SupervisorSettings {
            grace_period: grace,
            poll_interval: Duration::from_millis(20),
        }
    }

    fn spec(name: &str, program: &str, args: &[&str]) -> AgentSpec {
        AgentSpec {
            name: name.to_string(),
            program: PathBuf::from(program),
            args: args.iter().map(|s| (*s).to_string()).collect(),
            interval: Duration::from_secs(60),
            backoff: Duration::from_secs(5),
        }
    }

    fn supervisor(dir: &Path, specs: Vec<AgentSpec>, grace: Duration) -> Supervisor {
        Supervisor::new(
            specs,
            settings(grace),
            LineLogger::open(&dir.join("supervisor.log"), "supervisor").with_echo(false),
            ActivityLog::open(&dir.join("supervisor.jsonl")),
        )
    }

    #[test]
    fn start_then_stop_leaves_no_children_even_with_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor(
            dir.path(),
            vec![
                spec("credential", "sleep", &["30"]),
                spec("security", "/nonexistent/sentinel-agent", &[]),
                spec("monitoring", "sleep", &["30"]),
            ],
            Duration::from_secs(5),
        );

        let report = sup.start();
        assert_eq!(report.started.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "security");
        let pids: Vec<u32> = report.started.iter().map(|(_, pid)| *pid).collect();

        let outcomes = sup.stop();
        assert_eq!(outcomes.len(), 2);
        assert!(
            outcomes
                .values()
                .all(|outcome| matches!(outcome, StopOutcome::Exited { .. }))
        );
        assert!(sup.running().is_empty());
        for pid in pids {
            assert!(!process_alive(pid), "pid {pid} should be gone");
        }

        let activity = fs::read_to_string(dir.path().join("supervisor.jsonl")).unwrap();
        assert!(activity.contains("\"spawn_failed\""));
        assert_eq!(activity.matches("\"agent_stopped\"").count(), 2);
    }

    #[test]
    fn second_start_does_not_double_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor(
            dir.path(),
            vec![spec("monitoring", "sleep", &["30"])],
            Duration::from_secs(5),
        );
        let first = sup.start();
        let second = sup.start();
        assert_eq!(first.started.len(), 1);
        assert!(second.started.is_empty());
        assert_eq!(second.already_running, vec!["monitoring".to_string()]);
        assert_eq!(sup.running().len(), 1);
        sup.stop();
    }

    #[test]
    fn stubborn_child_is_killed_within_grace_plus_epsilon() {
        let dir = tempfile::tempdir().unwrap();
        let grace = Duration::from_secs(1);
        let mut sup = supervisor(
            dir.path(),
            vec![
                spec("security", "sh", &["-c", "trap '' TERM; exec sleep 30"]),
                spec("credential", "sh", &["-c", "trap '' TERM; exec sleep 30"]),
            ],
            grace,
        );
        let report = sup.start();
        assert_eq!(report.started.len(), 2);
        // Let the shells install their trap before signalling.
        thread::sleep(Duration::from_millis(300));

        let started = Instant::now();
        let outcomes = sup.stop();
        let elapsed = started.elapsed();

        assert!(elapsed >= grace, "stop returned early: {elapsed:?}");
        assert!(
            elapsed < grace + Duration::from_secs(2),
            "stop took too long: {elapsed:?}"
        );
        assert_eq!(outcomes["security"], StopOutcome::Killed);
        assert_eq!(outcomes["credential"], StopOutcome::Killed);
        for (_, pid) in report.started {
            assert!(!process_alive(pid));
        }
    }

    #[test]
    fn unexpected_exit_is_reaped_and_not_restarted() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor(
            dir.path(),
            vec![spec("monitoring", "sh", &["-c", "exit 3"])],
            Duration::from_secs(1),
        );
        sup.start();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut exited = Vec::new();
        while exited.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
            exited = sup.reap_exited();
        }
        assert_eq!(exited, vec!["monitoring".to_string()]);
        assert!(sup.running().is_empty());
        let handle = sup.handle("monitoring").unwrap();
        assert!(!handle.running);
        assert_eq!(handle.exit_status().and_then(|status| status.code()), Some(3));

        let outcomes = sup.stop();
        assert_eq!(
            outcomes["monitoring"],
            StopOutcome::AlreadyExited { code: Some(3) }
        );
        let log = fs::read_to_string(dir.path().join("supervisor.log")).unwrap();
        assert!(log.contains("exited unexpectedly: exit code 3"));
    }

    #[test]
    fn await_shutdown_stops_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor(
            dir.path(),
            vec![spec("credential", "sleep", &["30"])],
            Duration::from_secs(5),
        );
        let report = sup.start();
        let signals = SignalHandler::detached();
        let remote = signals.clone();
        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            remote.request_shutdown();
        });

        let outcomes = sup.await_shutdown(&signals);
        trigger.join().unwrap();
        assert!(matches!(outcomes["credential"], StopOutcome::Exited { .. }));
        assert!(!process_alive(report.started[0].1));
    }

    #[test]
    fn spec_passes_config_file_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("sentinel.toml");
        fs::write(&cfg_path, "").unwrap();
        let mut config = Config::default();
        config.paths.config_file = cfg_path.clone();
        config.agents.security.enabled = false;

        let specs = AgentSpec::all_enabled(&config, Path::new("/usr/bin/sentinel"));
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["credential", "monitoring"]);
        assert_eq!(
            specs[0].args,
            vec![
                "agent".to_string(),
                "credential".to_string(),
                "--config".to_string(),
                cfg_path.display().to_string(),
            ]
        );
    }

    #[test]
    fn pidfile_round_trip_and_liveness() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run/supervisor.pid");
        assert_eq!(read_pidfile(&path).unwrap(), None);
        write_pidfile(&path).unwrap();
        let pid = read_pidfile(&path).unwrap().unwrap();
        assert_eq!(pid, std::process::id());
        assert!(process_alive(pid));
    }
}
