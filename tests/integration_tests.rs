//! End-to-end tests against the built `sentinel` binary.

mod common;

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const CREDENTIALS: [(&str, &str); 4] = [
    ("GITHUB_TOKEN", "ghp_0123456789abcdef"),
    ("AZURE_CLIENT_ID", "00000000-1111-2222-3333-444444444444"),
    ("AZURE_CLIENT_SECRET", "client-secret-value"),
    ("AZURE_TENANT_ID", "55555555-6666-7777-8888-999999999999"),
];

#[cfg(unix)]
fn write_private(path: &Path, contents: &str) {
    use std::os::unix::fs::PermissionsExt;
    fs::write(path, contents).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).unwrap();
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
}

/// Project with a private `.env` that holds every credential and a
/// `.gitignore` that lists it.
fn healthy_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let env: String = CREDENTIALS
        .iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect();
    write_private(&dir.path().join(".env"), &env);
    fs::write(dir.path().join(".gitignore"), "target/\n.env\n").unwrap();
    dir
}

#[test]
fn help_command_prints_usage() {
    let result = common::run_cli_case("help_command_prints_usage", &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: sentinel [OPTIONS] <COMMAND>"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn version_command_prints_version() {
    let result = common::run_cli_case("version_command_prints_version", &["--version"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.contains("sentinel"),
        "missing version output; log: {}",
        result.log_path.display()
    );
}

#[test]
fn subcommand_help_flags_work() {
    let subcommands: [&[&str]; 11] = [
        &["supervise"],
        &["agent"],
        &["credentials"],
        &["credentials", "check"],
        &["env"],
        &["monitor"],
        &["automate"],
        &["status"],
        &["dev"],
        &["dev", "logs"],
        &["completions"],
    ];

    for subcmd in subcommands {
        let mut args = subcmd.to_vec();
        args.push("--help");
        let case_name = format!("subcommand_{}_help", subcmd.join("_"));
        let result = common::run_cli_case(&case_name, &args);
        assert!(
            result.status.success(),
            "'{}' failed; log: {}",
            args.join(" "),
            result.log_path.display()
        );
        assert!(
            result.stdout.contains("Usage"),
            "'{}' missing usage info; log: {}",
            args.join(" "),
            result.log_path.display()
        );
    }
}

#[test]
fn completions_command_generates_shell_script() {
    let result = common::run_cli_case(
        "completions_command_generates_shell_script",
        &["completions", "bash"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.contains("sentinel"),
        "expected completion script contents; log: {}",
        result.log_path.display()
    );
}

#[test]
fn credentials_check_exit_status_is_issue_count() {
    let dir = tempfile::tempdir().unwrap();
    let result = common::run_cli_in(
        "credentials_check_empty_project",
        dir.path(),
        &["credentials", "check"],
        &[],
    );
    // Four missing variables, no .env, no .gitignore.
    assert_eq!(result.code(), Some(6), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("Missing environment variable: GITHUB_TOKEN"));
    assert!(result.stdout.contains(".env file not found"));
    assert!(result.stdout.contains(".gitignore file not found"));
}

#[test]
fn credentials_check_passes_for_healthy_project() {
    let dir = healthy_project();
    let result = common::run_cli_in(
        "credentials_check_healthy",
        dir.path(),
        &["credentials", "check"],
        &[],
    );
    assert_eq!(result.code(), Some(0), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("all checks passed"));
}

#[test]
fn credentials_check_names_the_single_missing_token() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(".gitignore"), ".env\n").unwrap();
    let env: String = CREDENTIALS
        .iter()
        .filter(|(key, _)| *key != "GITHUB_TOKEN")
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect();
    write_private(&dir.path().join(".env"), &env);

    let result = common::run_cli_in(
        "credentials_check_missing_token",
        dir.path(),
        &["credentials", "check"],
        &[],
    );
    assert_eq!(result.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("Missing environment variable: GITHUB_TOKEN"));
    assert!(!result.stdout.contains("AZURE_CLIENT_ID"));
}

#[test]
fn credentials_status_never_prints_values() {
    let dir = healthy_project();
    let result = common::run_cli_in(
        "credentials_status",
        dir.path(),
        &["credentials", "status"],
        &[],
    );
    assert_eq!(result.code(), Some(0), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("GitHub Personal Access Token: Present"));
    assert!(result.stdout.contains("Azure Subscription ID: Missing"));
    assert!(!result.stdout.contains("ghp_0123456789abcdef"));
}

#[test]
fn env_command_validates_file() {
    let empty = tempfile::tempdir().unwrap();
    let missing = common::run_cli_in("env_missing", empty.path(), &["env"], &[]);
    assert_eq!(missing.code(), Some(1), "log: {}", missing.log_path.display());

    let dir = healthy_project();
    let ok = common::run_cli_in("env_ok", dir.path(), &["env"], &[]);
    assert_eq!(ok.code(), Some(0), "log: {}", ok.log_path.display());
    assert!(ok.stdout.contains("Loaded: GITHUB_TOKEN"));
    assert!(!ok.stdout.contains("ghp_0123456789abcdef"));
}

#[test]
fn explicit_missing_config_is_a_user_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = common::run_cli_in(
        "explicit_missing_config",
        dir.path(),
        &["--config", "absent.toml", "status"],
        &[],
    );
    assert_eq!(result.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("OPS-1002") || result.stderr.contains("absent.toml"));
}

#[test]
fn agent_once_records_snapshot_read_back_by_status() {
    let dir = healthy_project();

    let before = common::run_cli_in("status_before", dir.path(), &["status"], &[]);
    assert_eq!(before.code(), Some(1), "log: {}", before.log_path.display());

    let once = common::run_cli_in(
        "agent_credential_once",
        dir.path(),
        &["agent", "credential", "--once"],
        &[],
    );
    assert_eq!(once.code(), Some(0), "log: {}", once.log_path.display());
    assert!(dir.path().join("logs/credential-agent.log").is_file());
    assert!(dir.path().join("logs/status/credential.json").is_file());

    let after = common::run_cli_in(
        "status_after",
        dir.path(),
        &["status", "--agent", "credential"],
        &[],
    );
    assert_eq!(after.code(), Some(0), "log: {}", after.log_path.display());
    assert!(after.stdout.contains("credential"));
    assert!(after.stdout.contains("OK"));

    let json = common::run_cli_in("status_json", dir.path(), &["--json", "status"], &[]);
    let payload: serde_json::Value = serde_json::from_str(json.stdout.trim()).unwrap();
    assert_eq!(payload["agents"][0]["agent"], "credential");
    assert_eq!(payload["agents"][0]["stale"], false);
}

#[test]
fn dev_status_counts_failing_items() {
    let dir = tempfile::tempdir().unwrap();
    let result = common::run_cli_in("dev_status_empty", dir.path(), &["dev", "status"], &[]);
    assert_eq!(result.code(), Some(4), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("supervisor not running"));
}

#[test]
fn automate_reports_summary() {
    let dir = tempfile::tempdir().unwrap();
    let result = common::run_cli_in("automate_empty", dir.path(), &["automate"], &[]);
    // The security scan fails without credentials.
    assert_eq!(result.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("tasks successful"));
    assert!(dir.path().join("logs/automation.log").is_file());
}

#[cfg(target_os = "linux")]
#[test]
fn supervisor_starts_agents_and_stops_on_sigterm() {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let dir = healthy_project();
    fs::write(
        dir.path().join("sentinel.toml"),
        "[supervisor]\ngrace_period_secs = 5\npoll_interval_ms = 50\n\n[resources]\ncpu_sample_ms = 50\n",
    )
    .unwrap();

    let mut child = Command::new(common::resolve_bin_path())
        .arg("supervise")
        .current_dir(dir.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let pidfile = dir.path().join("logs/supervisor.pid");
    let status_dir = dir.path().join("logs/status");
    let deadline = Instant::now() + Duration::from_secs(20);
    while Instant::now() < deadline
        && !(pidfile.is_file()
            && ["credential", "security", "monitoring"]
                .iter()
                .all(|agent| status_dir.join(format!("{agent}.json")).is_file()))
    {
        thread::sleep(Duration::from_millis(50));
    }
    assert!(pidfile.is_file(), "supervisor never wrote its pidfile");

    let pid = i32::try_from(child.id()).unwrap();
    kill(Pid::from_raw(pid), Signal::SIGTERM).unwrap();

    let deadline = Instant::now() + Duration::from_secs(15);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        assert!(Instant::now() < deadline, "supervisor did not stop");
        thread::sleep(Duration::from_millis(50));
    };

    assert!(status.success());
    assert!(!pidfile.exists());
    let activity = fs::read_to_string(dir.path().join("logs/supervisor.jsonl")).unwrap();
    assert_eq!(activity.matches("\"agent_spawned\"").count(), 3);
    assert!(activity.contains("\"signal_received\""));
    assert!(activity.contains("\"supervisor_stop\""));
    for agent in ["credential", "security", "monitoring"] {
        assert!(
            status_dir.join(format!("{agent}.json")).is_file(),
            "{agent} never recorded a snapshot"
        );
    }
}
