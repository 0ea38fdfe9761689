//! Path resolution and the well-known file names under the logs directory.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Suffix given to log files retired by the log-cleanup task.
pub const RETIRED_LOG_SUFFIX: &str = ".old.log";

/// Resolve a path to an absolute, normalized path.
///
/// Existing paths are canonicalized (symlinks resolved). Anything else is
/// joined onto the working directory and normalized syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

/// Join `path` onto `root` unless it is already absolute.
pub fn anchor_to(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        normalize_syntactic(&root.join(path))
    }
}

/// `<logs_dir>/<agent>-agent.log`
pub fn agent_log_path(logs_dir: &Path, agent: &str) -> PathBuf {
    logs_dir.join(format!("{agent}-agent.log"))
}

/// `<status_dir>/<agent>.json`
pub fn status_file_path(status_dir: &Path, agent: &str) -> PathBuf {
    status_dir.join(format!("{agent}.json"))
}

/// Whether the file name ends in `.log` and has not been retired already.
pub fn is_active_log(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    name.ends_with(".log") && !name.ends_with(RETIRED_LOG_SUFFIX)
}

/// `app.log` → `app.old.log`, in the same directory.
pub fn retired_log_path(path: &Path) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    Some(path.with_file_name(format!("{stem}{RETIRED_LOG_SUFFIX}")))
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
