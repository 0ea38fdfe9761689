//! PAL trait and the Linux implementation backed by `/proc` and `statvfs`.

#![allow(missing_docs)]

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SentinelError};

/// Aggregate CPU jiffies from the first line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CpuTimes {
    /// `idle + iowait`.
    pub idle: u64,
    /// Sum of the first eight columns (guest time excluded).
    pub total: u64,
}

impl CpuTimes {
    /// Busy percentage between an earlier sample and this one.
    #[must_use]
    pub fn busy_pct_since(&self, earlier: &Self) -> f64 {
        let total = self.total.saturating_sub(earlier.total);
        if total == 0 {
            return 0.0;
        }
        let idle = self.idle.saturating_sub(earlier.idle).min(total);
        #[allow(clippy::cast_precision_loss)]
        {
            (total - idle) as f64 * 100.0 / total as f64
        }
    }
}

/// Current system memory info.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl MemoryInfo {
    /// `(total - available) / total` as a percentage.
    #[must_use]
    pub fn used_pct(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        #[allow(clippy::cast_precision_loss)]
        {
            used as f64 * 100.0 / self.total_bytes as f64
        }
    }
}

/// Filesystem statistics for a path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsStats {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
}

impl FsStats {
    /// Percentage used as reported by `df`: `used / (used + available)`.
    ///
    /// Blocks reserved for root count neither as used nor as available.
    #[must_use]
    pub fn used_pct(&self) -> f64 {
        let used = self.total_bytes.saturating_sub(self.free_bytes);
        let denominator = used.saturating_add(self.available_bytes);
        if denominator == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            used as f64 * 100.0 / denominator as f64
        }
    }
}

/// OS abstraction used by the resource checks.
pub trait Platform: Send + Sync {
    fn cpu_times(&self) -> Result<CpuTimes>;
    fn memory_info(&self) -> Result<MemoryInfo>;
    fn fs_stats(&self, path: &Path) -> Result<FsStats>;
}

/// Linux platform implementation using `/proc` + `statvfs`.
#[derive(Debug, Default)]
pub struct LinuxPlatform;

impl LinuxPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn read_proc(path: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|source| SentinelError::Io {
        path: PathBuf::from(path),
        source,
    })
}

impl Platform for LinuxPlatform {
    fn cpu_times(&self) -> Result<CpuTimes> {
        parse_proc_stat(&read_proc("/proc/stat")?)
    }

    fn memory_info(&self) -> Result<MemoryInfo> {
        parse_meminfo(&read_proc("/proc/meminfo")?)
    }

    #[cfg(unix)]
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(|error| SentinelError::Sampling {
            resource: "disk",
            details: format!("statvfs {}: {error}", path.display()),
        })?;
        let fragment = stat.fragment_size();
        Ok(FsStats {
            total_bytes: stat.blocks().saturating_mul(fragment),
            free_bytes: stat.blocks_free().saturating_mul(fragment),
            available_bytes: stat.blocks_available().saturating_mul(fragment),
        })
    }

    #[cfg(not(unix))]
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        Err(SentinelError::UnsupportedPlatform {
            details: format!("statvfs unavailable for {}", path.display()),
        })
    }
}

/// In-memory mock implementation for deterministic tests.
///
/// CPU samples are handed out in order; the last one repeats once the queue
/// is drained.
#[derive(Debug)]
pub struct MockPlatform {
    cpu: Mutex<VecDeque<CpuTimes>>,
    memory: MemoryInfo,
    stats_by_path: HashMap<PathBuf, FsStats>,
}

impl MockPlatform {
    #[must_use]
    pub fn new(
        cpu: Vec<CpuTimes>,
        memory: MemoryInfo,
        stats_by_path: HashMap<PathBuf, FsStats>,
    ) -> Self {
        Self {
            cpu: Mutex::new(cpu.into()),
            memory,
            stats_by_path,
        }
    }
}

impl Platform for MockPlatform {
    fn cpu_times(&self) -> Result<CpuTimes> {
        let mut queue = self.cpu.lock();
        let sample = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        };
        sample.ok_or_else(|| SentinelError::Sampling {
            resource: "cpu",
            details: "mock has no cpu samples".to_string(),
        })
    }

    fn memory_info(&self) -> Result<MemoryInfo> {
        Ok(self.memory.clone())
    }

    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        self.stats_by_path
            .get(path)
            .cloned()
            .ok_or_else(|| SentinelError::Sampling {
                resource: "disk",
                details: format!("mock stats not found for {}", path.display()),
            })
    }
}

/// Detect active platform implementation.
pub fn detect_platform() -> Result<Arc<dyn Platform>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxPlatform::new()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(SentinelError::UnsupportedPlatform {
            details: "only Linux is currently implemented".to_string(),
        })
    }
}

fn parse_proc_stat(raw: &str) -> Result<CpuTimes> {
    let line = raw
        .lines()
        .find(|line| line.starts_with("cpu "))
        .ok_or_else(|| SentinelError::ProcParse {
            details: "missing aggregate cpu line in /proc/stat".to_string(),
        })?;

    let mut columns = Vec::with_capacity(10);
    for field in line.split_whitespace().skip(1) {
        let value = field.parse::<u64>().map_err(|err| SentinelError::ProcParse {
            details: format!("invalid /proc/stat cpu column {field:?}: {err}"),
        })?;
        columns.push(value);
    }
    if columns.len() < 4 {
        return Err(SentinelError::ProcParse {
            details: format!("expected at least 4 cpu columns, got {}", columns.len()),
        });
    }

    // user nice system idle iowait irq softirq steal guest guest_nice
    let idle = columns[3].saturating_add(columns.get(4).copied().unwrap_or(0));
    // guest time is already folded into user/nice.
    let total = columns.iter().take(8).copied().fold(0_u64, u64::saturating_add);
    Ok(CpuTimes { idle, total })
}

fn parse_meminfo(raw: &str) -> Result<MemoryInfo> {
    let mut values = HashMap::<String, u64>::new();

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((key, rest)) = line.split_once(':') else {
            return Err(SentinelError::ProcParse {
                details: format!("invalid meminfo line (missing ':'): {line}"),
            });
        };
        let mut parts = rest.split_whitespace();
        let Some(value_raw) = parts.next() else {
            return Err(SentinelError::ProcParse {
                details: format!("missing meminfo value in line: {line}"),
            });
        };
        let value = value_raw
            .parse::<u64>()
            .map_err(|err| SentinelError::ProcParse {
                details: format!("invalid meminfo numeric value in line {line:?}: {err}"),
            })?;

        let bytes = match parts.next() {
            None => value,
            Some("kB") => value.saturating_mul(1024),
            Some(unit) => {
                return Err(SentinelError::ProcParse {
                    details: format!("unsupported meminfo unit in line {line:?}: {unit}"),
                });
            }
        };
        values.insert(key.trim().to_string(), bytes);
    }

    let required = |key: &str| {
        values
            .get(key)
            .copied()
            .ok_or_else(|| SentinelError::ProcParse {
                details: format!("missing required meminfo field: {key}"),
            })
    };

    Ok(MemoryInfo {
        total_bytes: required("MemTotal")?,
        available_bytes: required("MemAvailable")?,
    })
}
