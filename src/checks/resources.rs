//! CPU, memory and disk utilization against thresholds.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::checks::{Check, CheckKind, CheckResult};
use crate::core::config::ResourcesConfig;
use crate::core::errors::Result;
use crate::platform::pal::Platform;

/// Summary line rebuilt from a monitoring snapshot's `cpu`, `memory` and
/// `disk` statuses. `None` for snapshots of other agents.
#[must_use]
pub fn summary_from_statuses(statuses: &BTreeMap<String, String>) -> Option<String> {
    let cpu = statuses.get("cpu")?;
    let memory = statuses.get("memory")?;
    let disk = statuses.get("disk")?;
    Some(format!("CPU: {cpu} | Memory: {memory} | Disk: {disk}"))
}

/// One utilization reading, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceSample {
    pub cpu_pct: f64,
    pub memory_pct: f64,
    pub disk_pct: f64,
}

impl ResourceSample {
    /// `CPU: 12.5% | Memory: 40.1% | Disk: 71.0%`
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!(
            "CPU: {:.1}% | Memory: {:.1}% | Disk: {:.1}%",
            self.cpu_pct, self.memory_pct, self.disk_pct
        )
    }

    /// One alert per value strictly above its threshold.
    #[must_use]
    pub fn alerts(&self, thresholds: &ResourcesConfig) -> Vec<String> {
        let mut alerts = Vec::new();
        for (label, value, limit) in [
            ("CPU", self.cpu_pct, thresholds.cpu_threshold_pct),
            ("memory", self.memory_pct, thresholds.memory_threshold_pct),
            ("disk", self.disk_pct, thresholds.disk_threshold_pct),
        ] {
            if value > limit {
                alerts.push(format!("High {label} usage: {value:.1}%"));
            }
        }
        alerts
    }
}

/// Samples utilization through the platform layer.
pub struct ResourceCheck {
    platform: Arc<dyn Platform>,
    config: ResourcesConfig,
    disk_path: PathBuf,
}

impl ResourceCheck {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, config: ResourcesConfig) -> Self {
        let disk_path = config.disk_path.clone();
        Self {
            platform,
            config,
            disk_path,
        }
    }

    /// Take a reading. Blocks for `cpu_sample_ms` between the two CPU samples.
    pub fn sample(&self) -> Result<ResourceSample> {
        let before = self.platform.cpu_times()?;
        thread::sleep(Duration::from_millis(self.config.cpu_sample_ms));
        let after = self.platform.cpu_times()?;
        let memory = self.platform.memory_info()?;
        let disk = self.platform.fs_stats(&self.disk_path)?;
        Ok(ResourceSample {
            cpu_pct: after.busy_pct_since(&before),
            memory_pct: memory.used_pct(),
            disk_pct: disk.used_pct(),
        })
    }

    #[must_use]
    pub fn thresholds(&self) -> &ResourcesConfig {
        &self.config
    }
}

impl Check for ResourceCheck {
    fn name(&self) -> &'static str {
        "resources"
    }

    fn kind(&self) -> CheckKind {
        CheckKind::Monitoring
    }

    fn run(&self) -> Result<CheckResult> {
        let sample = self.sample()?;
        let mut statuses = BTreeMap::new();
        statuses.insert("cpu".to_string(), format!("{:.1}%", sample.cpu_pct));
        statuses.insert("memory".to_string(), format!("{:.1}%", sample.memory_pct));
        statuses.insert("disk".to_string(), format!("{:.1}%", sample.disk_pct));
        Ok(CheckResult::new(
            CheckKind::Monitoring,
            statuses,
            sample.alerts(&self.config),
        ))
    }
}
