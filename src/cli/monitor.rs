//! `sentinel monitor`: one utilization line plus alerts, optionally repeated.

#![allow(missing_docs)]

use std::time::Duration;

use serde::Serialize;

use crate::agent::runner::Sleeper;
use crate::checks::resources::{ResourceCheck, ResourceSample};
use crate::core::errors::Result;
use crate::logger::line::LineLogger;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorReading {
    #[serde(flatten)]
    pub sample: ResourceSample,
    pub alerts: Vec<String>,
}

pub struct SystemMonitor {
    check: ResourceCheck,
    logger: LineLogger,
}

impl SystemMonitor {
    #[must_use]
    pub fn new(check: ResourceCheck, logger: LineLogger) -> Self {
        Self { check, logger }
    }

    /// Take one reading and log it.
    pub fn monitor_once(&self) -> Result<MonitorReading> {
        let sample = match self.check.sample() {
            Ok(sample) => sample,
            Err(err) => {
                self.logger
                    .error(format!("Error getting system info: {err}"));
                return Err(err);
            }
        };
        self.logger.info(sample.summary_line());
        let alerts = sample.alerts(self.check.thresholds());
        for alert in &alerts {
            self.logger.warning(alert);
        }
        Ok(MonitorReading { sample, alerts })
    }

    /// Read every `interval` until `sleeper` says stop. Sampling failures are
    /// logged and do not end the loop. Returns the number of readings taken.
    pub fn monitor_continuous<S, F>(&self, interval: Duration, sleeper: &S, mut on_reading: F) -> u64
    where
        S: Sleeper + ?Sized,
        F: FnMut(&MonitorReading),
    {
        self.logger.info(format!(
            "Starting continuous monitoring (interval: {}s)",
            interval.as_secs()
        ));
        let mut readings = 0_u64;
        loop {
            if let Ok(reading) = self.monitor_once() {
                readings += 1;
                on_reading(&reading);
            }
            if !sleeper.sleep(interval) {
                break;
            }
        }
        self.logger.info("Monitoring stopped");
        readings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ResourcesConfig;
    use crate::platform::pal::{CpuTimes, FsStats, MemoryInfo, MockPlatform, Platform};
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct CountingSleeper {
        remaining: Cell<u32>,
    }

    impl Sleeper for CountingSleeper {
        fn sleep(&self, _delay: Duration) -> bool {
            let left = self.remaining.get();
            self.remaining.set(left.saturating_sub(1));
            left > 1
        }
    }

    fn monitor(dir: &std::path::Path, disk_used: u64) -> SystemMonitor {
        let mut disks = HashMap::new();
        disks.insert(
            PathBuf::from("/"),
            FsStats {
                total_bytes: 100,
                free_bytes: 100 - disk_used,
                available_bytes: 100 - disk_used,
            },
        );
        let platform: Arc<dyn Platform> = Arc::new(MockPlatform::new(
            vec![CpuTimes::default()],
            MemoryInfo {
                total_bytes: 100,
                available_bytes: 50,
            },
            disks,
        ));
        let config = ResourcesConfig {
            cpu_sample_ms: 1,
            ..ResourcesConfig::default()
        };
        SystemMonitor::new(
            ResourceCheck::new(platform, config),
            LineLogger::open(&dir.join("system-monitor.log"), "system-monitor").with_echo(false),
        )
    }

    #[test]
    fn one_reading_logs_summary_and_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let reading = monitor(dir.path(), 90).monitor_once().unwrap();
        assert_eq!(reading.alerts, vec!["High disk usage: 90.0%".to_string()]);
        assert_eq!(
            reading.sample.summary_line(),
            "CPU: 0.0% | Memory: 50.0% | Disk: 90.0%"
        );
        let log = std::fs::read_to_string(dir.path().join("system-monitor.log")).unwrap();
        assert!(log.contains(" - INFO - CPU: 0.0% | Memory: 50.0% | Disk: 90.0%"));
        assert!(log.contains(" - WARNING - High disk usage: 90.0%"));
    }

    #[test]
    fn continuous_mode_stops_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let sleeper = CountingSleeper {
            remaining: Cell::new(3),
        };
        let mut seen = 0;
        let readings =
            monitor(dir.path(), 10).monitor_continuous(Duration::from_secs(60), &sleeper, |_| {
                seen += 1;
            });
        assert_eq!(readings, 3);
        assert_eq!(seen, 3);
    }
}
