//! Agent loop: run checks, record the snapshot, sleep; back off after a fault.
//!
//! A fault is either an `Err` from the suite or a panic inside a check. It
//! is logged at ERROR, the previous snapshot is left untouched and the next
//! cycle starts after the backoff delay instead of the normal interval.

#![allow(missing_docs)]

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::checks::resources::summary_from_statuses;
use crate::checks::{CheckResult, CheckSuite, Outcome};
use crate::logger::line::LineLogger;
use crate::status::sink::StatusSink;

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Checking,
    Sleeping,
    BackingOff,
}

/// Waits between cycles.
pub trait Sleeper {
    /// Wait for `delay`. Returns `false` when the loop should stop instead.
    fn sleep(&self, delay: Duration) -> bool;
}

#[cfg(feature = "daemon")]
impl Sleeper for crate::daemon::signals::SignalHandler {
    fn sleep(&self, delay: Duration) -> bool {
        Self::sleep(self, delay)
    }
}

/// Result of one cycle.
#[derive(Debug, Clone)]
pub enum Cycle {
    /// Checks completed and the snapshot was written.
    Recorded(CheckResult),
    /// Checks or recording failed; `CheckResult` carries `Outcome::Error`.
    Faulted(CheckResult),
}

impl Cycle {
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }

    #[must_use]
    pub fn into_result(self) -> CheckResult {
        match self {
            Self::Recorded(result) | Self::Faulted(result) => result,
        }
    }
}

pub struct AgentLoop {
    name: String,
    suite: CheckSuite,
    interval: Duration,
    backoff: Duration,
    sink: StatusSink,
    logger: LineLogger,
    state: LoopState,
}

impl AgentLoop {
    #[must_use]
    pub fn new(
        name: &str,
        suite: CheckSuite,
        interval: Duration,
        backoff: Duration,
        sink: StatusSink,
        logger: LineLogger,
    ) -> Self {
        Self {
            name: name.to_string(),
            suite,
            interval,
            backoff,
            sink,
            logger,
            state: LoopState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> LoopState {
        self.state
    }

    fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            self.logger
                .debug(format!("state {:?} -> {state:?}", self.state));
            self.state = state;
        }
    }

    /// Run cycles until `sleeper` asks to stop. Returns the number of cycles.
    pub fn run<S: Sleeper + ?Sized>(&mut self, sleeper: &S) -> u64 {
        let mut cycles = 0_u64;
        loop {
            let cycle = self.run_once();
            cycles += 1;
            let (state, delay) = if cycle.is_fault() {
                (LoopState::BackingOff, self.backoff)
            } else {
                (LoopState::Sleeping, self.interval)
            };
            self.set_state(state);
            if !sleeper.sleep(delay) {
                break;
            }
        }
        self.set_state(LoopState::Idle);
        cycles
    }

    /// One cycle: run the suite, log the result, record the snapshot.
    pub fn run_once(&mut self) -> Cycle {
        self.set_state(LoopState::Checking);
        self.logger
            .info(format!("Running {} checks...", self.suite.kind()));
        let started = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.suite.run()));
        let cycle = match outcome {
            Ok(Ok(result)) => self.record(result),
            Ok(Err(err)) => self.fault(format!("Error in {} agent: {err}", self.name)),
            Err(payload) => self.fault(format!(
                "Error in {} agent: check panicked: {}",
                self.name,
                panic_message(payload.as_ref())
            )),
        };

        self.logger.debug(format!(
            "cycle finished in {}ms",
            started.elapsed().as_millis()
        ));
        self.set_state(LoopState::Idle);
        cycle
    }

    fn record(&self, result: CheckResult) -> Cycle {
        match &result.outcome {
            Outcome::Ok => self.logger.info("All checks passed"),
            Outcome::Warning { issues } => {
                for issue in issues {
                    self.logger.warning(issue);
                }
                self.logger
                    .warning(format!("{} issue(s) found", issues.len()));
            }
            Outcome::Error { message } => self.logger.error(message),
        }
        if let Some(summary) = summary_from_statuses(&result.statuses) {
            self.logger.info(summary);
        }
        for (item, status) in &result.statuses {
            self.logger.debug(format!("{item}: {status}"));
        }

        match self.sink.record(&self.name, &result) {
            Ok(()) => Cycle::Recorded(result),
            Err(err) => self.fault(format!("Error in {} agent: {err}", self.name)),
        }
    }

    fn fault(&self, message: String) -> Cycle {
        self.logger.error(&message);
        Cycle::Faulted(CheckResult::fault(self.suite.kind(), message))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
