use crate::errors::MonitorError;
use crate::logging::EventJournal;
use crate::probe::ProcessProbe;
use crate::runtime::{Clock, Terminal};
use crate::types::{Action, RetryBudget};
use serde_json::json;

pub struct ActionExecutor<'a> {
    pub probe: ProcessProbe<'a>,
    pub clock: &'a dyn Clock,
    pub terminal: &'a dyn Terminal,
    pub journal: &'a EventJournal,
    pub recorder: &'a str,
    pub budget: RetryBudget,
}

impl ActionExecutor<'_> {
    pub fn execute(&self, action: Action) -> Result<(), MonitorError> {
        match action {
            Action::None => Ok(()),
            Action::StopRecorder => self.stop_recorder(),
        }
    }

    fn stop_recorder(&self) -> Result<(), MonitorError> {
        self.terminal.write_line("Stopping cyber recorder")?;
        for attempt in 1..=self.budget.attempts {
            match self.probe.kill(self.recorder) {
                Ok(Some(pid)) => tracing::info!(attempt, pid, "sent kill to recorder"),
                Ok(None) => tracing::debug!(attempt, "no recorder process to kill"),
                Err(error) => tracing::warn!(attempt, %error, "kill attempt failed"),
            }
            self.clock.pause(self.budget.delay)?;
            if !self.probe.is_running(self.recorder) {
                self.journal.record(
                    "info",
                    "stop_recorder",
                    json!({ "recorder": self.recorder, "attempts": attempt, "stopped": true }),
                );
                return Ok(());
            }
        }

        self.journal.record(
            "error",
            "stop_recorder",
            json!({
                "recorder": self.recorder,
                "attempts": self.budget.attempts,
                "stopped": false,
            }),
        );
        Err(MonitorError::RecorderStopFailed {
            attempts: self.budget.attempts,
        })
    }
}
