use crate::config::MonitorConfig;
use crate::errors::MonitorError;
use crate::executor::ActionExecutor;
use crate::fsm::{step, Step, TransitionNote};
use crate::logging::{structured_fallback_line, EventJournal};
use crate::probe::ProcessProbe;
use crate::runtime::MonitorRuntime;
use crate::session::has_active_session;
use crate::shutdown::ShutdownSignal;
use crate::types::{Action, Observation, Phase, SessionErrorPolicy};
use serde_json::json;

pub const RECORDER_LOST_WARNING: &str = "Warning: the recorder stopped during the simulation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Stepped {
        observation: Observation,
        step: Step,
    },
    /// Session status was unavailable and the policy asked to skip.
    Inconclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSummary {
    pub ticks: u64,
    pub final_phase: Phase,
}

pub struct Monitor<'a> {
    phase: Phase,
    cfg: &'a MonitorConfig,
    runtime: &'a MonitorRuntime,
    journal: &'a EventJournal,
}

impl<'a> Monitor<'a> {
    pub fn new(
        cfg: &'a MonitorConfig,
        runtime: &'a MonitorRuntime,
        journal: &'a EventJournal,
    ) -> Self {
        Self {
            phase: Phase::Idle,
            cfg,
            runtime,
            journal,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn run(&mut self, shutdown: &ShutdownSignal) -> Result<MonitorSummary, MonitorError> {
        let mut ticks = 0u64;
        while !shutdown.is_requested() {
            self.tick()?;
            ticks += 1;
            self.runtime.clock.pause(self.cfg.poll_interval)?;
        }
        self.runtime.terminal.clear_status()?;
        self.journal.record(
            "info",
            "shutdown",
            json!({ "ticks": ticks, "phase": self.phase.as_str() }),
        );
        Ok(MonitorSummary {
            ticks,
            final_phase: self.phase,
        })
    }

    pub fn tick(&mut self) -> Result<TickOutcome, MonitorError> {
        let probe = ProcessProbe::new(self.runtime.processes.as_ref());
        let recorder_running = probe.is_running(&self.cfg.recorder_process);

        let session_active = match has_active_session(self.runtime.sessions.as_ref()) {
            Ok(active) => active,
            Err(error) if error.is_transient() => {
                self.journal.record(
                    "warn",
                    "session_probe_error",
                    json!({
                        "error": error.to_string(),
                        "policy": self.cfg.session_errors.as_str(),
                    }),
                );
                match self.cfg.session_errors {
                    SessionErrorPolicy::TreatAsInactive => {
                        tracing::warn!(%error, "session query failed, treating as no active session");
                        false
                    }
                    SessionErrorPolicy::SkipTick => {
                        tracing::warn!(%error, "session query failed, skipping tick");
                        self.render()?;
                        return Ok(TickOutcome::Inconclusive);
                    }
                }
            }
            Err(error) => return Err(error),
        };

        let observation = Observation::new(recorder_running, session_active);
        let result = step(self.phase, observation);

        if result.note == Some(TransitionNote::RecorderLost) {
            self.runtime.terminal.write_line(RECORDER_LOST_WARNING)?;
        }
        if result.next != self.phase {
            tracing::info!(
                from = self.phase.as_str(),
                to = result.next.as_str(),
                recorder_running,
                session_active,
                "phase transition"
            );
            self.journal.record(
                "info",
                "transition",
                json!({
                    "from": self.phase.as_str(),
                    "to": result.next.as_str(),
                    "observation": observation,
                    "action": result.action,
                }),
            );
        }
        self.phase = result.next;
        self.render()?;

        let executor = ActionExecutor {
            probe,
            clock: self.runtime.clock.as_ref(),
            terminal: self.runtime.terminal.as_ref(),
            journal: self.journal,
            recorder: &self.cfg.recorder_process,
            budget: self.cfg.stop_budget,
        };
        executor.execute(result.action)?;
        if result.action != Action::None {
            self.render()?;
        }

        Ok(TickOutcome::Stepped {
            observation,
            step: result,
        })
    }

    fn render(&self) -> Result<(), MonitorError> {
        let terminal = self.runtime.terminal.as_ref();
        if terminal.stdout_is_tty() {
            terminal.draw_status(self.phase.label())
        } else {
            terminal.write_line(&structured_fallback_line(
                self.phase.as_str(),
                self.phase.label().trim_end(),
            ))
        }
    }
}
