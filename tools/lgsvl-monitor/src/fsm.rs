use crate::errors::MonitorError;
use crate::types::{Action, Observation, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionNote {
    RecorderLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub next: Phase,
    pub action: Action,
    pub note: Option<TransitionNote>,
}

impl Step {
    fn to(next: Phase) -> Self {
        Self {
            next,
            action: Action::None,
            note: None,
        }
    }

    fn stop() -> Self {
        Self {
            next: Phase::Stopping,
            action: Action::StopRecorder,
            note: None,
        }
    }

    pub fn pair(self) -> (Phase, Action) {
        (self.next, self.action)
    }
}

pub fn step(phase: Phase, observation: Observation) -> Step {
    use Phase as P;

    let rec = observation.recorder_running;
    let sim = observation.session_active;

    match phase {
        P::Idle => {
            if sim || rec {
                Step::to(P::Waiting)
            } else {
                Step::to(P::Idle)
            }
        }
        P::Waiting => match (sim, rec) {
            (true, true) => Step::to(P::Running),
            (false, false) => Step::to(P::Idle),
            _ => Step::to(P::Waiting),
        },
        P::Running => match (sim, rec) {
            (true, true) => Step::to(P::Running),
            (true, false) => Step {
                note: Some(TransitionNote::RecorderLost),
                ..Step::to(P::Waiting)
            },
            (false, true) => Step::stop(),
            (false, false) => Step::to(P::Idle),
        },
        P::Stopping => {
            if !sim && !rec {
                Step::to(P::Idle)
            } else {
                Step::stop()
            }
        }
    }
}

/// Steps a phase that arrived as a raw code, rejecting codes outside the known set.
pub fn step_code(code: u8, observation: Observation) -> Result<Step, MonitorError> {
    let phase = Phase::from_code(code)?;
    Ok(step(phase, observation))
}
