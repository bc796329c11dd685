use crate::errors::MonitorError;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Waiting,
    Running,
    Stopping,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Self::Idle, Self::Waiting, Self::Running, Self::Stopping];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }

    /// Fixed-width console label; every variant renders to the same width.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle...    ",
            Self::Waiting => "Waiting... ",
            Self::Running => "Running... ",
            Self::Stopping => "Stopping...",
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Idle => 1,
            Self::Waiting => 2,
            Self::Running => 3,
            Self::Stopping => 4,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, MonitorError> {
        match code {
            1 => Ok(Self::Idle),
            2 => Ok(Self::Waiting),
            3 => Ok(Self::Running),
            4 => Ok(Self::Stopping),
            other => Err(MonitorError::CorruptedState(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    None,
    StopRecorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub recorder_running: bool,
    pub session_active: bool,
}

impl Observation {
    pub fn new(recorder_running: bool, session_active: bool) -> Self {
        Self {
            recorder_running,
            session_active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(200),
        }
    }
}

/// How a failed session query is folded into a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorPolicy {
    /// A failed query reads as "no active session".
    TreatAsInactive,
    /// A failed query leaves the phase untouched for that tick.
    SkipTick,
}

impl SessionErrorPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "treat-as-inactive" => Some(Self::TreatAsInactive),
            "skip-tick" => Some(Self::SkipTick),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TreatAsInactive => "treat-as-inactive",
            Self::SkipTick => "skip-tick",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}
