use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("io error: {0}")]
    Io(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("Error logging into LGSVL cloud (WISE): status {status}")]
    LoginFailed { status: u16 },
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("Corrupted state: unknown phase code {0}")]
    CorruptedState(u8),
    #[error("Could not stop the recorder after {attempts} attempts")]
    RecorderStopFailed { attempts: u32 },
}

impl MonitorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Decode(_))
    }
}
