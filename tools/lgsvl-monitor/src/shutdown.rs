use crate::errors::MonitorError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Raises the flag for a signal. The first signal asks for a drain; any
    /// later one means the operator wants out now.
    pub fn on_signal(&self) -> SignalResponse {
        if self.requested.swap(true, Ordering::SeqCst) {
            SignalResponse::ForceExit
        } else {
            SignalResponse::Drain
        }
    }

    /// Listens for SIGINT/SIGTERM on a background thread. The monitor notices
    /// the flag between ticks; a second signal exits with status 130 even if
    /// a tick is blocked on the network.
    pub fn install(&self) -> Result<(), MonitorError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| MonitorError::Io(e.to_string()))?;
        let signal = self.clone();
        std::thread::Builder::new()
            .name("lgsvl-monitor-signals".to_string())
            .spawn(move || runtime.block_on(listen(signal)))
            .map_err(|e| MonitorError::Io(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalResponse {
    Drain,
    ForceExit,
}

pub const FORCED_EXIT_CODE: i32 = 130;

fn respond(signal: &ShutdownSignal, reason: &'static str) {
    match signal.on_signal() {
        SignalResponse::Drain => {
            tracing::info!(reason, "shutdown requested, draining current tick");
        }
        SignalResponse::ForceExit => {
            tracing::warn!(reason, "second shutdown signal, exiting immediately");
            std::process::exit(FORCED_EXIT_CODE);
        }
    }
}

#[cfg(unix)]
async fn listen(signal: ShutdownSignal) {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let (mut interrupt, mut terminate) = match (
        unix_signal(SignalKind::interrupt()),
        unix_signal(SignalKind::terminate()),
    ) {
        (Ok(interrupt), Ok(terminate)) => (interrupt, terminate),
        (Err(error), _) | (_, Err(error)) => {
            tracing::warn!(%error, "signal handlers unavailable");
            return;
        }
    };
    loop {
        let reason = tokio::select! {
            Some(()) = interrupt.recv() => "SIGINT",
            Some(()) = terminate.recv() => "SIGTERM",
            else => return,
        };
        respond(&signal, reason);
    }
}

#[cfg(not(unix))]
async fn listen(signal: ShutdownSignal) {
    loop {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "signal handlers unavailable");
            return;
        }
        respond(&signal, "ctrl-c");
    }
}
