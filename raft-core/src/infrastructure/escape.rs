// raft-core/src/infrastructure/escape.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Process-wide pause/kill flags.
///
/// Readers (the governor at loop boundaries, the operator `/state`
/// endpoint) use relaxed loads; writers release. No other coordination is
/// needed: the flags only gate, they never carry data.
#[derive(Debug, Default)]
pub struct EscapeHatches {
    paused: AtomicBool,
    kill_requested: AtomicBool,
}

impl EscapeHatches {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_pause(&self, pause: bool) {
        self.paused.store(pause, Ordering::Release);
        info!(pause, "pause flag set");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn request_kill(&self) {
        self.kill_requested.store(true, Ordering::Release);
        info!("kill requested");
    }

    pub fn kill_requested(&self) -> bool {
        self.kill_requested.load(Ordering::Relaxed)
    }
}

/// Watchdog: polls the kill flag and terminates the process. The running
/// cycle gets to finish its current component step because the governor
/// only yields between steps.
pub fn spawn_watchdog(hatches: Arc<EscapeHatches>, poll: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if hatches.kill_requested() {
                error!("watchdog: kill flag set, terminating");
                std::process::exit(1);
            }
            tokio::time::sleep(poll).await;
        }
    })
}

/// Interrupt/terminate handlers set the kill flag instead of aborting, so
/// the current cycle drains and the watchdog performs the exit.
pub fn install_signal_handlers(hatches: Arc<EscapeHatches>) {
    let on_interrupt = Arc::clone(&hatches);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.request_kill();
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            if let Ok(mut terminate) = signal(SignalKind::terminate()) {
                terminate.recv().await;
                hatches.request_kill();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_start_cleared() {
        let hatches = EscapeHatches::new();
        assert!(!hatches.is_paused());
        assert!(!hatches.kill_requested());
    }

    #[test]
    fn test_pause_round_trip() {
        let hatches = EscapeHatches::new();
        hatches.request_pause(true);
        assert!(hatches.is_paused());
        hatches.request_pause(false);
        assert!(!hatches.is_paused());
    }

    #[test]
    fn test_kill_is_sticky() {
        let hatches = EscapeHatches::new();
        hatches.request_kill();
        assert!(hatches.kill_requested());
    }

    #[tokio::test]
    async fn test_watchdog_idles_while_flag_clear() {
        let hatches = EscapeHatches::new();
        let handle = spawn_watchdog(Arc::clone(&hatches), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
