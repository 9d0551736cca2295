use crate::runtime::Supervisor;
use futures::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::low_level::signal_name;
use signal_hook_tokio::{Handle, Signals};
use std::io;
use tracing::{info, warn};

/*
    @@@
    @ShutdownSignals;
    . Owns the SIGINT/SIGTERM registration; register early so nothing is missed while start() runs.
    . run(): the first signal drives a graceful shutdown; every further signal while it is in progress force-kills.
    . Returns early when every monitor loop has already exited on its own.
*/
pub struct ShutdownSignals {
    signals: Signals,
    handle: Handle,
}

impl ShutdownSignals {
    pub fn register() -> io::Result<Self> {
        let signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();
        Ok(Self { signals, handle })
    }

    pub async fn run(mut self, supervisor: &Supervisor) {
        tokio::select! {
            sig = self.signals.next() => match sig {
                Some(sig) => info!(signal = describe(sig), "received termination signal"),
                None => warn!("signal stream closed, shutting down"),
            },
            _ = supervisor.wait() => {
                info!("no monitor loops left, nothing to supervise");
                self.handle.close();
                return;
            }
        }

        let shutdown = supervisor.shutdown();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(sig) = self.signals.next() => {
                    warn!(signal = describe(sig), "termination signal during shutdown, force killing");
                    supervisor.force_kill().await;
                }
            }
        }

        self.handle.close();
    }
}

fn describe(sig: i32) -> &'static str {
    signal_name(sig).unwrap_or("unknown")
}

/// Blocks until a termination signal arrives and the supervisor has shut down.
pub async fn run_until_signal(supervisor: &Supervisor) -> io::Result<()> {
    ShutdownSignals::register()?.run(supervisor).await;
    Ok(())
}
