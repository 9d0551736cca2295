use crate::error::SupervisorError;
use crate::prefix::{relay, PrefixedWriter};
use crate::spec::{ProcessSpec, DEFAULT_RESTART_DELAY};
use chrono::{DateTime, Local};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::io::{self, Write};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Pause after a critical process starts, before the next spec is launched.
    pub stabilize_interval: Duration,
    /// Restart delay for specs that leave theirs at zero.
    pub default_restart_delay: Duration,
    /// Graceful window between SIGTERM and the SIGKILL fallback.
    pub shutdown_timeout: Duration,
    /// How long to wait for monitor loops to reap SIGKILLed children.
    /// Worst-case shutdown is `shutdown_timeout + kill_grace`.
    pub kill_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stabilize_interval: Duration::from_secs(1),
            default_restart_delay: DEFAULT_RESTART_DELAY,
            shutdown_timeout: Duration::from_secs(30),
            kill_grace: Duration::from_secs(5),
        }
    }
}

// Live child of one spec; present in the map only between spawn and reap.
// Signals go through the monitor loop, which still owns the Child and knows
// whether it has been reaped; `pid` is informational only.
#[derive(Debug, Clone)]
pub struct RunningHandle {
    pub name: String,
    pub pid: Pid,
    pub started_at: DateTime<Local>,
    signals: mpsc::UnboundedSender<Signal>,
}

struct Shared {
    config: SupervisorConfig,
    token: CancellationToken,
    running: Mutex<HashMap<String, RunningHandle>>,
    tracker: TaskTracker,
}

pub struct Supervisor {
    specs: Vec<Arc<ProcessSpec>>,
    shared: Arc<Shared>,
    started: AtomicBool,
}

impl Supervisor {
    /// `specs` are launched in order; names must be unique.
    pub fn new(config: SupervisorConfig, specs: Vec<ProcessSpec>) -> Self {
        Self {
            specs: specs.into_iter().map(Arc::new).collect(),
            shared: Arc::new(Shared {
                config,
                token: CancellationToken::new(),
                running: Mutex::new(HashMap::new()),
                tracker: TaskTracker::new(),
            }),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }



    /*
        @@@
        @start();
        . Launches one monitor loop per spec, in list order, and waits for each loop's first launch attempt.
        . A critical spec that fails to launch aborts startup; specs already running are left alone.
        . A non-critical failure is logged and startup moves on.
        . After a critical spec comes up, waits the stabilization interval before the next one.
    */
    pub async fn start(&self) -> Result<(), SupervisorError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SupervisorError::AlreadyStarted);
        }
        let result = self.start_all().await;
        self.shared.tracker.close();
        result
    }

    async fn start_all(&self) -> Result<(), SupervisorError> {
        info!(processes = self.specs.len(), "supervisor starting");

        for spec in &self.specs {
            if self.shared.token.is_cancelled() {
                return Err(SupervisorError::ShuttingDown);
            }

            let (ready_tx, ready_rx) = oneshot::channel();
            let shared = Arc::clone(&self.shared);
            let loop_spec = Arc::clone(spec);
            self.shared
                .tracker
                .spawn(async move { shared.monitor(loop_spec, ready_tx).await });

            match ready_rx.await {
                Ok(Ok(())) => {}
                Ok(Err(source)) if spec.critical => {
                    error!(process = %spec.name, error = %source, "failed to start critical process");
                    return Err(SupervisorError::CriticalStart {
                        name: spec.name.clone(),
                        source,
                    });
                }
                Ok(Err(e)) => {
                    warn!(process = %spec.name, error = %e, "failed to start process, continuing");
                }
                // loop saw cancellation before its first attempt
                Err(_) => return Err(SupervisorError::ShuttingDown),
            }

            if spec.critical {
                debug!(
                    process = %spec.name,
                    wait_ms = self.shared.config.stabilize_interval.as_millis() as u64,
                    "waiting for critical process to stabilize"
                );
                tokio::select! {
                    _ = sleep(self.shared.config.stabilize_interval) => {}
                    _ = self.shared.token.cancelled() => return Err(SupervisorError::ShuttingDown),
                }
            }
        }

        info!("all processes started");
        Ok(())
    }



    /*
        @@@
        @shutdown();
        . Cancels every monitor loop so nothing is restarted, then sends SIGTERM to every live handle.
        . Waits up to shutdown_timeout for the loops to reap their children.
        . On timeout, SIGKILLs whatever is still in the map and waits a bounded kill_grace.
        . Always returns, at the latest after shutdown_timeout + kill_grace (35s by default); safe to call more than once.
    */
    pub async fn shutdown(&self) {
        info!("initiating graceful shutdown");
        self.shared.token.cancel();
        self.shared.tracker.close();

        let signalled = self.shared.signal_all(Signal::SIGTERM).await;
        debug!(processes = signalled, "termination requested");

        let grace = self.shared.config.shutdown_timeout;
        match timeout(grace, self.shared.tracker.wait()).await {
            Ok(()) => info!("all processes exited gracefully"),
            Err(_) => {
                warn!(
                    timeout_secs = grace.as_secs_f64(),
                    "timeout waiting for processes to exit, forcing shutdown"
                );
                self.shared.signal_all(Signal::SIGKILL).await;
                if timeout(self.shared.config.kill_grace, self.shared.tracker.wait())
                    .await
                    .is_err()
                {
                    warn!("monitor loops still running after SIGKILL, giving up");
                }
            }
        }

        info!("shutdown complete");
    }

    /// Cancels restarts and SIGKILLs every live child without a grace period.
    pub async fn force_kill(&self) {
        self.shared.token.cancel();
        self.shared.tracker.close();
        let killed = self.shared.signal_all(Signal::SIGKILL).await;
        warn!(processes = killed, "force killed managed processes");
    }

    /// Resolves once every monitor loop has exited; immediately if start() was never called.
    pub async fn wait(&self) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        self.shared.tracker.wait().await;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    /// Snapshot of the live handles, sorted by name.
    pub async fn running(&self) -> Vec<RunningHandle> {
        let map = self.shared.running.lock().await;
        let mut handles: Vec<RunningHandle> = map.values().cloned().collect();
        handles.sort_by(|a, b| a.name.cmp(&b.name));
        handles
    }
}

impl Shared {
    /*
        @@@
        @monitor();
        . Per-spec loop: launch, record the handle, wait for exit, drop the handle, sleep restart_delay, repeat.
        . The first attempt's outcome goes back to start(); a failed first attempt is never retried.
        . Later launch failures are logged and retried after the delay, without a cap.
        . Every sleep races cancellation; once cancelled, nothing is restarted.
    */
    async fn monitor(&self, spec: Arc<ProcessSpec>, ready: oneshot::Sender<io::Result<()>>) {
        let name = spec.name.as_str();
        let delay = spec.effective_restart_delay(self.config.default_restart_delay);
        let mut ready = Some(ready);

        loop {
            if self.token.is_cancelled() {
                info!(process = name, "shutdown requested");
                return;
            }

            info!(process = name, "starting process");
            let (mut child, handle, mut signal_rx) = match self.launch(&spec).await {
                Ok(launched) => launched,
                Err(e) => {
                    self.forget(name).await;
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Err(e));
                        return;
                    }
                    error!(process = name, error = %e, "failed to start process");
                    if !self.pause(name, delay).await {
                        return;
                    }
                    continue;
                }
            };

            if let Some(tx) = ready.take() {
                let _ = tx.send(Ok(()));
            }
            info!(process = name, pid = handle.pid.as_raw(), "process started");

            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    Some(sig) = signal_rx.recv() => deliver(&child, name, sig),
                }
            };
            // reaped: from here on, senders see a closed channel instead of a stale pid
            drop(signal_rx);
            self.forget(name).await;

            if self.token.is_cancelled() {
                info!(process = name, "exited during shutdown");
                return;
            }

            let uptime_ms = (Local::now() - handle.started_at).num_milliseconds();
            match status {
                Ok(status) if status.success() => {
                    info!(process = name, uptime_ms, "exited normally");
                }
                Ok(status) => {
                    warn!(process = name, %status, uptime_ms, "exited with error");
                }
                Err(e) => {
                    error!(process = name, error = %e, "failed to wait on process");
                }
            }

            info!(process = name, delay_ms = delay.as_millis() as u64, "restarting after delay");
            if !self.pause(name, delay).await {
                return;
            }
        }
    }

    // Spawns the child with piped output and records its handle.
    async fn launch(
        &self,
        spec: &ProcessSpec,
    ) -> io::Result<(Child, RunningHandle, mpsc::UnboundedReceiver<Signal>)> {
        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let prefix = spec.output_prefix();
        if let Some(out) = child.stdout.take() {
            spawn_relay(&spec.name, "stdout", out, PrefixedWriter::new(prefix.clone(), io::stdout()));
        }
        if let Some(err) = child.stderr.take() {
            spawn_relay(&spec.name, "stderr", err, PrefixedWriter::new(prefix, io::stderr()));
        }

        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("child exited before its pid was read"))?;
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let handle = RunningHandle {
            name: spec.name.clone(),
            pid: Pid::from_raw(pid as i32),
            started_at: Local::now(),
            signals,
        };

        let mut running = self.running.lock().await;
        running.insert(spec.name.clone(), handle.clone());
        if self.token.is_cancelled() {
            // shutdown may have walked the map before this insert
            info!(process = %spec.name, pid, "terminating process spawned during shutdown");
            deliver(&child, &spec.name, Signal::SIGTERM);
        }
        drop(running);

        Ok((child, handle, signal_rx))
    }

    async fn forget(&self, name: &str) {
        self.running.lock().await.remove(name);
    }

    // false when cancelled before the delay elapsed
    async fn pause(&self, name: &str, delay: Duration) -> bool {
        tokio::select! {
            _ = sleep(delay) => true,
            _ = self.token.cancelled() => {
                info!(process = name, "shutdown requested during restart delay");
                false
            }
        }
    }

    async fn signal_all(&self, sig: Signal) -> usize {
        let running = self.running.lock().await;
        for handle in running.values() {
            info!(process = %handle.name, pid = handle.pid.as_raw(), signal = %sig, "sending signal");
            if handle.signals.send(sig).is_err() {
                warn!(
                    process = %handle.name,
                    pid = handle.pid.as_raw(),
                    signal = %sig,
                    "failed to deliver signal, process already exited"
                );
            }
        }
        running.len()
    }
}

// Signals the child only while it is unreaped, so its pid cannot have been recycled.
fn deliver(child: &Child, name: &str, sig: Signal) {
    let Some(pid) = child.id() else {
        warn!(process = name, signal = %sig, "failed to deliver signal, process already reaped");
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), sig) {
        warn!(process = name, pid, signal = %sig, error = %e, "failed to deliver signal");
    }
}

fn spawn_relay<R, W>(name: &str, stream: &'static str, reader: R, sink: PrefixedWriter<W>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: Write + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        if let Err(e) = relay(reader, sink).await {
            debug!(process = %name, stream, error = %e, "output relay stopped");
        }
    });
}
