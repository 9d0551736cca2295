// Raises real signals at this test process; keep this file to a single test.

use nix::sys::signal::{raise, Signal};
use procvisor::{ProcessSpec, ShutdownSignals, Supervisor, SupervisorConfig};
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[tokio::test]
async fn signals_drive_graceful_then_forced_shutdown() {
    let config = SupervisorConfig {
        stabilize_interval: Duration::from_millis(50),
        default_restart_delay: Duration::from_millis(200),
        shutdown_timeout: Duration::from_secs(30),
        kill_grace: Duration::from_secs(2),
    };
    let sup = Supervisor::new(
        config,
        vec![
            ProcessSpec::new("polite", "sleep").args(["60"]),
            ProcessSpec::new("stubborn", "/bin/sh").args(["-c", "trap '' TERM; while :; do sleep 0.1; done"]),
        ],
    );

    let signals = ShutdownSignals::register().unwrap();
    sup.start().await.unwrap();
    sleep(Duration::from_millis(300)).await;
    assert_eq!(sup.running().await.len(), 2);

    let begin = Instant::now();
    let raiser = tokio::spawn(async {
        raise(Signal::SIGTERM).unwrap();
        // second request while the stubborn child is holding up the graceful wait
        sleep(Duration::from_millis(700)).await;
        raise(Signal::SIGINT).unwrap();
    });

    signals.run(&sup).await;
    raiser.await.unwrap();

    let took = begin.elapsed();
    assert!(took < Duration::from_secs(10), "force kill did not cut the 30s wait: {took:?}");
    assert!(sup.is_shutting_down());
    assert!(sup.running().await.is_empty());
}
