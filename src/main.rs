use anyhow::{Context, Result};
use clap::Parser;
use procvisor::lifecycle::ShutdownSignals;
use procvisor::logger::logs_tracing;
use procvisor::parse::{parser, Config};
use procvisor::runtime::Supervisor;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "procvisor", version, about = "Starts, restarts and stops a fixed set of processes")]
struct Cli {
    /// YAML file listing the processes; the built-in server/client pair is used without it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the rotating log file; overrides `logdir` from the config.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Print the parsed config and exit.
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg: Config = match cli.config.as_deref() {
        Some(path) => parser(path).with_context(|| format!("loading config `{}`", path.display()))?,
        None => Config::default(),
    };

    if cli.check_config {
        for prog in &cfg.processes {
            println!("Program `{}`:\n{:#?}\n", prog.name, prog);
        }
        return Ok(());
    }

    let log_dir = cli.log_dir.or_else(|| cfg.logdir.clone());
    let _guard = logs_tracing(log_dir.as_deref()).context("initializing logging")?;
    info!(version = env!("CARGO_PKG_VERSION"), "procvisor starting");

    let signals = ShutdownSignals::register().context("registering signal handlers")?;
    let supervisor = Supervisor::new(cfg.supervisor_config(), cfg.process_specs());
    info!(
        processes = cfg.processes.len(),
        shutdown_timeout_secs = supervisor.config().shutdown_timeout.as_secs(),
        "supervisor configured"
    );

    if let Err(e) = supervisor.start().await {
        error!(error = %e, "startup failed, stopping processes already launched");
        supervisor.shutdown().await;
        return Err(e).context("starting processes");
    }

    signals.run(&supervisor).await;
    info!("procvisor exited");
    Ok(())
}
