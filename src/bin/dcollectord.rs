//! dcollector daemon - polls a fleet of BOINC and Folding@home clients
//!
//! This binary loads the fleet configuration once, then keeps one
//! authenticated connection per reachable client and refreshes its state
//! on the client's refresh interval.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! dcollectord start --config clients.json
//!
//! # Start the daemon (background/daemonized)
//! dcollectord start -d
//!
//! # Validate a configuration and list its clients
//! dcollectord check --config clients.json
//!
//! # Stop the daemon
//! dcollectord stop
//! ```

use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dc_core::{ClientConfig, FleetConfig, ProtocolFamily};
use dcollectord::adapter::{BoincAdapter, FahAdapter};
use dcollectord::registry::spawn_registry;
use dcollectord::scheduler::{spawn_scheduler, SchedulerConfig};
use dcollectord::summary::spawn_summary_task;

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "DCOLLECTOR_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "clients.json";

/// dcollector daemon - BOINC and Folding@home fleet poller
#[derive(Parser, Debug)]
#[command(name = "dcollectord", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Path to clients.json
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seconds between scans for unconnected clients
        #[arg(long, value_name = "SECS")]
        scan_interval: Option<u64>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
    /// Validate a configuration file and list its clients
    Check {
        /// Path to clients.json
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("dcollector")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("dcollectord.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("dcollectord.log")
}

/// `--config`, then `$DCOLLECTOR_CONFIG`, then `./clients.json`.
fn resolve_config_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn load_config(flag: Option<PathBuf>) -> Result<(PathBuf, FleetConfig)> {
    let path = resolve_config_path(flag);
    let config = FleetConfig::from_path(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    // daemonize changes the working directory
    let path = path.canonicalize().unwrap_or(path);
    Ok((path, config))
}

fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
        scan_interval: None,
    });

    match command {
        Command::Start {
            daemon,
            config,
            scan_interval,
        } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'dcollectord stop' to stop it first.");
                process::exit(1);
            }

            // fail on the terminal, before forking
            let (config_path, fleet) = load_config(config)?;

            let mut scheduler = SchedulerConfig::default();
            if let Some(secs) = scan_interval {
                if secs == 0 {
                    bail!("--scan-interval must be at least 1 second");
                }
                scheduler.scan_interval = Duration::from_secs(secs);
            }

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config_path, fleet, scheduler);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");
                println!("Log: {}", log_file_path().display());
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
        Command::Check { config } => {
            let (path, fleet) = load_config(config)?;
            let clients = fleet.client_configs();
            println!("{}: {} client(s)", path.display(), clients.len());

            let mut invalid = 0;
            for client in &clients {
                match client.validate() {
                    Ok(()) => println!("  ok       {}", describe(client)),
                    Err(e) => {
                        invalid += 1;
                        println!("  invalid  {}: {e}", describe(client));
                    }
                }
            }

            if invalid > 0 {
                bail!("{invalid} client(s) would never connect");
            }
            Ok(())
        }
    }
}

fn describe(client: &ClientConfig) -> String {
    format!(
        "{} {} (refresh {}s{})",
        client.id(),
        client.endpoint(),
        client.refresh.as_secs_f64(),
        if client.debug { ", debug" } else { "" }
    )
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config_path: PathBuf, fleet: FleetConfig, scheduler: SchedulerConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("dcollectord=info".parse()?)
                .add_directive("dc_core=info".parse()?)
                .add_directive("dc_protocol=info".parse()?),
        )
        .init();

    let clients = fleet.client_configs();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        config = %config_path.display(),
        boinc = fleet.boinc.clients.len(),
        fah = fleet.fah.clients.len(),
        "dcollector daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry(clients);
    info!("Client registry started");

    let mut schedulers = Vec::new();
    for family in ProtocolFamily::ALL {
        if fleet.section(family).clients.is_empty() {
            info!(family = %family, "No clients configured, scheduler not started");
            continue;
        }
        let handle = match family {
            ProtocolFamily::Boinc => spawn_scheduler(
                BoincAdapter::new(),
                registry.clone(),
                scheduler,
                cancel_token.clone(),
            ),
            ProtocolFamily::Fah => spawn_scheduler(
                FahAdapter::new(),
                registry.clone(),
                scheduler,
                cancel_token.clone(),
            ),
        };
        schedulers.push(handle);
    }

    let summary = spawn_summary_task(registry.clone(), cancel_token.clone());

    for handle in schedulers {
        if let Err(e) = handle.await {
            error!(error = %e, "Scheduler task failed");
        }
    }
    let _ = summary.await;

    // let polling tasks report their disconnects
    tokio::time::sleep(Duration::from_millis(200)).await;

    info!("dcollector daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
