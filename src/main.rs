use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use port_sweep::error::ScanError;
use port_sweep::probe::ProbeTimeouts;
use port_sweep::scanner::ScanController;
use port_sweep::sink::ScanObserver;
use port_sweep::types::{Notice, ScanOptions, ScanReport};
use port_sweep::{persist, resolve, server};

use anyhow::Result;
use clap::{ArgAction, Parser};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// port-sweep — concurrent TCP connect port scanner with Stealth, Aggressive and Script profiles.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "port-sweep",
    version,
    about = "Concurrent TCP connect port scanner with scan profiles and banner grabbing.",
    long_about = None
)]
struct Cli {
    /// Target IP address or hostname. Optional with --serve-ui.
    target: Option<String>,

    /// Scan profile: Stealth (10-1023), Aggressive (1-1024) or Script (20-99).
    #[arg(long, short, default_value = "Stealth")]
    mode: String,

    /// Only print open ports.
    #[arg(long = "hide-closed", default_value_t = false)]
    hide_closed: bool,

    /// Read a service banner from every open port.
    #[arg(long, default_value_t = false)]
    banners: bool,

    /// Save result lines to a text file; `--save` alone uses scan_output.txt, `--save=PATH` picks one.
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = persist::DEFAULT_OUTPUT_FILE
    )]
    save: Option<PathBuf>,

    /// Write a JSON run report to this path.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Connect timeout per probe in milliseconds.
    #[arg(long = "connect-timeout-ms", default_value_t = 1000)]
    connect_timeout_ms: u64,

    /// Banner read timeout in milliseconds.
    #[arg(long = "banner-timeout-ms", default_value_t = 1000)]
    banner_timeout_ms: u64,

    /// Serve the HTTP control API instead of running a one-shot scan.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Bind address for the HTTP control API.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Live display: result lines and notices straight to stdout.
struct StdoutObserver;

impl ScanObserver for StdoutObserver {
    fn on_line(&self, line: &str) {
        println!("{line}");
    }

    fn on_notice(&self, notice: &Notice) {
        println!("\n{notice}\n");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let timeouts = ProbeTimeouts {
        connect: Duration::from_millis(cli.connect_timeout_ms),
        banner: Duration::from_millis(cli.banner_timeout_ms),
        ..ProbeTimeouts::default()
    };
    let output = cli
        .save
        .clone()
        .unwrap_or_else(|| PathBuf::from(persist::DEFAULT_OUTPUT_FILE));
    let observer: Arc<dyn ScanObserver> = Arc::new(StdoutObserver);
    let controller = ScanController::with_timeouts(observer.clone(), timeouts);

    if cli.serve_ui {
        let stopper = controller.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stopper.stop();
            }
        });
        println!("Scan API at http://{}/api (Ctrl+C to stop)", cli.bind);
        tokio::select! {
            res = server::spawn_server(&cli.bind, controller, output) => res?,
            _ = tokio::signal::ctrl_c() => {}
        }
        return Ok(ExitCode::SUCCESS);
    }

    let Some(target) = cli.target.as_deref() else {
        eprintln!("error: a target is required unless --serve-ui is given");
        return Ok(ExitCode::from(2));
    };

    let options = ScanOptions {
        show_closed: !cli.hide_closed,
        grab_banners: cli.banners,
        persist_results: cli.save.is_some(),
    };

    // Claim the controller first so a bad profile fails before anything is printed.
    let run = match controller.begin(target, &cli.mode, options).await {
        Ok(run) => run.with_output(output),
        Err(e @ ScanError::InvalidProfile(_)) => {
            eprintln!("error: {e} (expected Stealth, Aggressive or Script)");
            return Ok(ExitCode::from(2));
        }
        Err(e) => return Err(e.into()),
    };

    match resolve::resolve_host(target).await {
        Ok(host) => observer.on_notice(&Notice::HostResolved(host)),
        Err(e) => {
            warn!(error = %e, "host resolution failed");
            observer.on_notice(&Notice::ResolveFailed);
        }
    }

    let stopper = controller.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop();
        }
    });

    let started_at = persist::now_rfc3339();
    let profile = run.profile().name().to_string();
    let summary = run.run().await;
    ctrl_c.abort();

    if let Some(path) = cli.json.as_deref() {
        let lines = controller.snapshot().await;
        let report = ScanReport {
            target: target.to_string(),
            profile,
            outcome: summary.outcome,
            started_at,
            lines,
        };
        persist::write_report_json(path, &report)?;
        observer.on_notice(&Notice::ResultsSaved(path.to_path_buf()));
    }

    Ok(ExitCode::SUCCESS)
}
