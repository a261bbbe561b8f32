//! `retarget-output` – robot output stage of the retargeting pipeline.
//!
//! This binary:
//!
//! 1. Loads `retarget.toml` (or the defaults) and builds one output handler
//!    per `[[handlers]]` entry.
//! 2. Starts the rosbridge WebSocket pump on a background Tokio runtime when
//!    any handler needs it.
//! 3. Initialises every handler, blocking until its endpoint answers.
//! 4. Reads one pose per stdin line and fans it out to all handlers.
//! 5. Stops on end of input or **Ctrl-C**.

mod config;
mod input;
mod outputs;
mod telemetry;

use std::io::BufRead;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use retarget_middleware::RosbridgeClient;
use tracing::{error, info, warn};

use crate::outputs::Transport;

const USAGE: &str = "\
Usage: retarget-output [--config <path>] [--print-default-config]

Reads JointState-shaped JSON lines from stdin and sends them to the
configured robot outputs.

Options:
  --config <path>          Config file (default: $RETARGET_CONFIG or ./retarget.toml)
  --print-default-config   Print the default config as TOML and exit
  -h, --help               Show this help";

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<String>,
    print_default_config: bool,
    help: bool,
}

fn parse_args<I>(args: I) -> Result<Args, String>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config requires a path")?;
                parsed.config = Some(path);
            }
            "--print-default-config" => parsed.print_default_config = true,
            "-h" | "--help" => parsed.help = true,
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }
    Ok(parsed)
}

fn main() -> ExitCode {
    let _guard = telemetry::init_tracing("retarget-output");

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };
    if args.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }
    if args.print_default_config {
        return match config::Config::default().to_toml() {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Cannot render default config");
                ExitCode::FAILURE
            }
        };
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let path = config::resolve_path(args.config.as_deref());
    let cfg = match config::load(&path).and_then(|cfg| cfg.validate().map(|()| cfg)) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Config error");
            return ExitCode::FAILURE;
        }
    };
    info!(path = %path.display(), handlers = cfg.handlers.len(), "Config loaded");

    // ── rosbridge pump ────────────────────────────────────────────────────
    // The control loop stays on this thread; only the WebSocket lives on the
    // runtime, so blocking connects never run inside it.
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("retarget-rosbridge")
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to start Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let transport = cfg.uses_rosbridge().then(Transport::default);
    if let Some(t) = &transport {
        let client = RosbridgeClient::new(&cfg.rosbridge_url, &t.bus, t.directory.clone());
        info!(url = %client.url(), "Starting rosbridge client");
        runtime.spawn(async move {
            if let Err(e) = client.run().await {
                error!(error = %e, "rosbridge client stopped");
            }
        });
    }

    let mut registry = match outputs::build_registry(&cfg, transport.as_ref()) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "Cannot build output handlers");
            return ExitCode::FAILURE;
        }
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        if shutdown_clone.swap(true, Ordering::SeqCst) {
            // Second Ctrl-C: a blocking init or stdin read is not returning.
            std::process::exit(130);
        }
        eprintln!("Ctrl-C received – stopping after the current cycle (press again to force)");
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Handler initialisation ────────────────────────────────────────────
    let report = registry.init_all();
    info!(ready = report.succeeded(), failed = report.failed(), "Output handlers initialised");
    if !registry.is_empty() && report.succeeded() == 0 {
        error!("No output handler is ready; exiting");
        return ExitCode::FAILURE;
    }

    // ── Control loop ──────────────────────────────────────────────────────
    let mut cycles: u64 = 0;
    let mut failed_cycles: u64 = 0;
    let mut rejected_lines: u64 = 0;

    for line in std::io::stdin().lock().lines() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                break;
            }
        };
        let snapshot = match input::parse_line(&line) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => continue,
            Err(e) => {
                rejected_lines += 1;
                warn!(error = %e, "Pose line rejected");
                continue;
            }
        };
        cycles += 1;
        if !registry.dispatch(&snapshot).is_success() {
            failed_cycles += 1;
        }
    }

    info!(cycles, failed_cycles, rejected_lines, "Output stage stopped");
    runtime.shutdown_timeout(Duration::from_secs(1));
    ExitCode::SUCCESS
}
