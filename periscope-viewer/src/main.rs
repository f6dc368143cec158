//! periscope-viewer — entry point.
//!
//! ```text
//! periscope-viewer                       Connect with defaults
//! periscope-viewer --server host:5900   Override the server address
//! periscope-viewer --config <path>      Use custom config TOML
//! periscope-viewer --gen-config         Dump default config and exit
//! ```
//!
//! A headless consumer: it runs the session supervisor and drains the
//! damage region at a fixed cadence, logging what a renderer would
//! upload. Useful for soak-testing a server and as a reference for
//! embedding the core behind a real presentation layer.

mod config;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use periscope_core::Supervisor;

use crate::config::ViewerConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "periscope-viewer", about = "Headless remote framebuffer viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "periscope.toml")]
    config: PathBuf,

    /// Server address (overrides config). Example: 192.168.1.20:5900
    #[arg(short, long)]
    server: Option<String>,

    /// Password for authenticated servers (overrides config).
    #[arg(short, long)]
    password: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(addr) = cli.server {
        match addr.rsplit_once(':') {
            Some((host, port)) => {
                config.session.host = host.to_string();
                config.session.port = port.parse()?;
            }
            None => config.session.host = addr,
        }
    }
    if let Some(password) = cli.password {
        config.session.password = Some(password);
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("periscope-viewer v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Start the supervisor ─────────────────────────────────

    let supervisor = Supervisor::new(config.session.clone());
    let client = supervisor.client();
    let stop = supervisor.stop_handle();
    let supervisor_task = tokio::spawn(async move { supervisor.run().await });

    // ── 2. Consumer loop ────────────────────────────────────────

    let mut ticker = tokio::time::interval(Duration::from_millis(
        config.consumer.poll_interval_ms.max(1),
    ));
    let mut updates: u64 = 0;
    let mut was_streaming = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let streaming = client.is_streaming();
                if streaming != was_streaming {
                    if streaming {
                        info!("stream up");
                    } else {
                        warn!("stream down; supervisor will reconnect");
                    }
                    was_streaming = streaming;
                }

                if let Some(update) = client.take_damage() {
                    updates += 1;
                    if config.consumer.log_updates {
                        info!(
                            left = update.bounds.left,
                            top = update.bounds.top,
                            right = update.bounds.right,
                            bottom = update.bounds.bottom,
                            width = update.view.width(),
                            height = update.view.height(),
                            updates,
                            "drained update"
                        );
                    }
                }
            }
        }
    }

    // ── 3. Shutdown ─────────────────────────────────────────────

    info!(updates, "shutting down");
    stop.store(false, Ordering::SeqCst);
    supervisor_task.abort();
    let _ = supervisor_task.await;

    Ok(())
}
