//! eISCP remote: entry point.
//!
//! ```text
//! eiscp                      Connect using eiscp.toml (or defaults)
//! eiscp --host 10.0.0.7      Override the receiver address
//! eiscp --gen-config         Dump default config and exit
//! ```
//!
//! Each stdin line is `<command> [argument]`, e.g. `vu`, `v 28`, `go music`.
//! An empty line selects the highlighted menu entry; `?`, `h` or `help`
//! lists the commands.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use eiscp_core::{Client, DeviceState, Outcome, SessionEvent};

use eiscp_cli::config::ClientConfig;
use eiscp_cli::output::{help, is_help, render, tokenize};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "eiscp", about = "Remote control for eISCP receivers")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "eiscp.toml")]
    config: PathBuf,

    /// Receiver host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Receiver port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Skip the status queries sent after connecting.
    #[arg(long)]
    no_refresh: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = ClientConfig::default().to_toml()?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.device.host = host;
    }
    if let Some(port) = cli.port {
        config.device.port = port;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("eiscp v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Connect ──────────────────────────────────────────────

    let mut client = Client::new(config.session.clone());
    let format = config.output.format;
    client
        .session()
        .subscribe(move |state: &DeviceState| println!("{}", render(state, format)));

    let info = config.connection();
    let mut events = client.connect(&info).await?;

    if !cli.no_refresh {
        if let Err(e) = client.refresh().await {
            warn!("status refresh failed: {e}");
        }
    }

    // ── 2. Command loop ─────────────────────────────────────────

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let (name, arg) = tokenize(&line);
                if name.is_some_and(is_help) {
                    print!("{}", help(client.table()));
                    continue;
                }
                match client.execute(name, arg).await {
                    Ok(Outcome::Sent(opcode)) => info!("sent {opcode}"),
                    Ok(Outcome::Macro(report)) => {
                        info!(
                            steps = report.steps,
                            issued = report.issued,
                            "macro finished in {:?}",
                            report.elapsed
                        );
                    }
                    Err(e) => error!("{e}"),
                }
            }
            Some(event) = events.recv() => {
                let SessionEvent::Terminated(e) = event;
                error!("{info}: {e}");
                break;
            }
        }
    }

    if let Some(uptime) = client.session().connected_for() {
        info!("session with {info} lasted {uptime:?}");
    }
    client.disconnect();
    Ok(())
}
