//! sbs-server: SBS-1 stream aggregator with periodic snapshot fan-out.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};

use sbs_core::config::Config;
use sbs_core::payload::{ConnectionStatus, OutboundMessage};
use sbs_core::store::AircraftStore;
use sbs_core::{parse_line, AircraftView};

mod ingest;
mod publisher;
mod web;

use ingest::TcpLineSource;
use publisher::{Publisher, SharedStore, SubscriberHub};
use web::AppState;

#[derive(Parser)]
#[command(name = "sbs-server", version, about = "SBS-1 aircraft stream aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to an SBS-1 feed and serve aggregated snapshots
    Serve {
        /// SBS-1 feed host (overrides TCP_HOST)
        #[arg(long)]
        tcp_host: Option<String>,

        /// SBS-1 feed port (overrides TCP_PORT)
        #[arg(long)]
        tcp_port: Option<u16>,

        /// Subscriber-facing bind port (overrides WS_PROXY_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Snapshot publish interval in milliseconds (overrides UPDATE_INTERVAL)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Record expiry window in milliseconds (overrides DATA_EXPIRY_TIME)
        #[arg(long)]
        expiry_ms: Option<u64>,

        /// Publish every tracked aircraft, not just trusted-callsign ones
        #[arg(long)]
        all_aircraft: bool,
    },

    /// Parse SBS lines from a capture file and print an aircraft table
    Replay {
        /// Path to capture file, or "-" for stdin
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            tcp_host,
            tcp_port,
            port,
            interval_ms,
            expiry_ms,
            all_aircraft,
        } => {
            let mut config = match Config::from_env() {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Configuration error: {e}");
                    std::process::exit(1);
                }
            };
            if let Some(host) = tcp_host {
                config.tcp_host = host;
            }
            if let Some(p) = tcp_port {
                config.tcp_port = p;
            }
            if let Some(p) = port {
                config.bind_port = p;
            }
            if let Some(ms) = interval_ms {
                config.update_interval_ms = ms;
            }
            if let Some(ms) = expiry_ms {
                config.expiry_ms = ms;
            }
            if all_aircraft {
                config.trusted_only = false;
            }
            // Flag overrides can re-break the interval/expiry relation.
            if let Err(e) = config.validate() {
                eprintln!("Configuration error: {e}");
                std::process::exit(1);
            }
            cmd_serve(config).await;
        }
        Commands::Replay { file } => cmd_replay(file),
    }
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

async fn cmd_serve(config: Config) {
    let store: SharedStore = Arc::new(RwLock::new(AircraftStore::new()));
    let hub = Arc::new(SubscriberHub::new());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let publisher = Publisher {
        store: store.clone(),
        hub: hub.clone(),
        interval: Duration::from_millis(config.update_interval_ms),
        expiry_secs: config.expiry_secs(),
        trusted_only: config.trusted_only,
    };
    let publisher_task = tokio::spawn(publisher.run(shutdown_rx.clone()));

    let ingest_task = tokio::spawn(feed_loop(
        config.clone(),
        store.clone(),
        hub.clone(),
        shutdown_rx,
    ));

    let state = Arc::new(AppState {
        store,
        hub,
        expiry_secs: config.expiry_secs(),
        trusted_only: config.trusted_only,
    });
    let app = web::build_router(state);

    let addr = format!("0.0.0.0:{}", config.bind_port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error binding {addr}: {e}");
            std::process::exit(1);
        }
    };
    eprintln!("sbs-server listening on http://{addr}");
    eprintln!(
        "  upstream {}:{}, interval {} ms, expiry {} ms, {}",
        config.tcp_host,
        config.tcp_port,
        config.update_interval_ms,
        config.expiry_ms,
        if config.trusted_only {
            "trusted callsigns only"
        } else {
            "all aircraft"
        }
    );

    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    });
    if let Err(e) = serve.await {
        eprintln!("Server error: {e}");
    }

    let _ = shutdown_tx.send(true);
    let _ = publisher_task.await;
    ingest_task.abort();
}

/// Keep the upstream SBS feed attached. Each closure or connect failure
/// backs off exponentially (`2^attempt * base`); a successful session
/// resets the counter. Past the attempt cap the loop gives up and the
/// server keeps running on whatever state it already has.
async fn feed_loop(
    config: Config,
    store: SharedStore,
    hub: Arc<SubscriberHub>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut attempts: u32 = 0;

    loop {
        match TcpLineSource::connect(&config.tcp_host, config.tcp_port).await {
            Ok(source) => {
                eprintln!(
                    "Connected to SBS feed {}:{}",
                    config.tcp_host, config.tcp_port
                );
                attempts = 0;
                match ingest::run_ingest(source, store.clone(), hub.clone(), config.trusted_only)
                    .await
                {
                    Ok(stats) => {
                        eprintln!(
                            "SBS feed closed: {} lines, {} accepted, {} rejected",
                            stats.lines, stats.accepted, stats.rejected
                        );
                    }
                    Err(e) => {
                        eprintln!("SBS feed error: {e}");
                    }
                }
            }
            Err(e) => {
                eprintln!(
                    "Error connecting to {}:{}: {e}",
                    config.tcp_host, config.tcp_port
                );
            }
        }

        attempts += 1;
        if attempts > config.max_reconnect_attempts {
            eprintln!(
                "Giving up on SBS feed after {} attempts",
                config.max_reconnect_attempts
            );
            let msg = Arc::new(OutboundMessage::Connection {
                status: ConnectionStatus::Disconnected,
                message: "upstream feed unavailable".into(),
            });
            hub.broadcast(msg);
            return;
        }

        let delay = Duration::from_millis(2u64.saturating_pow(attempts) * config.reconnect_base_ms);
        eprintln!(
            "Reconnecting in {:.1}s (attempt {}/{})",
            delay.as_secs_f64(),
            attempts,
            config.max_reconnect_attempts
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}

// ---------------------------------------------------------------------------
// replay
// ---------------------------------------------------------------------------

fn cmd_replay(file: PathBuf) {
    let reader: Box<dyn BufRead> = if file.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        let f = std::fs::File::open(&file).unwrap_or_else(|e| {
            eprintln!("Error opening {}: {e}", file.display());
            std::process::exit(1);
        });
        Box::new(io::BufReader::new(f))
    };

    let mut store = AircraftStore::new();
    let mut total_lines = 0u64;
    let mut accepted = 0u64;
    // Synthetic clock: capture files carry no receive timestamps.
    let mut timestamp = 0.0f64;

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        total_lines += 1;
        timestamp += 0.1;

        if let Some(update) = parse_line(trimmed) {
            accepted += 1;
            store.apply_update(&update, timestamp);
        }
    }

    print_summary(&store, timestamp, total_lines, accepted);
}

fn print_summary(store: &AircraftStore, now: f64, total_lines: u64, accepted: u64) {
    println!();
    println!(
        "Lines: {total_lines} read, {accepted} parsed, {} aircraft",
        store.len()
    );
    println!();

    if store.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Ident", "Callsign", "Airline", "Country", "Alt (ft)", "Spd (kts)", "Trk", "VRate",
        "Lat", "Lon", "Squawk", "Msgs",
    ]);

    // Generous window so nothing from the capture ages out of the table.
    let snapshot = store.snapshot(now, now + 1.0);
    for record in &snapshot {
        let view = AircraftView::from_record(record, now);
        table.add_row(vec![
            Cell::new(&view.ident),
            Cell::new(view.callsign.as_deref().unwrap_or("-")),
            Cell::new(view.airline.as_deref().unwrap_or("-")),
            Cell::new(view.country.as_deref().unwrap_or("-")),
            Cell::new(
                view.altitude
                    .map(|a| a.to_string())
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                view.ground_speed
                    .map(|s| s.to_string())
                    .unwrap_or("-".into()),
            ),
            Cell::new(view.track.map(|t| t.to_string()).unwrap_or("-".into())),
            Cell::new(
                view.vertical_rate
                    .map(|v| format!("{v:+}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                view.latitude
                    .map(|l| format!("{l:.4}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                view.longitude
                    .map(|l| format!("{l:.4}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(view.squawk.as_deref().unwrap_or("-")),
            Cell::new(view.message_count),
        ]);
    }

    println!("{table}");
}
