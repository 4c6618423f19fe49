//! sbs-client: terminal subscriber for the aircraft stream.

use std::sync::{Arc, Mutex};

use clap::Parser;
use comfy_table::{Cell, Table};
use tokio::sync::{watch, Notify};

use sbs_core::config::{DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_MS};

mod session;

use session::{Backoff, LocalView, SessionState, SubscriberSession};

#[derive(Parser)]
#[command(name = "sbs-client", version, about = "Terminal aircraft stream viewer")]
struct Cli {
    /// WebSocket stream URL
    #[arg(default_value = "ws://localhost:8080/stream")]
    url: String,

    /// Reconnect backoff base in milliseconds
    #[arg(long, default_value_t = DEFAULT_RECONNECT_BASE_MS)]
    backoff_base_ms: u64,

    /// Reconnect attempts before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_RECONNECT_ATTEMPTS)]
    max_attempts: u32,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let view = Arc::new(Mutex::new(LocalView::new()));
    let repaint = Arc::new(Notify::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut session = SubscriberSession::new(
        cli.url.clone(),
        Backoff::new(cli.backoff_base_ms, cli.max_attempts),
        view.clone(),
        repaint.clone(),
    );
    let session_task = tokio::spawn(async move { session.run(shutdown_rx).await });

    eprintln!("Subscribing to {}", cli.url);

    loop {
        tokio::select! {
            _ = repaint.notified() => {
                print_view(&view);
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = shutdown_tx.send(true);
                break;
            }
        }
        if session_task.is_finished() {
            break;
        }
    }

    match session_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            eprintln!("Session ended: {e}");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Session task panicked: {e}");
            std::process::exit(1);
        }
    }
}

fn print_view(view: &Arc<Mutex<LocalView>>) {
    let view = view.lock().unwrap();

    let mut table = Table::new();
    table.set_header(vec![
        "Ident", "Callsign", "Airline", "Alt (ft)", "Spd (kts)", "Trk", "VRate", "Lat", "Lon",
        "Age",
    ]);

    for ac in view.sorted() {
        table.add_row(vec![
            Cell::new(&ac.ident),
            Cell::new(ac.callsign.as_deref().unwrap_or("-")),
            Cell::new(ac.airline.as_deref().unwrap_or("-")),
            Cell::new(ac.altitude.map(|a| a.to_string()).unwrap_or("-".into())),
            Cell::new(
                ac.ground_speed
                    .map(|s| s.to_string())
                    .unwrap_or("-".into()),
            ),
            Cell::new(ac.track.map(|t| t.to_string()).unwrap_or("-".into())),
            Cell::new(
                ac.vertical_rate
                    .map(|v| format!("{v:+}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(ac.latitude.map(|l| format!("{l:.4}")).unwrap_or("-".into())),
            Cell::new(
                ac.longitude
                    .map(|l| format!("{l:.4}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(format!("{}s", ac.age)),
        ]);
    }

    let status = match view.state {
        SessionState::Connected => "connected",
        SessionState::Connecting => "connecting",
        SessionState::Disconnected => "disconnected",
        SessionState::Error => "error",
        SessionState::Failed => "failed",
    };

    println!();
    println!("{} aircraft ({status})", view.aircraft.len());
    if let Some(err) = &view.last_error {
        println!("last error: {err}");
    }
    println!("{table}");
}
