//! Subscriber session: WebSocket consumer with exponential reconnect.
//!
//! The session owns the connection lifecycle; `LocalView` is the mirrored
//! aircraft state it maintains from payloads. The view never invents data:
//! while disconnected it shows whatever the last payload left behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{watch, Notify};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use sbs_core::payload::{AircraftView, ConnectionStatus, OutboundMessage};
use sbs_core::types::{Result, SbsError};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// `Error` means the server reported a failure on a live connection.
/// `Failed` is terminal for one `run()` call; calling `run()` again starts
/// over with a fresh attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Failed,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Disconnected
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Exponential reconnect schedule: delay `2^attempt * base`, capped by an
/// attempt budget.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_attempts: u32,
    attempts: u32,
}

impl Backoff {
    pub fn new(base_ms: u64, max_attempts: u32) -> Self {
        Backoff {
            base_ms,
            max_attempts,
            attempts: 0,
        }
    }

    /// Consume one attempt. `None` means the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            return None;
        }
        Some(Duration::from_millis(
            2u64.saturating_pow(self.attempts).saturating_mul(self.base_ms),
        ))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

// ---------------------------------------------------------------------------
// Local view
// ---------------------------------------------------------------------------

/// The client's mirror of the published aircraft state.
#[derive(Debug, Default)]
pub struct LocalView {
    pub aircraft: HashMap<String, AircraftView>,
    pub state: SessionState,
    pub last_error: Option<String>,
    pub last_snapshot: Option<f64>,
}

impl LocalView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one payload. Returns true when the aircraft set changed
    /// enough to warrant a repaint (full snapshot or incremental record).
    pub fn apply(&mut self, msg: &OutboundMessage) -> bool {
        match msg {
            OutboundMessage::AircraftUpdate {
                aircraft, timestamp, ..
            } => {
                // Full snapshot replaces the view wholesale; aircraft that
                // expired server-side disappear here too.
                self.aircraft = aircraft
                    .iter()
                    .map(|a| (a.ident.clone(), a.clone()))
                    .collect();
                self.last_snapshot = Some(*timestamp);
                true
            }
            OutboundMessage::AircraftData { data, .. } => {
                match self.aircraft.get_mut(&data.ident) {
                    Some(existing) => merge_view(existing, data),
                    None => {
                        self.aircraft.insert(data.ident.clone(), data.clone());
                    }
                }
                true
            }
            OutboundMessage::Connection { status, .. } => {
                self.state = match status {
                    ConnectionStatus::Connected => SessionState::Connected,
                    ConnectionStatus::Disconnected => SessionState::Disconnected,
                };
                false
            }
            OutboundMessage::Error { message } => {
                self.state = SessionState::Error;
                self.last_error = Some(message.clone());
                false
            }
        }
    }

    /// Aircraft sorted the way the server publishes them: altitude
    /// ascending, unknown altitude last.
    pub fn sorted(&self) -> Vec<&AircraftView> {
        let mut views: Vec<&AircraftView> = self.aircraft.values().collect();
        views.sort_by_key(|v| (v.altitude.is_none(), v.altitude, v.ident.clone()));
        views
    }
}

/// Same non-null-overwrite rule the server store uses, applied to the
/// projected view.
fn merge_view(existing: &mut AircraftView, incoming: &AircraftView) {
    if incoming.callsign.is_some() {
        existing.callsign = incoming.callsign.clone();
    }
    if incoming.airline.is_some() {
        existing.airline = incoming.airline.clone();
    }
    if incoming.country.is_some() {
        existing.country = incoming.country.clone();
    }
    if incoming.latitude.is_some() {
        existing.latitude = incoming.latitude;
    }
    if incoming.longitude.is_some() {
        existing.longitude = incoming.longitude;
    }
    if incoming.altitude.is_some() {
        existing.altitude = incoming.altitude;
    }
    if incoming.ground_speed.is_some() {
        existing.ground_speed = incoming.ground_speed;
    }
    if incoming.track.is_some() {
        existing.track = incoming.track;
    }
    if incoming.vertical_rate.is_some() {
        existing.vertical_rate = incoming.vertical_rate;
    }
    if incoming.squawk.is_some() {
        existing.squawk = incoming.squawk.clone();
    }
    if incoming.category.is_some() {
        existing.category = incoming.category;
    }
    existing.on_ground = incoming.on_ground;
    existing.alert = incoming.alert;
    existing.emergency = incoming.emergency;
    existing.spi = incoming.spi;
    existing.message_count = incoming.message_count;
    existing.age = incoming.age;
    existing.last_update = incoming.last_update;
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct SubscriberSession {
    url: String,
    backoff: Backoff,
    view: Arc<Mutex<LocalView>>,
    repaint: Arc<Notify>,
}

impl SubscriberSession {
    pub fn new(
        url: String,
        backoff: Backoff,
        view: Arc<Mutex<LocalView>>,
        repaint: Arc<Notify>,
    ) -> Self {
        SubscriberSession {
            url,
            backoff,
            view,
            repaint,
        }
    }

    /// Drive the session until the shutdown flag flips or the reconnect
    /// budget is spent. Each `run()` call starts with a fresh budget, so a
    /// caller can retry after `Failed`.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.backoff.reset();

        loop {
            self.set_state(SessionState::Connecting);

            match connect_async(self.url.as_str()).await {
                Ok((ws, _response)) => {
                    self.backoff.reset();
                    self.set_state(SessionState::Connected);
                    let shutdown_requested = self.drive(ws, &mut shutdown).await;
                    self.set_state(SessionState::Disconnected);
                    if shutdown_requested {
                        return Ok(());
                    }
                }
                Err(e) => {
                    self.view.lock().unwrap().last_error = Some(e.to_string());
                    // Disconnected while the backoff timer runs; only the
                    // next attempt moves back to Connecting.
                    self.set_state(SessionState::Disconnected);
                }
            }

            match self.backoff.next_delay() {
                Some(delay) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {
                            self.set_state(SessionState::Disconnected);
                            return Ok(());
                        }
                    }
                }
                None => {
                    self.set_state(SessionState::Failed);
                    return Err(SbsError::ReconnectExhausted {
                        attempts: self.backoff.max_attempts(),
                    });
                }
            }
        }
    }

    /// Pump one connection. Returns true if the exit was a shutdown
    /// request rather than a transport closure.
    async fn drive(
        &self,
        ws: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(msg) = serde_json::from_str::<OutboundMessage>(&text) else {
                            continue; // unknown payloads are ignored, not fatal
                        };
                        let changed = self.view.lock().unwrap().apply(&msg);
                        if changed {
                            self.repaint.notify_one();
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if write.send(Message::Pong(data)).await.is_err() {
                            return false;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return false,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.view.lock().unwrap().last_error = Some(e.to_string());
                        return false;
                    }
                },
                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return true;
                }
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        self.view.lock().unwrap().state = state;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sbs_core::payload::AltitudeRange;
    use sbs_core::types::TransmissionType;

    fn view_named(ident: &str, altitude: Option<i32>) -> AircraftView {
        AircraftView {
            ident: ident.to_string(),
            callsign: None,
            airline: None,
            country: None,
            latitude: None,
            longitude: None,
            altitude,
            ground_speed: None,
            track: None,
            vertical_rate: None,
            squawk: None,
            category: None,
            on_ground: false,
            alert: false,
            emergency: false,
            spi: false,
            message_count: 1,
            age: 0,
            first_seen: 1.0,
            last_update: 1.0,
        }
    }

    fn snapshot_of(views: Vec<AircraftView>, ts: f64) -> OutboundMessage {
        let altitude_range = AltitudeRange::summarize(&views);
        OutboundMessage::AircraftUpdate {
            count: views.len(),
            aircraft: views,
            altitude_range,
            timestamp: ts,
        }
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let mut backoff = Backoff::new(1000, 5);
        let delays: Vec<_> = std::iter::from_fn(|| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(8000),
                Duration::from_millis(16000),
                Duration::from_millis(32000),
            ]
        );
        assert_eq!(backoff.next_delay(), None, "budget stays spent");
    }

    #[test]
    fn test_backoff_reset_restores_budget() {
        let mut backoff = Backoff::new(100, 1);
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_snapshot_replaces_view_wholesale() {
        let mut view = LocalView::new();
        view.apply(&snapshot_of(
            vec![view_named("AAA111", Some(1000)), view_named("BBB222", None)],
            10.0,
        ));
        assert_eq!(view.aircraft.len(), 2);

        // Next snapshot no longer contains BBB222: it is gone.
        let changed = view.apply(&snapshot_of(vec![view_named("AAA111", Some(2000))], 12.0));
        assert!(changed);
        assert_eq!(view.aircraft.len(), 1);
        assert_eq!(view.aircraft["AAA111"].altitude, Some(2000));
        assert_eq!(view.last_snapshot, Some(12.0));
    }

    #[test]
    fn test_incremental_merges_non_null_fields() {
        let mut view = LocalView::new();
        let mut base = view_named("AAA111", Some(35000));
        base.callsign = Some("GIA152".into());
        view.apply(&snapshot_of(vec![base], 10.0));

        // Velocity-only record: altitude and callsign must survive.
        let mut incremental = view_named("AAA111", None);
        incremental.ground_speed = Some(450);
        incremental.track = Some(270);
        incremental.message_count = 7;
        view.apply(&OutboundMessage::AircraftData {
            data: incremental,
            transmission_type: TransmissionType::Velocity,
            timestamp: 11.0,
        });

        let merged = &view.aircraft["AAA111"];
        assert_eq!(merged.altitude, Some(35000));
        assert_eq!(merged.callsign.as_deref(), Some("GIA152"));
        assert_eq!(merged.ground_speed, Some(450));
        assert_eq!(merged.message_count, 7);
    }

    #[test]
    fn test_incremental_inserts_unknown_aircraft() {
        let mut view = LocalView::new();
        let changed = view.apply(&OutboundMessage::AircraftData {
            data: view_named("CCC333", Some(5000)),
            transmission_type: TransmissionType::AirbornePosition,
            timestamp: 5.0,
        });
        assert!(changed);
        assert_eq!(view.aircraft.len(), 1);
    }

    #[test]
    fn test_connection_payload_touches_only_status() {
        let mut view = LocalView::new();
        view.apply(&snapshot_of(vec![view_named("AAA111", None)], 10.0));

        let changed = view.apply(&OutboundMessage::Connection {
            status: ConnectionStatus::Disconnected,
            message: "stream closed".into(),
        });
        assert!(!changed);
        assert_eq!(view.state, SessionState::Disconnected);
        assert_eq!(view.aircraft.len(), 1, "aircraft survive disconnect");
    }

    #[test]
    fn test_error_payload_sets_error_status_keeps_aircraft() {
        let mut view = LocalView::new();
        view.apply(&snapshot_of(vec![view_named("AAA111", None)], 10.0));
        view.state = SessionState::Connected;

        view.apply(&OutboundMessage::Error {
            message: "upstream refused".into(),
        });
        assert_eq!(view.state, SessionState::Error);
        assert_eq!(view.last_error.as_deref(), Some("upstream refused"));
        assert_eq!(view.aircraft.len(), 1);
    }

    #[test]
    fn test_sorted_orders_by_altitude_nulls_last() {
        let mut view = LocalView::new();
        view.apply(&snapshot_of(
            vec![
                view_named("AAA111", None),
                view_named("BBB222", Some(1000)),
                view_named("CCC333", Some(37000)),
            ],
            10.0,
        ));
        let idents: Vec<_> = view.sorted().iter().map(|v| v.ident.clone()).collect();
        assert_eq!(idents, vec!["BBB222", "CCC333", "AAA111"]);
    }

    #[tokio::test]
    async fn test_run_fails_after_reconnect_budget() {
        let view = Arc::new(Mutex::new(LocalView::new()));
        let mut session = SubscriberSession::new(
            // Nothing listens here; every connect attempt is refused.
            "ws://127.0.0.1:9/stream".into(),
            Backoff::new(1, 2),
            view.clone(),
            Arc::new(Notify::new()),
        );
        let (_tx, rx) = watch::channel(false);

        let err = session.run(rx).await.unwrap_err();
        assert!(matches!(err, SbsError::ReconnectExhausted { attempts: 2 }));
        assert_eq!(view.lock().unwrap().state, SessionState::Failed);

        // A second run starts with a fresh budget and fails the same way,
        // not instantly.
        let (_tx, rx) = watch::channel(false);
        let err = session.run(rx).await.unwrap_err();
        assert!(matches!(err, SbsError::ReconnectExhausted { attempts: 2 }));
    }

    #[tokio::test]
    async fn test_state_is_disconnected_during_backoff() {
        let view = Arc::new(Mutex::new(LocalView::new()));
        let mut session = SubscriberSession::new(
            "ws://127.0.0.1:9/stream".into(),
            // Long delay: the session sits in the backoff wait while we look.
            Backoff::new(60_000, 5),
            view.clone(),
            Arc::new(Notify::new()),
        );
        let (_tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { session.run(rx).await });
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(view.lock().unwrap().state, SessionState::Disconnected);
        handle.abort();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_backoff() {
        let view = Arc::new(Mutex::new(LocalView::new()));
        let mut session = SubscriberSession::new(
            "ws://127.0.0.1:9/stream".into(),
            // Long delays: only shutdown can end the run promptly.
            Backoff::new(60_000, 5),
            view.clone(),
            Arc::new(Notify::new()),
        );
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { session.run(rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("run ends promptly on shutdown")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(view.lock().unwrap().state, SessionState::Disconnected);
    }
}
