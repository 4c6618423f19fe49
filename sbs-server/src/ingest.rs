//! Ingestion adapter: byte stream in, merged aircraft state out.
//!
//! A `LineSource` is the one pluggable transport capability — yield complete
//! text lines until end of stream. The TCP implementation reassembles line
//! boundaries from arbitrary read chunks; a simulated source for tests is a
//! `Vec` of lines. Every complete line goes through the parser and into the
//! shared store; lines the parser rejects are counted and dropped, never
//! fatal. Stream closure is reported exactly once, through the return value
//! — reconnection is the owner's call.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use sbs_core::filter::has_trusted_callsign;
use sbs_core::message::parse_line;
use sbs_core::payload::{AircraftView, ConnectionStatus, OutboundMessage};
use sbs_core::types::Result;

use crate::publisher::{now, SharedStore, SubscriberHub};

const READ_CHUNK: usize = 4096;

// ---------------------------------------------------------------------------
// Line source trait
// ---------------------------------------------------------------------------

/// A transport yielding complete text lines. `Ok(None)` is orderly end of
/// stream; `Err` is a transport failure. Both end ingestion.
#[async_trait]
pub trait LineSource: Send {
    async fn next_line(&mut self) -> Result<Option<String>>;
}

// ---------------------------------------------------------------------------
// Line reassembly
// ---------------------------------------------------------------------------

/// Splits a byte stream into lines across chunk boundaries.
///
/// A chunk may hold zero, one, or many newline-terminated messages; a
/// trailing partial line is buffered until the next chunk completes it.
/// CR before LF is stripped. A line that is not valid UTF-8 is skipped —
/// one garbled line must not end the stream.
pub struct LineAssembler {
    buf: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        LineAssembler { buf: Vec::new() }
    }

    /// Feed one chunk; returns the lines it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut raw: Vec<u8> = self.buf.drain(..=pos).collect();
            raw.pop(); // the LF
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            match String::from_utf8(raw) {
                Ok(line) if !line.trim().is_empty() => lines.push(line),
                _ => {} // blank or malformed encoding: skip
            }
        }
        lines
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// TCP transport
// ---------------------------------------------------------------------------

/// Raw TCP feed, e.g. a BaseStation port 30003 stream.
pub struct TcpLineSource {
    stream: TcpStream,
    assembler: LineAssembler,
    pending: VecDeque<String>,
}

impl TcpLineSource {
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(TcpLineSource {
            stream,
            assembler: LineAssembler::new(),
            pending: VecDeque::new(),
        })
    }
}

#[async_trait]
impl LineSource for TcpLineSource {
    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Ok(Some(line));
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.pending.extend(self.assembler.push(&chunk[..n]));
        }
    }
}

// ---------------------------------------------------------------------------
// Ingest loop
// ---------------------------------------------------------------------------

/// Counters for one ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: u64,
    pub accepted: u64,
    pub rejected: u64,
}

/// Drive a line source to completion, merging each parsed line into the
/// store. Significant updates (position, movement, or altitude) are pushed
/// to subscribers immediately as incremental payloads, subject to the same
/// trust policy as snapshots.
///
/// Returns the run's counters on orderly end of stream; a transport failure
/// comes back as the `Err`. Either way subscribers get exactly one
/// closing `connection`/`error` payload, and the caller owns what happens
/// next.
pub async fn run_ingest(
    mut source: impl LineSource,
    store: SharedStore,
    hub: Arc<SubscriberHub>,
    trusted_only: bool,
) -> Result<IngestStats> {
    let mut stats = IngestStats::default();

    loop {
        match source.next_line().await {
            Ok(Some(line)) => {
                stats.lines += 1;
                let Some(update) = parse_line(&line) else {
                    stats.rejected += 1;
                    continue;
                };
                stats.accepted += 1;

                let timestamp = now();
                let incremental = {
                    let mut store = store.write().unwrap();
                    store.apply_update(&update, timestamp);
                    if update.is_significant() {
                        store
                            .get(&update.ident)
                            .filter(|r| !trusted_only || has_trusted_callsign(r))
                            .map(|r| AircraftView::from_record(r, timestamp))
                    } else {
                        None
                    }
                }; // store lock dropped before fan-out

                if let Some(view) = incremental {
                    hub.broadcast(Arc::new(OutboundMessage::AircraftData {
                        data: view,
                        transmission_type: update.transmission_type,
                        timestamp,
                    }));
                }
            }
            Ok(None) => {
                hub.broadcast(Arc::new(OutboundMessage::Connection {
                    status: ConnectionStatus::Disconnected,
                    message: "upstream stream closed".into(),
                }));
                return Ok(stats);
            }
            Err(e) => {
                hub.broadcast(Arc::new(OutboundMessage::Error {
                    message: format!("upstream transport failed: {e}"),
                }));
                return Err(e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::RwLock;

    use sbs_core::store::AircraftStore;
    use sbs_core::types::{ident_from_hex, SbsError};

    /// Simulated transport: a fixed script of lines, optionally ending in a
    /// transport error instead of a clean close.
    struct ScriptedSource {
        lines: VecDeque<String>,
        fail_at_end: bool,
    }

    impl ScriptedSource {
        fn new(lines: &[&str]) -> Self {
            ScriptedSource {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                fail_at_end: false,
            }
        }
    }

    #[async_trait]
    impl LineSource for ScriptedSource {
        async fn next_line(&mut self) -> Result<Option<String>> {
            match self.lines.pop_front() {
                Some(line) => Ok(Some(line)),
                None if self.fail_at_end => {
                    Err(SbsError::Transport("connection reset".into()))
                }
                None => Ok(None),
            }
        }
    }

    fn shared_store() -> SharedStore {
        Arc::new(RwLock::new(AircraftStore::new()))
    }

    const POSITION_LINE: &str =
        "MSG,3,1,1,ABC123,1,a,b,c,d,,37000,,,-6.2,106.8,,,0,0,0,0";
    const VELOCITY_LINE: &str =
        "MSG,4,1,1,ABC123,1,a,b,c,d,,,450,270,,,-64,,,,,";

    // -- LineAssembler ------------------------------------------------------

    #[test]
    fn test_assembler_single_line() {
        let mut asm = LineAssembler::new();
        assert_eq!(asm.push(b"MSG,8,1\n"), vec!["MSG,8,1"]);
    }

    #[test]
    fn test_assembler_many_lines_one_chunk() {
        let mut asm = LineAssembler::new();
        assert_eq!(asm.push(b"one\ntwo\nthree\n"), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_assembler_partial_line_carried_over() {
        let mut asm = LineAssembler::new();
        assert!(asm.push(b"MSG,3,1,1,AB").is_empty());
        assert_eq!(asm.push(b"C123\nMSG,4").as_slice(), ["MSG,3,1,1,ABC123"]);
        assert_eq!(asm.push(b"\n").as_slice(), ["MSG,4"]);
    }

    #[test]
    fn test_assembler_crlf() {
        let mut asm = LineAssembler::new();
        assert_eq!(asm.push(b"one\r\ntwo\r\n"), vec!["one", "two"]);
    }

    #[test]
    fn test_assembler_skips_blank_and_invalid_utf8() {
        let mut asm = LineAssembler::new();
        assert!(asm.push(b"\n\r\n").is_empty());
        assert_eq!(asm.push(b"\xFF\xFE\nok\n"), vec!["ok"]);
    }

    #[test]
    fn test_assembler_chunk_with_no_newline_yields_nothing() {
        let mut asm = LineAssembler::new();
        assert!(asm.push(b"never finished").is_empty());
        assert!(asm.push(b" still going").is_empty());
    }

    // -- run_ingest ---------------------------------------------------------

    #[tokio::test]
    async fn test_ingest_merges_lines_into_store() {
        let store = shared_store();
        let hub = Arc::new(SubscriberHub::new());
        let source = ScriptedSource::new(&[
            POSITION_LINE,
            "GARBAGE,not,a,real,message",
            VELOCITY_LINE,
        ]);

        let stats = run_ingest(source, store.clone(), hub, false)
            .await
            .expect("clean close");
        assert_eq!(
            stats,
            IngestStats {
                lines: 3,
                accepted: 2,
                rejected: 1
            }
        );

        let store = store.read().unwrap();
        let record = store.get(&ident_from_hex("ABC123").unwrap()).unwrap();
        assert_eq!(record.latitude, Some(-6.2));
        assert_eq!(record.ground_speed, Some(450));
        assert_eq!(record.message_count, 2);
    }

    #[tokio::test]
    async fn test_ingest_pushes_incremental_updates() {
        let store = shared_store();
        let hub = Arc::new(SubscriberHub::new());
        let mut rx = hub.register();

        let source = ScriptedSource::new(&[POSITION_LINE]);
        run_ingest(source, store, hub, false).await.unwrap();

        match rx.try_recv().expect("incremental payload").as_ref() {
            OutboundMessage::AircraftData { data, .. } => {
                assert_eq!(data.ident, "ABC123");
                assert_eq!(data.latitude, Some(-6.2));
            }
            other => panic!("expected AircraftData, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ingest_trust_policy_gates_incrementals() {
        let store = shared_store();
        let hub = Arc::new(SubscriberHub::new());
        let mut rx = hub.register();

        // No callsign yet: tracked but not pushed under trusted-only.
        let source = ScriptedSource::new(&[POSITION_LINE]);
        run_ingest(source, store.clone(), hub.clone(), true)
            .await
            .unwrap();

        match rx.try_recv().expect("closing payload").as_ref() {
            OutboundMessage::Connection { status, .. } => {
                assert_eq!(*status, ConnectionStatus::Disconnected);
            }
            other => panic!("expected only the closing payload, got {other:?}"),
        }
        assert_eq!(store.read().unwrap().len(), 1, "still tracked internally");
    }

    #[tokio::test]
    async fn test_ingest_reports_clean_close_once() {
        let store = shared_store();
        let hub = Arc::new(SubscriberHub::new());
        let mut rx = hub.register();

        let source = ScriptedSource::new(&[]);
        run_ingest(source, store, hub, false).await.unwrap();

        match rx.try_recv().unwrap().as_ref() {
            OutboundMessage::Connection { status, .. } => {
                assert_eq!(*status, ConnectionStatus::Disconnected);
            }
            other => panic!("expected Connection, got {other:?}"),
        }
        assert!(rx.try_recv().is_err(), "closure reported exactly once");
    }

    #[tokio::test]
    async fn test_ingest_transport_error_surfaces_as_error_payload() {
        let store = shared_store();
        let hub = Arc::new(SubscriberHub::new());
        let mut rx = hub.register();

        let mut source = ScriptedSource::new(&[POSITION_LINE]);
        source.fail_at_end = true;

        let result = run_ingest(source, store.clone(), hub, false).await;
        assert!(result.is_err());

        // Incremental first, then the error payload; store state survives.
        let first = rx.try_recv().unwrap();
        assert!(matches!(
            first.as_ref(),
            OutboundMessage::AircraftData { .. }
        ));
        let second = rx.try_recv().unwrap();
        assert!(matches!(second.as_ref(), OutboundMessage::Error { .. }));
        assert_eq!(store.read().unwrap().len(), 1);
    }
}
