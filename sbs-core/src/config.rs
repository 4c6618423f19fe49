//! Runtime configuration, consumed from environment variables.
//!
//! Every setting has a default; unset or unparseable values fall back
//! silently. The one hard rule is that the expiry window must exceed the
//! publish cadence, otherwise a record could expire before a single
//! snapshot ever saw it.

use crate::types::{Result, SbsError};

pub const DEFAULT_TCP_HOST: &str = "localhost";
pub const DEFAULT_TCP_PORT: u16 = 30003;
pub const DEFAULT_BIND_PORT: u16 = 8080;
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_EXPIRY_MS: u64 = 30000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 1000;

/// Aggregator configuration surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SBS-1 stream endpoint.
    pub tcp_host: String,
    pub tcp_port: u16,
    /// Subscriber-facing bind port.
    pub bind_port: u16,
    /// Snapshot publish cadence, milliseconds.
    pub update_interval_ms: u64,
    /// Staleness tolerated before a record leaves outward visibility.
    pub expiry_ms: u64,
    /// Consumer-side reconnect policy.
    pub max_reconnect_attempts: u32,
    pub reconnect_base_ms: u64,
    /// Restrict outward snapshots to records with a trusted callsign.
    pub trusted_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tcp_host: DEFAULT_TCP_HOST.into(),
            tcp_port: DEFAULT_TCP_PORT,
            bind_port: DEFAULT_BIND_PORT,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            expiry_ms: DEFAULT_EXPIRY_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_ms: DEFAULT_RECONNECT_BASE_MS,
            trusted_only: true,
        }
    }
}

impl Config {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Config> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary lookup, for tests and embedding.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
        let defaults = Config::default();
        let config = Config {
            tcp_host: lookup("TCP_HOST").unwrap_or(defaults.tcp_host),
            tcp_port: parse_or(&lookup, "TCP_PORT", defaults.tcp_port),
            bind_port: parse_or(&lookup, "WS_PROXY_PORT", defaults.bind_port),
            update_interval_ms: parse_or(
                &lookup,
                "UPDATE_INTERVAL",
                defaults.update_interval_ms,
            ),
            expiry_ms: parse_or(&lookup, "DATA_EXPIRY_TIME", defaults.expiry_ms),
            max_reconnect_attempts: parse_or(
                &lookup,
                "MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            reconnect_base_ms: parse_or(&lookup, "RECONNECT_BASE", defaults.reconnect_base_ms),
            trusted_only: lookup("TRUSTED_ONLY")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(defaults.trusted_only),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject windows that cannot guarantee at least one snapshot per
    /// record lifetime.
    pub fn validate(&self) -> Result<()> {
        if self.expiry_ms <= self.update_interval_ms {
            return Err(SbsError::Config(format!(
                "expiry window ({} ms) must exceed the publish interval ({} ms)",
                self.expiry_ms, self.update_interval_ms
            )));
        }
        if self.update_interval_ms == 0 {
            return Err(SbsError::Config("publish interval must be non-zero".into()));
        }
        Ok(())
    }

    pub fn expiry_secs(&self) -> f64 {
        self.expiry_ms as f64 / 1000.0
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
