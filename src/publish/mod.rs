//! # Publishers
//!
//! The core hands resolved readings to a `Publisher` and never waits for an
//! acknowledgement. Keys are `"{source}/{name}"`; values are already formatted
//! text.
//!
//! Only `publish` is required. Error summaries and identities have default
//! encodings on top of it:
//!
//! - `{slave}/error` = `{"success":N,"fail":M}` and `{slave}/last_error` = text
//! - `{slave}/id` = bus address and, when known, `{slave}/serial`

use std::io::Write;

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;

use crate::error::SlaveError;
use crate::poll::SlaveIdentity;

/// Snapshot of a slave's health published after a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorSummary {
    pub success: u32,
    pub fail: u32,
    pub last_error: Option<SlaveError>,
}

#[derive(Serialize)]
struct Counts {
    success: u32,
    fail: u32,
}

impl ErrorSummary {
    /// `{"success":N,"fail":M}`
    pub fn to_json(&self) -> String {
        serde_json::to_string(&Counts {
            success: self.success,
            fail: self.fail,
        })
        .unwrap_or_default()
    }

    /// Human-readable last error, `"none"` if there never was one.
    pub fn last_error_text(&self) -> String {
        match self.last_error {
            Some(e) => e.to_string(),
            None => "none".to_string(),
        }
    }
}

/// Downstream sink for readings.
pub trait Publisher {
    /// Fire-and-forget publication of one value.
    fn publish(&mut self, key: &str, value: &str);

    fn publish_error(&mut self, slave: &str, summary: &ErrorSummary) {
        self.publish(&format!("{slave}/error"), &summary.to_json());
        self.publish(&format!("{slave}/last_error"), &summary.last_error_text());
    }

    fn publish_identity(&mut self, slave: &str, identity: &SlaveIdentity) {
        self.publish(&format!("{slave}/id"), &identity.address.to_string());
        if identity.serial != 0 {
            self.publish(&format!("{slave}/serial"), &identity.serial.to_string());
        }
    }

    /// Link state for policy outside the acquisition core.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Writes every reading to the `log` facade at info level.
#[derive(Debug, Default)]
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn publish(&mut self, key: &str, value: &str) {
        info!("{key} = {value}");
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    ts: String,
    key: &'a str,
    value: &'a str,
}

/// Appends one JSON object per reading to a writer.
///
/// `{"ts":"2024-05-01T12:00:00.000Z","key":"sdm/power_total","value":"1520"}`
pub struct JsonLinesPublisher<W: Write> {
    writer: W,
    healthy: bool,
}

impl<W: Write> JsonLinesPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            healthy: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Publisher for JsonLinesPublisher<W> {
    fn publish(&mut self, key: &str, value: &str) {
        let line = JsonLine {
            ts: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            key,
            value,
        };
        let result = serde_json::to_writer(&mut self.writer, &line)
            .map_err(std::io::Error::from)
            .and_then(|_| self.writer.write_all(b"\n"))
            .and_then(|_| self.writer.flush());
        match result {
            Ok(()) => self.healthy = true,
            Err(e) => {
                if self.healthy {
                    warn!("JSON lines publisher write failed: {e}");
                }
                self.healthy = false;
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.healthy
    }
}

/// Records publications in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryPublisher {
    pub messages: Vec<(String, String)>,
}

impl MemoryPublisher {
    /// Last value published under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.messages.iter().map(|(k, _)| k.as_str()).collect()
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&mut self, key: &str, value: &str) {
        self.messages.push((key.to_string(), value.to_string()));
    }
}
