//! # Logging Helpers
//!
//! Rate limiting for messages that can repeat every tick (an unreachable
//! meter answers nothing, forever) and bounded hex dumps of frames.
//!
//! ```rust
//! use sml_gateway::util::logging::LogThrottle;
//!
//! let mut throttle = LogThrottle::new(1000, 2);
//! assert!(throttle.allow());
//! assert!(throttle.allow());
//! assert!(!throttle.allow());
//! ```

use std::time::Instant;

/// Allows at most `cap` messages per `window_ms`.
#[derive(Debug)]
pub struct LogThrottle {
    window_ms: u64,
    cap: u32,
    count: u32,
    suppressed: u32,
    t0: Instant,
}

impl LogThrottle {
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            suppressed: 0,
            t0: Instant::now(),
        }
    }

    /// Returns `true` if the message should be logged.
    ///
    /// When a new window opens, the number of messages swallowed in the last
    /// one is reported once.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.t0).as_millis() as u64 > self.window_ms {
            if self.suppressed > 0 {
                log::debug!("{} similar messages suppressed", self.suppressed);
            }
            self.t0 = now;
            self.count = 0;
            self.suppressed = 0;
        }

        self.count += 1;
        let allowed = self.count <= self.cap;
        if !allowed {
            self.suppressed += 1;
        }
        allowed
    }

    /// Messages dropped in the current window.
    pub fn suppressed(&self) -> u32 {
        self.suppressed
    }
}

/// Logs `data` as hex at debug level, cut off after 64 bytes.
pub fn log_frame_hex(prefix: &str, data: &[u8]) {
    const MAX_LOG_BYTES: usize = 64;

    if !log::log_enabled!(log::Level::Debug) {
        return;
    }

    let shown = &data[..data.len().min(MAX_LOG_BYTES)];
    let hex_str = crate::util::hex::format_hex_compact(shown);
    if data.len() > MAX_LOG_BYTES {
        log::debug!("{prefix}: {hex_str} ... ({} bytes total)", data.len());
    } else {
        log::debug!("{prefix}: {hex_str}");
    }
}
