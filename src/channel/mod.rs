//! # Channel Frame Acquisition
//!
//! A `Channel` turns a stream of arbitrarily sized byte bursts from one serial
//! meter input into validated whole frames.
//!
//! ## States
//!
//! - `Idle`: empty buffer, waiting for the first byte of a burst
//! - `Collecting`: appending bursts until the transport reports a gap
//! - `Validating`: marker checks run on the next tick
//! - `Delivering`: the decoder is handed the frame exactly once
//! - `Throttled`: quiet period after a delivery; incoming bytes are dropped
//!
//! Every failure path (overflow, validation error) discards the buffer and
//! returns to `Idle`. Nothing here blocks and nothing here is fatal.
//!
//! ## Usage
//!
//! ```rust
//! use sml_gateway::channel::{Channel, ChannelConfig, ChannelState};
//! use sml_gateway::clock::Millis;
//! use sml_gateway::decoder::CollectingDecoder;
//! use sml_gateway::publish::MemoryPublisher;
//!
//! let mut channel = Channel::new(0, ChannelConfig::sml("sensor0"));
//! let mut decoder = CollectingDecoder::default();
//! let mut publisher = MemoryPublisher::default();
//!
//! channel.push(&[0x1B, 0x1B, 0x1B, 0x1B, 0x01, 0x01, 0x01, 0x01]);
//! channel.push(&[0x1B, 0x1B, 0x1B, 0x1B, 0x1A, 0x00, 0x12, 0x34]);
//! channel.end_of_burst();
//! channel.tick(Millis(0), &mut decoder, &mut publisher);
//!
//! assert_eq!(decoder.frames.len(), 1);
//! assert_eq!(channel.state(), ChannelState::Idle);
//! ```

pub mod framing;
pub mod shared;

pub use framing::Framing;
pub use shared::SharedChannel;

use log::{debug, warn};
use serde::Serialize;

use crate::clock::Millis;
use crate::constants::DEFAULT_BUFFER_CAPACITY;
use crate::decoder::{Decoder, FrameContext};
use crate::error::FrameError;
use crate::publish::Publisher;
use crate::util::logging::log_frame_hex;

/// Framing state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelState {
    Idle,
    Collecting,
    Validating,
    Delivering,
    Throttled,
}

/// Static configuration of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub name: String,
    pub framing: Framing,
    /// Buffer size in bytes, fixed for the lifetime of the channel.
    pub capacity: usize,
    /// Quiet period after a delivery; 0 disables throttling.
    pub throttle_ms: u32,
}

impl ChannelConfig {
    /// SML channel with the default buffer and no throttle.
    pub fn sml(name: &str) -> Self {
        Self {
            name: name.to_string(),
            framing: Framing::Sml,
            capacity: DEFAULT_BUFFER_CAPACITY,
            throttle_ms: 0,
        }
    }

    /// Line-delimited ASCII channel with the default buffer and no throttle.
    pub fn line(name: &str, terminator: u8) -> Self {
        Self {
            name: name.to_string(),
            framing: Framing::Line { terminator },
            capacity: DEFAULT_BUFFER_CAPACITY,
            throttle_ms: 0,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_throttle_ms(mut self, throttle_ms: u32) -> Self {
        self.throttle_ms = throttle_ms;
        self
    }
}

/// Counters kept per channel for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChannelStats {
    pub frames_delivered: u64,
    pub frames_discarded: u64,
    /// Bytes offered while the channel was not accepting input.
    pub bytes_dropped: u64,
    #[serde(skip)]
    pub last_delivery: Option<Millis>,
    #[serde(skip)]
    pub last_error: Option<FrameError>,
}

/// Frame reassembly state machine for one meter input.
#[derive(Debug)]
pub struct Channel {
    index: usize,
    config: ChannelConfig,
    buffer: Box<[u8]>,
    cursor: usize,
    state: ChannelState,
    /// Only meaningful while `Throttled`.
    resume_at: Millis,
    stats: ChannelStats,
}

impl Channel {
    /// Creates a channel and allocates its buffer once.
    pub fn new(index: usize, config: ChannelConfig) -> Self {
        debug!(
            "Initializing channel {} ({:?}, {} bytes)",
            config.name, config.framing, config.capacity
        );
        Self {
            index,
            buffer: vec![0u8; config.capacity].into_boxed_slice(),
            config,
            cursor: 0,
            state: ChannelState::Idle,
            resume_at: Millis::ZERO,
            stats: ChannelStats::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// The bytes collected so far.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer[..self.cursor]
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// True once at least one frame has been handed to the decoder.
    pub fn has_delivered(&self) -> bool {
        self.stats.frames_delivered > 0
    }

    /// Appends a burst.
    ///
    /// Accepted only in `Idle` and `Collecting`; a burst that does not fit
    /// discards everything collected so far.
    pub fn push(&mut self, bytes: &[u8]) {
        match self.state {
            ChannelState::Idle | ChannelState::Collecting => {}
            _ => {
                self.stats.bytes_dropped += bytes.len() as u64;
                return;
            }
        }

        if bytes.is_empty() {
            return;
        }

        let attempted = self.cursor + bytes.len();
        if attempted > self.buffer.len() {
            self.discard(FrameError::BufferOverflow {
                capacity: self.buffer.len(),
                attempted,
            });
            return;
        }

        if self.state == ChannelState::Idle {
            self.set_state(ChannelState::Collecting);
        }
        self.buffer[self.cursor..attempted].copy_from_slice(bytes);
        self.cursor = attempted;
    }

    /// The transport observed an inter-frame gap.
    pub fn end_of_burst(&mut self) {
        if self.state == ChannelState::Collecting {
            debug!("channel {}: burst complete, {} bytes", self.config.name, self.cursor);
            self.set_state(ChannelState::Validating);
        }
    }

    /// Advances the time-dependent transitions.
    ///
    /// A frame that validates is delivered within the same tick.
    pub fn tick(&mut self, now: Millis, decoder: &mut dyn Decoder, publisher: &mut dyn Publisher) {
        if self.state == ChannelState::Validating {
            match self.config.framing.validate(self.buffered()) {
                Ok(()) => self.set_state(ChannelState::Delivering),
                Err(e) => self.discard(e),
            }
        }

        match self.state {
            ChannelState::Delivering => self.deliver(now, decoder, publisher),
            ChannelState::Throttled => {
                if now.reached(self.resume_at) {
                    self.reset();
                }
            }
            _ => {}
        }
    }

    fn deliver(&mut self, now: Millis, decoder: &mut dyn Decoder, publisher: &mut dyn Publisher) {
        log_frame_hex(&format!("channel {} frame", self.config.name), self.buffered());

        let ctx = FrameContext {
            channel: &self.config.name,
            channel_index: self.index,
            framing: &self.config.framing,
            received_at: now,
        };
        decoder.decode(&self.buffer[..self.cursor], &ctx, publisher);

        self.stats.frames_delivered += 1;
        self.stats.last_delivery = Some(now);

        if self.config.throttle_ms > 0 {
            self.resume_at = now.add_ms(self.config.throttle_ms);
            self.cursor = 0;
            self.set_state(ChannelState::Throttled);
        } else {
            self.reset();
        }
    }

    fn discard(&mut self, reason: FrameError) {
        warn!("channel {}: discarding {} bytes: {}", self.config.name, self.cursor, reason);
        self.stats.frames_discarded += 1;
        self.stats.last_error = Some(reason);
        self.reset();
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.set_state(ChannelState::Idle);
    }

    fn set_state(&mut self, next: ChannelState) {
        if self.state != next {
            debug!("channel {}: {:?} -> {:?}", self.config.name, self.state, next);
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{SML_END_SEQUENCE, SML_START_SEQUENCE};
    use crate::decoder::CollectingDecoder;
    use crate::publish::MemoryPublisher;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut f = SML_START_SEQUENCE.to_vec();
        f.extend_from_slice(payload);
        f.extend_from_slice(&SML_END_SEQUENCE);
        f.extend_from_slice(&[0x01, 0xC3, 0x5A]);
        f
    }

    #[test]
    fn test_push_enters_collecting() {
        let mut ch = Channel::new(0, ChannelConfig::sml("s0"));
        assert_eq!(ch.state(), ChannelState::Idle);
        ch.push(&[]);
        assert_eq!(ch.state(), ChannelState::Idle);
        ch.push(&[0x1B]);
        assert_eq!(ch.state(), ChannelState::Collecting);
        assert_eq!(ch.len(), 1);
    }

    #[test]
    fn test_exact_capacity_is_accepted() {
        let mut ch = Channel::new(0, ChannelConfig::sml("s0").with_capacity(4));
        ch.push(&[1, 2, 3, 4]);
        assert_eq!(ch.len(), 4);
        ch.push(&[5]);
        assert_eq!(ch.state(), ChannelState::Idle);
        assert_eq!(ch.len(), 0);
        assert_eq!(
            ch.stats().last_error,
            Some(FrameError::BufferOverflow { capacity: 4, attempted: 5 })
        );
    }

    #[test]
    fn test_end_of_burst_only_from_collecting() {
        let mut ch = Channel::new(0, ChannelConfig::sml("s0"));
        ch.end_of_burst();
        assert_eq!(ch.state(), ChannelState::Idle);
    }

    #[test]
    fn test_bytes_dropped_while_validating() {
        let mut ch = Channel::new(0, ChannelConfig::sml("s0"));
        ch.push(&frame(&[0x76]));
        ch.end_of_burst();
        ch.push(&[0xAA, 0xBB]);
        assert_eq!(ch.len(), 17);
        assert_eq!(ch.stats().bytes_dropped, 2);
    }

    #[test]
    fn test_line_channel_delivers_text() {
        let mut ch = Channel::new(1, ChannelConfig::line("obis", b'\n'));
        let mut decoder = CollectingDecoder::default();
        let mut publisher = MemoryPublisher::default();

        ch.push(b"1-0:1.8.0(000123.4*kWh)\n");
        ch.end_of_burst();
        ch.tick(Millis(10), &mut decoder, &mut publisher);

        assert_eq!(decoder.frames.len(), 1);
        assert_eq!(decoder.frames[0].0, "obis");
        assert!(ch.has_delivered());
    }

    #[test]
    fn test_throttle_clears_buffer() {
        let mut ch = Channel::new(0, ChannelConfig::sml("s0").with_throttle_ms(1000));
        let mut decoder = CollectingDecoder::default();
        let mut publisher = MemoryPublisher::default();

        ch.push(&frame(&[]));
        ch.end_of_burst();
        ch.tick(Millis(u32::MAX - 100), &mut decoder, &mut publisher);
        assert_eq!(ch.state(), ChannelState::Throttled);
        assert!(ch.is_empty());

        // Deadline lies past the counter wrap.
        ch.tick(Millis(u32::MAX), &mut decoder, &mut publisher);
        assert_eq!(ch.state(), ChannelState::Throttled);
        ch.tick(Millis(899), &mut decoder, &mut publisher);
        assert_eq!(ch.state(), ChannelState::Idle);
    }
}
