//! # Frame Decoders
//!
//! A `Decoder` receives each validated frame exactly once, synchronously, from
//! the channel's `Delivering` state. Payload parsing failures are the decoder's
//! own business; nothing it does can push a channel off its state machine.

use log::{debug, trace};

use crate::channel::Framing;
use crate::clock::Millis;
use crate::publish::Publisher;
use crate::util::hex::encode_hex;

/// Where a frame came from.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub channel: &'a str,
    pub channel_index: usize,
    pub framing: &'a Framing,
    pub received_at: Millis,
}

/// Consumer of validated frames.
pub trait Decoder {
    /// Called once per validated frame. Must not block.
    fn decode(&mut self, frame: &[u8], ctx: &FrameContext<'_>, publisher: &mut dyn Publisher);
}

/// Forwards frames without interpreting the payload.
///
/// SML frames are published as one hex string under `{channel}/frame`;
/// line-framed bursts are split and each non-empty record is published as
/// text under `{channel}/line`.
#[derive(Debug, Default)]
pub struct RawFrameDecoder {
    frames: u64,
}

impl RawFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames seen.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Decoder for RawFrameDecoder {
    fn decode(&mut self, frame: &[u8], ctx: &FrameContext<'_>, publisher: &mut dyn Publisher) {
        self.frames += 1;
        match ctx.framing {
            Framing::Sml => {
                debug!("{}: SML frame of {} bytes", ctx.channel, frame.len());
                publisher.publish(&format!("{}/frame", ctx.channel), &encode_hex(frame));
            }
            Framing::Line { terminator } => {
                let key = format!("{}/line", ctx.channel);
                for record in frame.split(|b| b == terminator) {
                    let text = String::from_utf8_lossy(record);
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    trace!("{}: {}", ctx.channel, text);
                    publisher.publish(&key, text);
                }
            }
        }
    }
}

/// Keeps a copy of every frame; used by the `replay` command and in tests.
#[derive(Debug, Default)]
pub struct CollectingDecoder {
    /// `(channel name, frame bytes)` in delivery order.
    pub frames: Vec<(String, Vec<u8>)>,
}

impl Decoder for CollectingDecoder {
    fn decode(&mut self, frame: &[u8], ctx: &FrameContext<'_>, _publisher: &mut dyn Publisher) {
        self.frames.push((ctx.channel.to_string(), frame.to_vec()));
    }
}
