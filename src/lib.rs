//! # sml-gateway - Serial Meter Acquisition for Telemetry Gateways
//!
//! The sml-gateway crate reads smart meters attached to serial lines and
//! forwards their readings to a publisher. It covers two kinds of meters:
//!
//! - push meters that emit SML bursts (or line-delimited OBIS text) on their
//!   optical interface, reassembled and validated by a [`Channel`] per input
//! - Modbus RTU energy meters (Eastron SDM series) polled on a shared RS-485
//!   bus by a single [`PollScheduler`]
//!
//! Both are cooperative state machines advanced by the [`Gateway`] tick driver.
//! No call in the tick path blocks, every error is recovered by discarding and
//! returning to idle, and all deadlines use the wrapping millisecond clock in
//! [`clock`].
//!
//! ## Features
//!
//! - Frame reassembly from arbitrarily sized bursts with overflow protection
//! - SML start/end marker validation, or line framing for ASCII meters
//! - Post-delivery throttling per channel
//! - Round-robin Modbus polling with per-slave intervals, identity discovery,
//!   error accounting and one-value-per-tick publishing
//! - Serial transports and bus driver on `tokio-serial`
//! - JSON configuration, `log`-based diagnostics and a status snapshot
//!
//! ## Usage
//!
//! ```rust
//! use sml_gateway::{Channel, ChannelConfig, Gateway, SharedChannel};
//! use sml_gateway::clock::Millis;
//! use sml_gateway::decoder::RawFrameDecoder;
//! use sml_gateway::publish::MemoryPublisher;
//!
//! let channel = SharedChannel::new(Channel::new(0, ChannelConfig::sml("grid")));
//! let mut gateway = Gateway::new(
//!     vec![channel.clone()],
//!     Box::new(RawFrameDecoder::new()),
//!     Box::new(MemoryPublisher::default()),
//! );
//!
//! channel.push(&[0x1B, 0x1B, 0x1B, 0x1B, 0x01, 0x01, 0x01, 0x01]);
//! channel.push(&[0x1B, 0x1B, 0x1B, 0x1B, 0x1A, 0x00, 0xB8, 0x7C]);
//! channel.end_of_burst();
//! gateway.tick(Millis(0));
//!
//! assert!(gateway.all_channels_delivered());
//! ```

pub mod bus;
pub mod channel;
pub mod clock;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod poll;
pub mod publish;
pub mod transport;
pub mod util;

pub use crate::error::{BusError, FrameError, GatewayError, SlaveError};
pub use crate::logging::{init_logger, init_logger_with_level, log_info};

pub use bus::{Bus, BusPoll, MockBus, SerialBus};
pub use channel::{Channel, ChannelConfig, ChannelState, Framing, SharedChannel};
pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use config::Config;
pub use decoder::{Decoder, FrameContext, RawFrameDecoder};
pub use gateway::{Gateway, GatewayStatus};
pub use poll::{PollConfig, PollScheduler, PollState, RegisterBlock, RegisterLayout, SlaveConfig};
pub use publish::{ErrorSummary, JsonLinesPublisher, LogPublisher, Publisher};
