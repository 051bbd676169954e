//! # Utility Modules
//!
//! Hex formatting and rate-limited logging shared by the channel, bus and
//! command-line code.

pub mod hex;
pub mod logging;

pub use self::hex::{decode_hex, encode_hex, format_hex_compact, pretty_hex, HexError};
pub use self::logging::{log_frame_hex, LogThrottle};
