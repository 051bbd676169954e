//! # Hex Helpers
//!
//! Thin wrappers over the `hex` crate for frame dumps in logs, the JSON
//! publisher and the `replay` command, which also accepts captures saved as
//! hex text.

use thiserror::Error;

/// Errors that can occur while reading hex text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

/// Lowercase hex without separators.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decodes hex text, ignoring whitespace and line breaks.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }
    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }
    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// "1b 1b 1b 1b" style, for log lines.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Offset, hex and ASCII columns, one line per `bytes_per_line` bytes.
pub fn pretty_hex(data: &[u8], bytes_per_line: usize) -> String {
    let width = bytes_per_line.max(1);
    data.chunks(width)
        .enumerate()
        .map(|(i, chunk)| {
            let hex = format_hex_compact(chunk);
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!("{:04x}: {:<pad$} |{}|", i * width, hex, ascii, pad = width * 3 - 1)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_capture_with_line_breaks() {
        let text = "1b1b1b1b 01010101\n7605\n";
        assert_eq!(
            decode_hex(text).unwrap(),
            vec![0x1B, 0x1B, 0x1B, 0x1B, 0x01, 0x01, 0x01, 0x01, 0x76, 0x05]
        );
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode_hex("  "), Err(HexError::EmptyString));
        assert_eq!(decode_hex("1b1"), Err(HexError::OddLength(3)));
        assert!(matches!(decode_hex("zz"), Err(HexError::DecodeError(_))));
    }

    #[test]
    fn test_pretty_hex_columns() {
        let dump = pretty_hex(b"AB\x1b", 2);
        assert_eq!(dump, "0000: 41 42 |AB|\n0002: 1b    |.|");
    }
}
