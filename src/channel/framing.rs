//! Framing policies and the validation step run in `Validating`.

use serde::{Deserialize, Serialize};

use crate::constants::{SML_END_SEQUENCE, SML_START_SEQUENCE, SML_TRAILER_LENGTH};
use crate::error::FrameError;

/// How a channel recognises a complete frame.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Binary SML transport: escape start marker, end marker, three trailer bytes.
    #[default]
    Sml,
    /// Line-delimited ASCII records (e.g. OBIS text output).
    Line { terminator: u8 },
}

impl Framing {
    /// Smallest buffer that can ever validate under this policy.
    pub fn min_frame_len(&self) -> usize {
        match self {
            Framing::Sml => SML_START_SEQUENCE.len() + SML_TRAILER_LENGTH,
            Framing::Line { .. } => 1,
        }
    }

    /// True if `buffered` looks like it ends on a frame boundary.
    ///
    /// Used where no inter-frame gap can be observed, such as replaying a
    /// capture file.
    pub fn ends_frame(&self, buffered: &[u8]) -> bool {
        match self {
            Framing::Sml => {
                buffered.len() >= self.min_frame_len() && end_marker_in_place(buffered)
            }
            Framing::Line { terminator } => buffered.last() == Some(terminator),
        }
    }

    /// Checks a collected buffer; the trailer beyond the end marker is left
    /// to the decoder.
    pub fn validate(&self, frame: &[u8]) -> Result<(), FrameError> {
        match self {
            Framing::Sml => validate_sml(frame),
            Framing::Line { terminator } => validate_line(frame, *terminator),
        }
    }
}

fn validate_sml(frame: &[u8]) -> Result<(), FrameError> {
    let min = SML_START_SEQUENCE.len() + SML_TRAILER_LENGTH;
    if frame.len() < min {
        return Err(FrameError::FrameTooShort {
            len: frame.len(),
            min,
        });
    }

    if frame[..SML_START_SEQUENCE.len()] != SML_START_SEQUENCE {
        return Err(FrameError::StartMarkerMismatch);
    }

    if !end_marker_in_place(frame) {
        return Err(FrameError::EndMarkerMismatch);
    }

    Ok(())
}

/// The end marker sits exactly at `len - 8`; callers check the length first.
fn end_marker_in_place(buffered: &[u8]) -> bool {
    let end_at = buffered.len() - SML_TRAILER_LENGTH;
    buffered[end_at..end_at + SML_END_SEQUENCE.len()] == SML_END_SEQUENCE
}

/// A line burst must carry at least one terminated record.
fn validate_line(frame: &[u8], terminator: u8) -> Result<(), FrameError> {
    if frame.is_empty() {
        return Err(FrameError::FrameTooShort { len: 0, min: 1 });
    }
    if frame.last() != Some(&terminator) {
        return Err(FrameError::EndMarkerMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sml_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = SML_START_SEQUENCE.to_vec();
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&SML_END_SEQUENCE);
        frame.extend_from_slice(&[0x00, 0xAB, 0xCD]);
        frame
    }

    #[test]
    fn test_minimal_sml_frame_is_valid() {
        let frame = sml_frame(&[]);
        assert_eq!(frame.len(), 16);
        assert_eq!(Framing::Sml.validate(&frame), Ok(()));
    }

    #[test]
    fn test_sml_too_short() {
        let frame = [0x1B; 15];
        assert_eq!(
            Framing::Sml.validate(&frame),
            Err(FrameError::FrameTooShort { len: 15, min: 16 })
        );
    }

    #[test]
    fn test_sml_start_mismatch() {
        let mut frame = sml_frame(&[0x76, 0x05]);
        frame[7] = 0x02;
        assert_eq!(Framing::Sml.validate(&frame), Err(FrameError::StartMarkerMismatch));
    }

    #[test]
    fn test_sml_end_marker_position_is_fixed() {
        // A fourth trailer byte moves the marker away from len - 8.
        let mut frame = sml_frame(&[0x76]);
        frame.push(0xEF);
        assert_eq!(Framing::Sml.validate(&frame), Err(FrameError::EndMarkerMismatch));
    }

    #[test]
    fn test_ends_frame_agrees_with_validation() {
        let frame = sml_frame(&[0x76, 0x05]);
        assert!(Framing::Sml.ends_frame(&frame));

        let mut shifted = frame.clone();
        shifted.push(0xEF);
        assert!(!Framing::Sml.ends_frame(&shifted));
        assert_eq!(Framing::Sml.validate(&shifted), Err(FrameError::EndMarkerMismatch));

        assert!(!Framing::Sml.ends_frame(&frame[..15]));
        assert!(!Framing::Sml.ends_frame(&frame[..frame.len() - 1]));
    }

    #[test]
    fn test_line_framing_ignores_sml_markers() {
        let framing = Framing::Line { terminator: b'\n' };
        assert_eq!(framing.validate(b"1-0:1.8.0*255(001234.5678*kWh)\n"), Ok(()));
        assert_eq!(
            framing.validate(b"1-0:1.8.0*255(0012"),
            Err(FrameError::EndMarkerMismatch)
        );
    }
}
