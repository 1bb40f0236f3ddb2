//! Delimiter framing shared by both wire protocols.
//!
//! BOINC frames end with `0x03`, Folding@home replies end with the `>`
//! prompt. Frames are yielded without their delimiter.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::boinc::{render_request, BoincRequest, BOINC_TERMINATOR};
use crate::error::FrameError;
use crate::fah::{FahCommand, FAH_PROMPT};

/// Largest frame accepted before the stream is considered broken (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Splits a byte stream on a single delimiter byte.
#[derive(Debug, Clone)]
pub struct DelimitedFrames {
    delimiter: u8,
    max_frame_len: usize,
    /// Bytes before this index are known not to contain the delimiter
    next_index: usize,
}

impl DelimitedFrames {
    pub fn new(delimiter: u8) -> Self {
        Self::with_max_len(delimiter, MAX_FRAME_LEN)
    }

    pub fn with_max_len(delimiter: u8, max_frame_len: usize) -> Self {
        Self {
            delimiter,
            max_frame_len,
            next_index: 0,
        }
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }
}

impl Decoder for DelimitedFrames {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        let start = self.next_index.min(buf.len());
        let found = buf
            .get(start..)
            .and_then(|rest| rest.iter().position(|b| *b == self.delimiter));

        match found {
            Some(offset) => {
                let end = start + offset;
                let mut frame = buf.split_to(end + 1);
                frame.truncate(end);
                self.next_index = 0;
                Ok(Some(frame.freeze()))
            }
            None if buf.len() > self.max_frame_len => Err(FrameError::TooLarge {
                max: self.max_frame_len,
            }),
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }
}

// ============================================================================
// BOINC Codec
// ============================================================================

/// GUI-RPC codec: XML requests out, `0x03`-terminated reply frames in.
#[derive(Debug, Clone)]
pub struct BoincCodec {
    frames: DelimitedFrames,
}

impl BoincCodec {
    pub fn new() -> Self {
        Self {
            frames: DelimitedFrames::new(BOINC_TERMINATOR),
        }
    }
}

impl Default for BoincCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BoincCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        self.frames.decode(buf)
    }
}

impl Encoder<BoincRequest> for BoincCodec {
    type Error = FrameError;

    fn encode(&mut self, request: BoincRequest, dst: &mut BytesMut) -> Result<(), FrameError> {
        let xml = render_request(&request);
        dst.reserve(xml.len() + 1);
        dst.extend_from_slice(xml.as_bytes());
        dst.extend_from_slice(&[BOINC_TERMINATOR]);
        Ok(())
    }
}

// ============================================================================
// Folding@home Codec
// ============================================================================

/// Command server codec: newline-terminated commands out, `>`-terminated
/// reply frames in.
#[derive(Debug, Clone)]
pub struct FahCodec {
    frames: DelimitedFrames,
}

impl FahCodec {
    pub fn new() -> Self {
        Self {
            frames: DelimitedFrames::new(FAH_PROMPT),
        }
    }
}

impl Default for FahCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FahCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        self.frames.decode(buf)
    }
}

impl Encoder<FahCommand> for FahCodec {
    type Error = FrameError;

    fn encode(&mut self, command: FahCommand, dst: &mut BytesMut) -> Result<(), FrameError> {
        let line = command.to_line();
        dst.reserve(line.len());
        dst.extend_from_slice(line.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimited_needs_full_frame() {
        let mut codec = DelimitedFrames::new(b'>');
        let mut buf = BytesMut::from(&b"Welcome"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b" to the server\n> ");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"Welcome to the server\n");
        assert_eq!(&buf[..], b" ");
    }

    #[test]
    fn test_delimited_yields_frames_in_order() {
        let mut codec = DelimitedFrames::new(0x03);
        let mut buf = BytesMut::from(&b"<a/>\x03<b/>\x03<c"[..]);
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"<a/>");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"<b/>");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"<c");
    }

    #[test]
    fn test_delimited_empty_frame() {
        let mut codec = DelimitedFrames::new(0x03);
        let mut buf = BytesMut::from(&b"\x03"[..]);
        assert!(codec.decode(&mut buf).unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_delimited_rejects_oversized_frame() {
        let mut codec = DelimitedFrames::with_max_len(b'>', 8);
        let mut buf = BytesMut::from(&b"0123456789"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::TooLarge { max: 8 })
        ));
    }

    #[test]
    fn test_delimited_resumes_scan_after_partial_read() {
        let mut codec = DelimitedFrames::new(b'>');
        let mut buf = BytesMut::from(&b"abc"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"def>");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"abcdef");
    }

    #[test]
    fn test_boinc_encoder_appends_terminator() {
        let mut codec = BoincCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(BoincRequest::GetState, &mut dst).unwrap();
        assert_eq!(dst.last(), Some(&BOINC_TERMINATOR));
        let text = std::str::from_utf8(&dst[..dst.len() - 1]).unwrap();
        assert!(text.starts_with("<boinc_gui_rpc_request>"));
        assert!(text.contains("<get_state/>"));
    }

    #[test]
    fn test_fah_encoder_writes_line() {
        let mut codec = FahCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(FahCommand::SlotInfo, &mut dst).unwrap();
        assert_eq!(&dst[..], b"slot-info\n");
    }
}
