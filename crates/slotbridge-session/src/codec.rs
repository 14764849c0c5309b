//! Frame codec.
//!
//! Messages are self-delimited JSON objects on a byte stream, separated by a
//! single delimiter byte (newline or NUL, fixed per deployment).

use serde_json::Value;
use slotbridge_core::FrameDelimiter;

/// Frame-level failure. An oversized frame is unrecoverable for the current
/// connection since the delimiter may never arrive.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame exceeds maximum length ({len} > {max} bytes)")]
    Oversized { len: usize, max: usize },
}

/// Serialize one outbound message, delimiter appended.
pub fn encode_frame(message: &Value, delimiter: FrameDelimiter) -> Vec<u8> {
    let mut bytes = message.to_string().into_bytes();
    bytes.push(delimiter.byte());
    bytes
}

/// Incremental frame splitter.
///
/// Feed raw reads in with [`extend`](Self::extend), pull complete frames out
/// with [`next_frame`](Self::next_frame) until it returns `Ok(None)`.
#[derive(Debug)]
pub struct FrameBuffer {
    delimiter: u8,
    max_len: usize,
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(delimiter: FrameDelimiter, max_len: usize) -> Self {
        Self {
            delimiter: delimiter.byte(),
            max_len,
            buf: Vec::new(),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete frame, without its delimiter.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        match self.buf.iter().position(|&b| b == self.delimiter) {
            Some(pos) => {
                let mut frame: Vec<u8> = self.buf.drain(..=pos).collect();
                frame.pop();
                Ok(Some(frame))
            }
            None if self.buf.len() > self.max_len => Err(FrameError::Oversized {
                len: self.buf.len(),
                max: self.max_len,
            }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_appends_delimiter() {
        let frame = encode_frame(&json!({"method": "hello", "id": "1"}), FrameDelimiter::Newline);
        assert_eq!(*frame.last().unwrap(), b'\n');

        let frame = encode_frame(&json!({"notification": "x"}), FrameDelimiter::Nul);
        assert_eq!(*frame.last().unwrap(), 0);
    }

    #[test]
    fn test_split_across_reads() {
        let mut fb = FrameBuffer::new(FrameDelimiter::Newline, 1024);
        fb.extend(b"{\"id\":");
        assert!(fb.next_frame().unwrap().is_none());
        fb.extend(b"\"1\"}\n{\"id\":\"2\"}\n");
        assert_eq!(fb.next_frame().unwrap().unwrap(), b"{\"id\":\"1\"}");
        assert_eq!(fb.next_frame().unwrap().unwrap(), b"{\"id\":\"2\"}");
        assert!(fb.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_nul_delimited() {
        let mut fb = FrameBuffer::new(FrameDelimiter::Nul, 1024);
        fb.extend(b"{\"notification\":\"ping\"}\x00");
        assert_eq!(fb.next_frame().unwrap().unwrap(), b"{\"notification\":\"ping\"}");
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut fb = FrameBuffer::new(FrameDelimiter::Newline, 8);
        fb.extend(b"0123456789abcdef");
        assert!(matches!(
            fb.next_frame(),
            Err(FrameError::Oversized { len: 16, max: 8 })
        ));
    }
}
