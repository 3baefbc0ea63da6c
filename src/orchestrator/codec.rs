//! Line codec for supervised program output.
//!
//! Frames a byte stream into text lines for relay. Unlike
//! [`tokio_util::codec::LinesCodec`] it never fails on content: invalid
//! UTF-8 is replaced, and an overlong line is cut at [`MAX_LINE_BYTES`]
//! with the remainder discarded up to the next newline, so one bad line
//! cannot end the stream.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use study_supervisor::orchestrator::codec::RelayCodec;
//!
//! let lines = FramedRead::new(child_stdout, RelayCodec::new());
//! ```

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::{AppError, Result};

/// Maximum bytes kept from a single output line: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline framing with lossy UTF-8 and trailing-whitespace trimming.
#[derive(Debug, Default)]
pub struct RelayCodec {
    /// Bytes already scanned for `\n` in the current buffer.
    next_index: usize,
    /// Inside an overlong line whose prefix was already emitted.
    discarding: bool,
}

impl RelayCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RelayCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let scan_from = self.next_index.min(src.len());
            let newline = src[scan_from..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| scan_from + offset);

            match newline {
                Some(end) => {
                    let raw = src.split_to(end + 1);
                    self.next_index = 0;
                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    return Ok(Some(to_line(&raw[..end])));
                }
                None if self.discarding => {
                    src.clear();
                    self.next_index = 0;
                    return Ok(None);
                }
                None if src.len() > MAX_LINE_BYTES => {
                    let head = src.split_to(MAX_LINE_BYTES);
                    src.clear();
                    self.next_index = 0;
                    self.discarding = true;
                    return Ok(Some(to_line(&head)));
                }
                None => {
                    self.next_index = src.len();
                    return Ok(None);
                }
            }
        }
    }

    /// Emit a final unterminated fragment, such as an input prompt.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split_to(src.len());
        self.next_index = 0;
        if std::mem::take(&mut self.discarding) {
            return Ok(None);
        }
        Ok(Some(to_line(&rest)))
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = &bytes[..bytes.len().min(MAX_LINE_BYTES)];
    String::from_utf8_lossy(bytes).trim_end().to_owned()
}
