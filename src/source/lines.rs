//! Incremental line reassembly over arbitrary byte chunks.

use std::collections::VecDeque;
use tracing::warn;

use crate::emit;
use crate::metrics::events::LossyDecode;

/// Turns a sequence of byte chunks into the lines [`str::lines`] would
/// produce over their concatenation.
///
/// An incomplete UTF-8 sequence at the end of a chunk is held until the
/// next one; invalid bytes become U+FFFD and are logged once per chunk.
#[derive(Debug)]
pub(crate) struct LineDecoder {
    origin: String,
    /// Undecoded tail of the previous chunk.
    pending: Vec<u8>,
    /// Text after the last newline seen so far.
    partial: String,
    ready: VecDeque<String>,
}

impl LineDecoder {
    pub(crate) fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            pending: Vec::new(),
            partial: String::new(),
            ready: VecDeque::new(),
        }
    }

    /// Feed chunk number `chunk`.
    pub(crate) fn push(&mut self, bytes: &[u8], chunk: u64) {
        self.pending.extend_from_slice(bytes);
        self.decode(chunk, false);
        self.split_lines();
    }

    /// Flush whatever is left after the last chunk.
    pub(crate) fn finish(&mut self, chunk: u64) {
        if !self.pending.is_empty() {
            self.decode(chunk, true);
            self.split_lines();
        }
        if !self.partial.is_empty() {
            self.ready.push_back(std::mem::take(&mut self.partial));
        }
    }

    pub(crate) fn next_line(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    /// Move the decodable prefix of `pending` into `partial`.
    ///
    /// An incomplete sequence at the end is left in `pending` unless `eof`.
    fn decode(&mut self, chunk: u64, eof: bool) {
        let mut lossy = false;
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.partial.push_str(text);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    self.partial.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            self.partial.push(char::REPLACEMENT_CHARACTER);
                            lossy = true;
                            rest = &after[bad..];
                        }
                        None if eof => {
                            self.partial.push(char::REPLACEMENT_CHARACTER);
                            lossy = true;
                            rest = &[];
                            break;
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();

        if lossy {
            warn!(
                origin = %self.origin,
                chunk,
                "Replaced invalid UTF-8 while decoding chunk"
            );
            emit!(LossyDecode { chunk });
        }
    }

    fn split_lines(&mut self) {
        let Some(last_newline) = self.partial.rfind('\n') else {
            return;
        };
        let tail = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, tail);

        for line in complete[..last_newline].split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            self.ready.push_back(line.to_string());
        }
    }
}
