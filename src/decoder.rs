//! Stacked JSON decoding
//!
//! A cohort export stores one JSON object per user, written back to back with
//! no separator: `{"userInfo": ...}{"userInfo": ...}`. [`StackedRecordDecoder`]
//! walks such a buffer and yields each object once it has been fully parsed.

use serde_json::{Deserializer, Value};
use tracing::debug;

/// Lazy decoder over back-to-back JSON documents.
///
/// Iteration stops silently at the first position where no complete document
/// can be parsed, which is normally the end of input. Partial trailing data is
/// never consumed; [`remainder`](Self::remainder) exposes it.
#[derive(Debug, Clone)]
pub struct StackedRecordDecoder<'a> {
    input: &'a str,
    pos: usize,
    exhausted: bool,
}

impl<'a> StackedRecordDecoder<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            exhausted: false,
        }
    }

    /// Byte offset just past the last emitted document
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Input left after the last emitted document
    pub fn remainder(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Restart decoding from the beginning of the input
    pub fn reset(&mut self) {
        self.pos = 0;
        self.exhausted = false;
    }
}

impl Iterator for StackedRecordDecoder<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if self.exhausted {
            return None;
        }

        let rest = &self.input[self.pos..];
        let mut stream = Deserializer::from_str(rest).into_iter::<Value>();

        match stream.next() {
            Some(Ok(value)) => {
                self.pos += stream.byte_offset();
                Some(value)
            }
            Some(Err(e)) => {
                let trailing = rest.trim_start().len();
                debug!(
                    position = self.pos,
                    trailing_bytes = trailing,
                    error = %e,
                    "stacked decode stopped"
                );
                self.exhausted = true;
                None
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}

/// Decode every complete document in `input`
pub fn decode_stacked(input: &str) -> Vec<Value> {
    StackedRecordDecoder::new(input).collect()
}
