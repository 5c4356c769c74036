//! Incremental extraction of JSON records from a token stream.
//!
//! Engines stream free text in arbitrary chunks; the records we care about
//! are JSON objects somewhere inside it, possibly surrounded by prose,
//! markdown fences, or malformed fragments. The assembler keeps one buffer per
//! turn and a cursor past everything already consumed:
//!
//! - the next candidate starts at the first unconsumed `{`;
//! - a candidate cut short by the end of the buffer waits for more input;
//! - a complete object is validated, emitted if valid, and skipped either way;
//! - anything that is not JSON at all advances the cursor by one character.
//!
//! Every byte range is decoded into at most one record, and chunk boundaries
//! never change what is emitted.

use std::marker::PhantomData;

use serde_json::Value;
use tracing::debug;

use super::{Assembled, Decision};

pub type DecisionAssembler = StreamAssembler<Decision>;

#[derive(Debug)]
pub struct StreamAssembler<T> {
    buffer: String,
    cursor: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: Assembled> Default for StreamAssembler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Assembled> StreamAssembler<T> {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            cursor: 0,
            _record: PhantomData,
        }
    }

    /// Drop all buffered text. Called at the start of every turn.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    /// Append a fragment and return the records it completed, in the order
    /// their closing braces appear.
    pub fn push(&mut self, fragment: &str) -> Vec<T> {
        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
        self.buffer.push_str(fragment);
        self.scan(false)
    }

    /// Flush at end of stream. A candidate still waiting for input can never
    /// complete, so it is skipped like malformed text and any records nested
    /// inside it are recovered.
    pub fn finish(&mut self) -> Vec<T> {
        let records = self.scan(true);
        self.reset();
        records
    }

    /// Convenience for complete texts such as non-streaming engine replies.
    pub fn extract_all(text: &str) -> Vec<T> {
        let mut assembler = Self::new();
        let mut records = assembler.push(text);
        records.extend(assembler.finish());
        records
    }

    /// Text received but not yet consumed.
    pub fn pending(&self) -> &str {
        &self.buffer[self.cursor..]
    }

    fn scan(&mut self, at_end: bool) -> Vec<T> {
        let mut records = Vec::new();
        loop {
            let Some(offset) = self.buffer[self.cursor..].find('{') else {
                self.cursor = self.buffer.len();
                break;
            };
            let start = self.cursor + offset;

            let mut stream =
                serde_json::Deserializer::from_str(&self.buffer[start..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) => {
                    self.cursor = start + stream.byte_offset();
                    match T::from_json(value) {
                        Ok(record) => records.push(record),
                        Err(err) => debug!(error = %err, "skipping schema-invalid object"),
                    }
                }
                Some(Err(err)) if err.is_eof() && !at_end => {
                    self.cursor = start;
                    break;
                }
                Some(Err(_)) => {
                    // '{' is a single byte, so this stays on a char boundary.
                    self.cursor = start + 1;
                }
                None => {
                    self.cursor = start;
                    break;
                }
            }
        }
        records
    }
}
