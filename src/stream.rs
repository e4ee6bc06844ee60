//! Streaming Result Decoding
//!
//! The JQL endpoint answers with a single JSON array. [`ArrayDecoder`] splits
//! that array into its elements incrementally: bytes are fed in as they
//! arrive and each element is decoded as soon as its last byte is seen. Only
//! the bytes of the element currently being read are buffered.
//!
//! Two front ends share the decoder:
//!
//! - [`decode_stream`] for async byte streams (HTTP response bodies)
//! - [`decode_reader`] for blocking readers (saved responses)

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use std::io::{BufRead, BufReader, Read};
use std::pin::Pin;
use thiserror::Error;

/// Errors found while decoding a result array
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The response did not start with `[`
    #[error("expected '[' at byte {offset}, found {found:?}")]
    ExpectedArray { offset: u64, found: char },

    /// A structural byte where none is allowed
    #[error("unexpected {found:?} at byte {offset}")]
    Unexpected { offset: u64, found: char },

    /// An element is not valid JSON
    #[error("malformed element starting at byte {offset}: {source}")]
    Malformed {
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    /// The input ended before the closing `]`
    #[error("response ended inside the result array at byte {offset}")]
    UnexpectedEof { offset: u64 },

    /// Reading the underlying input failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Before the opening `[`
    Start,
    /// After `[` or `,`
    BeforeElement { first: bool },
    InElement,
    /// After an element, expecting `,` or `]`
    AfterElement,
    /// After the closing `]`
    Done,
}

/// Incremental splitter for a top-level JSON array
#[derive(Debug)]
pub struct ArrayDecoder {
    phase: Phase,
    depth: usize,
    in_string: bool,
    escaped: bool,
    element: Vec<u8>,
    element_start: u64,
    offset: u64,
}

impl Default for ArrayDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrayDecoder {
    pub fn new() -> Self {
        Self {
            phase: Phase::Start,
            depth: 0,
            in_string: false,
            escaped: false,
            element: Vec::new(),
            element_start: 0,
            offset: 0,
        }
    }

    /// Consume bytes from `input` until an element completes or the input runs out
    ///
    /// Returns the number of bytes consumed and the completed element, if any.
    /// Call again with the unconsumed remainder to continue.
    pub fn decode(&mut self, input: &[u8]) -> Result<(usize, Option<Value>), DecodeError> {
        for (i, &b) in input.iter().enumerate() {
            let pos = self.offset;
            self.offset += 1;

            match self.phase {
                Phase::Start => match b {
                    _ if is_json_whitespace(b) => {}
                    b'[' => self.phase = Phase::BeforeElement { first: true },
                    _ => {
                        return Err(DecodeError::ExpectedArray {
                            offset: pos,
                            found: char::from(b),
                        })
                    }
                },
                Phase::BeforeElement { first } => match b {
                    _ if is_json_whitespace(b) => {}
                    b']' if first => self.phase = Phase::Done,
                    b',' | b']' | b'}' => return Err(unexpected(pos, b)),
                    _ => {
                        self.phase = Phase::InElement;
                        self.element_start = pos;
                        if let Some(value) = self.scan(pos, b)? {
                            return Ok((i + 1, Some(value)));
                        }
                    }
                },
                Phase::InElement => {
                    if let Some(value) = self.scan(pos, b)? {
                        return Ok((i + 1, Some(value)));
                    }
                }
                Phase::AfterElement => match b {
                    _ if is_json_whitespace(b) => {}
                    b',' => self.phase = Phase::BeforeElement { first: false },
                    b']' => self.phase = Phase::Done,
                    _ => return Err(unexpected(pos, b)),
                },
                Phase::Done => {
                    if !is_json_whitespace(b) {
                        return Err(unexpected(pos, b));
                    }
                }
            }
        }
        Ok((input.len(), None))
    }

    /// Check that the whole array was read
    pub fn finish(&self) -> Result<(), DecodeError> {
        match self.phase {
            Phase::Done => Ok(()),
            _ => Err(DecodeError::UnexpectedEof {
                offset: self.offset,
            }),
        }
    }

    /// True once the closing `]` has been read
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Feed one byte of the current element; returns the element once complete
    fn scan(&mut self, pos: u64, b: u8) -> Result<Option<Value>, DecodeError> {
        if self.in_string {
            self.element.push(b);
            if self.escaped {
                self.escaped = false;
            } else if b == b'\\' {
                self.escaped = true;
            } else if b == b'"' {
                self.in_string = false;
                if self.depth == 0 {
                    return self.complete(Phase::AfterElement).map(Some);
                }
            }
            return Ok(None);
        }

        match b {
            b'"' => {
                self.in_string = true;
                self.element.push(b);
            }
            b'{' | b'[' => {
                self.depth += 1;
                self.element.push(b);
            }
            b'}' | b']' if self.depth > 0 => {
                self.depth -= 1;
                self.element.push(b);
                if self.depth == 0 {
                    return self.complete(Phase::AfterElement).map(Some);
                }
            }
            // A scalar element ends at the first delimiter after it
            b',' if self.depth == 0 => {
                return self
                    .complete(Phase::BeforeElement { first: false })
                    .map(Some)
            }
            b']' if self.depth == 0 => return self.complete(Phase::Done).map(Some),
            b'}' => return Err(unexpected(pos, b)),
            _ if self.depth == 0 && is_json_whitespace(b) => {
                return self.complete(Phase::AfterElement).map(Some)
            }
            _ => self.element.push(b),
        }
        Ok(None)
    }

    fn complete(&mut self, next: Phase) -> Result<Value, DecodeError> {
        let result = serde_json::from_slice(&self.element);
        self.element.clear();
        self.phase = next;
        result.map_err(|source| DecodeError::Malformed {
            offset: self.element_start,
            source,
        })
    }
}

/// Space, tab, LF and CR only; form feed is not JSON whitespace
fn is_json_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

fn unexpected(offset: u64, b: u8) -> DecodeError {
    DecodeError::Unexpected {
        offset,
        found: char::from(b),
    }
}

/// A boxed stream of decoded rows
pub type BoxRowStream<E> = Pin<Box<dyn Stream<Item = Result<Value, E>> + Send>>;

/// Decode rows lazily from a stream of byte chunks
///
/// Chunks are pulled only as rows are consumed. The stream ends after the
/// first error; rows yielded before it stay valid. Dropping the stream drops
/// the byte source.
pub fn decode_stream<S, E>(bytes: S) -> BoxRowStream<E>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: From<DecodeError> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut decoder = ArrayDecoder::new();
        let mut bytes = Box::pin(bytes);

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut rest: &[u8] = &chunk;
            while !rest.is_empty() {
                match decoder.decode(rest) {
                    Ok((used, row)) => {
                        rest = &rest[used..];
                        if let Some(row) = row {
                            tracing::trace!("decoded row");
                            yield Ok(row);
                        }
                    }
                    Err(e) => {
                        yield Err(E::from(e));
                        return;
                    }
                }
            }
        }

        if let Err(e) = decoder.finish() {
            yield Err(E::from(e));
        }
    };

    Box::pin(stream)
}

/// Decode rows lazily from a blocking reader
pub fn decode_reader<R: Read>(reader: R) -> ReaderRows<R> {
    ReaderRows {
        reader: BufReader::new(reader),
        decoder: ArrayDecoder::new(),
        finished: false,
    }
}

/// Iterator returned by [`decode_reader`]
pub struct ReaderRows<R: Read> {
    reader: BufReader<R>,
    decoder: ArrayDecoder,
    finished: bool,
}

impl<R: Read> ReaderRows<R> {
    fn next_row(&mut self) -> Result<Option<Value>, DecodeError> {
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                self.decoder.finish()?;
                return Ok(None);
            }
            let (used, row) = self.decoder.decode(buf)?;
            self.reader.consume(used);
            if row.is_some() {
                return Ok(row);
            }
        }
    }
}

impl<R: Read> Iterator for ReaderRows<R> {
    type Item = Result<Value, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
