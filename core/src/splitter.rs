//! Splits a file's byte stream into JSON documents as chunks arrive.
//!
//! Chunk boundaries come from the blob store and have no relation to document
//! boundaries, so the splitter keeps the undecoded tail of each chunk and
//! prepends it to the next one.

use serde_json::Deserializer;
use serde_json::value::RawValue;

use crate::errors::EnqueueError;

/// One complete JSON document, kept as its raw bytes.
pub type Document = Box<RawValue>;

pub struct DocumentSplitter {
    buffer: Vec<u8>,
    size_limit: usize,
    documents_seen: usize,
}

impl DocumentSplitter {
    pub fn new(size_limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            size_limit,
            documents_seen: 0,
        }
    }

    /// Number of complete documents decoded so far.
    pub fn documents_seen(&self) -> usize {
        self.documents_seen
    }

    /// Bytes carried over from previous chunks, waiting for more input.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Appends `chunk` and returns every document completed by it, in order.
    ///
    /// A document cut off by the end of the chunk stays buffered, unless
    /// `is_last` is set, in which case it is reported as malformed input. A
    /// buffered tail that already exceeds the size limit is rejected without
    /// waiting for the rest of it.
    pub fn feed(&mut self, chunk: &[u8], is_last: bool) -> Result<Vec<Document>, EnqueueError> {
        self.buffer.extend_from_slice(chunk);

        let mut documents = Vec::new();
        let mut stream = Deserializer::from_slice(&self.buffer).into_iter::<Document>();

        let consumed = loop {
            let start = stream.byte_offset();
            match stream.next() {
                None => break stream.byte_offset(),
                Some(Ok(document)) => {
                    // a bare number at the very end may continue in the next chunk
                    if !is_last
                        && stream.byte_offset() == self.buffer.len()
                        && !is_self_delimited(document.get())
                    {
                        break start;
                    }

                    if document.get().len() > self.size_limit {
                        return Err(self.too_large(document.get().len()));
                    }

                    self.documents_seen += 1;
                    documents.push(document);
                }
                Some(Err(err)) if is_truncated(&err, &self.buffer) => {
                    if is_last {
                        return Err(EnqueueError::MalformedInput {
                            reason: format!(
                                "file ends in the middle of document {}: {}",
                                self.documents_seen, err
                            ),
                        });
                    }
                    break stream.byte_offset();
                }
                Some(Err(err)) => {
                    return Err(EnqueueError::from(err)
                        .context(format!("document {}", self.documents_seen)));
                }
            }
        };

        drop(stream);
        self.buffer.drain(..consumed);
        if is_last {
            self.buffer.clear();
        }

        let pending = self
            .buffer
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map_or(0, |first| self.buffer.len() - first);
        if pending > self.size_limit {
            return Err(self.too_large(pending));
        }

        Ok(documents)
    }

    fn too_large(&self, size: usize) -> EnqueueError {
        EnqueueError::PayloadTooLarge {
            size,
            limit: self.size_limit,
        }
        .context(format!("document {}", self.documents_seen))
    }
}

/// Whether decoding stopped because the input ran out rather than on a bad byte.
///
/// Numbers cut after `.`, `e` or `-` fail as invalid numbers instead of
/// end of input, so an error positioned at the end of the buffer counts too.
fn is_truncated(err: &serde_json::Error, buffer: &[u8]) -> bool {
    if err.is_eof() {
        return true;
    }
    let start_of_line = buffer
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |newline| newline + 1);
    let line = 1 + buffer[..start_of_line].iter().filter(|b| **b == b'\n').count();
    err.line() == line && err.column() == buffer.len() - start_of_line
}

fn is_self_delimited(raw: &str) -> bool {
    matches!(raw.as_bytes().first(), Some(b'{' | b'[' | b'"'))
}
