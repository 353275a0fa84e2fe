//! Ordered output: per-chunk buffers flushed in submission order.
//!
//! Workers append to private buffers, so only flushes take the lock. The
//! writer only ever emits the chunk whose index matches the emit cursor;
//! `end` hands a completed buffer over and drains as many consecutive
//! completed chunks as possible. Chunks therefore never interleave.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Condvar, Mutex};

pub struct OrderedOutput {
    inner: Mutex<Inner>,
    head_advanced: Condvar,
    max_buffered: usize,
    flush_threshold: usize,
}

struct Inner {
    writer: Box<dyn Write + Send>,
    /// Index of the next chunk to emit.
    next: u32,
    /// Completed buffers waiting for lower-indexed chunks to finish.
    completed: BTreeMap<u32, Vec<u8>>,
    /// First write failure; later output is discarded.
    error: Option<io::Error>,
}

/// Append-only output buffer for one chunk, owned by the worker scanning it.
pub struct OutputChunk {
    index: u32,
    buffer: Vec<u8>,
}

impl OutputChunk {
    /// Drop anything buffered but not yet emitted (used when a chunk fails
    /// mid-scan so no partial output is committed).
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl OrderedOutput {
    pub fn new(writer: Box<dyn Write + Send>, max_buffered: usize, flush_threshold: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                writer,
                next: 0,
                completed: BTreeMap::new(),
                error: None,
            }),
            head_advanced: Condvar::new(),
            max_buffered,
            flush_threshold,
        }
    }

    pub fn begin(&self, index: u32) -> OutputChunk {
        OutputChunk {
            index,
            buffer: Vec::new(),
        }
    }

    /// Append bytes to the chunk's buffer. The head chunk writes through
    /// once past the flush threshold; a non-head chunk that hits the buffer
    /// ceiling waits until it becomes the head. FIFO task dispatch
    /// guarantees the head chunk's task is never queued behind a waiter.
    pub fn write(&self, chunk: &mut OutputChunk, bytes: &[u8]) {
        chunk.buffer.extend_from_slice(bytes);

        if chunk.buffer.len() < self.flush_threshold {
            return;
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.next != chunk.index {
            if chunk.buffer.len() < self.max_buffered {
                return;
            }
            while inner.next != chunk.index {
                inner = self.head_advanced.wait(inner).unwrap();
            }
        }
        inner.emit(&chunk.buffer);
        chunk.buffer.clear();
    }

    /// Mark the chunk complete. When it is the head, its buffer and any
    /// consecutive completed successors are emitted immediately.
    pub fn end(&self, chunk: OutputChunk) {
        let mut inner = self.inner.lock().unwrap();

        if inner.next == chunk.index {
            inner.emit(&chunk.buffer);
            inner.next += 1;

            loop {
                let next = inner.next;
                let Some(buffer) = inner.completed.remove(&next) else {
                    break;
                };
                inner.emit(&buffer);
                inner.next += 1;
            }

            drop(inner);
            self.head_advanced.notify_all();
        } else {
            inner.completed.insert(chunk.index, chunk.buffer);
        }
    }

    /// Flush the underlying writer and surface the first write error.
    pub fn finish(&self) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.error.take() {
            return Err(err);
        }
        inner.writer.flush()
    }
}

impl Inner {
    fn emit(&mut self, bytes: &[u8]) {
        if self.error.is_none() {
            if let Err(err) = self.writer.write_all(bytes) {
                self.error = Some(err);
            }
        }
    }
}
