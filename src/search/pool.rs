//! Bounded block pool for decompression scratch space.
//!
//! The pool caps the total bytes handed out at once; together with the work
//! queue's byte budget this bounds resident memory for the whole search.
//! Allocation blocks when the budget is spent, and releasing a block wakes
//! one of the waiters.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex};

/// Freed buffers kept around for reuse.
const MAX_FREE_BLOCKS: usize = 16;

pub struct BlockPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    block_size: usize,
    budget: usize,
    state: Mutex<PoolState>,
    freed: Condvar,
}

struct PoolState {
    outstanding: usize,
    free: Vec<Box<[u8]>>,
}

impl BlockPool {
    /// `block_size` is the nominal allocation granularity; `budget` caps the
    /// total outstanding bytes.
    pub fn new(block_size: usize, budget: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                block_size,
                budget,
                state: Mutex::new(PoolState {
                    outstanding: 0,
                    free: Vec::new(),
                }),
                freed: Condvar::new(),
            }),
        }
    }

    /// Allocate a block of at least `len` bytes, blocking while the budget
    /// is exhausted. A request larger than the whole budget is admitted once
    /// nothing else is outstanding, so it cannot deadlock.
    pub fn allocate(&self, len: usize) -> PoolBlock {
        let charge = len.max(self.inner.block_size);

        let mut state = self.inner.state.lock().unwrap();
        while state.outstanding > 0 && state.outstanding + charge > self.inner.budget {
            state = self.inner.freed.wait(state).unwrap();
        }

        let buf = match state.free.iter().position(|b| b.len() >= len) {
            Some(pos) => state.free.swap_remove(pos),
            None => vec![0u8; charge].into_boxed_slice(),
        };
        state.outstanding += buf.len();

        PoolBlock {
            len,
            buf: Some(buf),
            pool: Arc::clone(&self.inner),
        }
    }

    #[cfg(test)]
    fn outstanding(&self) -> usize {
        self.inner.state.lock().unwrap().outstanding
    }
}

/// A byte buffer leased from the pool; returned (and possibly recycled) on
/// drop.
pub struct PoolBlock {
    len: usize,
    buf: Option<Box<[u8]>>,
    pool: Arc<PoolInner>,
}

impl Deref for PoolBlock {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // buf is Some until drop
        &self.buf.as_ref().unwrap()[..self.len]
    }
}

impl DerefMut for PoolBlock {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf.as_mut().unwrap()[..self.len]
    }
}

impl Drop for PoolBlock {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            let mut state = self.pool.state.lock().unwrap();
            state.outstanding -= buf.len();
            if state.free.len() < MAX_FREE_BLOCKS {
                state.free.push(buf);
            }
            drop(state);
            self.pool.freed.notify_all();
        }
    }
}
