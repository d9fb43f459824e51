//! Bounded pool of reusable byte buffers.
//!
//! Response bodies for `/read` are produced into pooled buffers so that the
//! memory held by in-flight streams is capped at `count * capacity` no
//! matter how many clients are connected. Producers block in [`acquire`]
//! when the pool is exhausted; they run on blocking worker tasks, so the
//! wait never stalls the async executor.
//!
//! [`acquire`]: BufferPool::acquire

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Capacity a pooled buffer is trimmed back to when released.
pub const DEFAULT_BUFFER_CAPACITY: usize = 512 * 1024;

struct State {
    free: Vec<Vec<u8>>,
    outstanding: usize,
}

/// Fixed-size pool of byte buffers.
pub struct BufferPool {
    state: Mutex<State>,
    available: Condvar,
    count: usize,
}

impl BufferPool {
    pub fn new(count: usize) -> Arc<BufferPool> {
        let count = count.max(1);
        Arc::new(BufferPool {
            state: Mutex::new(State {
                free: (0..count).map(|_| Vec::new()).collect(),
                outstanding: 0,
            }),
            available: Condvar::new(),
            count,
        })
    }

    /// Take a buffer, blocking until one is free.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let mut state = self.lock();
        while state.free.is_empty() {
            state = self
                .available
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        let mut buf = state.free.pop().unwrap_or_default();
        buf.clear();
        state.outstanding += 1;
        drop(state);

        PooledBuffer {
            pool: Arc::clone(self),
            buf: Some(buf),
        }
    }

    /// Buffers currently handed out.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        if buf.capacity() > DEFAULT_BUFFER_CAPACITY {
            buf.shrink_to(DEFAULT_BUFFER_CAPACITY);
        }
        let mut state = self.lock();
        state.free.push(buf);
        state.outstanding -= 1;
        drop(state);
        self.available.notify_one();
    }
}

/// RAII handle to a pooled buffer; returns its storage on drop.
pub struct PooledBuffer {
    pool: Arc<BufferPool>,
    buf: Option<Vec<u8>>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        self.buf.as_ref().unwrap_or(&EMPTY)
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.get_or_insert_with(Vec::new)
    }
}

static EMPTY: Vec<u8> = Vec::new();

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
