//! Fixed ring of output buffers shared with the device completion path
//!
//! The producer fills the buffer under the cursor, marks it in flight and
//! hands it to the device. The device reports each finished buffer through
//! a `CompletionHandle`, which flips it back to free and wakes the producer.
//!
//! State lives behind one mutex. The completion side only touches the
//! counter and the buffer's state flag so it never waits on the producer.

use crate::error::{Error, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Index of a buffer within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(usize);

impl BufferId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Free,
    InFlight,
}

#[derive(Debug)]
struct PoolState {
    states: Vec<BufferState>,
    free_count: usize,
    completions: u64,
    /// Notifications for buffers that were not in flight
    spurious: u64,
}

#[derive(Debug)]
struct PoolShared {
    state: Mutex<PoolState>,
    freed: Condvar,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle the device uses to report finished buffers
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    shared: Arc<PoolShared>,
}

impl CompletionHandle {
    /// Mark a buffer as played.
    ///
    /// Safe to call from a real-time callback: holds the lock only for a
    /// flag flip and a counter increment, and never logs.
    pub fn notify(&self, id: BufferId) {
        {
            let mut state = self.shared.lock();
            match state.states.get(id.0).copied() {
                Some(BufferState::InFlight) => {
                    state.states[id.0] = BufferState::Free;
                    state.free_count += 1;
                    state.completions += 1;
                }
                _ => state.spurious += 1,
            }
        }
        self.shared.freed.notify_all();
    }
}

/// Counters read back from a pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCounters {
    pub free_count: usize,
    pub completions: u64,
    pub spurious: u64,
}

/// Ring of `N` fixed-capacity i16 buffers
#[derive(Debug)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
    payloads: Vec<Vec<i16>>,
    cursor: usize,
}

impl BufferPool {
    /// Create `count` free buffers of `samples_per_buffer` interleaved samples
    pub fn new(count: usize, samples_per_buffer: usize) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                states: vec![BufferState::Free; count],
                free_count: count,
                completions: 0,
                spurious: 0,
            }),
            freed: Condvar::new(),
        });

        Self {
            shared,
            payloads: vec![vec![0; samples_per_buffer]; count],
            cursor: 0,
        }
    }

    pub fn completion_handle(&self) -> CompletionHandle {
        CompletionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of buffers (N)
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Buffer the next write will fill
    pub fn cursor(&self) -> BufferId {
        BufferId(self.cursor)
    }

    pub fn free_count(&self) -> usize {
        self.shared.lock().free_count
    }

    pub fn state(&self, id: BufferId) -> BufferState {
        self.shared.lock().states[id.0]
    }

    pub fn counters(&self) -> PoolCounters {
        let state = self.shared.lock();
        PoolCounters {
            free_count: state.free_count,
            completions: state.completions,
            spurious: state.spurious,
        }
    }

    /// Block until the buffer under the cursor is free.
    ///
    /// Returns whether the caller actually had to wait. With FIFO
    /// completions this is the same as waiting for `free_count > 0`.
    pub fn wait_for_cursor(&self, timeout: Option<Duration>) -> Result<bool> {
        let idx = self.cursor;
        self.wait_while(timeout, |s| s.states[idx] == BufferState::InFlight)
    }

    /// Block until every buffer has been played
    pub fn wait_until_drained(&self, timeout: Option<Duration>) -> Result<()> {
        let total = self.len();
        self.wait_while(timeout, |s| s.free_count < total).map(|_| ())
    }

    fn wait_while<F>(&self, timeout: Option<Duration>, mut blocked: F) -> Result<bool>
    where
        F: FnMut(&mut PoolState) -> bool,
    {
        let mut guard = self.shared.lock();
        if !blocked(&mut *guard) {
            return Ok(false);
        }

        match timeout {
            None => {
                let _guard = self
                    .shared
                    .freed
                    .wait_while(guard, |s| blocked(s))
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(limit) => {
                let deadline = Instant::now() + limit;
                while blocked(&mut *guard) {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::WriteTimeout(limit));
                    }
                    let (next, _) = self
                        .shared
                        .freed
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard = next;
                }
            }
        }
        Ok(true)
    }

    /// Writable payload of the cursor buffer
    pub fn cursor_payload_mut(&mut self) -> &mut [i16] {
        &mut self.payloads[self.cursor]
    }

    /// Mark the cursor buffer in flight and return its first `samples` samples.
    ///
    /// Must happen before the device sees the buffer so that a completion
    /// arriving immediately finds it in flight.
    pub fn begin_submit(&mut self, samples: usize) -> (BufferId, &[i16]) {
        let idx = self.cursor;
        {
            let mut state = self.shared.lock();
            debug_assert_eq!(state.states[idx], BufferState::Free);
            state.states[idx] = BufferState::InFlight;
            state.free_count -= 1;
        }
        (BufferId(idx), &self.payloads[idx][..samples])
    }

    /// Undo `begin_submit` after the device refused the buffer
    pub fn abort_submit(&mut self, id: BufferId) {
        let mut state = self.shared.lock();
        if state.states[id.0] == BufferState::InFlight {
            state.states[id.0] = BufferState::Free;
            state.free_count += 1;
        }
    }

    /// Move the cursor to the next buffer in the ring
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.payloads.len();
    }
}
