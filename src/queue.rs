// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Bounded FIFO buffers which evict the oldest item on overflow.
//!
//! A camera producing faster than its consumers must never be blocked, and
//! consumers must never be handed a frame from far in the past. Both queues
//! in this module resolve overflow by dropping the oldest pending item before
//! admitting the new one, so a consumer always receives the freshest frames
//! still buffered, in production order.
//!
//! [`DroppingQueue`] is shared between OS threads and blocks the calling
//! thread in [`DroppingQueue::take`]. [`AsyncDroppingQueue`] is shared
//! between Tokio tasks and suspends the calling task instead. Both use the
//! same eviction core and expose the same contract.

use crate::error::{check_maxsize, Error, Result};
use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tokio::sync::Notify;
use tracing::trace;

/// Eviction core shared by both queue flavours.
#[derive(Debug)]
struct Ring<T> {
    items: VecDeque<T>,
    maxsize: usize,
    dropped: u64,
}

impl<T> Ring<T> {
    fn new(maxsize: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(maxsize),
            maxsize,
            dropped: 0,
        }
    }

    /// Evicts the oldest items until `item` fits, then appends it.
    fn push(&mut self, item: T) {
        while self.items.len() >= self.maxsize {
            self.evict_oldest();
        }
        self.items.push_back(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Updates the capacity and trims the excess right away.
    fn resize(&mut self, maxsize: usize) {
        self.maxsize = maxsize;
        while self.items.len() > self.maxsize {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        if self.items.pop_front().is_some() {
            self.dropped += 1;
            trace!(dropped = self.dropped, "evicted oldest item");
        }
    }
}

/// Longest wait honoured; larger timeouts are clamped to it.
const MAX_WAIT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Absolute monotonic deadline `timeout` from now.
pub(crate) fn deadline(timeout: Duration) -> Instant {
    Instant::now() + timeout.min(MAX_WAIT)
}

fn lock<T>(mutex: &Mutex<Ring<T>>) -> MutexGuard<'_, Ring<T>> {
    // Ring operations cannot panic half-way, the state stays consistent.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe bounded queue with eviction-on-overflow.
///
/// # Example
///
/// ```
/// use edgefirst_framefeed::queue::DroppingQueue;
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = DroppingQueue::new(3)?;
/// for item in ["A", "B", "C", "D"] {
///     queue.put(item);
/// }
///
/// // "A" was evicted to make room for "D"
/// assert_eq!(queue.take(Duration::ZERO)?, "B");
/// assert_eq!(queue.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DroppingQueue<T> {
    ring: Mutex<Ring<T>>,
    not_empty: Condvar,
}

impl<T> DroppingQueue<T> {
    /// Creates a queue holding at most `maxsize` items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `maxsize` is zero.
    pub fn new(maxsize: usize) -> Result<Self> {
        check_maxsize(maxsize)?;
        Ok(Self {
            ring: Mutex::new(Ring::new(maxsize)),
            not_empty: Condvar::new(),
        })
    }

    pub fn maxsize(&self) -> usize {
        lock(&self.ring).maxsize
    }

    /// Changes the capacity, evicting the oldest items which no longer fit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `maxsize` is zero, in which case
    /// the capacity is left unchanged.
    pub fn set_maxsize(&self, maxsize: usize) -> Result<()> {
        check_maxsize(maxsize)?;
        lock(&self.ring).resize(maxsize);
        Ok(())
    }

    /// Appends `item`, evicting the oldest item if the queue is full.
    ///
    /// Never blocks. Wakes at most one thread waiting in [`Self::take`].
    pub fn put(&self, item: T) {
        let mut ring = lock(&self.ring);
        ring.push(item);
        self.not_empty.notify_one();
    }

    /// Removes and returns the oldest item, waiting up to `timeout` for one
    /// to arrive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the queue is still empty once the
    /// deadline has passed.
    pub fn take(&self, timeout: Duration) -> Result<T> {
        let deadline = deadline(timeout);
        let mut ring = lock(&self.ring);
        loop {
            if let Some(item) = ring.pop() {
                return Ok(item);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(None));
            }
            ring = self
                .not_empty
                .wait_timeout(ring, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.ring).items.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.ring).items.is_empty()
    }

    /// Total number of items evicted since the queue was created.
    pub fn dropped(&self) -> u64 {
        lock(&self.ring).dropped
    }
}

impl<T> Default for DroppingQueue<T> {
    fn default() -> Self {
        Self {
            ring: Mutex::new(Ring::new(1)),
            not_empty: Condvar::new(),
        }
    }
}

/// Tokio flavour of [`DroppingQueue`].
///
/// The ring lock is never held across an `.await`, so `put` and the
/// accessors stay synchronous; only [`Self::take`] suspends.
#[derive(Debug)]
pub struct AsyncDroppingQueue<T> {
    ring: Mutex<Ring<T>>,
    not_empty: Notify,
}

impl<T> AsyncDroppingQueue<T> {
    /// Creates a queue holding at most `maxsize` items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `maxsize` is zero.
    pub fn new(maxsize: usize) -> Result<Self> {
        check_maxsize(maxsize)?;
        Ok(Self {
            ring: Mutex::new(Ring::new(maxsize)),
            not_empty: Notify::new(),
        })
    }

    pub fn maxsize(&self) -> usize {
        lock(&self.ring).maxsize
    }

    /// See [`DroppingQueue::set_maxsize`].
    pub fn set_maxsize(&self, maxsize: usize) -> Result<()> {
        check_maxsize(maxsize)?;
        lock(&self.ring).resize(maxsize);
        Ok(())
    }

    /// See [`DroppingQueue::put`].
    pub fn put(&self, item: T) {
        lock(&self.ring).push(item);
        self.not_empty.notify_one();
    }

    /// Removes and returns the oldest item, suspending up to `timeout` for
    /// one to arrive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the queue is still empty once the
    /// deadline has passed.
    pub async fn take(&self, timeout: Duration) -> Result<T> {
        let deadline = tokio::time::Instant::from_std(deadline(timeout));
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            // Register before checking so a put in between is not missed.
            notified.as_mut().enable();

            if let Some(item) = lock(&self.ring).pop() {
                return Ok(item);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return lock(&self.ring).pop().ok_or(Error::Timeout(None));
            }
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.ring).items.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.ring).items.is_empty()
    }

    /// Total number of items evicted since the queue was created.
    pub fn dropped(&self) -> u64 {
        lock(&self.ring).dropped
    }
}

impl<T> Default for AsyncDroppingQueue<T> {
    fn default() -> Self {
        Self {
            ring: Mutex::new(Ring::new(1)),
            not_empty: Notify::new(),
        }
    }
}
