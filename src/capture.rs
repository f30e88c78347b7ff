// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Exclusive, deadline-bounded access to a [`FrameSource`].
//!
//! Every call into the source happens under one mutex, so at most one
//! `open`, `close` or `read` is in flight at any time. Reads retry transient
//! failures with a short backoff until a frame arrives or the deadline
//! passes; only then does the last failure surface, chained inside
//! [`Error::Timeout`].

use crate::{
    error::{BoxError, Error, Result},
    queue::deadline,
    source::{FrameSource, SourceOptions},
};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tracing::{debug, trace};

/// Pause between two read attempts on a source which is not ready.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Device<S> {
    source: S,
    open: bool,
}

impl<S: FrameSource> Device<S> {
    fn open(&mut self, identifier: &str, options: &SourceOptions) -> Result<()> {
        match self.source.open(identifier, options) {
            Ok(()) => {
                self.open = true;
                debug!(identifier, "source opened");
                Ok(())
            }
            Err(source) => {
                self.open = false;
                Err(Error::ConnectionFailed {
                    identifier: identifier.to_string(),
                    source,
                })
            }
        }
    }

    fn close(&mut self) {
        self.source.close();
        if std::mem::take(&mut self.open) {
            debug!("source closed");
        }
    }
}

fn lock<S>(device: &Mutex<Device<S>>) -> MutexGuard<'_, Device<S>> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe wrapper around a blocking [`FrameSource`].
#[derive(Debug)]
pub struct SourceReader<S> {
    device: Mutex<Device<S>>,
    pub(crate) backoff: Duration,
}

impl<S: FrameSource> SourceReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            device: Mutex::new(Device {
                source,
                open: false,
            }),
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Sets the pause between two failed read attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn is_open(&self) -> bool {
        lock(&self.device).open
    }

    /// Opens the underlying source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`] wrapping the source's failure. The
    /// reader is left closed and may be opened again.
    pub fn open(&self, identifier: &str, options: &SourceOptions) -> Result<()> {
        lock(&self.device).open(identifier, options)
    }

    /// Releases the underlying source. Closing twice is harmless.
    pub fn close(&self) {
        lock(&self.device).close();
    }

    /// Reads one frame, retrying transient failures until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] chaining the last read failure when no
    /// attempt succeeded before the deadline.
    pub fn read(&self, timeout: Duration) -> Result<S::Frame> {
        let deadline = deadline(timeout);
        loop {
            let attempt = lock(&self.device).source.read();
            let err = match attempt {
                Ok(frame) => return Ok(frame),
                Err(err) => err,
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(Some(err)));
            }
            trace!("read failed, retrying: {err}");
            std::thread::sleep(self.backoff.min(remaining));
        }
    }
}

/// Tokio flavour of [`SourceReader`].
///
/// Source calls still block, so each one runs on Tokio's blocking pool while
/// the calling task is suspended. The backoff is an async sleep.
#[derive(Debug)]
pub struct AsyncSourceReader<S> {
    device: Arc<Mutex<Device<S>>>,
    pub(crate) backoff: Duration,
}

impl<S: FrameSource> AsyncSourceReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            device: Arc::new(Mutex::new(Device {
                source,
                open: false,
            })),
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Sets the pause between two failed read attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn is_open(&self) -> bool {
        lock(&self.device).open
    }

    /// See [`SourceReader::open`].
    pub async fn open(&self, identifier: &str, options: &SourceOptions) -> Result<()> {
        let identifier = identifier.to_string();
        let options = options.clone();
        self.blocking(move |device| device.open(&identifier, &options))
            .await?
    }

    /// See [`SourceReader::close`].
    pub async fn close(&self) -> Result<()> {
        self.blocking(|device| device.close()).await
    }

    /// Closes the source on the calling thread, waiting for an in-flight
    /// call to finish first.
    pub(crate) fn close_now(&self) {
        lock(&self.device).close();
    }

    /// See [`SourceReader::read`].
    pub async fn read(&self, timeout: Duration) -> Result<S::Frame> {
        let deadline = tokio::time::Instant::from_std(deadline(timeout));
        loop {
            let err: BoxError = match self.blocking(|device| device.source.read()).await? {
                Ok(frame) => return Ok(frame),
                Err(err) => err,
            };
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(Some(err)));
            }
            trace!("read failed, retrying: {err}");
            tokio::time::sleep(self.backoff.min(remaining)).await;
        }
    }

    async fn blocking<F, R>(&self, call: F) -> Result<R>
    where
        F: FnOnce(&mut Device<S>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let device = Arc::clone(&self.device);
        tokio::task::spawn_blocking(move || call(&mut *lock(&device)))
            .await
            .map_err(|err| Error::TaskPanicked(err.to_string()))
    }
}
