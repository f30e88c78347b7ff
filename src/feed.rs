// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Camera handles which decouple consumers from the producer's pacing.
//!
//! A feed owns a source reader, a dropping queue and a background task. Once
//! opened, the task repeatedly reads one frame from the source and pushes it
//! into the queue, evicting the oldest frame when consumers fall behind.
//! Consumers only ever talk to the queue through `read_frame`.
//!
//! The producer fails fast: a read which exhausts its own timeout ends the
//! background task. Consumers then time out in `read_frame`, and the feed
//! must be closed and opened again to resume.

use crate::{
    capture::{AsyncSourceReader, SourceReader},
    error::{Error, Result},
    queue::{AsyncDroppingQueue, DroppingQueue},
    source::{FrameSource, SourceOptions},
    task::{AsyncTask, Task},
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Timeout of the producer's single source read per iteration.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Thread-backed camera feed.
///
/// # Example
///
/// ```no_run
/// use edgefirst_framefeed::{feed::FrameFeed, source::{RawFileSource, SourceOptions}};
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut feed = FrameFeed::new(RawFileSource::new());
/// feed.set_buffer_size(5)?;
/// feed.open("capture.yuyv", &SourceOptions::default())?;
///
/// for _ in 0..100 {
///     let frame = feed.read_frame(Duration::from_secs(2))?;
///     println!("{frame}");
/// }
///
/// feed.close()?;
/// # Ok(())
/// # }
/// ```
pub struct FrameFeed<S: FrameSource> {
    reader: Arc<SourceReader<S>>,
    buffer: Arc<DroppingQueue<S::Frame>>,
    task: Task,
    read_timeout: Duration,
}

impl<S: FrameSource> FrameFeed<S> {
    /// Creates a closed feed over `source` with a buffer of one frame.
    pub fn new(source: S) -> Self {
        Self {
            reader: Arc::new(SourceReader::new(source)),
            buffer: Arc::new(DroppingQueue::default()),
            task: Task::new("framefeed"),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Sets the producer's per-iteration read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the pause between two failed source reads.
    ///
    /// Only takes effect on a feed which has never been opened.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        if let Some(reader) = Arc::get_mut(&mut self.reader) {
            reader.backoff = backoff;
        }
        self
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.maxsize()
    }

    /// Changes the number of buffered frames, dropping the oldest ones which
    /// no longer fit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `size` is zero.
    pub fn set_buffer_size(&self, size: usize) -> Result<()> {
        self.buffer.set_maxsize(size)
    }

    /// Frames evicted from the buffer because consumers fell behind.
    pub fn dropped_frames(&self) -> u64 {
        self.buffer.dropped()
    }

    /// Returns true while the producer task is running.
    pub fn is_running(&self) -> bool {
        self.task.is_alive()
    }

    /// Opens the source and starts the producer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if the feed is already producing,
    /// or [`Error::ConnectionFailed`] if the source could not be opened.
    pub fn open(&mut self, identifier: &str, options: &SourceOptions) -> Result<()> {
        if self.task.is_alive() {
            return Err(Error::AlreadyRunning);
        }
        if let Some(err) = self.task.take_failure() {
            warn!("producer had stopped: {err}");
            self.reader.close();
        }
        self.reader.open(identifier, options)?;

        let reader = Arc::clone(&self.reader);
        let buffer = Arc::clone(&self.buffer);
        let timeout = self.read_timeout;
        let started = self.task.start(move || {
            buffer.put(reader.read(timeout)?);
            Ok(())
        });
        if let Err(err) = started {
            self.reader.close();
            return Err(err);
        }

        info!(identifier, buffer_size = self.buffer_size(), "feed opened");
        Ok(())
    }

    /// Stops the producer, then closes the source.
    ///
    /// The source is closed in every case. Returns the producer's failure if
    /// it had crashed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRunning`] if the feed was not opened.
    pub fn close(&mut self) -> Result<()> {
        let outcome = match self.task.stop() {
            Err(Error::NotRunning) => match self.task.take_failure() {
                Some(err) => {
                    warn!("producer had stopped: {err}");
                    Err(err)
                }
                None if self.reader.is_open() => Ok(()),
                None => Err(Error::NotRunning),
            },
            outcome => outcome,
        };
        self.reader.close();
        debug!(dropped = self.dropped_frames(), "feed closed");
        outcome
    }

    /// Takes the oldest buffered frame, waiting up to `timeout` for one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no frame arrived in time, including when
    /// the producer has crashed.
    pub fn read_frame(&self, timeout: Duration) -> Result<S::Frame> {
        self.buffer.take(timeout)
    }
}

impl<S: FrameSource> Drop for FrameFeed<S> {
    fn drop(&mut self) {
        if self.task.is_alive() {
            let _ = self.task.stop();
        }
        self.reader.close();
    }
}

/// Tokio-backed camera feed.
///
/// Same contract as [`FrameFeed`]; the producer is a Tokio task and the
/// blocking source calls run on Tokio's blocking pool.
pub struct AsyncFrameFeed<S: FrameSource> {
    reader: Arc<AsyncSourceReader<S>>,
    buffer: Arc<AsyncDroppingQueue<S::Frame>>,
    task: AsyncTask,
    read_timeout: Duration,
}

impl<S: FrameSource> AsyncFrameFeed<S> {
    /// Creates a closed feed over `source` with a buffer of one frame.
    pub fn new(source: S) -> Self {
        Self {
            reader: Arc::new(AsyncSourceReader::new(source)),
            buffer: Arc::new(AsyncDroppingQueue::default()),
            task: AsyncTask::new("framefeed"),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Sets the producer's per-iteration read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the pause between two failed source reads.
    ///
    /// Only takes effect on a feed which has never been opened.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        if let Some(reader) = Arc::get_mut(&mut self.reader) {
            reader.backoff = backoff;
        }
        self
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.maxsize()
    }

    /// See [`FrameFeed::set_buffer_size`].
    pub fn set_buffer_size(&self, size: usize) -> Result<()> {
        self.buffer.set_maxsize(size)
    }

    /// Frames evicted from the buffer because consumers fell behind.
    pub fn dropped_frames(&self) -> u64 {
        self.buffer.dropped()
    }

    /// Returns true while the producer task is running.
    pub fn is_running(&self) -> bool {
        self.task.is_alive()
    }

    /// See [`FrameFeed::open`].
    pub async fn open(&mut self, identifier: &str, options: &SourceOptions) -> Result<()> {
        if self.task.is_alive() {
            return Err(Error::AlreadyRunning);
        }
        if let Some(err) = self.task.take_failure().await {
            warn!("producer had stopped: {err}");
            self.reader.close().await?;
        }
        self.reader.open(identifier, options).await?;

        let reader = Arc::clone(&self.reader);
        let buffer = Arc::clone(&self.buffer);
        let timeout = self.read_timeout;
        let started = self
            .task
            .start(move || {
                let reader = Arc::clone(&reader);
                let buffer = Arc::clone(&buffer);
                async move {
                    buffer.put(reader.read(timeout).await?);
                    Ok(())
                }
            })
            .await;
        if let Err(err) = started {
            self.reader.close().await?;
            return Err(err);
        }

        info!(identifier, buffer_size = self.buffer_size(), "feed opened");
        Ok(())
    }

    /// See [`FrameFeed::close`].
    pub async fn close(&mut self) -> Result<()> {
        let outcome = match self.task.stop().await {
            Err(Error::NotRunning) => match self.task.take_failure().await {
                Some(err) => {
                    warn!("producer had stopped: {err}");
                    Err(err)
                }
                None if self.reader.is_open() => Ok(()),
                None => Err(Error::NotRunning),
            },
            outcome => outcome,
        };
        self.reader.close().await?;
        debug!(dropped = self.dropped_frames(), "feed closed");
        outcome
    }

    /// See [`FrameFeed::read_frame`].
    pub async fn read_frame(&self, timeout: Duration) -> Result<S::Frame> {
        self.buffer.take(timeout).await
    }
}

impl<S: FrameSource> Drop for AsyncFrameFeed<S> {
    fn drop(&mut self) {
        // The producer cannot be awaited here; cancel it, then close the
        // source once any in-flight read has released the device.
        self.task.abort();
        self.reader.close_now();
    }
}
