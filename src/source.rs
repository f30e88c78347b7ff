// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame sources.
//!
//! A [`FrameSource`] is the blocking device handle underneath a feed. Reads
//! may fail transiently, for example while the next frame is not ready yet;
//! the [`SourceReader`](crate::capture::SourceReader) retries them until its
//! deadline.
//!
//! Two sources are provided:
//! - [`TestPattern`]: synthetic moving gradient, identifiers `test://<name>`
//! - [`RawFileSource`]: fixed-size raw frames read back from a file

use crate::{
    error::BoxError,
    frame::{frame_size, FourCC, Frame, YUYV},
};
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    time::{Duration, Instant},
};
use tracing::debug;

/// Identifier prefix selecting the [`TestPattern`] source.
pub const TEST_PATTERN_SCHEME: &str = "test://";

/// Capture settings handed to [`FrameSource::open`].
#[derive(Clone, Debug, PartialEq)]
pub struct SourceOptions {
    pub width: u32,
    pub height: u32,
    pub format: FourCC,
    /// Frame rate limit, 0 disables pacing
    pub fps: u32,
    /// Restart from the beginning at end of stream
    pub looping: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            format: YUYV,
            fps: 30,
            looping: true,
        }
    }
}

impl SourceOptions {
    fn frame_size(&self) -> Result<usize, BoxError> {
        frame_size(self.width, self.height, self.format)
            .ok_or_else(|| format!("unsupported pixel format {}", self.format).into())
    }
}

/// A blocking camera or stream handle.
pub trait FrameSource: Send + 'static {
    type Frame: Send + 'static;

    /// Opens the source named by `identifier`.
    fn open(&mut self, identifier: &str, options: &SourceOptions) -> Result<(), BoxError>;

    /// Releases the source. Closing a closed source does nothing.
    fn close(&mut self);

    /// Polls the opened source for one frame. May fail transiently.
    fn read(&mut self) -> Result<Self::Frame, BoxError>;
}

/// Transient failure reported while the next frame is not due yet.
#[derive(Debug)]
pub struct NotReady;

impl std::fmt::Display for NotReady {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame not ready")
    }
}

impl std::error::Error for NotReady {}

fn not_open() -> BoxError {
    Box::new(io::Error::new(io::ErrorKind::NotConnected, "source is not open"))
}

/// Spaces frames `1 / fps` apart without ever blocking.
#[derive(Debug)]
struct Pacer {
    started: Instant,
    interval: Option<Duration>,
    next_due: Instant,
}

impl Pacer {
    fn new(fps: u32) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            interval: (fps > 0).then(|| Duration::from_secs(1) / fps),
            next_due: now,
        }
    }

    /// Claims the next frame slot, returning its timestamp, or fails with
    /// [`NotReady`] if the slot is still in the future.
    fn claim(&mut self) -> Result<Duration, BoxError> {
        let now = Instant::now();
        if let Some(interval) = self.interval {
            if now < self.next_due {
                return Err(Box::new(NotReady));
            }
            // Skip missed slots rather than bursting to catch up.
            self.next_due = (self.next_due + interval).max(now);
        }
        Ok(now.duration_since(self.started))
    }
}

#[derive(Debug)]
struct PatternState {
    options: SourceOptions,
    size: usize,
    pacer: Pacer,
    sequence: u64,
}

/// Synthetic source producing a moving gradient.
#[derive(Debug, Default)]
pub struct TestPattern {
    state: Option<PatternState>,
}

impl TestPattern {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSource for TestPattern {
    type Frame = Frame;

    fn open(&mut self, identifier: &str, options: &SourceOptions) -> Result<(), BoxError> {
        if !identifier.starts_with(TEST_PATTERN_SCHEME) {
            return Err(format!("not a test pattern identifier: {identifier}").into());
        }
        let size = options.frame_size()?;
        debug!(identifier, "test pattern {}x{} {}", options.width, options.height, options.format);
        self.state = Some(PatternState {
            options: options.clone(),
            size,
            pacer: Pacer::new(options.fps),
            sequence: 0,
        });
        Ok(())
    }

    fn close(&mut self) {
        self.state = None;
    }

    fn read(&mut self) -> Result<Frame, BoxError> {
        let state = self.state.as_mut().ok_or_else(not_open)?;
        let timestamp = state.pacer.claim()?;
        let sequence = state.sequence;
        state.sequence += 1;

        let shift = sequence as usize;
        let data = (0..state.size)
            .map(|i| (i.wrapping_add(shift) & 0xff) as u8)
            .collect();
        Ok(Frame {
            sequence,
            timestamp,
            width: state.options.width,
            height: state.options.height,
            format: state.options.format,
            data,
        })
    }
}

#[derive(Debug)]
struct FileState {
    file: File,
    options: SourceOptions,
    size: usize,
    pacer: Pacer,
    sequence: u64,
}

/// Source reading fixed-size raw frames back from a file, such as a YUYV
/// dump of a V4L2 capture.
#[derive(Debug, Default)]
pub struct RawFileSource {
    state: Option<FileState>,
}

impl RawFileSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSource for RawFileSource {
    type Frame = Frame;

    fn open(&mut self, identifier: &str, options: &SourceOptions) -> Result<(), BoxError> {
        let size = options.frame_size()?;
        let file = File::open(identifier)?;
        let len = file.metadata()?.len();
        if len < size as u64 {
            return Err(format!(
                "{identifier} holds {len} bytes, smaller than one {}x{} {} frame ({size} bytes)",
                options.width, options.height, options.format
            )
            .into());
        }
        debug!(identifier, frames = len / size as u64, "raw file opened");
        self.state = Some(FileState {
            file,
            options: options.clone(),
            size,
            pacer: Pacer::new(options.fps),
            sequence: 0,
        });
        Ok(())
    }

    fn close(&mut self) {
        self.state = None;
    }

    fn read(&mut self) -> Result<Frame, BoxError> {
        let state = self.state.as_mut().ok_or_else(not_open)?;
        let timestamp = state.pacer.claim()?;

        let mut data = vec![0; state.size];
        match state.file.read_exact(&mut data) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof && state.options.looping => {
                state.file.seek(SeekFrom::Start(0))?;
                state.file.read_exact(&mut data)?;
            }
            Err(err) => return Err(err.into()),
        }

        let sequence = state.sequence;
        state.sequence += 1;
        Ok(Frame {
            sequence,
            timestamp,
            width: state.options.width,
            height: state.options.height,
            format: state.options.format,
            data,
        })
    }
}
