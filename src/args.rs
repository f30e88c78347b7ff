// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_framefeed::{
    frame::FourCC,
    source::{SourceOptions, TEST_PATTERN_SCHEME},
    timeout_from_secs,
};
use std::{error::Error, fs::File, path::PathBuf, time::Duration};

/// Scheduling model driving the producer loop.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum Runtime {
    /// Dedicated OS thread
    Thread,
    /// Tokio task
    Tokio,
}

/// Command-line arguments for the EdgeFirst Frame Feed demo.
///
/// Arguments can be specified via command line or environment variables.
/// When no source is given, the `cam_source` key of the JSON file named by
/// `--config` is used instead.
///
/// # Example
///
/// ```bash
/// # Via command line
/// edgefirst-framefeed --source capture.yuyv --buffer-size 5
///
/// # Via environment variables
/// export SOURCE=test://gradient
/// export RUNTIME=tokio
/// edgefirst-framefeed
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Frame source: a raw frame file or test://<name> for a test pattern
    #[arg(short, long, env = "SOURCE")]
    pub source: Option<String>,

    /// JSON configuration file providing cam_source
    #[arg(long, env = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Capture resolution in pixels (width height)
    #[arg(
        long,
        env = "CAMERA_SIZE",
        default_value = "640 480",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub camera_size: Vec<u32>,

    /// Pixel format of the source frames (RGB3, RGBX, RGBA, YUYV, NV12)
    #[arg(long, env = "FORMAT", default_value = "YUYV")]
    pub format: FourCC,

    /// Source frame rate limit, 0 disables pacing
    #[arg(long, env = "FPS", default_value = "30")]
    pub fps: u32,

    /// Stop at end of file instead of looping back to the start
    #[arg(long, env = "NO_LOOP")]
    pub no_loop: bool,

    /// Number of frames buffered before the oldest are dropped
    #[arg(short, long, env = "BUFFER_SIZE", default_value = "5")]
    pub buffer_size: usize,

    /// Producer read timeout in seconds
    #[arg(long, env = "READ_TIMEOUT", default_value = "30", allow_negative_numbers = true)]
    pub read_timeout: f64,

    /// Consumer frame timeout in seconds
    #[arg(long, env = "FRAME_TIMEOUT", default_value = "30", allow_negative_numbers = true)]
    pub frame_timeout: f64,

    /// Pause between failed source reads in milliseconds
    #[arg(long, env = "BACKOFF_MS", default_value = "100")]
    pub backoff_ms: u64,

    /// Number of frames to read before exiting, 0 runs forever
    #[arg(short = 'n', long, env = "FRAMES", default_value = "0")]
    pub frames: u64,

    /// Scheduling model of the producer loop
    #[arg(long, env = "RUNTIME", default_value = "thread", value_enum)]
    pub runtime: Runtime,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable Tokio async runtime console for debugging
    #[arg(long, env = "TOKIO_CONSOLE")]
    pub tokio_console: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}

impl Args {
    /// Resolves the source identifier from `--source` or the config file.
    pub fn source(&self) -> Result<String, Box<dyn Error>> {
        if let Some(source) = &self.source {
            return Ok(source.clone());
        }
        let Some(path) = &self.config else {
            return Err(Box::from("no --source given and no --config to read it from"));
        };
        let file = File::open(path)?;
        let json: serde_json::Value = serde_json::from_reader(file)?;
        match json["cam_source"].as_str() {
            Some(source) => Ok(source.to_string()),
            None => Err(Box::from(format!(
                "Did not find cam_source as a string in {}",
                path.display()
            ))),
        }
    }

    pub fn is_test_pattern(source: &str) -> bool {
        source.starts_with(TEST_PATTERN_SCHEME)
    }

    pub fn options(&self) -> SourceOptions {
        SourceOptions {
            width: self.camera_size[0],
            height: self.camera_size[1],
            format: self.format,
            fps: self.fps,
            looping: !self.no_loop,
        }
    }

    pub fn read_timeout(&self) -> Result<Duration, Box<dyn Error>> {
        Ok(timeout_from_secs(self.read_timeout)?)
    }

    pub fn frame_timeout(&self) -> Result<Duration, Box<dyn Error>> {
        Ok(timeout_from_secs(self.frame_timeout)?)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}
