// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{io, time::Duration};
use thiserror::Error;

/// Boxed error raised by a [`FrameSource`](crate::source::FrameSource).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors reported by queues, tasks, readers and feeds.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("the operation timed out")]
    Timeout(#[source] Option<BoxError>),
    #[error("the task is already running")]
    AlreadyRunning,
    #[error("the task is not running")]
    NotRunning,
    #[error("failed to open the camera source {identifier}")]
    ConnectionFailed {
        identifier: String,
        #[source]
        source: BoxError,
    },
    #[error("the task panicked: {0}")]
    TaskPanicked(String),
    #[error("failed to spawn the task: {0}")]
    Spawn(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Converts a timeout in seconds, as found in configuration and on the
/// command line, into a [`Duration`].
///
/// Negative, NaN and infinite values are rejected with
/// [`Error::InvalidArgument`].
pub fn timeout_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        Error::InvalidArgument(format!(
            "the timeout must be greater than or equal to 0 (got {secs})"
        ))
    })
}

pub(crate) fn check_maxsize(maxsize: usize) -> Result<()> {
    if maxsize < 1 {
        return Err(Error::InvalidArgument(
            "the maxsize must be greater than or equal to 1".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
