// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst Frame Feed Library
//!
//! This library delivers live frames from a continuously producing, possibly
//! slow or intermittently failing camera source to one or more consumers.
//! Consumers always see the freshest frames available: when they fall
//! behind, the oldest buffered frames are evicted instead of stalling the
//! producer.
//!
//! ## Features
//!
//! - **Dropping Queue**: Bounded FIFO buffer which evicts the oldest item on
//!   overflow, with deadline-bounded blocking `take`.
//! - **Background Tasks**: Single-instance producer loops with join-on-stop
//!   semantics.
//! - **Source Reader**: Mutex-guarded access to a blocking frame source with
//!   a retrying, timeout-bounded read.
//! - **Frame Feed**: Composition of the above into a camera handle whose
//!   consumers are decoupled from the producer's pacing.
//!
//! Every component comes in two flavours with the same contract: a
//! preemptive one built on OS threads and a cooperative one built on Tokio.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_framefeed::{feed::FrameFeed, source::{SourceOptions, TestPattern}};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut feed = FrameFeed::new(TestPattern::default());
//! feed.set_buffer_size(5)?;
//! feed.open("test://gradient", &SourceOptions::default())?;
//!
//! let frame = feed.read_frame(Duration::from_secs(2))?;
//! println!("{frame}");
//!
//! feed.close()?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod error;
pub mod feed;
pub mod frame;
pub mod queue;
pub mod source;
pub mod task;

pub use error::{timeout_from_secs, BoxError, Error, Result};
