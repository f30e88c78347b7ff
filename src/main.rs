// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use args::{Args, Runtime};
use clap::Parser;
use edgefirst_framefeed::{
    feed::{AsyncFrameFeed, FrameFeed},
    frame::Frame,
    source::{FrameSource, RawFileSource, TestPattern},
};
use std::{
    error::Error,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, info_span, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, Layer};

mod args;

/// Frames between two summary lines.
const REPORT_INTERVAL: u64 = 100;

struct FrameStats {
    prev: Instant,
    history: Vec<i64>,
    index: usize,
    tracy: bool,
}

impl FrameStats {
    fn new(window: usize, tracy: bool) -> Self {
        Self {
            prev: Instant::now(),
            history: vec![0; window],
            index: 0,
            tracy,
        }
    }

    fn update_fps(&mut self) -> i64 {
        let now = Instant::now();

        let elapsed = now.duration_since(self.prev);
        self.prev = now;

        self.history[self.index] = 1e9 as i64 / elapsed.as_nanos().max(1) as i64;
        self.index = (self.index + 1) % self.history.len();

        (self.history.iter().sum::<i64>() as f64 / self.history.len() as f64).round() as i64
    }

    fn record(&mut self, count: u64, frame: &Frame, wait: Duration, dropped: u64) {
        let fps = self.update_fps();
        if self.tracy {
            tracy_client::frame_mark();
        }
        debug!("frame {frame} wait: {wait:?} fps: {fps}");
        if count % REPORT_INTERVAL == 0 {
            info!(count, fps, dropped, "frames received");
        }
    }
}

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let stdout_log = tracing_subscriber::fmt::layer().with_filter(level);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(level)),
        Err(_) => None,
    };

    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default().with_filter(level))
    } else {
        None
    };

    let console = if args.tokio_console {
        Some(console_subscriber::spawn())
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(console)
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    let source = args.source()?;
    info!(source = %source, runtime = ?args.runtime, "EdgeFirst Frame Feed");

    match args.runtime {
        Runtime::Thread => {
            if Args::is_test_pattern(&source) {
                stream(TestPattern::new(), &source, &args)
            } else {
                stream(RawFileSource::new(), &source, &args)
            }
        }
        Runtime::Tokio => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            rt.block_on(async {
                if Args::is_test_pattern(&source) {
                    stream_async(TestPattern::new(), &source, &args).await
                } else {
                    stream_async(RawFileSource::new(), &source, &args).await
                }
            })
        }
    }
}

fn stream<S>(source: S, identifier: &str, args: &Args) -> Result<(), Box<dyn Error>>
where
    S: FrameSource<Frame = Frame>,
{
    let mut feed = FrameFeed::new(source)
        .with_read_timeout(args.read_timeout()?)
        .with_backoff(args.backoff());
    feed.set_buffer_size(args.buffer_size)?;
    let frame_timeout = args.frame_timeout()?;

    feed.open(identifier, &args.options())?;

    let mut stats = FrameStats::new(30, args.tracy);
    let mut count = 0;
    let received = loop {
        if args.frames > 0 && count >= args.frames {
            break Ok(());
        }
        let _span = info_span!("read_frame").entered();
        let now = Instant::now();
        let frame = match feed.read_frame(frame_timeout) {
            Ok(frame) => frame,
            Err(err) => break Err(err),
        };
        count += 1;
        stats.record(count, &frame, now.elapsed(), feed.dropped_frames());
    };

    let closed = feed.close();
    finish(count, received, closed)
}

async fn stream_async<S>(source: S, identifier: &str, args: &Args) -> Result<(), Box<dyn Error>>
where
    S: FrameSource<Frame = Frame>,
{
    let mut feed = AsyncFrameFeed::new(source)
        .with_read_timeout(args.read_timeout()?)
        .with_backoff(args.backoff());
    feed.set_buffer_size(args.buffer_size)?;
    let frame_timeout = args.frame_timeout()?;

    feed.open(identifier, &args.options()).await?;

    let mut stats = FrameStats::new(30, args.tracy);
    let mut count = 0;
    let received = loop {
        if args.frames > 0 && count >= args.frames {
            break Ok(());
        }
        let now = Instant::now();
        let frame = match feed.read_frame(frame_timeout).await {
            Ok(frame) => frame,
            Err(err) => break Err(err),
        };
        count += 1;
        stats.record(count, &frame, now.elapsed(), feed.dropped_frames());
    };

    let closed = feed.close().await;
    finish(count, received, closed)
}

fn finish(
    count: u64,
    received: edgefirst_framefeed::Result<()>,
    closed: edgefirst_framefeed::Result<()>,
) -> Result<(), Box<dyn Error>> {
    info!(count, "feed finished");
    if let Err(err) = &closed {
        error!("close: {err}");
    }
    received?;
    closed?;
    Ok(())
}
