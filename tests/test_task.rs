// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_framefeed::{
    task::{AsyncTask, Task},
    Error,
};
use serial_test::serial;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

fn counting(counter: &Arc<AtomicU64>) -> impl FnMut() -> edgefirst_framefeed::Result<()> {
    let counter = Arc::clone(counter);
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1));
        Ok(())
    }
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
#[serial]
fn test_start_stop() -> Result<(), Box<dyn std::error::Error>> {
    let counter = Arc::new(AtomicU64::new(0));
    let mut task = Task::new("counter");
    assert!(!task.is_alive());

    task.start(counting(&counter))?;
    assert!(task.is_alive());
    assert!(wait_until(Duration::from_secs(2), || counter.load(Ordering::SeqCst) > 3));

    task.stop()?;
    assert!(!task.is_alive());

    // no work runs once stop has returned
    let stopped_at = counter.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.load(Ordering::SeqCst), stopped_at);
    Ok(())
}

#[test]
#[serial]
fn test_lifecycle_misuse() -> Result<(), Box<dyn std::error::Error>> {
    let counter = Arc::new(AtomicU64::new(0));
    let mut task = Task::new("counter");

    assert!(matches!(task.stop(), Err(Error::NotRunning)));

    task.start(counting(&counter))?;
    assert!(matches!(
        task.start(|| Ok(())),
        Err(Error::AlreadyRunning)
    ));
    assert!(task.is_alive());

    // the running loop is unaffected by the rejected start
    let before = counter.load(Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(2), || {
        counter.load(Ordering::SeqCst) > before
    }));

    task.stop()?;
    assert!(matches!(task.stop(), Err(Error::NotRunning)));
    Ok(())
}

#[test]
#[serial]
fn test_restart() -> Result<(), Box<dyn std::error::Error>> {
    let counter = Arc::new(AtomicU64::new(0));
    let mut task = Task::new("counter");

    for _ in 0..3 {
        let before = counter.load(Ordering::SeqCst);
        task.start(counting(&counter))?;
        assert!(wait_until(Duration::from_secs(2), || {
            counter.load(Ordering::SeqCst) > before
        }));
        task.stop()?;
    }
    Ok(())
}

#[test]
#[serial]
fn test_failing_work() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Arc::new(AtomicU64::new(0));
    let mut task = Task::new("failing");

    let work_calls = Arc::clone(&calls);
    task.start(move || {
        work_calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Timeout(None))
    })?;

    assert!(wait_until(Duration::from_secs(2), || !task.is_alive()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(matches!(task.stop(), Err(Error::NotRunning)));
    assert!(matches!(task.take_failure(), Some(Error::Timeout(None))));
    assert!(task.take_failure().is_none());
    Ok(())
}

#[test]
#[serial]
fn test_panicking_work() -> Result<(), Box<dyn std::error::Error>> {
    let mut task = Task::new("panicking");
    task.start(|| panic!("boom"))?;

    assert!(wait_until(Duration::from_secs(2), || !task.is_alive()));
    match task.take_failure() {
        Some(Error::TaskPanicked(msg)) => assert_eq!(msg, "boom"),
        other => panic!("unexpected outcome {other:?}"),
    }
    Ok(())
}

#[test]
#[serial]
fn test_stop_waits_for_iteration() -> Result<(), Box<dyn std::error::Error>> {
    let mut task = Task::new("slow");
    task.start(|| {
        thread::sleep(Duration::from_millis(200));
        Ok(())
    })?;
    thread::sleep(Duration::from_millis(20));

    let now = Instant::now();
    task.stop()?;
    assert!(now.elapsed() >= Duration::from_millis(100));
    assert!(!task.is_alive());
    Ok(())
}

#[test]
fn test_invalid_name() {
    let mut task = Task::new("cam\0era");
    assert!(matches!(
        task.start(|| Ok(())),
        Err(Error::InvalidArgument(_))
    ));
    assert!(!task.is_alive());
}

#[tokio::test]
#[serial]
async fn test_async_start_stop() -> Result<(), Box<dyn std::error::Error>> {
    let counter = Arc::new(AtomicU64::new(0));
    let mut task = AsyncTask::new("counter");
    assert!(matches!(task.stop().await, Err(Error::NotRunning)));

    let work_counter = Arc::clone(&counter);
    task.start(move || {
        let counter = Arc::clone(&work_counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
    .await?;
    assert!(task.is_alive());
    assert!(matches!(
        task.start(|| async { Ok(()) }).await,
        Err(Error::AlreadyRunning)
    ));

    tokio::time::sleep(Duration::from_millis(20)).await;
    task.stop().await?;
    assert!(!task.is_alive());

    let stopped_at = counter.load(Ordering::SeqCst);
    assert!(stopped_at > 0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(counter.load(Ordering::SeqCst), stopped_at);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_async_failing_work() -> Result<(), Box<dyn std::error::Error>> {
    let mut task = AsyncTask::new("failing");
    task.start(|| async { Err(Error::NotRunning) }).await?;

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!task.is_alive());
    assert!(matches!(task.take_failure().await, Some(Error::NotRunning)));

    // a crashed task may be started again
    task.start(|| async { Ok(()) }).await?;
    assert!(task.is_alive());
    task.stop().await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_async_stop_waits_for_iteration() -> Result<(), Box<dyn std::error::Error>> {
    let mut task = AsyncTask::new("slow");
    task.start(|| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    })
    .await?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let now = Instant::now();
    task.stop().await?;
    assert!(now.elapsed() >= Duration::from_millis(100));
    assert!(!task.is_alive());
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_async_abort() -> Result<(), Box<dyn std::error::Error>> {
    let counter = Arc::new(AtomicU64::new(0));
    let mut task = AsyncTask::new("counter");

    let work_counter = Arc::clone(&counter);
    task.start(move || {
        let counter = Arc::clone(&work_counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok(())
        }
    })
    .await?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    task.abort();
    assert!(!task.is_alive());
    assert!(matches!(task.stop().await, Err(Error::NotRunning)));

    tokio::time::sleep(Duration::from_millis(20)).await;
    let aborted_at = counter.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(counter.load(Ordering::SeqCst), aborted_at);

    // an aborted task may be started again
    task.start(|| async { Ok(()) }).await?;
    assert!(task.is_alive());
    task.stop().await?;
    Ok(())
}
