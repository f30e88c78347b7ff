// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_framefeed::{
    queue::{AsyncDroppingQueue, DroppingQueue},
    timeout_from_secs, Error,
};
use serial_test::serial;
use std::{
    error::Error as _,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

const SLACK: Duration = Duration::from_millis(250);

fn drain<T>(queue: &DroppingQueue<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = queue.take(Duration::ZERO) {
        items.push(item);
    }
    items
}

#[test]
fn test_evicts_oldest() -> Result<(), Box<dyn std::error::Error>> {
    let queue = DroppingQueue::new(3)?;
    for item in ["A", "B", "C", "D"] {
        queue.put(item);
    }
    assert_eq!(queue.len(), 3);
    assert_eq!(queue.dropped(), 1);

    assert_eq!(queue.take(Duration::ZERO)?, "B");
    assert_eq!(drain(&queue), ["C", "D"]);
    assert!(queue.is_empty());
    Ok(())
}

#[test]
fn test_keeps_most_recent() -> Result<(), Box<dyn std::error::Error>> {
    for maxsize in [1, 2, 5, 8] {
        let queue = DroppingQueue::new(maxsize)?;
        for item in 0..20usize {
            queue.put(item);
            assert!(queue.len() <= maxsize);
        }
        let expected: Vec<_> = (20 - maxsize..20).collect();
        assert_eq!(drain(&queue), expected);
        assert_eq!(queue.dropped(), (20 - maxsize) as u64);
    }
    Ok(())
}

#[test]
fn test_set_maxsize_trims() -> Result<(), Box<dyn std::error::Error>> {
    let queue = DroppingQueue::new(5)?;
    for item in 0..5 {
        queue.put(item);
    }

    queue.set_maxsize(2)?;
    assert_eq!(queue.maxsize(), 2);
    assert_eq!(queue.len(), 2);
    assert_eq!(drain(&queue), [3, 4]);

    queue.set_maxsize(4)?;
    for item in 10..13 {
        queue.put(item);
    }
    assert_eq!(drain(&queue), [10, 11, 12]);
    Ok(())
}

#[test]
fn test_invalid_maxsize() -> Result<(), Box<dyn std::error::Error>> {
    assert!(matches!(
        DroppingQueue::<u8>::new(0),
        Err(Error::InvalidArgument(_))
    ));

    let queue = DroppingQueue::new(3)?;
    queue.put(1);
    assert!(matches!(queue.set_maxsize(0), Err(Error::InvalidArgument(_))));
    assert_eq!(queue.maxsize(), 3);
    assert_eq!(queue.len(), 1);

    assert_eq!(DroppingQueue::<u8>::default().maxsize(), 1);
    Ok(())
}

#[test]
fn test_invalid_timeout() {
    assert!(matches!(timeout_from_secs(-1.0), Err(Error::InvalidArgument(_))));
    assert!(matches!(timeout_from_secs(f64::NAN), Err(Error::InvalidArgument(_))));
    assert_eq!(timeout_from_secs(0.0).unwrap(), Duration::ZERO);
    assert_eq!(timeout_from_secs(1.5).unwrap(), Duration::from_millis(1500));
}

#[test]
#[serial]
fn test_take_timeout() -> Result<(), Box<dyn std::error::Error>> {
    let queue = DroppingQueue::<u32>::new(1)?;
    let timeout = Duration::from_millis(200);

    let now = Instant::now();
    let result = queue.take(timeout);
    let elapsed = now.elapsed();

    assert!(matches!(result, Err(Error::Timeout(None))));
    assert!(elapsed >= timeout, "returned early after {elapsed:?}");
    assert!(elapsed < timeout + SLACK, "returned late after {elapsed:?}");

    assert!(matches!(queue.take(Duration::ZERO), Err(Error::Timeout(_))));
    Ok(())
}

#[test]
#[serial]
fn test_take_waits_for_put() -> Result<(), Box<dyn std::error::Error>> {
    let queue = Arc::new(DroppingQueue::new(2)?);

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            queue.put("frame");
        })
    };

    let now = Instant::now();
    assert_eq!(queue.take(Duration::from_secs(5))?, "frame");
    assert!(now.elapsed() < Duration::from_secs(5));
    producer.join().unwrap();
    Ok(())
}

#[test]
#[serial]
fn test_concurrent_consumers() -> Result<(), Box<dyn std::error::Error>> {
    let queue = Arc::new(DroppingQueue::new(64)?);

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut taken = Vec::new();
                while let Ok(item) = queue.take(Duration::from_millis(300)) {
                    taken.push(item);
                }
                taken
            })
        })
        .collect();

    for item in 0..200u32 {
        queue.put(item);
        if item % 16 == 0 {
            thread::sleep(Duration::from_millis(1));
        }
    }

    let mut received = Vec::new();
    for consumer in consumers {
        let taken = consumer.join().unwrap();
        // each consumer sees items in production order
        assert!(taken.windows(2).all(|w| w[0] < w[1]));
        received.extend(taken);
    }
    received.sort_unstable();
    received.dedup();
    assert_eq!(received.len() as u64 + queue.dropped(), 200);
    Ok(())
}

#[tokio::test]
async fn test_async_evicts_oldest() -> Result<(), Box<dyn std::error::Error>> {
    let queue = AsyncDroppingQueue::new(3)?;
    for item in ["A", "B", "C", "D"] {
        queue.put(item);
    }
    assert_eq!(queue.len(), 3);
    assert_eq!(queue.take(Duration::ZERO).await?, "B");
    assert_eq!(queue.take(Duration::ZERO).await?, "C");
    assert_eq!(queue.take(Duration::ZERO).await?, "D");
    assert!(queue.is_empty());
    assert_eq!(queue.dropped(), 1);
    Ok(())
}

#[tokio::test]
async fn test_async_set_maxsize() -> Result<(), Box<dyn std::error::Error>> {
    let queue = AsyncDroppingQueue::new(4)?;
    for item in 0..4 {
        queue.put(item);
    }
    assert!(matches!(queue.set_maxsize(0), Err(Error::InvalidArgument(_))));
    assert_eq!(queue.maxsize(), 4);

    queue.set_maxsize(1)?;
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.take(Duration::ZERO).await?, 3);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_async_take_timeout() -> Result<(), Box<dyn std::error::Error>> {
    let queue = AsyncDroppingQueue::<u32>::new(1)?;
    let timeout = Duration::from_millis(200);

    let now = Instant::now();
    let result = queue.take(timeout).await;
    let elapsed = now.elapsed();

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Timeout(None)));
    assert!(err.source().is_none());
    assert!(elapsed >= timeout, "returned early after {elapsed:?}");
    assert!(elapsed < timeout + SLACK, "returned late after {elapsed:?}");
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_async_take_waits_for_put() -> Result<(), Box<dyn std::error::Error>> {
    let queue = Arc::new(AsyncDroppingQueue::new(2)?);

    let producer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            queue.put(7u32);
        })
    };

    assert_eq!(queue.take(Duration::from_secs(5)).await?, 7);
    producer.await?;

    // a put with nobody waiting is not lost
    queue.put(8);
    assert_eq!(queue.take(Duration::from_millis(10)).await?, 8);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_async_concurrent_consumers() -> Result<(), Box<dyn std::error::Error>> {
    let queue = Arc::new(AsyncDroppingQueue::new(64)?);

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut taken = Vec::new();
                while let Ok(item) = queue.take(Duration::from_millis(300)).await {
                    taken.push(item);
                }
                taken
            })
        })
        .collect();

    for item in 0..2000u32 {
        queue.put(item);
        if item % 16 == 0 {
            tokio::task::yield_now().await;
        }
    }

    let mut received = Vec::new();
    for consumer in consumers {
        let taken = consumer.await?;
        assert!(taken.windows(2).all(|w| w[0] < w[1]));
        received.extend(taken);
    }
    let total = received.len();
    received.sort_unstable();
    received.dedup();
    // no item is handed to two consumers
    assert_eq!(received.len(), total);
    assert_eq!(received.len() as u64 + queue.dropped(), 2000);
    Ok(())
}
