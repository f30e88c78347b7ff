// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Single-instance background loops.
//!
//! A task repeatedly runs one unit of work until it is stopped. Stopping is
//! cooperative: the stop flag is checked between iterations, so a unit of
//! work which is blocked finishes before the loop exits. `stop` joins the
//! loop, so no work runs once it returns.
//!
//! A unit of work which fails ends the loop. The failure is logged and kept
//! as the task's outcome, returned by `stop` or `take_failure`; a crashed
//! task is never restarted automatically.

use crate::error::{panic_message, Error, Result};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};
use tracing::{debug, error, warn};

/// Background loop running on a dedicated OS thread.
#[derive(Debug)]
pub struct Task {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl Task {
    /// Creates an idle task whose thread will be called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true while the background thread exists and has not finished.
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawns a thread which calls `work` until the task is stopped or
    /// `work` fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if the task is alive, leaving the
    /// running loop untouched, [`Error::InvalidArgument`] if the name holds a
    /// NUL byte, or [`Error::Spawn`] if the thread could not be created.
    pub fn start<F>(&mut self, mut work: F) -> Result<()>
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        if self.is_alive() {
            return Err(Error::AlreadyRunning);
        }
        if self.name.contains('\0') {
            return Err(Error::InvalidArgument(format!(
                "task name {:?} contains a NUL byte",
                self.name
            )));
        }
        if let Some(err) = self.take_failure() {
            warn!(task = %self.name, "discarding previous failure: {err}");
        }

        let stop = Arc::clone(&self.stop);
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let outcome = run_loop(&stop, &mut work);
                if let Err(err) = &outcome {
                    error!(task = %name, "task stopped: {err}");
                }
                outcome
            })
            .map_err(Error::Spawn)?;

        debug!(task = %self.name, "task started");
        self.handle = Some(handle);
        Ok(())
    }

    /// Stops the loop after its current iteration and waits for the thread
    /// to exit.
    ///
    /// Returns the error of the final iteration if it failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRunning`] if the task is not alive.
    pub fn stop(&mut self) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::NotRunning);
        }
        let Some(handle) = self.handle.take() else {
            return Err(Error::NotRunning);
        };

        self.stop.store(true, Ordering::Release);
        let outcome = join(handle);
        self.stop.store(false, Ordering::Release);

        debug!(task = %self.name, "task stopped");
        outcome
    }

    /// Reaps a task which ended on its own and returns its failure, if any.
    ///
    /// Returns `None` while the task is alive or when there is nothing to
    /// reap.
    pub fn take_failure(&mut self) -> Option<Error> {
        if self.is_alive() {
            return None;
        }
        self.handle.take().and_then(|handle| join(handle).err())
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = self.stop();
        }
    }
}

fn run_loop<F>(stop: &AtomicBool, work: &mut F) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    while !stop.load(Ordering::Acquire) {
        work()?;
    }
    Ok(())
}

fn join(handle: JoinHandle<Result<()>>) -> Result<()> {
    handle
        .join()
        .unwrap_or_else(|payload| Err(Error::TaskPanicked(panic_message(payload))))
}

/// Background loop running as a Tokio task.
///
/// The loop yields to the scheduler after every iteration so the stop flag
/// and other tasks on the runtime get a chance to run.
#[derive(Debug)]
pub struct AsyncTask {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<Result<()>>>,
}

impl AsyncTask {
    /// Creates an idle task identified as `name` in logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true while the spawned task exists and has not finished.
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawns a Tokio task which awaits `work()` until the task is stopped
    /// or the work fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if the task is alive, leaving the
    /// running loop untouched.
    pub async fn start<F, Fut>(&mut self, mut work: F) -> Result<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if self.is_alive() {
            return Err(Error::AlreadyRunning);
        }
        if let Some(err) = self.take_failure().await {
            warn!(task = %self.name, "discarding previous failure: {err}");
        }

        let stop = Arc::clone(&self.stop);
        let name = self.name.clone();
        self.handle = Some(tokio::spawn(async move {
            let outcome = async {
                while !stop.load(Ordering::Acquire) {
                    work().await?;
                    tokio::task::yield_now().await;
                }
                Ok::<(), Error>(())
            }
            .await;
            if let Err(err) = &outcome {
                error!(task = %name, "task stopped: {err}");
            }
            outcome
        }));

        debug!(task = %self.name, "task started");
        Ok(())
    }

    /// Stops the loop after its current iteration and awaits its exit.
    ///
    /// Returns the error of the final iteration if it failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRunning`] if the task is not alive.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::NotRunning);
        }
        let Some(handle) = self.handle.take() else {
            return Err(Error::NotRunning);
        };

        self.stop.store(true, Ordering::Release);
        let outcome = join_async(handle).await;
        self.stop.store(false, Ordering::Release);

        debug!(task = %self.name, "task stopped");
        outcome
    }

    /// Reaps a task which ended on its own and returns its failure, if any.
    pub async fn take_failure(&mut self) -> Option<Error> {
        if self.is_alive() {
            return None;
        }
        match self.handle.take() {
            Some(handle) => join_async(handle).await.err(),
            None => None,
        }
    }

    /// Cancels the loop at its next `.await` without waiting for it.
    ///
    /// The outcome of the cancelled loop is discarded.
    pub fn abort(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.stop = Arc::new(AtomicBool::new(false));
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(task = %self.name, "task aborted");
        }
    }
}

impl Drop for AsyncTask {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn join_async(handle: tokio::task::JoinHandle<Result<()>>) -> Result<()> {
    match handle.await {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => Err(Error::TaskPanicked(panic_message(err.into_panic()))),
        Err(err) => Err(Error::TaskPanicked(err.to_string())),
    }
}
