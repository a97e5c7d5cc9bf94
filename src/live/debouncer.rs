//! Reload debouncing.
//!
//! A [`Debouncer`] enforces at-most-one in-flight run: the first caller
//! starts a runner, and every request that arrives while a run is in
//! progress is absorbed into the next batch. After a run completes, if
//! requests queued up during it, exactly one more run executes after the
//! quiet interval, coalescing everything queued so far, until the queue
//! drains. A failed run rejects every caller queued in its batch and does
//! not stop later batches.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::core::{Error, Result};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;
type Waiter = oneshot::Sender<std::result::Result<(), String>>;

#[derive(Default)]
struct Inner {
    /// The job the next batch will run; later requests replace it.
    next_job: Option<Job>,
    waiters: Vec<Waiter>,
    executing: bool,
}

/// Coalesces bursts of reload requests into sequential batched runs.
pub(crate) struct Debouncer {
    interval: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl Debouncer {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Queue a job and wait for the batch that absorbs it to finish.
    pub(crate) async fn debounce<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = lock(&self.inner);
            inner.next_job = Some(Box::new(job));
            inner.waiters.push(tx);

            if !inner.executing {
                inner.executing = true;
                tokio::spawn(run(Arc::clone(&self.inner), self.interval));
            }
        }

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(Error::ReloadFailed { message }),
            Err(_) => Err(Error::ReloadFailed {
                message: "debounced run was dropped".to_string(),
            }),
        }
    }
}

async fn run(inner: Arc<Mutex<Inner>>, interval: Duration) {
    loop {
        let (job, waiters) = {
            let mut guard = lock(&inner);
            match guard.next_job.take() {
                Some(job) => (job, std::mem::take(&mut guard.waiters)),
                None => {
                    guard.executing = false;
                    return;
                }
            }
        };

        let result = job().await.map_err(|err| err.to_string());
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }

        // Quiet interval before the batch that queued up during this run.
        let queued = !lock(&inner).waiters.is_empty();
        if queued {
            tokio::time::sleep(interval).await;
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> std::sync::MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
