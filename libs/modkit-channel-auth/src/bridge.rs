//! Run async token acquisition from synchronous inspector code.
//!
//! Inspectors run inside whatever thread sends the request, which may be a
//! tokio worker or the only thread of a current-thread runtime. Blocking that
//! thread on a future that needs the same runtime deadlocks. The bridge never
//! touches the caller's runtime: every acquisition is spawned on a dedicated
//! worker thread that owns its own current-thread runtime, and the caller
//! waits on a plain channel for the result. Nothing about the caller's
//! execution context is modified, so there is nothing to restore.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::TokenError;
use crate::source::{AccessToken, TokenSource};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

const WORKER_NAME: &str = "modkit-token-bridge";

/// Lazily started worker that executes token acquisitions.
///
/// Dropping the last reference stops the worker once queued work is gone.
#[derive(Default)]
pub struct TokenBridge {
    jobs: Mutex<Option<mpsc::UnboundedSender<Job>>>,
}

impl TokenBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block the current thread until `source` yields a token for `scope`.
    ///
    /// Safe to call from inside any tokio runtime flavor.
    ///
    /// # Errors
    /// The source's own error, unchanged, or [`TokenError::Unavailable`]
    /// when the worker cannot run the acquisition.
    pub fn acquire(
        &self,
        source: Arc<dyn TokenSource>,
        scope: &str,
    ) -> Result<AccessToken, TokenError> {
        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        let scope = scope.to_owned();
        let job: Job = Box::pin(async move {
            let result = source.get_token(&scope).await;
            if reply_tx.send(result).is_err() {
                tracing::trace!("token requester went away before completion");
            }
        });

        self.submit(job)?;

        reply_rx.recv().map_err(|_| {
            TokenError::Unavailable("token source did not complete".to_owned())
        })?
    }

    fn submit(&self, job: Job) -> Result<(), TokenError> {
        let mut jobs = self.jobs.lock();
        let sender = match jobs.take() {
            Some(sender) if !sender.is_closed() => sender,
            _ => spawn_worker()?,
        };
        let sent = sender
            .send(job)
            .map_err(|_| TokenError::Unavailable("token bridge worker stopped".to_owned()));
        *jobs = Some(sender);
        sent
    }

    /// Whether the worker thread has been started and is still accepting work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.jobs
            .lock()
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }
}

impl std::fmt::Debug for TokenBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBridge")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn spawn_worker() -> Result<mpsc::UnboundedSender<Job>, TokenError> {
    let (jobs_tx, mut jobs_rx) = mpsc::unbounded_channel::<Job>();
    let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), String>>(1);

    std::thread::Builder::new()
        .name(WORKER_NAME.to_owned())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    drop(ready_tx.send(Err(e.to_string())));
                    return;
                }
            };
            if ready_tx.send(Ok(())).is_err() {
                return;
            }
            tracing::debug!(worker = WORKER_NAME, "token bridge worker started");

            runtime.block_on(async move {
                while let Some(job) = jobs_rx.recv().await {
                    tokio::spawn(job);
                }
            });
            tracing::debug!(worker = WORKER_NAME, "token bridge worker stopped");
        })
        .map_err(|e| TokenError::Unavailable(format!("failed to start token bridge: {e}")))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(jobs_tx),
        Ok(Err(reason)) => Err(TokenError::Unavailable(format!(
            "failed to build token bridge runtime: {reason}"
        ))),
        Err(_) => Err(TokenError::Unavailable(
            "token bridge worker exited during startup".to_owned(),
        )),
    }
}
