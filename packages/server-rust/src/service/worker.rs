//! Background worker for the top-up command hand-off.
//!
//! Provides a generic `BackgroundWorker<R>` that processes tasks from an mpsc channel
//! via a `BackgroundRunnable` implementation, with optional periodic tick callbacks.
//! [`IntentJournal`] is the runnable that receives finalized top-up intents.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use wallet_core::{PaymentProvider, TopUpIntent};

use crate::traits::IntentPublisher;

/// Capacity of the task channel feeding each worker.
pub const WORKER_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Trait for task handlers executed by `BackgroundWorker`.
///
/// Implementors define how individual tasks are processed, what happens on each
/// periodic tick, and how to clean up on shutdown.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called periodically (on each tick interval). Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Generic background worker that processes tasks via an mpsc channel.
///
/// The worker spawns a tokio task that:
/// 1. Listens for tasks on the mpsc channel
/// 2. Calls `BackgroundRunnable::run()` for each task
/// 3. Periodically calls `BackgroundRunnable::on_tick()` at the configured interval
/// 4. Drains queued tasks and calls `BackgroundRunnable::shutdown()` when stopped
///
/// All handle methods take `&self`, so the worker can be shared behind an `Arc`.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Mutex<Option<mpsc::Sender<R::Task>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Start the background worker with the given runnable and tick interval.
    ///
    /// Returns a `BackgroundWorker` handle that can be used to submit tasks
    /// and stop the worker. The channel capacity is [`WORKER_CHANNEL_CAPACITY`].
    pub fn start(mut runnable: R, tick_interval_ms: u64) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(WORKER_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut tick_interval =
                tokio::time::interval(std::time::Duration::from_millis(tick_interval_ms.max(1)));
            // Skip the first immediate tick so on_tick doesn't fire at startup.
            tick_interval.tick().await;

            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break, // Channel closed.
                        }
                    }
                    _ = tick_interval.tick() => {
                        runnable.on_tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            // Accepted hand-offs are processed before shutdown.
            rx.close();
            while let Some(t) = rx.recv().await {
                runnable.run(t).await;
            }

            runnable.shutdown().await;
        });

        Self {
            tx: Mutex::new(Some(tx)),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Submit a task to the worker, waiting for channel capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        let tx = self.tx.lock().clone();
        match tx {
            Some(tx) => tx
                .send(task)
                .await
                .map_err(|_| anyhow::anyhow!("worker channel closed")),
            None => Err(anyhow::anyhow!("worker not running")),
        }
    }

    /// Whether the worker still accepts tasks.
    pub fn is_running(&self) -> bool {
        self.tx.lock().is_some()
    }

    /// Stop the worker gracefully, waiting for the worker task to complete.
    pub async fn stop(&self) {
        // Signal shutdown.
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        // Close the task channel.
        self.tx.lock().take();
        // Wait for the worker task to finish.
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "background worker task failed");
            }
        }
    }
}

#[async_trait]
impl<R> IntentPublisher for BackgroundWorker<R>
where
    R: BackgroundRunnable<Task = TopUpIntent>,
{
    async fn publish(&self, intent: TopUpIntent) -> anyhow::Result<()> {
        self.submit(intent).await
    }
}

// ---------------------------------------------------------------------------
// IntentJournal
// ---------------------------------------------------------------------------

/// Running totals of intents received for one provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntentTotals {
    pub count: u64,
    pub amount: Decimal,
}

/// Shared view of the totals accumulated by an [`IntentJournal`].
pub type JournalTotals = Arc<Mutex<HashMap<PaymentProvider, IntentTotals>>>;

/// Receives finalized top-up intents off the request path.
///
/// Keeps per-provider totals, logs each intent, and logs a summary on every
/// tick and once more at shutdown.
#[derive(Debug, Default)]
pub struct IntentJournal {
    totals: JournalTotals,
}

impl IntentJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the totals, readable while the worker runs.
    #[must_use]
    pub fn totals(&self) -> JournalTotals {
        Arc::clone(&self.totals)
    }

    fn log_summary(&self, message: &'static str) {
        let totals = self.totals.lock();
        for provider in PaymentProvider::ALL {
            if let Some(t) = totals.get(&provider) {
                tracing::info!(
                    provider = provider.as_str(),
                    count = t.count,
                    amount = %t.amount,
                    "{message}"
                );
            }
        }
    }
}

#[async_trait]
impl BackgroundRunnable for IntentJournal {
    type Task = TopUpIntent;

    async fn run(&mut self, intent: TopUpIntent) {
        tracing::info!(
            provider = intent.provider.as_str(),
            amount = %intent.amount,
            "top-up intent received"
        );
        let mut totals = self.totals.lock();
        let entry = totals.entry(intent.provider).or_default();
        entry.count += 1;
        entry.amount += intent.amount;
    }

    async fn on_tick(&mut self) {
        self.log_summary("top-up intent totals");
    }

    async fn shutdown(&mut self) {
        self.log_summary("final top-up intent totals");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
