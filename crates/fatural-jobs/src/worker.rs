//! Pull worker: leases messages and runs them with bounded concurrency.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use fatural_core::{defaults, Error, Result};

use crate::delivery::{DeliveryAdapter, WorkerEvent};
use crate::source::{MessageSource, ReceivedMessage};

/// Configuration for the pull worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs in flight.
    pub max_in_flight: usize,
    /// Maximum payload bytes in flight.
    pub max_in_flight_bytes: usize,
    /// Messages requested per pull.
    pub pull_batch: usize,
    /// Sleep when the queue is idle, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: defaults::WORKER_MAX_IN_FLIGHT,
            max_in_flight_bytes: defaults::WORKER_MAX_IN_FLIGHT_BYTES,
            pull_batch: defaults::WORKER_PULL_BATCH,
            poll_interval_ms: defaults::WORKER_POLL_INTERVAL_MS,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_MAX_IN_FLIGHT` | `10` | Concurrent jobs |
    /// | `WORKER_MAX_IN_FLIGHT_BYTES` | `10485760` | Payload byte ceiling |
    /// | `WORKER_PULL_BATCH` | `10` | Messages per pull |
    /// | `WORKER_POLL_INTERVAL_MS` | `1000` | Idle poll interval |
    pub fn from_env() -> Self {
        fn parse<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }
        let base = Self::default();
        Self {
            max_in_flight: parse(defaults::ENV_WORKER_MAX_IN_FLIGHT)
                .unwrap_or(base.max_in_flight)
                .max(1),
            max_in_flight_bytes: parse(defaults::ENV_WORKER_MAX_IN_FLIGHT_BYTES)
                .unwrap_or(base.max_in_flight_bytes)
                .max(1),
            pull_batch: parse(defaults::ENV_WORKER_PULL_BATCH)
                .unwrap_or(base.pull_batch)
                .max(1),
            poll_interval_ms: parse(defaults::ENV_WORKER_POLL_INTERVAL_MS)
                .unwrap_or(base.poll_interval_ms),
        }
    }

    /// Set maximum jobs in flight.
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    /// Set the payload byte ceiling.
    pub fn with_max_in_flight_bytes(mut self, max: usize) -> Self {
        self.max_in_flight_bytes = max.max(1);
        self
    }

    pub fn with_pull_batch(mut self, n: usize) -> Self {
        self.pull_batch = n.max(1);
        self
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }
}

/// Semaphore size for a byte ceiling.
pub(crate) fn byte_budget(max_in_flight_bytes: usize) -> usize {
    max_in_flight_bytes.clamp(1, u32::MAX as usize)
}

/// Byte permits a payload of `len` bytes holds. Oversized payloads take the
/// whole budget so they still run, alone.
pub(crate) fn byte_permits(len: usize, max_in_flight_bytes: usize) -> u32 {
    len.clamp(1, byte_budget(max_in_flight_bytes)) as u32
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to stop pulling. In-flight jobs still finish.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// Wait until the worker has drained and stopped.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Worker task panicked: {}", e)))
    }

    /// Signal shutdown and wait for the drain.
    pub async fn stop(self) -> Result<()> {
        // The loop may already have exited; a closed channel is fine here.
        let _ = self.shutdown_tx.send(()).await;
        self.join().await
    }
}

/// Pull worker over a [`MessageSource`].
pub struct PullWorker {
    source: Arc<dyn MessageSource>,
    adapter: Arc<DeliveryAdapter>,
    config: WorkerConfig,
}

impl PullWorker {
    pub fn new(
        source: Arc<dyn MessageSource>,
        adapter: Arc<DeliveryAdapter>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            source,
            adapter,
            config,
        }
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.adapter.events();

        let task = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            task,
        }
    }

    #[instrument(skip(self, shutdown_rx), fields(subsystem = "worker", component = "pull"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        info!(
            max_in_flight = self.config.max_in_flight,
            max_in_flight_bytes = self.config.max_in_flight_bytes,
            pull_batch = self.config.pull_batch,
            "Pull worker started"
        );
        self.adapter.emit(WorkerEvent::WorkerStarted);

        let slots = Arc::new(Semaphore::new(self.config.max_in_flight));
        let bytes = Arc::new(Semaphore::new(byte_budget(self.config.max_in_flight_bytes)));
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut tasks: JoinSet<()> = JoinSet::new();

        'outer: loop {
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    error!(error = ?e, "Job task panicked");
                }
            }

            let free = slots.available_permits();
            if free == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    Some(result) = tasks.join_next() => {
                        if let Err(e) = result {
                            error!(error = ?e, "Job task panicked");
                        }
                    }
                }
                continue;
            }

            let batch = match self.source.pull(free.min(self.config.pull_batch)).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "Pull failed");
                    Vec::new()
                }
            };

            if batch.is_empty() {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = sleep(poll_interval) => {}
                }
                continue;
            }

            debug!(count = batch.len(), in_flight = tasks.len(), "Leased messages");
            for (i, message) in batch.iter().enumerate() {
                let acquired = async {
                    let slot = slots.clone().acquire_owned().await.ok()?;
                    let budget = bytes
                        .clone()
                        .acquire_many_owned(byte_permits(
                            message.data.len(),
                            self.config.max_in_flight_bytes,
                        ))
                        .await
                        .ok()?;
                    Some((slot, budget))
                };
                let permits = tokio::select! {
                    _ = shutdown_rx.recv() => None,
                    permits = acquired => permits,
                };
                let Some(permits) = permits else {
                    // Stopping: hand the unstarted messages back to the queue.
                    let ack_ids: Vec<String> =
                        batch[i..].iter().map(|m| m.ack_id.clone()).collect();
                    if let Err(e) = self.source.nack(&ack_ids).await {
                        warn!(error = %e, "Failed to release unstarted messages");
                    }
                    break 'outer;
                };
                self.spawn_job(&mut tasks, message.clone(), permits);
            }
        }

        info!(in_flight = tasks.len(), "Pull worker draining");
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = ?e, "Job task panicked");
            }
        }

        self.adapter.emit(WorkerEvent::WorkerStopped);
        info!("Pull worker stopped");
    }

    fn spawn_job(
        &self,
        tasks: &mut JoinSet<()>,
        message: ReceivedMessage,
        permits: (OwnedSemaphorePermit, OwnedSemaphorePermit),
    ) {
        let source = self.source.clone();
        let adapter = self.adapter.clone();
        tasks.spawn(async move {
            let _permits = permits;
            let start = Instant::now();
            let outcome = adapter.deliver(&message.data).await;
            let ack_ids = [message.ack_id.clone()];
            let settled = if outcome.should_ack() {
                source.ack(&ack_ids).await
            } else {
                source.nack(&ack_ids).await
            };
            if let Err(e) = settled {
                warn!(message_id = %message.message_id, error = %e, "Failed to settle message");
            }
            debug!(
                message_id = %message.message_id,
                acked = outcome.should_ack(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Message settled"
            );
        });
    }
}
