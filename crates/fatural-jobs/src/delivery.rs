//! Delivery adapter: raw message bytes in, ack/nack decision out.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, warn};
use uuid::Uuid;

use fatural_core::{defaults, ProcessingJob};

use crate::orchestrator::{PipelineOrchestrator, ProcessOutcome};

/// Event emitted by the delivery adapter and the pull worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A decoded job entered the pipeline.
    JobStarted { bill_id: Uuid, company_id: Uuid },
    /// A bill reached `completed`.
    JobCompleted {
        bill_id: Uuid,
        fingerprinted: bool,
        fallback: bool,
    },
    /// A bill reached `duplicate`.
    JobDuplicate {
        bill_id: Uuid,
        duplicate_of: Uuid,
        similarity: f64,
    },
    /// A message was acknowledged without processing.
    JobDropped {
        bill_id: Option<Uuid>,
        reason: String,
    },
    /// Processing failed; the message will be redelivered.
    JobFailed { bill_id: Uuid, error: String },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// What happened to one delivered message.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// The orchestrator handled the job (including drops).
    Processed {
        bill_id: Uuid,
        outcome: ProcessOutcome,
    },
    /// The payload did not decode into a job.
    Malformed(String),
    /// The orchestrator returned an error.
    Failed { bill_id: Uuid, error: String },
}

impl DeliveryOutcome {
    /// Acknowledge everything except pipeline failures. A malformed payload
    /// is acknowledged since it can never decode on retry.
    pub fn should_ack(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Decodes messages, runs the orchestrator, and reports outcomes.
pub struct DeliveryAdapter {
    orchestrator: Arc<PipelineOrchestrator>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl DeliveryAdapter {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            orchestrator,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: WorkerEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Handle one message payload (the JSON upload message).
    pub async fn deliver(&self, data: &[u8]) -> DeliveryOutcome {
        let job = match ProcessingJob::decode(data) {
            Ok(job) => job,
            Err(e) => {
                warn!(
                    subsystem = "delivery",
                    error = %e,
                    size_bytes = data.len(),
                    "Malformed message; acknowledging"
                );
                let reason = e.to_string();
                self.emit(WorkerEvent::JobDropped {
                    bill_id: None,
                    reason: reason.clone(),
                });
                return DeliveryOutcome::Malformed(reason);
            }
        };

        self.emit(WorkerEvent::JobStarted {
            bill_id: job.bill_id,
            company_id: job.company_id,
        });

        match self.orchestrator.process(&job).await {
            Ok(outcome) => {
                self.emit(match &outcome {
                    ProcessOutcome::Completed {
                        fingerprinted,
                        fallback,
                    } => WorkerEvent::JobCompleted {
                        bill_id: job.bill_id,
                        fingerprinted: *fingerprinted,
                        fallback: *fallback,
                    },
                    ProcessOutcome::Duplicate {
                        duplicate_of,
                        similarity,
                    } => WorkerEvent::JobDuplicate {
                        bill_id: job.bill_id,
                        duplicate_of: *duplicate_of,
                        similarity: *similarity,
                    },
                    ProcessOutcome::Dropped(reason) => WorkerEvent::JobDropped {
                        bill_id: Some(job.bill_id),
                        reason: reason.to_string(),
                    },
                });
                DeliveryOutcome::Processed {
                    bill_id: job.bill_id,
                    outcome,
                }
            }
            Err(e) => {
                error!(
                    subsystem = "delivery",
                    bill_id = %job.bill_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Job failed; requesting redelivery"
                );
                let error = e.to_string();
                self.emit(WorkerEvent::JobFailed {
                    bill_id: job.bill_id,
                    error: error.clone(),
                });
                DeliveryOutcome::Failed {
                    bill_id: job.bill_id,
                    error,
                }
            }
        }
    }
}
