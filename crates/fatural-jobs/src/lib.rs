//! # fatural-jobs
//!
//! The bill processing pipeline.
//!
//! This crate provides:
//! - `DuplicateDetector`: tenant-scoped nearest-neighbour check
//! - `BillStateMachine`: guarded lifecycle writes
//! - `PipelineOrchestrator`: fetch, extract, embed, detect, commit
//! - `DeliveryAdapter`: decode, process, ack/nack decision
//! - `PullWorker`: bounded-concurrency pull loop over a `MessageSource`
//! - `push::router`: HTTP push endpoint

pub mod config;
pub mod delivery;
pub mod detector;
pub mod lifecycle;
pub mod orchestrator;
pub mod pubsub;
pub mod push;
pub mod source;
pub mod worker;

pub use config::PipelineConfig;
pub use delivery::{DeliveryAdapter, DeliveryOutcome, WorkerEvent};
pub use detector::DuplicateDetector;
pub use lifecycle::BillStateMachine;
pub use orchestrator::{DropReason, PipelineOrchestrator, ProcessOutcome};
pub use pubsub::PubSubSource;
pub use source::{MemorySource, MessageSource, ReceivedMessage};
pub use worker::{PullWorker, WorkerConfig, WorkerHandle};
