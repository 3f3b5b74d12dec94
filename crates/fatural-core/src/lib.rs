//! # fatural-core
//!
//! Core types, traits, and abstractions for the fatural bill pipeline.
//!
//! This crate provides the bill domain model, the lifecycle rules, the
//! collaborator traits that the pipeline is written against, and the shared
//! error type.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod similarity;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use similarity::{
    cosine_distance, cosine_similarity, is_zero_vector, similarity_from_distance,
};
pub use traits::*;

/// Generate a new time-ordered UUIDv7.
pub fn new_v7() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}
