//! Error types for the version generation pipeline.
//!
//! The taxonomy follows how failures propagate: `Config` aborts a job before
//! any image is touched, `Transform` is scoped to a single image/iteration
//! and recorded in the job error log, `Storage` is left to the external
//! queue's at-least-once retry, and `JobTimeout` fails the job while keeping
//! already-written samples.

use thiserror::Error;

/// Main error type for dataset version operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid or unsupported transform configuration. Surfaced before the
    /// job transitions out of QUEUED.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A single transform application failed on one image/iteration.
    #[error("transform failed: {0}")]
    Transform(String),

    /// A blob or metadata store call failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The job exceeded its wall-clock deadline.
    #[error("job deadline exceeded after {elapsed_secs}s (limit {limit_secs}s)")]
    JobTimeout { elapsed_secs: u64, limit_secs: u64 },

    /// The job was cancelled at an inter-image checkpoint.
    #[error("job cancelled after {completed} images")]
    Cancelled { completed: usize },

    /// Image decode/encode failure.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PipelineError {
    /// Builds a `Config` error from anything displayable.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        PipelineError::Config(msg.to_string())
    }

    /// Builds a `Transform` error from anything displayable.
    pub fn transform(msg: impl std::fmt::Display) -> Self {
        PipelineError::Transform(msg.to_string())
    }

    /// Builds a `Storage` error from anything displayable.
    pub fn storage(msg: impl std::fmt::Display) -> Self {
        PipelineError::Storage(msg.to_string())
    }
}

/// Convenience result type used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
