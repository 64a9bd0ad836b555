//! Error types for the scheduler core

use thiserror::Error;

use crate::job::{JobId, JobStatus, WorkflowId};

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Error types for the scheduler, the task runners, and the submission surface
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Job lookup failed
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    /// Workflow lookup failed
    #[error("Workflow {0} not found")]
    WorkflowNotFound(WorkflowId),

    /// Job-type discriminator was not recognized
    #[error("Unsupported job type: {0}")]
    UnsupportedJobType(String),

    /// Cancellation requested for a job that is no longer pending
    #[error("Cannot cancel job with status {0}; only PENDING jobs can be cancelled")]
    NotCancellable(JobStatus),

    /// The slide could not be opened (fatal to the job)
    #[error("Failed to open slide {path}: {reason}")]
    SlideOpen { path: String, reason: String },

    /// A tile region could not be read (tile-local)
    #[error("Failed to read region at ({x}, {y}): {reason}")]
    RegionRead { x: u32, y: u32, reason: String },

    /// Inference rejected a tile (tile-local)
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Artifact serialization failed
    #[error("Artifact serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Artifact or output-directory I/O failed
    #[error("Artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
