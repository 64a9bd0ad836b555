//! Job and workflow records

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchedulerError;

/// Unique identifier for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    /// Generate a new workflow ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Queued on its branch FIFO, not yet admitted
    Pending,
    /// Holds a running slot; its task runner is active
    Running,
    /// Completed successfully (terminal)
    Succeeded,
    /// Fatally errored (terminal)
    Failed,
    /// Cancelled while pending (terminal)
    Cancelled,
}

impl JobStatus {
    /// Whether this state admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{name}")
    }
}

/// Task routine discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Tiled cell segmentation with bounded inference concurrency
    CellSegmentation,
    /// Single-threaded tissue-mask computation
    TissueMask,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobType::CellSegmentation => "CELL_SEGMENTATION",
            JobType::TissueMask => "TISSUE_MASK",
        };
        write!(f, "{name}")
    }
}

impl FromStr for JobType {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CELL_SEGMENTATION" => Ok(JobType::CellSegmentation),
            "TISSUE_MASK" => Ok(JobType::TissueMask),
            other => Err(SchedulerError::UnsupportedJobType(other.to_string())),
        }
    }
}

/// Shared handle to a job record.
///
/// The record is shared between the state store and the running task runner.
/// While a job is RUNNING its runner is the only writer of `progress`,
/// `status`, and `error_message`; every other writer goes through the store's
/// mutation discipline first.
pub type SharedJob = Arc<RwLock<Job>>;

/// Unit of schedulable work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier
    pub id: JobId,
    /// Owning workflow
    pub workflow_id: WorkflowId,
    /// Owning user (opaque equality key)
    pub user_id: String,
    /// Serialization key: at most one running job per branch
    pub branch: String,
    /// Routine discriminator
    pub job_type: JobType,
    /// Locator of the input slide
    pub slide_path: String,
    /// Current lifecycle state
    pub status: JobStatus,
    /// Completion percentage in [0.0, 100.0], monotonically non-decreasing
    pub progress: f64,
    /// Human-readable failure reason, set on FAILED
    pub error_message: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Admission timestamp
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal-transition timestamp
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job
    pub fn new(
        workflow_id: WorkflowId,
        user_id: impl Into<String>,
        branch: impl Into<String>,
        job_type: JobType,
        slide_path: impl Into<String>,
    ) -> Self {
        Self {
            id: JobId::new(),
            workflow_id,
            user_id: user_id.into(),
            branch: branch.into(),
            job_type,
            slide_path: slide_path.into(),
            status: JobStatus::Pending,
            progress: 0.0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Advance progress, clamped to 100 and never decreasing
    pub fn advance_progress(&mut self, value: f64) {
        let clamped = value.min(100.0);
        if clamped > self.progress {
            self.progress = clamped;
        }
    }
}

/// User-owned grouping of jobs; no scheduling semantics of its own
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier
    pub id: WorkflowId,
    /// Owning user
    pub user_id: String,
    /// Member jobs in submission order
    pub job_ids: Vec<JobId>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Create an empty workflow
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            id: WorkflowId::new(),
            user_id: user_id.into(),
            job_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
