//! Branch-aware workflow scheduler for tiled whole-slide image analysis
//!
//! This crate provides the scheduling and execution core of an image-analysis
//! service:
//! - An in-memory state store of workflows, jobs, per-branch FIFO queues, and
//!   the running set, behind a single mutation discipline
//! - A scheduler that admits queue heads under a global worker cap, per-branch
//!   serialization, and an active-user fairness cap
//! - Tiled task runners for cell segmentation (bounded inference concurrency)
//!   and tissue masking, reporting monotonic progress and writing JSON
//!   artifacts
//! - An in-process submission service realizing the ingestion contract
//!
//! The image decoder and the segmentation inference engine are opaque
//! collaborators behind the [`slide`] and [`inference`] traits.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod artifact;
pub mod config;
pub mod constants;
pub mod error;
pub mod inference;
pub mod job;
pub mod scheduler;
pub mod slide;
pub mod state;
pub mod submit;
pub mod tasks;
pub mod tiles;

pub use config::SchedulerConfig;
pub use error::{SchedulerError, SchedulerResult};
pub use inference::{InferenceEngine, NullInference, Region};
pub use job::{Job, JobId, JobStatus, JobType, SharedJob, Workflow, WorkflowId};
pub use scheduler::Scheduler;
pub use slide::{RgbTile, SlideOpener, SlideRegionReader, SyntheticSlide, SyntheticSlideOpener};
pub use state::StateStore;
pub use submit::{JobRequest, JobView, SubmissionService, WorkflowView};
pub use tasks::RunnerContext;
