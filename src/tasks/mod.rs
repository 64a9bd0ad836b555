//! Task dispatch and lifecycle
//!
//! The scheduler admits a job and hands it here. The dispatcher selects the
//! routine for the job type, runs it, finalizes the terminal status, and frees
//! the running slot.

pub mod segmentation;
pub mod tissue_mask;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error};

use crate::config::SchedulerConfig;
use crate::inference::InferenceEngine;
use crate::job::{JobStatus, JobType, SharedJob};
use crate::slide::SlideOpener;
use crate::state::StateStore;

/// Shared collaborators handed to every task runner
#[derive(Clone)]
pub struct RunnerContext {
    /// The state store; runners touch it only to free their running slot
    pub store: StateStore,
    /// Slide decoder collaborator
    pub opener: Arc<dyn SlideOpener>,
    /// Segmentation inference collaborator
    pub inference: Arc<dyn InferenceEngine>,
    /// Limits and tile geometry
    pub config: Arc<SchedulerConfig>,
}

/// Run a job to completion and finalize its status.
///
/// Invoked by the scheduler after the job has been marked RUNNING and inserted
/// into the running set. Always removes the job from the running set on exit.
pub async fn run_job(ctx: RunnerContext, job: SharedJob) {
    let (job_id, job_type, slide_path) = {
        let j = job.read();
        (j.id, j.job_type, j.slide_path.clone())
    };

    let result = match job_type {
        JobType::CellSegmentation => segmentation::process_slide(&ctx, &job, &slide_path).await,
        JobType::TissueMask => tissue_mask::generate_mask(&ctx, &job, &slide_path).await,
    };

    {
        let mut j = job.write();
        match result {
            Ok(()) => {
                if !j.status.is_terminal() {
                    j.status = JobStatus::Succeeded;
                    j.progress = 100.0;
                }
            }
            Err(err) => {
                error!(job_id = %job_id, error = %err, "job failed");
                j.status = JobStatus::Failed;
                j.error_message = Some(err.to_string());
            }
        }
        j.completed_at = Some(Utc::now());
    }

    ctx.store
        .mutate(|inner| {
            inner.running.remove(&job_id);
        })
        .await;
    debug!(job_id = %job_id, "running slot freed");
}
