//! Workflow intake and read/cancel surface
//!
//! Realizes the ingestion contract as an in-process service: constructing
//! workflows and jobs, enqueueing them on branch FIFOs, and exposing
//! owner-scoped reads and pending-job cancellation. Transport concerns stay
//! outside the core; callers hand in an already-authenticated opaque user id.
//! Non-owner lookups report not-found rather than forbidden.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{SchedulerError, SchedulerResult};
use crate::job::{Job, JobId, JobStatus, JobType, SharedJob, Workflow, WorkflowId};
use crate::state::StateStore;

/// Specification of one job within a workflow submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Serialization key for the job
    pub branch: String,
    /// Routine discriminator
    pub job_type: JobType,
    /// Locator of the input slide
    pub slide_path: String,
}

/// Snapshot of a job for external readers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    /// Job identifier
    pub job_id: JobId,
    /// Owning workflow
    pub workflow_id: WorkflowId,
    /// Serialization key
    pub branch: String,
    /// Owning user
    pub user_id: String,
    /// Routine discriminator
    pub job_type: JobType,
    /// Locator of the input slide
    pub slide_path: String,
    /// Lifecycle state at snapshot time
    pub status: JobStatus,
    /// Progress at snapshot time
    pub progress: f64,
    /// Failure reason, if FAILED
    pub error_message: Option<String>,
}

impl JobView {
    fn from_shared(job: &SharedJob) -> Self {
        let j = job.read();
        Self {
            job_id: j.id,
            workflow_id: j.workflow_id,
            branch: j.branch.clone(),
            user_id: j.user_id.clone(),
            job_type: j.job_type,
            slide_path: j.slide_path.clone(),
            status: j.status,
            progress: j.progress,
            error_message: j.error_message.clone(),
        }
    }
}

/// Snapshot of a workflow with derived progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowView {
    /// Workflow identifier
    pub workflow_id: WorkflowId,
    /// Owning user
    pub user_id: String,
    /// Member jobs in submission order
    pub jobs: Vec<JobView>,
    /// Arithmetic mean of member-job progress; 0.0 when empty
    pub progress: f64,
}

impl WorkflowView {
    fn build(workflow: &Workflow, jobs: Vec<JobView>) -> Self {
        let progress = mean_progress(&jobs);
        Self {
            workflow_id: workflow.id,
            user_id: workflow.user_id.clone(),
            jobs,
            progress,
        }
    }
}

/// Arithmetic mean of job progress; 0.0 for an empty slice
fn mean_progress(jobs: &[JobView]) -> f64 {
    if jobs.is_empty() {
        return 0.0;
    }
    jobs.iter().map(|job| job.progress).sum::<f64>() / jobs.len() as f64
}

/// Owner-scoped intake and query service over the state store
#[derive(Clone)]
pub struct SubmissionService {
    store: StateStore,
}

impl SubmissionService {
    /// Create a service over a store
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Create a workflow with one job per request.
    ///
    /// Jobs are registered and enqueued before the workflow is published, so a
    /// visible workflow always lists all of its submitted jobs.
    pub async fn create_workflow(
        &self,
        user_id: &str,
        requests: Vec<JobRequest>,
    ) -> SchedulerResult<WorkflowView> {
        let mut workflow = Workflow::new(user_id);
        let mut jobs: Vec<SharedJob> = Vec::with_capacity(requests.len());

        for request in requests {
            let job = Job::new(
                workflow.id,
                user_id,
                request.branch,
                request.job_type,
                request.slide_path,
            );
            workflow.job_ids.push(job.id);
            let shared = self.store.add_job(job).await;
            self.store.enqueue(&shared).await;
            jobs.push(shared);
        }
        self.store.add_workflow(workflow.clone()).await;

        info!(
            workflow_id = %workflow.id,
            user_id = %user_id,
            jobs = jobs.len(),
            "workflow submitted"
        );
        Ok(WorkflowView::build(
            &workflow,
            jobs.iter().map(JobView::from_shared).collect(),
        ))
    }

    /// All workflows owned by `user_id`, in creation order
    pub async fn list_workflows(&self, user_id: &str) -> Vec<WorkflowView> {
        let workflows = self.store.list_user_workflows(user_id).await;
        let mut views = Vec::with_capacity(workflows.len());
        for workflow in workflows {
            if let Ok(view) = self.workflow_view(&workflow).await {
                views.push(view);
            }
        }
        views
    }

    /// Fetch a workflow owned by `user_id`
    pub async fn get_workflow(
        &self,
        user_id: &str,
        id: &WorkflowId,
    ) -> SchedulerResult<WorkflowView> {
        let workflow = self
            .store
            .get_workflow(id)
            .await
            .ok_or(SchedulerError::WorkflowNotFound(*id))?;
        if workflow.user_id != user_id {
            return Err(SchedulerError::WorkflowNotFound(*id));
        }
        self.workflow_view(&workflow).await
    }

    /// Member jobs of a workflow owned by `user_id`
    pub async fn workflow_jobs(
        &self,
        user_id: &str,
        id: &WorkflowId,
    ) -> SchedulerResult<Vec<JobView>> {
        Ok(self.get_workflow(user_id, id).await?.jobs)
    }

    /// Fetch a job owned by `user_id`
    pub async fn get_job(&self, user_id: &str, id: &JobId) -> SchedulerResult<JobView> {
        let job = self
            .store
            .get_job(id)
            .await
            .ok_or(SchedulerError::JobNotFound(*id))?;
        if job.read().user_id != user_id {
            return Err(SchedulerError::JobNotFound(*id));
        }
        Ok(JobView::from_shared(&job))
    }

    /// Derived progress of a workflow owned by `user_id`, in [0, 100]
    pub async fn workflow_progress(
        &self,
        user_id: &str,
        id: &WorkflowId,
    ) -> SchedulerResult<f64> {
        Ok(self.get_workflow(user_id, id).await?.progress)
    }

    /// Cancel a pending job owned by `user_id`.
    ///
    /// Verifies the status, flips it to CANCELLED, and removes the queue entry
    /// eagerly, all inside one critical section. The scheduler's stale-head
    /// eviction covers any interleaving this races with.
    pub async fn cancel_job(&self, user_id: &str, id: &JobId) -> SchedulerResult<JobView> {
        let view = self
            .store
            .mutate(|inner| {
                let job = inner
                    .jobs
                    .get(id)
                    .cloned()
                    .ok_or(SchedulerError::JobNotFound(*id))?;

                let branch = {
                    let mut j = job.write();
                    if j.user_id != user_id {
                        return Err(SchedulerError::JobNotFound(*id));
                    }
                    if j.status != JobStatus::Pending {
                        return Err(SchedulerError::NotCancellable(j.status));
                    }
                    j.status = JobStatus::Cancelled;
                    j.completed_at = Some(Utc::now());
                    j.branch.clone()
                };

                if let Some(queue) = inner.branch_queues.get_mut(&branch) {
                    queue.retain(|queued| queued != id);
                }
                if inner
                    .branch_queues
                    .get(&branch)
                    .is_some_and(|queue| queue.is_empty())
                {
                    inner.branch_queues.remove(&branch);
                }
                Ok(JobView::from_shared(&job))
            })
            .await?;

        info!(job_id = %id, "job cancelled");
        Ok(view)
    }

    async fn workflow_view(&self, workflow: &Workflow) -> SchedulerResult<WorkflowView> {
        let jobs = self.store.workflow_jobs(&workflow.id).await?;
        Ok(WorkflowView::build(
            workflow,
            jobs.iter().map(JobView::from_shared).collect(),
        ))
    }
}
