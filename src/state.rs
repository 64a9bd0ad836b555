//! In-memory state store
//!
//! Single source of truth for workflows, job records, per-branch FIFO queues,
//! and the running set. All multi-collection inspections go through one async
//! mutex so the scheduler and the cancellation path observe consistent
//! snapshots.
//!
//! Lock order: the store mutex first, then individual job-record locks. A task
//! holding a job lock must never acquire the store mutex.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{SchedulerError, SchedulerResult};
use crate::job::{Job, JobId, SharedJob, Workflow, WorkflowId};

/// Mutable collections guarded by the store mutex
#[derive(Default)]
pub struct StateInner {
    /// All registered workflows
    pub workflows: HashMap<WorkflowId, Workflow>,
    /// All registered job records
    pub jobs: HashMap<JobId, SharedJob>,
    /// Branch label to job ids in FIFO order; entries reference PENDING jobs,
    /// stale entries are evicted lazily by the scheduler
    pub branch_queues: BTreeMap<String, VecDeque<JobId>>,
    /// Ids of jobs currently RUNNING
    pub running: HashSet<JobId>,
}

impl StateInner {
    /// Distinct owners of currently running jobs
    pub fn active_users(&self) -> HashSet<String> {
        self.running
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .map(|job| job.read().user_id.clone())
            .collect()
    }

    /// Branches of currently running jobs
    pub fn busy_branches(&self) -> HashSet<String> {
        self.running
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .map(|job| job.read().branch.clone())
            .collect()
    }
}

/// Handle to the shared in-memory state
#[derive(Clone, Default)]
pub struct StateStore {
    inner: Arc<Mutex<StateInner>>,
}

impl StateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the mutation discipline: exclusive access to every collection
    pub async fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().await
    }

    /// Run `f` as a scoped critical section over all collections
    pub async fn mutate<R>(&self, f: impl FnOnce(&mut StateInner) -> R) -> R {
        let mut inner = self.inner.lock().await;
        f(&mut inner)
    }

    /// Register a workflow. Member jobs should already be registered so the
    /// workflow never becomes visible with jobs missing.
    pub async fn add_workflow(&self, workflow: Workflow) {
        self.lock().await.workflows.insert(workflow.id, workflow);
    }

    /// Register a job record, ensuring workflow membership when its workflow
    /// is already known
    pub async fn add_job(&self, job: Job) -> SharedJob {
        let id = job.id;
        let workflow_id = job.workflow_id;
        let shared: SharedJob = Arc::new(RwLock::new(job));
        let mut inner = self.lock().await;
        inner.jobs.insert(id, shared.clone());
        if let Some(workflow) = inner.workflows.get_mut(&workflow_id) {
            if !workflow.job_ids.contains(&id) {
                workflow.job_ids.push(id);
            }
        }
        shared
    }

    /// Append a job to its branch FIFO, creating the queue lazily
    pub async fn enqueue(&self, job: &SharedJob) {
        let (id, branch) = {
            let j = job.read();
            (j.id, j.branch.clone())
        };
        self.lock()
            .await
            .branch_queues
            .entry(branch)
            .or_default()
            .push_back(id);
    }

    /// Fetch a job record
    pub async fn get_job(&self, id: &JobId) -> Option<SharedJob> {
        self.lock().await.jobs.get(id).cloned()
    }

    /// Fetch a workflow snapshot
    pub async fn get_workflow(&self, id: &WorkflowId) -> Option<Workflow> {
        self.lock().await.workflows.get(id).cloned()
    }

    /// All workflows owned by `user_id`, in creation order
    pub async fn list_user_workflows(&self, user_id: &str) -> Vec<Workflow> {
        let inner = self.lock().await;
        let mut workflows: Vec<Workflow> = inner
            .workflows
            .values()
            .filter(|workflow| workflow.user_id == user_id)
            .cloned()
            .collect();
        workflows.sort_by_key(|workflow| workflow.created_at);
        workflows
    }

    /// Member job records of a workflow, in membership order
    pub async fn workflow_jobs(&self, id: &WorkflowId) -> SchedulerResult<Vec<SharedJob>> {
        let inner = self.lock().await;
        let workflow = inner
            .workflows
            .get(id)
            .ok_or(SchedulerError::WorkflowNotFound(*id))?;
        Ok(workflow
            .job_ids
            .iter()
            .filter_map(|job_id| inner.jobs.get(job_id).cloned())
            .collect())
    }
}
