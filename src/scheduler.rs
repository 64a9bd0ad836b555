//! Branch-aware admission and dispatch loop
//!
//! Each cycle takes the store lock, evicts stale queue heads, and admits every
//! queue head that satisfies all three constraints at once: the global worker
//! cap, one running job per branch, and the active-user fairness cap. Selected
//! jobs are marked RUNNING under the lock and dispatched outside it. Every
//! branch is scanned every cycle, so any admissible head is eventually
//! admitted and a hot branch cannot starve a cold one.

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::job::{JobStatus, SharedJob};
use crate::state::StateInner;
use crate::tasks::{self, RunnerContext};

/// The scheduling loop
pub struct Scheduler {
    ctx: RunnerContext,
}

impl Scheduler {
    /// Create a scheduler over the given store and collaborators
    pub fn new(ctx: RunnerContext) -> Self {
        Self { ctx }
    }

    /// Spawn the scheduling loop as a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run scheduling cycles until the task is aborted
    pub async fn run(self) {
        loop {
            tokio::time::sleep(self.ctx.config.tick).await;
            self.cycle().await;
        }
    }

    /// One admission cycle; returns the number of jobs dispatched
    pub async fn cycle(&self) -> usize {
        let max_workers = self.ctx.config.max_workers;
        let active_users_limit = self.ctx.config.active_users_limit;
        let admitted = self
            .ctx
            .store
            .mutate(|inner| {
                if inner.running.len() >= max_workers {
                    return Vec::new();
                }
                let selected = select_admissible(inner, max_workers, active_users_limit);
                commit_admissions(inner, selected)
            })
            .await;

        let count = admitted.len();
        for job in admitted {
            let ctx = self.ctx.clone();
            tokio::spawn(tasks::run_job(ctx, job));
        }
        count
    }
}

/// Pick queue heads that can run without violating any constraint.
///
/// Evicts stale entries (missing jobs, jobs no longer PENDING) from the front
/// of each queue while scanning, and drops emptied queues. Selection is
/// provisional: returned jobs are still PENDING and still queued; the caller
/// commits them under the same critical section.
fn select_admissible(
    inner: &mut StateInner,
    max_workers: usize,
    active_users_limit: usize,
) -> Vec<SharedJob> {
    let mut active_users = inner.active_users();
    let mut busy_branches = inner.busy_branches();
    let mut provisional_running = inner.running.len();
    let mut selected: Vec<SharedJob> = Vec::new();

    let branches: Vec<String> = inner.branch_queues.keys().cloned().collect();
    for branch in branches {
        if provisional_running >= max_workers {
            break;
        }

        let Some(job) = evict_stale_and_peek(inner, &branch) else {
            continue;
        };

        let (user_id, job_branch) = {
            let j = job.read();
            (j.user_id.clone(), j.branch.clone())
        };

        // Serial per branch
        if busy_branches.contains(&job_branch) {
            continue;
        }
        // Admitting a new user must not open a slot beyond the fairness cap
        if !active_users.contains(&user_id) && active_users.len() >= active_users_limit {
            continue;
        }

        active_users.insert(user_id);
        busy_branches.insert(job_branch);
        provisional_running += 1;
        selected.push(job);
    }
    selected
}

/// Pop stale entries off the front of `branch`'s queue and return the first
/// live PENDING head, if any. Removes the queue once it is empty.
fn evict_stale_and_peek(inner: &mut StateInner, branch: &str) -> Option<SharedJob> {
    loop {
        let head_id = match inner.branch_queues.get(branch).and_then(|q| q.front().copied()) {
            Some(id) => id,
            None => {
                inner.branch_queues.remove(branch);
                return None;
            }
        };
        let live = inner
            .jobs
            .get(&head_id)
            .filter(|job| job.read().status == JobStatus::Pending)
            .cloned();
        match live {
            Some(job) => return Some(job),
            None => {
                debug!(branch = %branch, job_id = %head_id, "evicting stale queue entry");
                if let Some(queue) = inner.branch_queues.get_mut(branch) {
                    queue.pop_front();
                }
            }
        }
    }
}

/// Transition selected jobs to RUNNING: pop the verified queue head, insert
/// the id into the running set, stamp the admission time
fn commit_admissions(inner: &mut StateInner, selected: Vec<SharedJob>) -> Vec<SharedJob> {
    let mut admitted = Vec::with_capacity(selected.len());
    for job in selected {
        let (id, branch) = {
            let j = job.read();
            (j.id, j.branch.clone())
        };

        let popped = match inner.branch_queues.get_mut(&branch) {
            Some(queue) if queue.front() == Some(&id) => {
                queue.pop_front();
                true
            }
            _ => false,
        };
        if !popped {
            debug!(job_id = %id, branch = %branch, "queue head changed under selection; skipping");
            continue;
        }
        if inner
            .branch_queues
            .get(&branch)
            .is_some_and(|queue| queue.is_empty())
        {
            inner.branch_queues.remove(&branch);
        }

        {
            let mut j = job.write();
            j.status = JobStatus::Running;
            j.started_at = Some(Utc::now());
        }
        inner.running.insert(id);
        debug!(job_id = %id, branch = %branch, "job admitted");
        admitted.push(job);
    }
    admitted
}
