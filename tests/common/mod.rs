//! Shared fixtures for the integration suites
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use slideflow::{
    InferenceEngine, JobId, JobStatus, Region, RgbTile, RunnerContext, Scheduler, SchedulerConfig,
    SchedulerError, SchedulerResult, SlideOpener, SlideRegionReader, StateStore, SubmissionService,
    SyntheticSlide,
};

/// A running scheduler plus everything a scenario needs to poke it
pub struct Harness {
    pub store: StateStore,
    pub service: SubmissionService,
    pub results: TempDir,
    handle: JoinHandle<()>,
}

impl Harness {
    /// Start a scheduler with a fast tick and a throwaway results directory
    pub fn start(opener: Arc<dyn SlideOpener>, inference: Arc<dyn InferenceEngine>) -> Self {
        Self::start_with(opener, inference, |_| {})
    }

    /// Like [`Harness::start`] but lets the scenario tweak the config first
    pub fn start_with(
        opener: Arc<dyn SlideOpener>,
        inference: Arc<dyn InferenceEngine>,
        tweak: impl FnOnce(&mut SchedulerConfig),
    ) -> Self {
        let results = tempfile::tempdir().expect("tempdir");
        let mut config = SchedulerConfig {
            tick: Duration::from_millis(10),
            results_dir: results.path().to_path_buf(),
            ..SchedulerConfig::default()
        };
        tweak(&mut config);

        let store = StateStore::new();
        let ctx = RunnerContext {
            store: store.clone(),
            opener,
            inference,
            config: Arc::new(config),
        };
        let handle = Scheduler::new(ctx).spawn();
        Self {
            service: SubmissionService::new(store.clone()),
            store,
            results,
            handle,
        }
    }

    /// Path of an artifact in the harness results directory
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.results.path().join(file_name)
    }

    pub fn results_dir(&self) -> &Path {
        self.results.path()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Inference engine scripted per call: fixed latency, fixed region count,
/// optionally failing one specific call
pub struct ScriptedInference {
    delay: Duration,
    regions_per_tile: usize,
    fail_on_call: Option<usize>,
    calls: AtomicUsize,
}

impl ScriptedInference {
    pub fn new(delay: Duration, regions_per_tile: usize) -> Self {
        Self {
            delay,
            regions_per_tile,
            fail_on_call: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail the `call`-th invocation (1-based)
    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Number of `infer` invocations so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceEngine for ScriptedInference {
    fn infer(&self, _tile: &RgbTile) -> SchedulerResult<Vec<Region>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            // Runs on the blocking pool, so a real sleep is fine here
            std::thread::sleep(self.delay);
        }
        if self.fail_on_call == Some(call) {
            return Err(SchedulerError::Inference(format!(
                "scripted failure on call {call}"
            )));
        }
        let regions = (0..self.regions_per_tile)
            .map(|index| Region {
                label: (call * 100 + index) as i64,
                bbox: (0, 0, 16, 16),
                area: 256.0,
            })
            .collect();
        Ok(regions)
    }
}

/// Opener whose regions fail for the configured tile origins
pub struct FlakyOpener {
    slide: SyntheticSlide,
    failing: HashSet<(u32, u32)>,
}

impl FlakyOpener {
    pub fn new(slide: SyntheticSlide, failing: impl IntoIterator<Item = (u32, u32)>) -> Self {
        Self {
            slide,
            failing: failing.into_iter().collect(),
        }
    }
}

struct FlakyRegionSlide {
    inner: SyntheticSlide,
    failing: HashSet<(u32, u32)>,
}

impl SlideRegionReader for FlakyRegionSlide {
    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    fn read_region(&self, x: u32, y: u32, width: u32, height: u32) -> SchedulerResult<RgbTile> {
        if self.failing.contains(&(x, y)) {
            return Err(SchedulerError::RegionRead {
                x,
                y,
                reason: "injected read failure".to_string(),
            });
        }
        self.inner.read_region(x, y, width, height)
    }
}

impl SlideOpener for FlakyOpener {
    fn open(&self, _path: &str) -> SchedulerResult<Arc<dyn SlideRegionReader>> {
        Ok(Arc::new(FlakyRegionSlide {
            inner: self.slide.clone(),
            failing: self.failing.clone(),
        }))
    }
}

/// Opener that cannot open anything; every job fails fatally
pub struct BrokenOpener;

impl SlideOpener for BrokenOpener {
    fn open(&self, path: &str) -> SchedulerResult<Arc<dyn SlideRegionReader>> {
        Err(SchedulerError::SlideOpen {
            path: path.to_string(),
            reason: "decoder unavailable".to_string(),
        })
    }
}

/// Statuses of the given jobs, read in one pass
pub async fn statuses(store: &StateStore, ids: &[JobId]) -> Vec<JobStatus> {
    let inner = store.lock().await;
    ids.iter()
        .map(|id| {
            inner
                .jobs
                .get(id)
                .map(|job| job.read().status)
                .unwrap_or(JobStatus::Pending)
        })
        .collect()
}

/// Snapshot of the running set: (size, busy branches, active users)
pub async fn running_snapshot(store: &StateStore) -> (usize, HashSet<String>, HashSet<String>) {
    let inner = store.lock().await;
    (
        inner.running.len(),
        inner.busy_branches(),
        inner.active_users(),
    )
}

/// Poll until all jobs are terminal; false on timeout
pub async fn wait_terminal(store: &StateStore, ids: &[JobId], timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if statuses(store, ids)
            .await
            .iter()
            .all(|status| status.is_terminal())
        {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(3)).await;
    }
}
