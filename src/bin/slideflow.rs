//! Demo driver: submit a synthetic workload and watch the scheduler run it

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use slideflow::{
    InferenceEngine, JobRequest, JobType, Region, RgbTile, RunnerContext, Scheduler,
    SchedulerConfig, SchedulerResult, StateStore, SubmissionService, SyntheticSlide,
    SyntheticSlideOpener,
};

/// Branch-aware workflow scheduler demo over a synthetic slide
#[derive(Parser, Debug)]
#[command(name = "slideflow", version, about)]
struct Args {
    /// Synthetic slide width in pixels
    #[arg(long, default_value_t = 2048)]
    width: u32,

    /// Synthetic slide height in pixels
    #[arg(long, default_value_t = 2048)]
    height: u32,

    /// Number of demo users, each submitting one workflow
    #[arg(long, default_value_t = 4)]
    users: usize,

    /// Directory for result artifacts
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,
}

/// Deterministic demo engine: one region in the corner of every tissue tile
struct DemoInference;

impl InferenceEngine for DemoInference {
    fn infer(&self, tile: &RgbTile) -> SchedulerResult<Vec<Region>> {
        let side = tile.width.min(tile.height).min(64);
        Ok(vec![Region {
            label: 1,
            bbox: (0, 0, side, side),
            area: f64::from(side * side),
        }])
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let store = StateStore::new();
    let service = SubmissionService::new(store.clone());

    // Tissue on the left half of the slide; the right half is background
    let slide = SyntheticSlide::new(args.width, args.height).with_tissue_rect(
        0,
        0,
        args.width / 2,
        args.height,
    );
    let config = SchedulerConfig {
        results_dir: args.results_dir,
        ..SchedulerConfig::default()
    };
    let ctx = RunnerContext {
        store,
        opener: Arc::new(SyntheticSlideOpener::new(slide)),
        inference: Arc::new(DemoInference),
        config: Arc::new(config),
    };
    Scheduler::new(ctx).spawn();

    // One workflow per user: a segmentation job and a mask job on two branches
    let mut submitted = Vec::new();
    for user_index in 0..args.users {
        let user_id = format!("user-{user_index}");
        let view = service
            .create_workflow(
                &user_id,
                vec![
                    JobRequest {
                        branch: format!("branch-{user_index}-cells"),
                        job_type: JobType::CellSegmentation,
                        slide_path: "demo.svs".to_string(),
                    },
                    JobRequest {
                        branch: format!("branch-{user_index}-mask"),
                        job_type: JobType::TissueMask,
                        slide_path: "demo.svs".to_string(),
                    },
                ],
            )
            .await?;
        submitted.push((user_id, view.workflow_id));
    }

    // Poll until every job is terminal
    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let mut all_done = true;
        for (user_id, workflow_id) in &submitted {
            let view = service.get_workflow(user_id, workflow_id).await?;
            if view.jobs.iter().any(|job| !job.status.is_terminal()) {
                all_done = false;
                break;
            }
        }
        if all_done {
            break;
        }
    }

    for (user_id, workflow_id) in &submitted {
        let view = service.get_workflow(user_id, workflow_id).await?;
        println!("workflow {} ({user_id}): {:.1}%", view.workflow_id, view.progress);
        for job in view.jobs {
            println!(
                "  {}  {:<22} {:<9} {:>5.1}%",
                job.job_id,
                job.branch,
                job.status.to_string(),
                job.progress
            );
        }
    }
    Ok(())
}
