//! Pipeline behaviors: tile-local failure, boundary images, artifact shapes,
//! and terminal-state stability

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{statuses, wait_terminal, BrokenOpener, FlakyOpener, Harness, ScriptedInference};
use slideflow::artifact::{CellDocument, MaskDocument};
use slideflow::tiles::generate_tiles;
use slideflow::{
    JobRequest, JobStatus, JobType, NullInference, SyntheticSlide, SyntheticSlideOpener,
};

const PIPELINE_TIMEOUT: Duration = Duration::from_secs(20);

fn cell_request(branch: &str) -> JobRequest {
    JobRequest {
        branch: branch.to_string(),
        job_type: JobType::CellSegmentation,
        slide_path: "slide.svs".to_string(),
    }
}

fn mask_request(branch: &str) -> JobRequest {
    JobRequest {
        branch: branch.to_string(),
        job_type: JobType::TissueMask,
        slide_path: "slide.svs".to_string(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn inference_failure_skips_one_tile_only() {
    // 2000x800 with T=512, O=64 is a 5x2 grid: ten tiles, all tissue
    let opener = Arc::new(SyntheticSlideOpener::new(SyntheticSlide::tissue_filled(
        2000, 800,
    )));
    let inference = Arc::new(ScriptedInference::new(Duration::ZERO, 1).failing_on(3));
    let harness = Harness::start(opener, inference.clone());

    let view = harness
        .service
        .create_workflow("u1", vec![cell_request("b")])
        .await
        .unwrap();
    let job_id = view.jobs[0].job_id;

    assert!(wait_terminal(&harness.store, &[job_id], PIPELINE_TIMEOUT).await);

    let job = harness.service.get_job("u1", &job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.progress, 100.0);
    assert_eq!(inference.calls(), 10);

    let artifact = harness.artifact_path(&CellDocument::file_name(&job_id));
    let document: CellDocument = serde_json::from_slice(&fs::read(&artifact).unwrap()).unwrap();
    assert_eq!(document.job_id, job_id);
    assert_eq!(document.polygons.len(), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tile_read_failure_is_non_fatal() {
    // Fail the region read of the tile at (448, 0)
    let opener = Arc::new(FlakyOpener::new(
        SyntheticSlide::tissue_filled(1024, 1024),
        [(448u32, 0u32)],
    ));
    let inference = Arc::new(ScriptedInference::new(Duration::ZERO, 1));
    let harness = Harness::start(opener, inference.clone());

    let view = harness
        .service
        .create_workflow("u1", vec![cell_request("b")])
        .await
        .unwrap();
    let job_id = view.jobs[0].job_id;

    assert!(wait_terminal(&harness.store, &[job_id], PIPELINE_TIMEOUT).await);

    let job = harness.service.get_job("u1", &job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.progress, 100.0);
    // Nine tiles total, one unreadable: eight inferences, eight polygons
    assert_eq!(inference.calls(), 8);

    let artifact = harness.artifact_path(&CellDocument::file_name(&job_id));
    let document: CellDocument = serde_json::from_slice(&fs::read(&artifact).unwrap()).unwrap();
    assert_eq!(document.polygons.len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tissue_mask_grid_matches_the_tiling() {
    // Tissue on the left half only
    let slide = SyntheticSlide::new(1024, 1024).with_tissue_rect(0, 0, 512, 1024);
    let opener = Arc::new(SyntheticSlideOpener::new(slide));
    let harness = Harness::start(opener, Arc::new(NullInference));

    let view = harness
        .service
        .create_workflow("u1", vec![mask_request("b")])
        .await
        .unwrap();
    let job_id = view.jobs[0].job_id;

    assert!(wait_terminal(&harness.store, &[job_id], PIPELINE_TIMEOUT).await);
    assert_eq!(
        statuses(&harness.store, &[job_id]).await,
        vec![JobStatus::Succeeded]
    );

    let artifact = harness.artifact_path(&MaskDocument::file_name(&job_id));
    let document: MaskDocument = serde_json::from_slice(&fs::read(&artifact).unwrap()).unwrap();

    let expected = generate_tiles(1024, 1024, 512, 64);
    assert_eq!(document.tiles.len(), expected.len());
    assert_eq!(document.tiles.len(), 9);
    for (record, tile) in document.tiles.iter().zip(expected.iter()) {
        assert_eq!((record.x, record.y, record.w, record.h), (tile.x, tile.y, tile.w, tile.h));
        assert!((0.0..=1.0).contains(&record.mask_mean));
    }
    // Leftmost tile is all tissue, rightmost column is all background
    assert_eq!(document.tiles[0].mask_mean, 1.0);
    let rightmost = document
        .tiles
        .iter()
        .find(|tile| tile.x == 896)
        .unwrap();
    assert_eq!(rightmost.mask_mean, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_image_succeeds_immediately_with_empty_artifacts() {
    let opener = Arc::new(SyntheticSlideOpener::new(SyntheticSlide::new(0, 0)));
    let harness = Harness::start(opener, Arc::new(NullInference));

    let view = harness
        .service
        .create_workflow("u1", vec![cell_request("a"), mask_request("b")])
        .await
        .unwrap();
    let ids: Vec<_> = view.jobs.iter().map(|job| job.job_id).collect();

    assert!(wait_terminal(&harness.store, &ids, PIPELINE_TIMEOUT).await);

    for id in &ids {
        let job = harness.service.get_job("u1", id).await.unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.progress, 100.0);
    }

    let cells: CellDocument = serde_json::from_slice(
        &fs::read(harness.artifact_path(&CellDocument::file_name(&ids[0]))).unwrap(),
    )
    .unwrap();
    assert!(cells.polygons.is_empty());

    let mask: MaskDocument = serde_json::from_slice(
        &fs::read(harness.artifact_path(&MaskDocument::file_name(&ids[1]))).unwrap(),
    )
    .unwrap();
    assert!(mask.tiles.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn zero_region_inference_still_succeeds() {
    let opener = Arc::new(SyntheticSlideOpener::new(SyntheticSlide::tissue_filled(
        1024, 1024,
    )));
    let harness = Harness::start(opener, Arc::new(NullInference));

    let view = harness
        .service
        .create_workflow("u1", vec![cell_request("b")])
        .await
        .unwrap();
    let job_id = view.jobs[0].job_id;

    assert!(wait_terminal(&harness.store, &[job_id], PIPELINE_TIMEOUT).await);

    let job = harness.service.get_job("u1", &job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);

    let document: CellDocument = serde_json::from_slice(
        &fs::read(harness.artifact_path(&CellDocument::file_name(&job_id))).unwrap(),
    )
    .unwrap();
    assert!(document.polygons.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unopenable_slide_fails_the_job_only() {
    let harness = Harness::start(Arc::new(BrokenOpener), Arc::new(NullInference));

    let view = harness
        .service
        .create_workflow("u1", vec![cell_request("bad"), ])
        .await
        .unwrap();
    let job_id = view.jobs[0].job_id;

    assert!(wait_terminal(&harness.store, &[job_id], PIPELINE_TIMEOUT).await);

    let job = harness.service.get_job("u1", &job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let message = job.error_message.unwrap();
    assert!(message.contains("Failed to open slide"), "{message}");

    assert!(!harness
        .artifact_path(&CellDocument::file_name(&job_id))
        .exists());

    // The running slot is freed shortly after the terminal transition
    tokio::time::sleep(Duration::from_millis(100)).await;
    let inner = harness.store.lock().await;
    assert!(inner.running.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn progress_is_monotonic_while_running() {
    // 4096x4096 is a 10x10 grid: enough tiles to observe many updates
    let opener = Arc::new(SyntheticSlideOpener::new(SyntheticSlide::tissue_filled(
        4096, 4096,
    )));
    let harness = Harness::start(opener, Arc::new(NullInference));

    let view = harness
        .service
        .create_workflow("u1", vec![mask_request("b")])
        .await
        .unwrap();
    let job_id = view.jobs[0].job_id;
    let job = harness.store.get_job(&job_id).await.unwrap();

    let deadline = tokio::time::Instant::now() + PIPELINE_TIMEOUT;
    let mut samples = Vec::new();
    while !job.read().status.is_terminal() {
        samples.push(job.read().progress);
        assert!(
            tokio::time::Instant::now() < deadline,
            "job did not finish in time"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    samples.push(job.read().progress);

    assert!(samples.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(*samples.last().unwrap(), 100.0);
    assert_eq!(job.read().status, JobStatus::Succeeded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn terminal_job_fields_are_stable_across_reads() {
    let opener = Arc::new(SyntheticSlideOpener::new(SyntheticSlide::tissue_filled(
        512, 512,
    )));
    let harness = Harness::start(opener, Arc::new(NullInference));

    let view = harness
        .service
        .create_workflow("u1", vec![mask_request("b")])
        .await
        .unwrap();
    let job_id = view.jobs[0].job_id;

    assert!(wait_terminal(&harness.store, &[job_id], PIPELINE_TIMEOUT).await);

    let first = harness.service.get_job("u1", &job_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = harness.service.get_job("u1", &job_id).await.unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(first.progress, second.progress);
    assert_eq!(first.error_message, second.error_message);
}
