//! End-to-end version generation tests against in-memory stores.
//!
//! Tests cover:
//! - Training multiplier and preprocessing-only non-training splits
//! - Config errors leaving the job QUEUED
//! - Per-iteration failures logged while the job still completes
//! - Bit-for-bit determinism across concurrency levels
//! - Cancellation and timeout landing the job in FAILED

mod common;
use common::{box_annotation, fixture_png, queued_job, seed_image, stores};

use dataset_versions::{
    AnnotationProjector, AnnotationSet, AugmentationSampler, BlobStore, JobStatus, MetadataStore,
    OrchestratorConfig, PipelineError, Split, TransformSpecParser, VersionJobOrchestrator,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

fn orchestrator(
    blob: &Arc<dataset_versions::InMemoryBlobStore>,
    meta: &Arc<dataset_versions::InMemoryMetadataStore>,
    config: OrchestratorConfig,
) -> VersionJobOrchestrator {
    VersionJobOrchestrator::new(blob.clone(), meta.clone(), config)
}

#[test]
fn test_multiplier_produces_indexed_training_samples() -> Result<()> {
    let (blob, meta) = stores();
    seed_image(&blob, &meta, "ds1", "train_a", Split::Train, 64, 48, vec![
        box_annotation("train_a", "dog", 8.0, 8.0, 20.0, 16.0),
    ]);
    meta.insert_job(queued_job(
        "job1",
        "ds1",
        "v1",
        json!({"flip_horizontal": true, "multiplier": 3, "seed": 7}),
    ))?;

    let orch = orchestrator(&blob, &meta, OrchestratorConfig::new().with_concurrency(2));
    let report = orch.generate_version("job1")?;

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.images_processed, 1);
    assert_eq!(report.samples_written, 3);

    let mut samples = meta.list_samples("v1")?;
    samples.sort_by_key(|s| s.augmentation_index);
    let indices: Vec<_> = samples.iter().map(|s| s.augmentation_index).collect();
    assert_eq!(indices, vec![Some(0), Some(1), Some(2)]);
    for sample in &samples {
        assert!(blob.exists(&sample.blob_key)?);
        assert_eq!(sample.split, Split::Train);
        assert_eq!(sample.annotations.len(), 1);
        assert_eq!(sample.annotations[0].class_label, "dog");
    }
    Ok(())
}

#[test]
fn test_non_training_splits_get_one_preprocessed_sample() -> Result<()> {
    let (blob, meta) = stores();
    seed_image(&blob, &meta, "ds1", "train_a", Split::Train, 64, 48, vec![]);
    seed_image(&blob, &meta, "ds1", "valid_a", Split::Valid, 64, 48, vec![
        box_annotation("valid_a", "dog", 0.0, 0.0, 32.0, 24.0),
    ]);
    seed_image(&blob, &meta, "ds1", "test_a", Split::Test, 64, 48, vec![]);
    meta.insert_job(queued_job(
        "job1",
        "ds1",
        "v1",
        json!({
            "flip_horizontal": true,
            "multiplier": 4,
            "seed": 1,
            "resize": {"width": 32, "height": 32, "mode": "stretch"}
        }),
    ))?;

    let orch = orchestrator(&blob, &meta, OrchestratorConfig::new());
    let report = orch.generate_version("job1")?;
    assert_eq!(report.status, JobStatus::Completed);
    // 4 training variants + one preprocessed sample for each other split.
    assert_eq!(report.samples_written, 6);

    let samples = meta.list_samples("v1")?;
    let valid: Vec<_> = samples.iter().filter(|s| s.split == Split::Valid).collect();
    assert_eq!(valid.len(), 1);
    assert_eq!(valid[0].augmentation_index, None);
    // Resize applies to every split; augmentation is train-only, so the
    // valid sample's provenance holds exactly the preprocessing step.
    assert_eq!(valid[0].width, 32);
    assert_eq!(valid[0].height, 32);
    assert_eq!(valid[0].provenance.len(), 1);
    // 64x48 stretched to 32x32: the valid box scales by (0.5, 2/3).
    let b = match &valid[0].annotations[0].geometry {
        dataset_versions::Geometry::BoundingBox(b) => *b,
        other => panic!("unexpected geometry {:?}", other),
    };
    assert!((b.w - 16.0).abs() < 1e-9);
    assert!((b.h - 16.0).abs() < 1e-9);

    for sample in samples.iter().filter(|s| s.split == Split::Train) {
        assert!(sample.augmentation_index.is_some());
    }
    Ok(())
}

#[test]
fn test_config_error_leaves_job_queued() -> Result<()> {
    let (blob, meta) = stores();
    seed_image(&blob, &meta, "ds1", "train_a", Split::Train, 64, 48, vec![]);
    meta.insert_job(queued_job(
        "job1",
        "ds1",
        "v1",
        json!({"blur": {"limit": 4}}), // even kernel bound is invalid
    ))?;

    let orch = orchestrator(&blob, &meta, OrchestratorConfig::new());
    let err = orch.generate_version("job1").unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)), "got {:?}", err);

    assert_eq!(meta.get_job("job1")?.status, JobStatus::Queued);
    assert!(meta.list_samples("v1")?.is_empty());
    Ok(())
}

#[test]
fn test_iteration_failures_logged_but_job_completes() -> Result<()> {
    let (blob, meta) = stores();
    // 4x4 source: a 0.1 crop fraction rounds to a degenerate window, so
    // every augmentation iteration fails while the image itself is fine.
    seed_image(&blob, &meta, "ds1", "tiny", Split::Train, 4, 4, vec![]);
    seed_image(&blob, &meta, "ds1", "ok", Split::Valid, 64, 48, vec![]);
    meta.insert_job(queued_job(
        "job1",
        "ds1",
        "v1",
        json!({"crop": {"height": 0.1, "width": 0.1, "p": 1.0}, "multiplier": 3, "seed": 5}),
    ))?;

    let orch = orchestrator(&blob, &meta, OrchestratorConfig::new());
    let report = orch.generate_version("job1")?;

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.images_processed, 2);
    assert_eq!(report.samples_written, 1); // only the valid-split sample
    assert_eq!(report.error_log.len(), 3);
    for entry in &report.error_log {
        assert_eq!(entry.image_id.as_deref(), Some("tiny"));
        assert_eq!(entry.transform.as_deref(), Some("crop"));
        assert!(entry.augmentation_index.is_some());
    }
    assert_eq!(meta.get_job("job1")?.status, JobStatus::Completed);
    Ok(())
}

#[test]
fn test_single_failed_iteration_keeps_remaining_samples() -> Result<()> {
    // multiplier = 3 with the crop behind a coin flip: an iteration that
    // draws the crop on a 4x4 image fails on the degenerate window, one
    // that skips it succeeds. Scan for a seed where exactly one of the
    // three iterations applies the crop, then assert the 2-of-3 shape end
    // to end.
    let config = |seed: u64| {
        json!({"crop": {"height": 0.1, "width": 0.1, "p": 0.5}, "multiplier": 3, "seed": seed})
    };
    let image = image::load_from_memory(&fixture_png(4, 4))?;
    let annotations: AnnotationSet = Vec::new();
    let seed = (0u64..512)
        .find(|&seed| {
            let parsed = TransformSpecParser::parse(&config(seed)).unwrap();
            let sampler = AugmentationSampler::new(
                parsed.augmentation.clone(),
                AnnotationProjector::new(0.0).unwrap(),
            );
            let (_, failures) = sampler.run(&image, &annotations, "tiny", 3, seed);
            failures.len() == 1
        })
        .expect("no seed in range fails exactly one of three iterations");

    let (blob, meta) = stores();
    seed_image(&blob, &meta, "ds1", "tiny", Split::Train, 4, 4, vec![]);
    meta.insert_job(queued_job("job1", "ds1", "v1", config(seed)))?;

    let orch = orchestrator(&blob, &meta, OrchestratorConfig::new());
    let report = orch.generate_version("job1")?;

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.samples_written, 2);
    assert_eq!(report.error_log.len(), 1);
    assert_eq!(report.error_log[0].image_id.as_deref(), Some("tiny"));
    assert_eq!(report.error_log[0].transform.as_deref(), Some("crop"));
    assert_eq!(meta.list_samples("v1")?.len(), 2);
    Ok(())
}

#[test]
fn test_unreadable_source_blob_is_logged_per_image() -> Result<()> {
    let (blob, meta) = stores();
    seed_image(&blob, &meta, "ds1", "good", Split::Valid, 32, 32, vec![]);
    // Register an image whose blob was never written.
    meta.insert_image(
        "ds1",
        dataset_versions::SourceImage {
            id: "missing".into(),
            blob_key: "datasets/ds1/missing.png".into(),
            file_name: "missing.png".into(),
            split: Split::Valid,
        },
        vec![],
    )?;
    meta.insert_job(queued_job("job1", "ds1", "v1", json!({})))?;

    let orch = orchestrator(&blob, &meta, OrchestratorConfig::new());
    let report = orch.generate_version("job1")?;

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.samples_written, 1);
    assert_eq!(report.error_log.len(), 1);
    assert_eq!(report.error_log[0].image_id.as_deref(), Some("missing"));
    Ok(())
}

#[test]
fn test_same_seed_is_deterministic_across_concurrency() -> Result<()> {
    let config = json!({
        "flip_horizontal": true,
        "flip_vertical": true,
        "rotate": {"limit": 20, "p": 0.7},
        "brightness_contrast": {"brightness_limit": 0.3, "contrast_limit": 0.3, "p": 0.7},
        "multiplier": 4,
        "seed": 99
    });

    let run = |concurrency: usize| -> Result<Vec<(String, Vec<u8>)>> {
        let (blob, meta) = stores();
        for id in ["a", "b", "c", "d", "e"] {
            seed_image(&blob, &meta, "ds1", id, Split::Train, 48, 32, vec![
                box_annotation(id, "cat", 4.0, 4.0, 16.0, 12.0),
            ]);
        }
        meta.insert_job(queued_job("job1", "ds1", "v1", config.clone()))?;
        let orch = orchestrator(
            &blob,
            &meta,
            OrchestratorConfig::new().with_concurrency(concurrency),
        );
        let report = orch.generate_version("job1")?;
        assert_eq!(report.status, JobStatus::Completed);

        let mut samples = meta.list_samples("v1")?;
        samples.sort_by(|x, y| x.blob_key.cmp(&y.blob_key));
        samples
            .iter()
            .map(|s| Ok((s.blob_key.clone(), blob.get(&s.blob_key)?)))
            .collect::<Result<Vec<_>, PipelineError>>()
            .map_err(Into::into)
    };

    let serial = run(1)?;
    let parallel = run(4)?;
    assert_eq!(serial.len(), 20);
    assert_eq!(serial, parallel);
    Ok(())
}

#[test]
fn test_cancellation_fails_job_with_log_entry() -> Result<()> {
    let (blob, meta) = stores();
    for i in 0..10 {
        seed_image(&blob, &meta, "ds1", &format!("img{}", i), Split::Train, 32, 32, vec![]);
    }
    meta.insert_job(queued_job("job1", "ds1", "v1", json!({"seed": 3})))?;

    let orch = orchestrator(&blob, &meta, OrchestratorConfig::new());
    orch.cancel_handle().store(true, Ordering::Relaxed);
    let report = orch.generate_version("job1")?;

    assert_eq!(report.status, JobStatus::Failed);
    assert_eq!(report.samples_written, 0);
    assert!(report
        .error_log
        .iter()
        .any(|e| e.image_id.is_none() && e.message.contains("cancelled")));
    assert_eq!(meta.get_job("job1")?.status, JobStatus::Failed);
    Ok(())
}

#[test]
fn test_zero_timeout_fails_job_and_keeps_partial_results() -> Result<()> {
    let (blob, meta) = stores();
    for i in 0..5 {
        seed_image(&blob, &meta, "ds1", &format!("img{}", i), Split::Train, 32, 32, vec![]);
    }
    meta.insert_job(queued_job("job1", "ds1", "v1", json!({"seed": 3})))?;

    let orch = orchestrator(
        &blob,
        &meta,
        OrchestratorConfig::new().with_job_timeout(Duration::ZERO),
    );
    let report = orch.generate_version("job1")?;

    assert_eq!(report.status, JobStatus::Failed);
    assert!(report
        .error_log
        .iter()
        .any(|e| e.image_id.is_none() && e.message.contains("deadline")));
    Ok(())
}

#[test]
fn test_empty_annotation_image_still_yields_samples() -> Result<()> {
    let (blob, meta) = stores();
    seed_image(&blob, &meta, "ds1", "plain", Split::Train, 32, 32, vec![]);
    meta.insert_job(queued_job(
        "job1",
        "ds1",
        "v1",
        json!({"flip_horizontal": {"p": 1.0}, "multiplier": 2, "seed": 11}),
    ))?;

    // flip_horizontal is a boolean flag; fix the config and rerun.
    let orch = orchestrator(&blob, &meta, OrchestratorConfig::new());
    assert!(orch.generate_version("job1").is_err());

    meta.insert_job(queued_job(
        "job2",
        "ds1",
        "v2",
        json!({"flip_horizontal": true, "multiplier": 2, "seed": 11}),
    ))?;
    let report = orch.generate_version("job2")?;
    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.samples_written, 2);
    for sample in meta.list_samples("v2")? {
        assert!(sample.annotations.is_empty());
    }
    Ok(())
}

#[test]
fn test_terminal_job_rerun_is_a_noop() -> Result<()> {
    let (blob, meta) = stores();
    seed_image(&blob, &meta, "ds1", "a", Split::Train, 32, 32, vec![]);
    meta.insert_job(queued_job("job1", "ds1", "v1", json!({"seed": 1})))?;

    let orch = orchestrator(&blob, &meta, OrchestratorConfig::new());
    orch.generate_version("job1")?;
    let first = meta.list_samples("v1")?;

    let report = orch.generate_version("job1")?;
    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.samples_written, 0);
    assert_eq!(meta.list_samples("v1")?, first);
    Ok(())
}
