//! Version job orchestration: fans source images out over a worker pool,
//! writes the resulting samples, and drives the job status machine.
//!
//! Failure policy: per-image and per-iteration failures become error log
//! entries and the job keeps going. Only a bad configuration (job stays
//! QUEUED), an unreadable source dataset, a timeout, or cancellation stop a
//! job. Storage write failures propagate as errors without a terminal
//! status so the at-least-once queue can redeliver; deterministic blob keys
//! make the rerun overwrite rather than duplicate.

use crate::annotation::AnnotationSet;
use crate::config::TransformSpecParser;
use crate::error::{PipelineError, Result};
use crate::export::{ExportFormat, ExportFormatter};
use crate::job::pool::WorkerPool;
use crate::job::{JobErrorEntry, JobStatus};
use crate::pipeline::{AugmentationSampler, AugmentedSample, PreprocessingStage};
use crate::store::{BlobStore, MetadataStore, SourceImage, Split, StoredSample};
use crate::transforms::project::AnnotationProjector;
use crate::transforms::spec::TransformSpec;
use image::{GenericImageView, ImageFormat};
use rand::Rng;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(3600);

/// Tuning knobs for job execution. Defaults are sized for a small worker
/// box; construct with `OrchestratorConfig::new()` and chain `with_*`.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub concurrency: usize,
    /// Task channel capacity per the pool; output capacity scales with
    /// concurrency.
    pub buffer_size: usize,
    pub job_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            buffer_size: 4,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }
}

/// Summary returned by [`VersionJobOrchestrator::generate_version`].
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: String,
    pub version_id: String,
    pub status: JobStatus,
    pub images_processed: usize,
    pub samples_written: usize,
    pub error_log: Vec<JobErrorEntry>,
}

/// One image plus its annotations, as handed to a worker.
struct WorkUnit {
    image: SourceImage,
    annotations: AnnotationSet,
}

/// What a worker reports back for one unit. `Err` carries a storage
/// failure that aborts the job run.
type UnitOutcome = Result<UnitReport>;

struct UnitReport {
    samples_written: usize,
    errors: Vec<JobErrorEntry>,
}

/// Runs dataset version generation and export against injected stores.
pub struct VersionJobOrchestrator {
    blob: Arc<dyn BlobStore>,
    meta: Arc<dyn MetadataStore>,
    config: OrchestratorConfig,
    cancel: Arc<AtomicBool>,
}

impl VersionJobOrchestrator {
    pub fn new(
        blob: Arc<dyn BlobStore>,
        meta: Arc<dyn MetadataStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            blob,
            meta,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag that callers may set to stop the job between work units.
    /// In-flight units always run to completion.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Executes the job end to end: parse config, fan images out over the
    /// pool, persist every sample, and land the job in a terminal status.
    pub fn generate_version(&self, job_id: &str) -> Result<JobReport> {
        let mut job = self.meta.get_job(job_id)?;
        if job.status.is_terminal() {
            info!(job_id, status = ?job.status, "job already terminal, nothing to do");
            return Ok(self.report(&job, 0, 0));
        }

        // A config error surfaces here, before the job leaves QUEUED.
        let parsed = TransformSpecParser::parse(&job.config)?;
        let job_seed = parsed
            .config
            .seed
            .unwrap_or_else(|| rand::rng().random());
        info!(
            job_id,
            version_id = %job.version_id,
            seed = job_seed,
            multiplier = parsed.config.multiplier,
            "starting version generation"
        );

        if job.status == JobStatus::Queued {
            job.transition(JobStatus::Processing)?;
            self.meta
                .update_job_status(&job.id, job.status, &job.error_log)?;
        }

        let mut units = Vec::new();
        for split in Split::ALL {
            match self.meta.list_images(&job.source_dataset_id, split) {
                Ok(images) => units.extend(
                    images
                        .into_iter()
                        .map(|(image, annotations)| WorkUnit { image, annotations }),
                ),
                Err(e) => {
                    // The source dataset itself is unreadable; no per-image
                    // recovery is possible.
                    warn!(job_id, split = split.as_str(), error = %e, "source listing failed");
                    job.error_log.push(JobErrorEntry::job_level(format!(
                        "failed to list {} images: {}",
                        split.as_str(),
                        e
                    )));
                    job.transition(JobStatus::Failed)?;
                    self.meta
                        .update_job_status(&job.id, job.status, &job.error_log)?;
                    return Ok(self.report(&job, 0, 0));
                }
            }
        }

        let worker = UnitWorker {
            blob: self.blob.clone(),
            meta: self.meta.clone(),
            preprocessing: PreprocessingStage::new(parsed.preprocessing.clone())?,
            sampler: AugmentationSampler::new(
                parsed.augmentation.clone(),
                AnnotationProjector::new(parsed.config.min_visibility)?,
            ),
            projector: AnnotationProjector::new(parsed.config.min_visibility)?,
            version_id: job.version_id.clone(),
            multiplier: parsed.config.multiplier,
            job_seed,
        };
        let worker = Arc::new(worker);

        let mut pool: WorkerPool<WorkUnit, UnitOutcome> = {
            let worker = worker.clone();
            WorkerPool::new(
                self.config.concurrency,
                self.config.buffer_size,
                move |tasks, outputs, shutdown| {
                    for unit in tasks.iter() {
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        if outputs.send(worker.process(unit)).is_err() {
                            break;
                        }
                    }
                },
            )?
        };

        let started = Instant::now();
        let total_units = units.len();
        let mut outcomes: Vec<UnitOutcome> = Vec::with_capacity(total_units);
        let mut stop_reason: Option<PipelineError> = None;

        for (dispatched, unit) in units.into_iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                warn!(job_id, dispatched, "job cancelled");
                stop_reason = Some(PipelineError::Cancelled { completed: dispatched });
                break;
            }
            let elapsed = started.elapsed();
            if elapsed >= self.config.job_timeout {
                warn!(job_id, elapsed_secs = elapsed.as_secs(), "job deadline exceeded");
                stop_reason = Some(PipelineError::JobTimeout {
                    elapsed_secs: elapsed.as_secs(),
                    limit_secs: self.config.job_timeout.as_secs(),
                });
                break;
            }
            pool.dispatch(unit)?;
            // Drain opportunistically so workers never block on a full
            // output channel while the task channel is also full.
            while let Ok(outcome) = pool.outputs().try_recv() {
                outcomes.push(outcome);
            }
        }

        pool.finish_dispatch();
        for outcome in pool.outputs().iter() {
            outcomes.push(outcome);
        }
        drop(pool);

        let mut samples_written = 0usize;
        let mut images_processed = 0usize;
        for outcome in outcomes {
            let report = outcome?;
            images_processed += 1;
            samples_written += report.samples_written;
            job.error_log.extend(report.errors);
        }

        let terminal = match stop_reason {
            Some(reason) => {
                job.error_log.push(JobErrorEntry::job_level(reason.to_string()));
                JobStatus::Failed
            }
            None => JobStatus::Completed,
        };
        job.transition(terminal)?;
        self.meta
            .update_job_status(&job.id, job.status, &job.error_log)?;
        info!(
            job_id,
            status = ?job.status,
            images = images_processed,
            samples = samples_written,
            errors = job.error_log.len(),
            "version generation finished"
        );
        Ok(self.report(&job, images_processed, samples_written))
    }

    /// Renders a completed version into `format` and writes the artifact
    /// files under one key prefix, which is returned.
    pub fn export_version(&self, version_id: &str, format: ExportFormat) -> Result<String> {
        let samples = self.meta.list_samples(version_id)?;
        let artifact = ExportFormatter::export(&samples, format)?;
        let prefix = format!("exports/{}/{}", version_id, format.as_str());
        for file in &artifact.files {
            self.blob.put(
                &format!("{}/{}", prefix, file.path),
                file.bytes.clone(),
                file.content_type,
            )?;
        }
        info!(
            version_id,
            format = format.as_str(),
            files = artifact.files.len(),
            samples = samples.len(),
            "export written"
        );
        Ok(prefix)
    }

    fn report(
        &self,
        job: &crate::job::DatasetVersionJob,
        images_processed: usize,
        samples_written: usize,
    ) -> JobReport {
        JobReport {
            job_id: job.id.clone(),
            version_id: job.version_id.clone(),
            status: job.status,
            images_processed,
            samples_written,
            error_log: job.error_log.clone(),
        }
    }
}

/// Everything a worker thread needs to turn one source image into stored
/// samples. Shared read-only across the pool.
struct UnitWorker {
    blob: Arc<dyn BlobStore>,
    meta: Arc<dyn MetadataStore>,
    preprocessing: PreprocessingStage,
    sampler: AugmentationSampler,
    projector: AnnotationProjector,
    version_id: String,
    multiplier: u32,
    job_seed: u64,
}

impl UnitWorker {
    fn process(&self, unit: WorkUnit) -> UnitOutcome {
        let image_id = unit.image.id.clone();
        let mut errors = Vec::new();

        let bytes = match self.blob.get(&unit.image.blob_key) {
            Ok(bytes) => bytes,
            Err(e) => {
                errors.push(JobErrorEntry::for_image(
                    &image_id,
                    format!("failed to read source blob '{}': {}", unit.image.blob_key, e),
                ));
                return Ok(UnitReport { samples_written: 0, errors });
            }
        };
        let decoded = match image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(e) => {
                errors.push(JobErrorEntry::for_image(
                    &image_id,
                    format!("failed to decode image: {}", e),
                ));
                return Ok(UnitReport { samples_written: 0, errors });
            }
        };

        let (pre_image, mapping, pre_provenance) = match self.preprocessing.run(&decoded) {
            Ok(out) => out,
            Err(e) => {
                errors.push(JobErrorEntry::for_image(
                    &image_id,
                    format!("preprocessing failed: {}", e),
                ));
                return Ok(UnitReport { samples_written: 0, errors });
            }
        };
        let pre_annotations = if mapping.is_identity() {
            unit.annotations.clone()
        } else {
            self.projector.project(&unit.annotations, &mapping)
        };

        let samples: Vec<AugmentedSample> = if unit.image.split == Split::Train {
            let (samples, failures) = self.sampler.run(
                &pre_image,
                &pre_annotations,
                &image_id,
                self.multiplier,
                self.job_seed,
            );
            for failure in failures {
                errors.push(JobErrorEntry::for_iteration(
                    &image_id,
                    failure.augmentation_index,
                    failure.transform,
                    failure.message,
                ));
            }
            samples
        } else {
            vec![AugmentedSample {
                source_image_id: image_id.clone(),
                augmentation_index: None,
                image: pre_image,
                annotations: pre_annotations,
                provenance: Vec::new(),
            }]
        };

        let mut samples_written = 0usize;
        for sample in samples {
            self.persist(&unit.image, &sample, &pre_provenance)?;
            samples_written += 1;
        }
        Ok(UnitReport { samples_written, errors })
    }

    /// Encodes and writes one sample. Storage failures propagate: a partial
    /// version must be retried by the queue, not silently trimmed.
    fn persist(
        &self,
        source: &SourceImage,
        sample: &AugmentedSample,
        pre_provenance: &[TransformSpec],
    ) -> Result<()> {
        let mut png = Vec::new();
        sample
            .image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        let blob_key = sample.blob_key(&self.version_id);
        self.blob.put(&blob_key, png, "image/png")?;

        let (width, height) = sample.image.dimensions();
        let mut provenance = pre_provenance.to_vec();
        provenance.extend(sample.provenance.iter().cloned());
        self.meta.write_sample(&StoredSample {
            version_id: self.version_id.clone(),
            source_image_id: sample.source_image_id.clone(),
            augmentation_index: sample.augmentation_index,
            blob_key,
            width,
            height,
            split: source.split,
            annotations: sample.annotations.clone(),
            provenance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder_defaults_and_overrides() {
        let config = OrchestratorConfig::new();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.job_timeout, Duration::from_secs(3600));

        let config = OrchestratorConfig::new()
            .with_concurrency(2)
            .with_buffer_size(8)
            .with_job_timeout(Duration::from_secs(10));
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.buffer_size, 8);
        assert_eq!(config.job_timeout, Duration::from_secs(10));
    }
}
