//! Randomized augmentation of training-split images.
//!
//! Each of the `multiplier` iterations draws independently from its own RNG,
//! derived from `(job seed, image id, iteration index)`. That makes results
//! identical no matter how iterations are ordered across worker threads, and
//! makes any single sample reproducible in isolation.
//!
//! A failing iteration is data, not control flow: it becomes an
//! [`IterationFailure`] destined for the job error log, and the remaining
//! iterations continue. There are no fallback substitutes; fewer output
//! samples is the correct degraded behavior.

use crate::annotation::AnnotationSet;
use crate::error::PipelineError;
use crate::pipeline::AugmentedSample;
use crate::transforms::engine;
use crate::transforms::project::AnnotationProjector;
use crate::transforms::spec::TransformPipeline;
use image::DynamicImage;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// One augmentation iteration that could not produce a sample.
#[derive(Debug, Clone)]
pub struct IterationFailure {
    pub augmentation_index: u32,
    pub transform: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct AugmentationSampler {
    pipeline: TransformPipeline,
    projector: AnnotationProjector,
}

/// Derives the RNG seed for one `(job, image, iteration)` unit of work.
/// Same shape as worker seeding elsewhere: a stable per-image hash plus the
/// iteration index shifted past it, folded with the job seed.
pub fn iteration_seed(job_seed: u64, image_id: &str, iteration: u32) -> u64 {
    fnv1a64(image_id.as_bytes())
        .wrapping_add((iteration as u64) << 32)
        ^ job_seed
}

fn fnv1a64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl AugmentationSampler {
    pub fn new(pipeline: TransformPipeline, projector: AnnotationProjector) -> Self {
        Self { pipeline, projector }
    }

    /// Produces up to `multiplier` augmented variants of one preprocessed
    /// image. Failed iterations are returned alongside, never retried.
    pub fn run(
        &self,
        image: &DynamicImage,
        annotations: &AnnotationSet,
        image_id: &str,
        multiplier: u32,
        job_seed: u64,
    ) -> (Vec<AugmentedSample>, Vec<IterationFailure>) {
        let mut samples = Vec::with_capacity(multiplier as usize);
        let mut failures = Vec::new();

        for index in 0..multiplier {
            let mut rng = ChaCha8Rng::seed_from_u64(iteration_seed(job_seed, image_id, index));
            match self.run_iteration(image, annotations, image_id, index, &mut rng) {
                Ok(sample) => samples.push(sample),
                Err(failure) => failures.push(failure),
            }
        }
        (samples, failures)
    }

    /// One independent draw through the full pipeline.
    fn run_iteration(
        &self,
        image: &DynamicImage,
        annotations: &AnnotationSet,
        image_id: &str,
        index: u32,
        rng: &mut ChaCha8Rng,
    ) -> Result<AugmentedSample, IterationFailure> {
        let mut current_image = image.clone();
        let mut current_annotations = annotations.clone();
        let mut provenance = Vec::new();

        for spec in self.pipeline.specs() {
            let outcome = engine::apply(&current_image, spec, rng).map_err(|e| IterationFailure {
                augmentation_index: index,
                transform: spec.name().to_string(),
                message: match e {
                    PipelineError::Transform(msg) => msg,
                    other => other.to_string(),
                },
            })?;

            if !outcome.applied {
                continue;
            }
            current_image = outcome.image;
            if !outcome.mapping.is_identity() {
                current_annotations = self.projector.project(&current_annotations, &outcome.mapping);
            }
            provenance.push(spec.clone());
        }

        Ok(AugmentedSample {
            source_image_id: image_id.to_string(),
            augmentation_index: Some(index),
            image: current_image,
            annotations: current_annotations,
            provenance,
        })
    }
}
