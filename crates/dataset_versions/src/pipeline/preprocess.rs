//! Deterministic per-image preprocessing.
//!
//! Applied exactly once to every source image regardless of split, before
//! any augmentation. Composes the preprocessing pipeline (Resize ->
//! Grayscale -> AutoContrast) through the raster engine and threads the
//! cumulative geometric mapping so the caller can project annotations in a
//! single pass.

use crate::error::{PipelineError, Result};
use crate::transforms::engine;
use crate::transforms::mapping::GeometricMapping;
use crate::transforms::spec::{TransformPipeline, TransformSpec};
use image::{DynamicImage, GenericImageView};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone)]
pub struct PreprocessingStage {
    pipeline: TransformPipeline,
}

impl PreprocessingStage {
    /// Rejects pipelines containing randomized transforms: preprocessing
    /// must be reproducible without a seed.
    pub fn new(pipeline: TransformPipeline) -> Result<Self> {
        if let Some(spec) = pipeline.specs().iter().find(|s| s.probability() < 1.0) {
            return Err(PipelineError::config(format!(
                "preprocessing pipeline may only contain deterministic transforms, found '{}'",
                spec.name()
            )));
        }
        Ok(Self { pipeline })
    }

    /// Applies the pipeline and returns the preprocessed image, the
    /// cumulative mapping, and the transforms applied.
    pub fn run(&self, img: &DynamicImage) -> Result<(DynamicImage, GeometricMapping, Vec<TransformSpec>)> {
        let (width, height) = img.dimensions();
        let mut current = img.clone();
        let mut cumulative = GeometricMapping::identity(width, height);
        let mut applied = Vec::with_capacity(self.pipeline.len());

        // Deterministic transforms never draw from the RNG; the engine
        // signature still wants one.
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        for spec in self.pipeline.specs() {
            let outcome = engine::apply(&current, spec, &mut rng)?;
            current = outcome.image;
            cumulative = cumulative.compose(&outcome.mapping);
            applied.push(spec.clone());
        }
        Ok((current, cumulative, applied))
    }
}
