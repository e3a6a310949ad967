//! The two per-image stages of version generation.
//!
//! ```text
//! source image + annotations
//!        │
//!        ▼
//!  PreprocessingStage      (deterministic, every split, once per image)
//!        │
//!        ├── non-training split ──► one preprocessing-only sample
//!        ▼
//!  AugmentationSampler     (training split, multiplier independent draws)
//!        │
//!        ▼
//!  AugmentedSample per surviving iteration
//! ```

pub mod augment;
pub mod preprocess;

pub use augment::{AugmentationSampler, IterationFailure};
pub use preprocess::PreprocessingStage;

use crate::annotation::AnnotationSet;
use crate::transforms::spec::TransformSpec;
use image::DynamicImage;

/// One output sample of a dataset version: a transformed raster with the
/// annotations projected through the exact same coordinate changes.
#[derive(Debug, Clone)]
pub struct AugmentedSample {
    pub source_image_id: String,
    /// `None` for the preprocessing-only pass of non-training images;
    /// `Some(0..multiplier)` for augmented training variants.
    pub augmentation_index: Option<u32>,
    pub image: DynamicImage,
    pub annotations: AnnotationSet,
    /// Ordered list of transforms actually applied (probability-skipped
    /// transforms are absent).
    pub provenance: Vec<TransformSpec>,
}

impl AugmentedSample {
    /// Deterministic blob-store key for this sample. Retries of the same
    /// work unit overwrite the same object.
    pub fn blob_key(&self, version_id: &str) -> String {
        match self.augmentation_index {
            Some(i) => format!("versions/{}/{}_aug{}.png", version_id, self.source_image_id, i),
            None => format!("versions/{}/{}.png", version_id, self.source_image_id),
        }
    }
}
