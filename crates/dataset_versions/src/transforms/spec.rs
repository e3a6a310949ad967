//! Closed enumeration of transform descriptors.
//!
//! The configuration layer only ever produces these variants, and the raster
//! engine matches exhaustively over them, so adding a transform without
//! wiring both the pixel side and the annotation side is a compile error.

use serde::{Deserialize, Serialize};

/// How `Resize` maps the source onto the target frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Non-uniform scale to exactly the target dimensions.
    Stretch,
    /// Uniform scale so the image fits inside the target, aspect preserved.
    Fit,
    /// `Fit`, then centered on a target-sized black canvas.
    Pad,
}

/// One transform descriptor with its application probability.
///
/// Randomized transforms default to `p = 0.5`; the deterministic
/// preprocessing transforms (`Resize`, `Grayscale`, `AutoContrast`) always
/// apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformSpec {
    FlipHorizontal {
        p: f64,
    },
    FlipVertical {
        p: f64,
    },
    Rotate {
        limit_deg: f64,
        p: f64,
    },
    Crop {
        height_frac: f64,
        width_frac: f64,
        p: f64,
    },
    Shear {
        limit_deg: f64,
        p: f64,
    },
    BrightnessContrast {
        brightness_limit: f64,
        contrast_limit: f64,
        p: f64,
    },
    HueSaturationValue {
        hue_shift: f64,
        sat_shift: f64,
        val_shift: f64,
        p: f64,
    },
    Blur {
        kernel_limit: u32,
        p: f64,
    },
    GaussianNoise {
        std: f64,
        p: f64,
    },
    CoarseDropout {
        num_holes: u32,
        max_height: u32,
        max_width: u32,
        p: f64,
    },
    Resize {
        width: u32,
        height: u32,
        mode: ResizeMode,
    },
    Grayscale,
    AutoContrast,
}

impl TransformSpec {
    /// Transforms that move pixels and therefore carry a non-identity
    /// mapping. Everything else is color/texture only.
    pub fn is_geometric(&self) -> bool {
        matches!(
            self,
            TransformSpec::FlipHorizontal { .. }
                | TransformSpec::FlipVertical { .. }
                | TransformSpec::Rotate { .. }
                | TransformSpec::Crop { .. }
                | TransformSpec::Shear { .. }
                | TransformSpec::Resize { .. }
        )
    }

    /// Per-call application probability.
    pub fn probability(&self) -> f64 {
        match self {
            TransformSpec::FlipHorizontal { p }
            | TransformSpec::FlipVertical { p }
            | TransformSpec::Rotate { p, .. }
            | TransformSpec::Crop { p, .. }
            | TransformSpec::Shear { p, .. }
            | TransformSpec::BrightnessContrast { p, .. }
            | TransformSpec::HueSaturationValue { p, .. }
            | TransformSpec::Blur { p, .. }
            | TransformSpec::GaussianNoise { p, .. }
            | TransformSpec::CoarseDropout { p, .. } => *p,
            TransformSpec::Resize { .. } | TransformSpec::Grayscale | TransformSpec::AutoContrast => 1.0,
        }
    }

    /// Short stable name used in provenance and error-log entries.
    pub fn name(&self) -> &'static str {
        match self {
            TransformSpec::FlipHorizontal { .. } => "flip_horizontal",
            TransformSpec::FlipVertical { .. } => "flip_vertical",
            TransformSpec::Rotate { .. } => "rotate",
            TransformSpec::Crop { .. } => "crop",
            TransformSpec::Shear { .. } => "shear",
            TransformSpec::BrightnessContrast { .. } => "brightness_contrast",
            TransformSpec::HueSaturationValue { .. } => "hue_saturation",
            TransformSpec::Blur { .. } => "blur",
            TransformSpec::GaussianNoise { .. } => "noise",
            TransformSpec::CoarseDropout { .. } => "cutout",
            TransformSpec::Resize { .. } => "resize",
            TransformSpec::Grayscale => "grayscale",
            TransformSpec::AutoContrast => "auto_contrast",
        }
    }
}

/// An immutable, ordered sequence of transforms. Built once per job by the
/// parser; rebuilding from the same config yields an identical pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransformPipeline {
    specs: Vec<TransformSpec>,
}

impl TransformPipeline {
    pub(crate) fn new(specs: Vec<TransformSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[TransformSpec] {
        &self.specs
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_specs_always_apply() {
        assert_eq!(TransformSpec::Grayscale.probability(), 1.0);
        assert_eq!(
            TransformSpec::Resize {
                width: 64,
                height: 64,
                mode: ResizeMode::Fit
            }
            .probability(),
            1.0
        );
        assert_eq!(TransformSpec::FlipHorizontal { p: 0.5 }.probability(), 0.5);
    }

    #[test]
    fn test_geometric_classification() {
        assert!(TransformSpec::Rotate { limit_deg: 15.0, p: 0.5 }.is_geometric());
        assert!(!TransformSpec::Blur { kernel_limit: 7, p: 0.5 }.is_geometric());
        assert!(!TransformSpec::AutoContrast.is_geometric());
    }
}
