//! Version configuration parsing and validation.
//!
//! The job config is a key-presence-driven JSON mapping: a recognized key
//! enables one transform with its parameters, an absent key omits it. The
//! parser normalizes that mapping into two fixed-order pipelines. The order
//! is load-bearing: geometric transforms precede color/noise transforms so
//! the annotation projector only ever reasons about geometry-affecting ops,
//! and resize precedes grayscale/auto-contrast because those are color-only.

use crate::error::{PipelineError, Result};
use crate::transforms::spec::{ResizeMode, TransformPipeline, TransformSpec};
use serde::{Deserialize, Serialize};

fn default_p() -> f64 {
    0.5
}

fn default_multiplier() -> u32 {
    1
}

fn default_rotate_limit() -> f64 {
    15.0
}

fn default_crop_frac() -> f64 {
    0.9
}

fn default_bc_limit() -> f64 {
    0.2
}

fn default_hue_shift() -> f64 {
    20.0
}

fn default_sat_shift() -> f64 {
    30.0
}

fn default_val_shift() -> f64 {
    20.0
}

fn default_blur_limit() -> u32 {
    7
}

fn default_noise_std() -> f64 {
    0.03
}

fn default_num_holes() -> u32 {
    8
}

fn default_hole_size() -> u32 {
    32
}

fn default_resize_mode() -> ResizeMode {
    ResizeMode::Fit
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RotateParams {
    #[serde(default = "default_rotate_limit")]
    pub limit: f64,
    #[serde(default = "default_p")]
    pub p: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CropParams {
    #[serde(default = "default_crop_frac")]
    pub height: f64,
    #[serde(default = "default_crop_frac")]
    pub width: f64,
    #[serde(default = "default_p")]
    pub p: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShearParams {
    #[serde(default = "default_rotate_limit")]
    pub limit: f64,
    #[serde(default = "default_p")]
    pub p: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrightnessContrastParams {
    #[serde(default = "default_bc_limit")]
    pub brightness_limit: f64,
    #[serde(default = "default_bc_limit")]
    pub contrast_limit: f64,
    #[serde(default = "default_p")]
    pub p: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HueSaturationParams {
    #[serde(default = "default_hue_shift")]
    pub hue_shift: f64,
    #[serde(default = "default_sat_shift")]
    pub sat_shift: f64,
    #[serde(default = "default_val_shift")]
    pub val_shift: f64,
    #[serde(default = "default_p")]
    pub p: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlurParams {
    #[serde(default = "default_blur_limit")]
    pub limit: u32,
    #[serde(default = "default_p")]
    pub p: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoiseParams {
    #[serde(default = "default_noise_std")]
    pub std: f64,
    #[serde(default = "default_p")]
    pub p: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CutoutParams {
    #[serde(default = "default_num_holes")]
    pub num_holes: u32,
    #[serde(default = "default_hole_size")]
    pub max_h_size: u32,
    #[serde(default = "default_hole_size")]
    pub max_w_size: u32,
    #[serde(default = "default_p")]
    pub p: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_resize_mode")]
    pub mode: ResizeMode,
}

/// The full dataset-version configuration as stored with the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionConfig {
    #[serde(default)]
    pub flip_horizontal: bool,
    #[serde(default)]
    pub flip_vertical: bool,
    #[serde(default)]
    pub rotate: Option<RotateParams>,
    #[serde(default)]
    pub crop: Option<CropParams>,
    #[serde(default)]
    pub shear: Option<ShearParams>,
    #[serde(default)]
    pub brightness_contrast: Option<BrightnessContrastParams>,
    #[serde(default)]
    pub hue_saturation: Option<HueSaturationParams>,
    #[serde(default)]
    pub blur: Option<BlurParams>,
    #[serde(default)]
    pub noise: Option<NoiseParams>,
    #[serde(default)]
    pub cutout: Option<CutoutParams>,
    #[serde(default)]
    pub resize: Option<ResizeParams>,
    #[serde(default)]
    pub grayscale: bool,
    #[serde(default)]
    pub auto_contrast: bool,
    /// Augmented variants per training-split image.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// When set, re-running the job reproduces the identical augmented set.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Visibility threshold for the annotation drop policy.
    #[serde(default)]
    pub min_visibility: f64,
}

impl Default for VersionConfig {
    fn default() -> Self {
        // An empty mapping: no transforms, one pass per image.
        Self {
            flip_horizontal: false,
            flip_vertical: false,
            rotate: None,
            crop: None,
            shear: None,
            brightness_contrast: None,
            hue_saturation: None,
            blur: None,
            noise: None,
            cutout: None,
            resize: None,
            grayscale: false,
            auto_contrast: false,
            multiplier: default_multiplier(),
            seed: None,
            min_visibility: 0.0,
        }
    }
}

/// Validated output of [`TransformSpecParser::parse`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedJobConfig {
    pub config: VersionConfig,
    pub preprocessing: TransformPipeline,
    pub augmentation: TransformPipeline,
}

/// Validates and normalizes a raw configuration mapping into the two
/// fixed-order pipelines.
pub struct TransformSpecParser;

impl TransformSpecParser {
    pub fn parse(raw: &serde_json::Value) -> Result<ParsedJobConfig> {
        let config: VersionConfig = serde_json::from_value(raw.clone())
            .map_err(|e| PipelineError::config(format!("unparseable config: {}", e)))?;
        Self::parse_config(config)
    }

    pub fn parse_config(config: VersionConfig) -> Result<ParsedJobConfig> {
        validate(&config)?;
        Ok(ParsedJobConfig {
            preprocessing: preprocessing_pipeline(&config),
            augmentation: augmentation_pipeline(&config),
            config,
        })
    }
}

fn check_probability(op: &str, p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(PipelineError::config(format!(
            "{}: probability must be in [0, 1], got {}",
            op, p
        )));
    }
    Ok(())
}

fn validate(config: &VersionConfig) -> Result<()> {
    if config.multiplier == 0 {
        return Err(PipelineError::config("multiplier must be at least 1"));
    }
    if !(0.0..=1.0).contains(&config.min_visibility) {
        return Err(PipelineError::config(format!(
            "min_visibility must be in [0, 1], got {}",
            config.min_visibility
        )));
    }

    if let Some(r) = &config.rotate {
        check_probability("rotate", r.p)?;
        if r.limit < 0.0 || r.limit > 180.0 {
            return Err(PipelineError::config(format!(
                "rotate.limit must be in [0, 180] degrees, got {}",
                r.limit
            )));
        }
    }
    if let Some(c) = &config.crop {
        check_probability("crop", c.p)?;
        for (axis, frac) in [("height", c.height), ("width", c.width)] {
            if !(0.0..=1.0).contains(&frac) || frac == 0.0 {
                return Err(PipelineError::config(format!(
                    "crop.{} must be in (0, 1], got {}",
                    axis, frac
                )));
            }
        }
    }
    if let Some(s) = &config.shear {
        check_probability("shear", s.p)?;
        // tan() blows up at 90; anything close is not a useful shear.
        if s.limit < 0.0 || s.limit >= 89.0 {
            return Err(PipelineError::config(format!(
                "shear.limit must be in [0, 89) degrees, got {}",
                s.limit
            )));
        }
    }
    if let Some(bc) = &config.brightness_contrast {
        check_probability("brightness_contrast", bc.p)?;
        if bc.brightness_limit < 0.0 || bc.contrast_limit < 0.0 {
            return Err(PipelineError::config(
                "brightness_contrast limits must be non-negative",
            ));
        }
    }
    if let Some(hsv) = &config.hue_saturation {
        check_probability("hue_saturation", hsv.p)?;
        if hsv.hue_shift < 0.0 || hsv.sat_shift < 0.0 || hsv.val_shift < 0.0 {
            return Err(PipelineError::config("hue_saturation shifts must be non-negative"));
        }
    }
    if let Some(b) = &config.blur {
        check_probability("blur", b.p)?;
        if b.limit < 3 || b.limit % 2 == 0 {
            return Err(PipelineError::config(format!(
                "blur.limit must be an odd kernel size >= 3, got {}",
                b.limit
            )));
        }
    }
    if let Some(n) = &config.noise {
        check_probability("noise", n.p)?;
        if n.std < 0.0 {
            return Err(PipelineError::config(format!(
                "noise.std must be non-negative, got {}",
                n.std
            )));
        }
    }
    if let Some(c) = &config.cutout {
        check_probability("cutout", c.p)?;
        if c.num_holes == 0 || c.max_h_size == 0 || c.max_w_size == 0 {
            return Err(PipelineError::config(
                "cutout num_holes and hole sizes must be at least 1",
            ));
        }
    }
    if let Some(r) = &config.resize {
        if r.width == 0 || r.height == 0 {
            return Err(PipelineError::config(format!(
                "resize target must be positive, got {}x{}",
                r.width, r.height
            )));
        }
    }
    Ok(())
}

/// Augmentation order is fixed regardless of key order in the input:
/// Flip -> Rotate -> Crop -> Shear -> BrightnessContrast -> HueSatVal ->
/// Blur -> Noise -> CoarseDropout.
fn augmentation_pipeline(config: &VersionConfig) -> TransformPipeline {
    let mut specs = Vec::new();
    if config.flip_horizontal {
        specs.push(TransformSpec::FlipHorizontal { p: default_p() });
    }
    if config.flip_vertical {
        specs.push(TransformSpec::FlipVertical { p: default_p() });
    }
    if let Some(r) = &config.rotate {
        specs.push(TransformSpec::Rotate {
            limit_deg: r.limit,
            p: r.p,
        });
    }
    if let Some(c) = &config.crop {
        specs.push(TransformSpec::Crop {
            height_frac: c.height,
            width_frac: c.width,
            p: c.p,
        });
    }
    if let Some(s) = &config.shear {
        specs.push(TransformSpec::Shear {
            limit_deg: s.limit,
            p: s.p,
        });
    }
    if let Some(bc) = &config.brightness_contrast {
        specs.push(TransformSpec::BrightnessContrast {
            brightness_limit: bc.brightness_limit,
            contrast_limit: bc.contrast_limit,
            p: bc.p,
        });
    }
    if let Some(hsv) = &config.hue_saturation {
        specs.push(TransformSpec::HueSaturationValue {
            hue_shift: hsv.hue_shift,
            sat_shift: hsv.sat_shift,
            val_shift: hsv.val_shift,
            p: hsv.p,
        });
    }
    if let Some(b) = &config.blur {
        specs.push(TransformSpec::Blur {
            kernel_limit: b.limit,
            p: b.p,
        });
    }
    if let Some(n) = &config.noise {
        specs.push(TransformSpec::GaussianNoise { std: n.std, p: n.p });
    }
    if let Some(c) = &config.cutout {
        specs.push(TransformSpec::CoarseDropout {
            num_holes: c.num_holes,
            max_height: c.max_h_size,
            max_width: c.max_w_size,
            p: c.p,
        });
    }
    TransformPipeline::new(specs)
}

/// Preprocessing order is fixed: Resize -> Grayscale -> AutoContrast.
fn preprocessing_pipeline(config: &VersionConfig) -> TransformPipeline {
    let mut specs = Vec::new();
    if let Some(r) = &config.resize {
        specs.push(TransformSpec::Resize {
            width: r.width,
            height: r.height,
            mode: r.mode,
        });
    }
    if config.grayscale {
        specs.push(TransformSpec::Grayscale);
    }
    if config.auto_contrast {
        specs.push(TransformSpec::AutoContrast);
    }
    TransformPipeline::new(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_change_pipeline_order() {
        let a = TransformSpecParser::parse(&json!({
            "noise": {},
            "rotate": { "limit": 10.0 },
            "flip_horizontal": true
        }))
        .unwrap();
        let b = TransformSpecParser::parse(&json!({
            "flip_horizontal": true,
            "rotate": { "limit": 10.0 },
            "noise": {}
        }))
        .unwrap();

        assert_eq!(a.augmentation, b.augmentation);
        let names: Vec<_> = a.augmentation.specs().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["flip_horizontal", "rotate", "noise"]);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let raw = json!({
            "flip_horizontal": true,
            "crop": { "height": 0.8, "width": 0.8 },
            "resize": { "width": 320, "height": 240, "mode": "pad" },
            "grayscale": true,
            "multiplier": 3
        });
        let a = TransformSpecParser::parse(&raw).unwrap();
        let b = TransformSpecParser::parse(&raw).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.config.multiplier, 3);

        let pre: Vec<_> = a.preprocessing.specs().iter().map(|s| s.name()).collect();
        assert_eq!(pre, vec!["resize", "grayscale"]);
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let err = TransformSpecParser::parse(&json!({ "fliip_horizontal": true })).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_wrong_type_is_config_error() {
        let err = TransformSpecParser::parse(&json!({ "rotate": { "limit": "fifteen" } })).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        for raw in [
            json!({ "blur": { "limit": 4 } }),
            json!({ "blur": { "limit": 1 } }),
            json!({ "crop": { "height": 1.5 } }),
            json!({ "rotate": { "limit": 270.0 } }),
            json!({ "noise": { "std": -0.1 } }),
            json!({ "multiplier": 0 }),
            json!({ "resize": { "width": 0, "height": 100 } }),
            json!({ "min_visibility": 2.0 }),
            json!({ "rotate": { "limit": 10.0, "p": 1.5 } }),
        ] {
            let err = TransformSpecParser::parse(&raw).unwrap_err();
            assert!(matches!(err, PipelineError::Config(_)), "{} should be rejected", raw);
        }
    }

    #[test]
    fn test_defaults_match_randomized_probability() {
        let parsed = TransformSpecParser::parse(&json!({ "rotate": {}, "blur": {} })).unwrap();
        for spec in parsed.augmentation.specs() {
            assert_eq!(spec.probability(), 0.5);
        }
    }

    #[test]
    fn test_empty_config_yields_empty_pipelines() {
        let parsed = TransformSpecParser::parse(&json!({})).unwrap();
        assert!(parsed.preprocessing.is_empty());
        assert!(parsed.augmentation.is_empty());
        assert_eq!(parsed.config.multiplier, 1);
    }
}
