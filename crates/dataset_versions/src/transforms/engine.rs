//! Raster application of a single transform descriptor.
//!
//! `apply` is the one place pixels move. Every geometric transform returns
//! the exact [`GeometricMapping`] it performed so the annotation side can
//! replay the same coordinate change; color transforms return an identity
//! mapping. All randomness (the probability gate and the effective parameter
//! draw) comes from the caller's RNG, never from process-global state.

use crate::error::{PipelineError, Result};
use crate::transforms::color;
use crate::transforms::mapping::GeometricMapping;
use crate::transforms::spec::{ResizeMode, TransformSpec};
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Result of one transform application.
#[derive(Debug)]
pub struct TransformOutcome {
    pub image: DynamicImage,
    pub mapping: GeometricMapping,
    /// `false` when the probability gate skipped the transform; the image is
    /// returned untouched and the mapping is identity.
    pub applied: bool,
}

/// Applies `spec` to `img`, drawing the probability gate and any effective
/// parameters from `rng`.
pub fn apply(img: &DynamicImage, spec: &TransformSpec, rng: &mut ChaCha8Rng) -> Result<TransformOutcome> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(PipelineError::transform(format!(
            "cannot transform empty image ({}x{})",
            width, height
        )));
    }

    let p = spec.probability();
    if p < 1.0 && !rng.random_bool(p) {
        return Ok(TransformOutcome {
            image: img.clone(),
            mapping: GeometricMapping::identity(width, height),
            applied: false,
        });
    }

    match spec {
        TransformSpec::FlipHorizontal { .. } => Ok(TransformOutcome {
            image: img.fliph(),
            mapping: GeometricMapping::flip_horizontal(width, height),
            applied: true,
        }),

        TransformSpec::FlipVertical { .. } => Ok(TransformOutcome {
            image: img.flipv(),
            mapping: GeometricMapping::flip_vertical(width, height),
            applied: true,
        }),

        TransformSpec::Rotate { limit_deg, .. } => {
            let angle = sample_symmetric(rng, *limit_deg);
            let mapping = GeometricMapping::rotation_about_center(angle, width, height);
            let out = warp_affine(&img.to_rgb8(), &mapping)?;
            Ok(TransformOutcome {
                image: DynamicImage::ImageRgb8(out),
                mapping,
                applied: true,
            })
        }

        TransformSpec::Crop {
            height_frac,
            width_frac,
            ..
        } => {
            let crop_w = ((width as f64) * width_frac).round() as u32;
            let crop_h = ((height as f64) * height_frac).round() as u32;
            if crop_w == 0 || crop_h == 0 || crop_w > width || crop_h > height {
                return Err(PipelineError::transform(format!(
                    "crop window {}x{} invalid for {}x{} image",
                    crop_w, crop_h, width, height
                )));
            }
            let x0 = rng.random_range(0..=width - crop_w);
            let y0 = rng.random_range(0..=height - crop_h);
            Ok(TransformOutcome {
                image: img.crop_imm(x0, y0, crop_w, crop_h),
                mapping: GeometricMapping::crop(x0, y0, crop_w, crop_h),
                applied: true,
            })
        }

        TransformSpec::Shear { limit_deg, .. } => {
            let angle = sample_symmetric(rng, *limit_deg);
            let mapping = GeometricMapping::shear_horizontal(angle, width, height);
            let out = warp_affine(&img.to_rgb8(), &mapping)?;
            Ok(TransformOutcome {
                image: DynamicImage::ImageRgb8(out),
                mapping,
                applied: true,
            })
        }

        TransformSpec::BrightnessContrast {
            brightness_limit,
            contrast_limit,
            ..
        } => {
            let delta = sample_symmetric(rng, *brightness_limit);
            let factor = 1.0 + sample_symmetric(rng, *contrast_limit);
            let out = adjust_contrast(&adjust_brightness(&img.to_rgb8(), delta), factor);
            Ok(color_outcome(out, width, height))
        }

        TransformSpec::HueSaturationValue {
            hue_shift,
            sat_shift,
            val_shift,
            ..
        } => {
            let dh = sample_symmetric(rng, *hue_shift);
            // Saturation/value shifts are configured in 8-bit units.
            let ds = sample_symmetric(rng, *sat_shift) / 255.0;
            let dv = sample_symmetric(rng, *val_shift) / 255.0;
            let out = shift_hsv(&img.to_rgb8(), dh, ds, dv);
            Ok(color_outcome(out, width, height))
        }

        TransformSpec::Blur { kernel_limit, .. } => {
            let kernel = sample_odd_kernel(rng, *kernel_limit);
            let out = box_blur(&img.to_rgb8(), kernel);
            Ok(color_outcome(out, width, height))
        }

        TransformSpec::GaussianNoise { std, .. } => {
            let out = gaussian_noise(&img.to_rgb8(), *std, rng);
            Ok(color_outcome(out, width, height))
        }

        TransformSpec::CoarseDropout {
            num_holes,
            max_height,
            max_width,
            ..
        } => {
            let out = coarse_dropout(&img.to_rgb8(), *num_holes, *max_height, *max_width, rng);
            Ok(color_outcome(out, width, height))
        }

        TransformSpec::Resize {
            width: target_w,
            height: target_h,
            mode,
        } => resize(img, *target_w, *target_h, *mode),

        TransformSpec::Grayscale => {
            // Keep 3 channels so downstream stages never branch on format.
            let out = DynamicImage::ImageLuma8(img.to_luma8()).to_rgb8();
            Ok(color_outcome(out, width, height))
        }

        TransformSpec::AutoContrast => {
            let out = color::equalize_value_channel(&img.to_rgb8());
            Ok(color_outcome(out, width, height))
        }
    }
}

fn color_outcome(out: RgbImage, width: u32, height: u32) -> TransformOutcome {
    TransformOutcome {
        image: DynamicImage::ImageRgb8(out),
        mapping: GeometricMapping::identity(width, height),
        applied: true,
    }
}

/// Draws uniformly from `[-limit, limit]`; zero limit short-circuits so the
/// RNG stream stays aligned with a draw either way.
fn sample_symmetric(rng: &mut ChaCha8Rng, limit: f64) -> f64 {
    if limit == 0.0 {
        let _: f64 = rng.random();
        return 0.0;
    }
    rng.random_range(-limit..=limit)
}

fn sample_odd_kernel(rng: &mut ChaCha8Rng, limit: u32) -> u32 {
    let k = rng.random_range(3..=limit.max(3));
    if k % 2 == 0 {
        (k - 1).max(3)
    } else {
        k
    }
}

// ----------------------------------------------------------------------------
// Geometric raster kernels
// ----------------------------------------------------------------------------

/// Backward-samples the source through the inverse of `mapping` with
/// bilinear interpolation. Pixels that map outside the source are black.
fn warp_affine(src: &RgbImage, mapping: &GeometricMapping) -> Result<RgbImage> {
    let inverse = mapping
        .invert()
        .ok_or_else(|| PipelineError::transform("singular geometric mapping"))?;

    let mut out = RgbImage::new(mapping.out_width(), mapping.out_height());
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let src_pt = inverse.apply_point(crate::annotation::Point::new(x as f64 + 0.5, y as f64 + 0.5));
        *pixel = bilinear_sample(src, src_pt.x - 0.5, src_pt.y - 0.5);
    }
    Ok(out)
}

fn bilinear_sample(img: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (width, height) = img.dimensions();
    if x < 0.0 || y < 0.0 || x > width as f64 - 1.0 || y > height as f64 - 1.0 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f64 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f64 * fx * (1.0 - fy)
            + p01[c] as f64 * (1.0 - fx) * fy
            + p11[c] as f64 * fx * fy;
        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(result)
}

fn resize(img: &DynamicImage, target_w: u32, target_h: u32, mode: ResizeMode) -> Result<TransformOutcome> {
    let (width, height) = img.dimensions();
    if target_w == 0 || target_h == 0 {
        return Err(PipelineError::transform(format!(
            "resize target {}x{} is degenerate",
            target_w, target_h
        )));
    }

    match mode {
        ResizeMode::Stretch => {
            let out = img.resize_exact(target_w, target_h, FilterType::Triangle);
            let mapping = GeometricMapping::scale_offset(
                target_w as f64 / width as f64,
                target_h as f64 / height as f64,
                0.0,
                0.0,
                target_w,
                target_h,
            );
            Ok(TransformOutcome {
                image: out,
                mapping,
                applied: true,
            })
        }
        ResizeMode::Fit => {
            let (scale, new_w, new_h) = fit_scale(width, height, target_w, target_h);
            let out = img.resize_exact(new_w, new_h, FilterType::Triangle);
            let mapping = GeometricMapping::scale_offset(scale, scale, 0.0, 0.0, new_w, new_h);
            Ok(TransformOutcome {
                image: out,
                mapping,
                applied: true,
            })
        }
        ResizeMode::Pad => {
            let (scale, new_w, new_h) = fit_scale(width, height, target_w, target_h);
            let fitted = img.resize_exact(new_w, new_h, FilterType::Triangle).to_rgb8();

            let left = (target_w - new_w) / 2;
            let top = (target_h - new_h) / 2;
            let mut canvas = RgbImage::new(target_w, target_h);
            image::imageops::overlay(&mut canvas, &fitted, left as i64, top as i64);

            let mapping = GeometricMapping::scale_offset(
                scale,
                scale,
                left as f64,
                top as f64,
                target_w,
                target_h,
            );
            Ok(TransformOutcome {
                image: DynamicImage::ImageRgb8(canvas),
                mapping,
                applied: true,
            })
        }
    }
}

/// Uniform scale so the image fits inside the target, and the resulting
/// dimensions (at least 1px per axis).
fn fit_scale(width: u32, height: u32, target_w: u32, target_h: u32) -> (f64, u32, u32) {
    let scale = (target_w as f64 / width as f64).min(target_h as f64 / height as f64);
    let new_w = ((width as f64 * scale).round() as u32).max(1);
    let new_h = ((height as f64 * scale).round() as u32).max(1);
    (scale, new_w, new_h)
}

// ----------------------------------------------------------------------------
// Photometric raster kernels
// ----------------------------------------------------------------------------

/// Adds `delta` (fraction of full scale) to every channel.
fn adjust_brightness(img: &RgbImage, delta: f64) -> RgbImage {
    let shift = (delta * 255.0).round() as i32;
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            pixel[c] = (pixel[c] as i32 + shift).clamp(0, 255) as u8;
        }
    }
    out
}

/// Scales pixel values around the mean luminance by `factor`.
fn adjust_contrast(img: &RgbImage, factor: f64) -> RgbImage {
    let (width, height) = img.dimensions();
    let count = (width as f64) * (height as f64);
    let mean: f64 = img
        .pixels()
        .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
        .sum::<f64>()
        / count;

    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels() {
        let mut adjusted = [0u8; 3];
        for c in 0..3 {
            adjusted[c] = (mean + factor * (pixel[c] as f64 - mean)).clamp(0.0, 255.0) as u8;
        }
        out.put_pixel(x, y, Rgb(adjusted));
    }
    out
}

fn shift_hsv(img: &RgbImage, dh: f64, ds: f64, dv: f64) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels() {
        let (h, s, v) = color::rgb_to_hsv(*pixel);
        out.put_pixel(x, y, color::hsv_to_rgb(h + dh, s + ds, v + dv));
    }
    out
}

fn box_blur(img: &RgbImage, kernel: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let half = kernel as i64 / 2;
    let mut out = RgbImage::new(width, height);

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut sums = [0.0f64; 3];
            let mut count = 0.0f64;
            for ky in -half..=half {
                for kx in -half..=half {
                    let px = x + kx;
                    let py = y + ky;
                    if px >= 0 && px < width as i64 && py >= 0 && py < height as i64 {
                        let p = img.get_pixel(px as u32, py as u32);
                        for c in 0..3 {
                            sums[c] += p[c] as f64;
                        }
                        count += 1.0;
                    }
                }
            }
            let averaged = [
                (sums[0] / count) as u8,
                (sums[1] / count) as u8,
                (sums[2] / count) as u8,
            ];
            out.put_pixel(x as u32, y as u32, Rgb(averaged));
        }
    }
    out
}

/// Additive Gaussian noise via the Box-Muller transform, shared across
/// channels per pixel. `std` is a fraction of full scale.
fn gaussian_noise(img: &RgbImage, std: f64, rng: &mut ChaCha8Rng) -> RgbImage {
    let sigma = std * 255.0;
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
        let u2: f64 = rng.random();
        let noise = sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        for c in 0..3 {
            pixel[c] = (pixel[c] as f64 + noise).clamp(0.0, 255.0) as u8;
        }
    }
    out
}

fn coarse_dropout(
    img: &RgbImage,
    num_holes: u32,
    max_height: u32,
    max_width: u32,
    rng: &mut ChaCha8Rng,
) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut out = img.clone();
    for _ in 0..num_holes {
        let hole_w = rng.random_range(1..=max_width.min(width));
        let hole_h = rng.random_range(1..=max_height.min(height));
        let x0 = rng.random_range(0..=width - hole_w);
        let y0 = rng.random_range(0..=height - hole_h);
        for y in y0..y0 + hole_h {
            for x in x0..x0 + hole_w {
                out.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
    }
    out
}
