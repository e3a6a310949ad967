//! Color-space helpers shared by the photometric transforms.
//!
//! Hue/saturation shifts and auto-contrast both need a luminance-separated
//! space so chroma survives the adjustment; everything here works on HSV
//! with hue in degrees and saturation/value in `[0, 1]`.

use image::{Rgb, RgbImage};

/// RGB (8-bit) to HSV. Hue in `[0, 360)` degrees, saturation and value in
/// `[0, 1]`.
pub fn rgb_to_hsv(rgb: Rgb<u8>) -> (f64, f64, f64) {
    let r = rgb[0] as f64 / 255.0;
    let g = rgb[1] as f64 / 255.0;
    let b = rgb[2] as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };
    (h, s, max)
}

/// HSV back to 8-bit RGB. Inputs outside range are clamped/wrapped.
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb<u8> {
    let h = h.rem_euclid(360.0);
    let s = s.clamp(0.0, 1.0);
    let v = v.clamp(0.0, 1.0);

    let c = v * s;
    let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    Rgb([
        ((r + m) * 255.0).round().clamp(0.0, 255.0) as u8,
        ((g + m) * 255.0).round().clamp(0.0, 255.0) as u8,
        ((b + m) * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Histogram-equalizes the value channel, leaving hue and saturation
/// untouched. This is the auto-contrast primitive: geometry is unaffected,
/// chroma is preserved, only lightness is redistributed.
pub fn equalize_value_channel(img: &RgbImage) -> RgbImage {
    let (width, height) = img.dimensions();
    let total = (width as u64) * (height as u64);
    if total == 0 {
        return img.clone();
    }

    // Histogram over the quantized value channel.
    let mut histogram = [0u64; 256];
    for pixel in img.pixels() {
        let (_, _, v) = rgb_to_hsv(*pixel);
        histogram[(v * 255.0).round() as usize] += 1;
    }

    // A single occupied bin means zero dynamic range: there is nothing to
    // redistribute, and the anchored CDF below would map the lone level to
    // 0. Return the image unchanged instead.
    if histogram.iter().any(|&count| count == total) {
        return img.clone();
    }

    // Cumulative distribution, anchored at the first occupied bin so the
    // darkest present level maps to 0.
    let mut cdf = [0u64; 256];
    let mut running = 0u64;
    for (bin, count) in histogram.iter().enumerate() {
        running += count;
        cdf[bin] = running;
    }
    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let denom = (total - cdf_min).max(1);

    let mut lut = [0.0f64; 256];
    for bin in 0..256 {
        lut[bin] = (cdf[bin].saturating_sub(cdf_min)) as f64 / denom as f64;
    }

    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels() {
        let (h, s, v) = rgb_to_hsv(*pixel);
        let v_eq = lut[(v * 255.0).round() as usize];
        out.put_pixel(x, y, hsv_to_rgb(h, s, v_eq));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsv_round_trip_primaries() {
        for rgb in [
            Rgb([255u8, 0, 0]),
            Rgb([0, 255, 0]),
            Rgb([0, 0, 255]),
            Rgb([255, 255, 255]),
            Rgb([0, 0, 0]),
            Rgb([128, 64, 32]),
        ] {
            let (h, s, v) = rgb_to_hsv(rgb);
            let back = hsv_to_rgb(h, s, v);
            for c in 0..3 {
                assert!(
                    (back[c] as i16 - rgb[c] as i16).abs() <= 1,
                    "channel {} of {:?} round-tripped to {:?}",
                    c,
                    rgb,
                    back
                );
            }
        }
    }

    #[test]
    fn test_equalize_stretches_low_contrast_image() {
        // Two gray levels squeezed into the middle of the range.
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([100, 100, 100]));
        img.put_pixel(1, 0, Rgb([140, 140, 140]));

        let eq = equalize_value_channel(&img);
        let lo = eq.get_pixel(0, 0)[0];
        let hi = eq.get_pixel(1, 0)[0];
        // The darker level anchors near 0, the brighter stretches up.
        assert!(lo < 10);
        assert!(hi > lo);
    }

    #[test]
    fn test_equalize_leaves_constant_image_unchanged() {
        // One occupied value bin: equalization has nothing to stretch and
        // must not collapse the level to black.
        let img = RgbImage::from_pixel(4, 4, Rgb([128, 128, 128]));
        let eq = equalize_value_channel(&img);
        assert_eq!(eq.as_raw(), img.as_raw());

        let white = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));
        assert_eq!(equalize_value_channel(&white).as_raw(), white.as_raw());
    }

    #[test]
    fn test_equalize_preserves_hue() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([120, 60, 60]));
        img.put_pixel(1, 0, Rgb([200, 100, 100]));

        let eq = equalize_value_channel(&img);
        for (_, _, p) in eq.enumerate_pixels() {
            let (h, _, _) = rgb_to_hsv(*p);
            // Reddish hue stays reddish.
            assert!(h < 30.0 || h > 330.0 || p[0] == p[1]);
        }
    }
}
