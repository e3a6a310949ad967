//! The exact coordinate transform performed by one raster operation.
//!
//! Every geometric transform is expressible as a 2x3 affine matrix plus the
//! output frame it lands in: flips are reflections, crops are translations
//! into a smaller frame, resize/pad are scale+offset, rotation and shear are
//! full affines about the image center. Keeping a single representation means
//! the annotation side only ever has to do one thing: push points through a
//! matrix, then clip against the output frame.

use crate::annotation::Point;

/// Row-major 2x3 affine matrix together with the output frame dimensions.
///
/// `x' = m[0]*x + m[1]*y + m[2]`
/// `y' = m[3]*x + m[4]*y + m[5]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometricMapping {
    m: [f64; 6],
    out_width: u32,
    out_height: u32,
}

const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

impl GeometricMapping {
    /// No-op mapping into a `width` x `height` frame. Color/texture
    /// transforms return this.
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            m: IDENTITY,
            out_width: width,
            out_height: height,
        }
    }

    /// Horizontal mirror: `x' = width - x`.
    pub fn flip_horizontal(width: u32, height: u32) -> Self {
        Self {
            m: [-1.0, 0.0, width as f64, 0.0, 1.0, 0.0],
            out_width: width,
            out_height: height,
        }
    }

    /// Vertical mirror: `y' = height - y`.
    pub fn flip_vertical(width: u32, height: u32) -> Self {
        Self {
            m: [1.0, 0.0, 0.0, 0.0, -1.0, height as f64],
            out_width: width,
            out_height: height,
        }
    }

    /// Crop window at `(x0, y0)` with extent `width` x `height`; points
    /// translate into the window's own frame.
    pub fn crop(x0: u32, y0: u32, width: u32, height: u32) -> Self {
        Self {
            m: [1.0, 0.0, -(x0 as f64), 0.0, 1.0, -(y0 as f64)],
            out_width: width,
            out_height: height,
        }
    }

    /// Per-axis scale followed by a translation, used by all resize modes
    /// (`stretch`: independent scales, `fit`: uniform scale, `pad`: uniform
    /// scale plus the centering offsets).
    pub fn scale_offset(sx: f64, sy: f64, dx: f64, dy: f64, out_width: u32, out_height: u32) -> Self {
        Self {
            m: [sx, 0.0, dx, 0.0, sy, dy],
            out_width,
            out_height,
        }
    }

    /// Counter-clockwise rotation by `angle_deg` about the image center,
    /// output frame unchanged.
    pub fn rotation_about_center(angle_deg: f64, width: u32, height: u32) -> Self {
        let rad = angle_deg.to_radians();
        let (sin, cos) = rad.sin_cos();
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;
        // Translate center to origin, rotate, translate back.
        Self {
            m: [
                cos,
                -sin,
                cx - cos * cx + sin * cy,
                sin,
                cos,
                cy - sin * cx - cos * cy,
            ],
            out_width: width,
            out_height: height,
        }
    }

    /// Horizontal shear by `angle_deg` about the vertical center line:
    /// `x' = x + tan(angle) * (y - cy)`.
    pub fn shear_horizontal(angle_deg: f64, width: u32, height: u32) -> Self {
        let k = angle_deg.to_radians().tan();
        let cy = height as f64 / 2.0;
        Self {
            m: [1.0, k, -k * cy, 0.0, 1.0, 0.0],
            out_width: width,
            out_height: height,
        }
    }

    pub fn out_width(&self) -> u32 {
        self.out_width
    }

    pub fn out_height(&self) -> u32 {
        self.out_height
    }

    pub fn is_identity(&self) -> bool {
        self.m
            .iter()
            .zip(IDENTITY.iter())
            .all(|(a, b)| (a - b).abs() < 1e-12)
    }

    /// Transforms a single point.
    pub fn apply_point(&self, p: Point) -> Point {
        Point::new(
            self.m[0] * p.x + self.m[1] * p.y + self.m[2],
            self.m[3] * p.x + self.m[4] * p.y + self.m[5],
        )
    }

    /// `self` followed by `then`. The output frame is `then`'s.
    pub fn compose(&self, then: &GeometricMapping) -> GeometricMapping {
        let a = &then.m;
        let b = &self.m;
        GeometricMapping {
            m: [
                a[0] * b[0] + a[1] * b[3],
                a[0] * b[1] + a[1] * b[4],
                a[0] * b[2] + a[1] * b[5] + a[2],
                a[3] * b[0] + a[4] * b[3],
                a[3] * b[1] + a[4] * b[4],
                a[3] * b[2] + a[4] * b[5] + a[5],
            ],
            out_width: then.out_width,
            out_height: then.out_height,
        }
    }

    /// Inverse mapping, used by the raster engine for backward sampling.
    /// `None` when the matrix is singular (zero-area scale).
    pub fn invert(&self) -> Option<GeometricMapping> {
        let m = &self.m;
        let det = m[0] * m[4] - m[1] * m[3];
        if det.abs() < 1e-12 {
            return None;
        }
        let inv = [
            m[4] / det,
            -m[1] / det,
            (m[1] * m[5] - m[4] * m[2]) / det,
            -m[3] / det,
            m[0] / det,
            (m[3] * m[2] - m[0] * m[5]) / det,
        ];
        Some(GeometricMapping {
            m: inv,
            out_width: self.out_width,
            out_height: self.out_height,
        })
    }
}
