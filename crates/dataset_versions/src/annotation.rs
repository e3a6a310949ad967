//! Annotation records attached to images.
//!
//! Bounding boxes use COCO conventions: absolute pixel units, top-left
//! origin, `(x, y)` the top-left corner and `(w, h)` the extent. Polygons
//! and keypoints carry absolute-pixel vertices in the same frame.

use serde::{Deserialize, Serialize};

/// A point in absolute pixel coordinates, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned box in COCO `x, y, w, h` form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    /// The four corners, clockwise from top-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.x + self.w, self.y),
            Point::new(self.x + self.w, self.y + self.h),
            Point::new(self.x, self.y + self.h),
        ]
    }

    /// Smallest axis-aligned box containing all `points`.
    /// Returns `None` for an empty slice.
    pub fn enclosing(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    /// Intersects the box with `[0, width] x [0, height]`. The result never
    /// has negative extent; a box fully outside the frame collapses to zero
    /// area at the nearest edge.
    pub fn clip(&self, width: f64, height: f64) -> Self {
        let x0 = self.x.clamp(0.0, width);
        let y0 = self.y.clamp(0.0, height);
        let x1 = (self.x + self.w).clamp(0.0, width);
        let y1 = (self.y + self.h).clamp(0.0, height);
        Self::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
    }
}

/// Geometry payload of an annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Geometry {
    BoundingBox(BoundingBox),
    Polygon { vertices: Vec<Point> },
    Keypoints { points: Vec<Point> },
}

/// One labeled shape on one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Id of the image this annotation belongs to.
    pub image_id: String,
    pub class_label: String,
    pub geometry: Geometry,
}

impl Annotation {
    pub fn bbox(image_id: impl Into<String>, class_label: impl Into<String>, b: BoundingBox) -> Self {
        Self {
            image_id: image_id.into(),
            class_label: class_label.into(),
            geometry: Geometry::BoundingBox(b),
        }
    }
}

/// All annotations of a single image.
pub type AnnotationSet = Vec<Annotation>;
