//! Projects annotations through the geometric mapping a raster transform
//! produced, keeping geometry and pixels synchronized.
//!
//! Bounding boxes are projected corner-wise and re-boxed: rotation and shear
//! turn an axis-aligned box into a quadrilateral, and the axis-aligned hull
//! of the transformed corners is the representation downstream consumers
//! expect. Polygons and keypoints are projected point-wise. Everything is
//! then clipped against the mapping's output frame and dropped when too
//! little of it remains visible.

use crate::annotation::{Annotation, AnnotationSet, BoundingBox, Geometry, Point};
use crate::error::{PipelineError, Result};
use crate::transforms::mapping::GeometricMapping;

/// Applies geometric mappings to annotation sets with a configurable
/// visibility policy.
#[derive(Debug, Clone, Copy)]
pub struct AnnotationProjector {
    /// An annotation is dropped when its clipped area is at most this
    /// fraction of its pre-clip area. Zero means "drop only what has no
    /// positive visible area".
    min_visibility: f64,
}

impl Default for AnnotationProjector {
    fn default() -> Self {
        Self { min_visibility: 0.0 }
    }
}

impl AnnotationProjector {
    pub fn new(min_visibility: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&min_visibility) {
            return Err(PipelineError::config(format!(
                "min_visibility must be in [0, 1], got {}",
                min_visibility
            )));
        }
        Ok(Self { min_visibility })
    }

    /// Projects every annotation through `mapping`, clips against the output
    /// frame, and culls per the visibility policy. Class labels and geometry
    /// kinds are never altered; annotations are only kept or dropped.
    pub fn project(&self, annotations: &AnnotationSet, mapping: &GeometricMapping) -> AnnotationSet {
        let width = mapping.out_width() as f64;
        let height = mapping.out_height() as f64;

        annotations
            .iter()
            .filter_map(|ann| {
                let geometry = match &ann.geometry {
                    Geometry::BoundingBox(b) => self
                        .project_box(b, mapping, width, height)
                        .map(Geometry::BoundingBox),
                    Geometry::Polygon { vertices } => {
                        let kept = project_points_in_frame(vertices, mapping, width, height);
                        // A polygon needs at least 3 surviving vertices to
                        // still describe an area.
                        (kept.len() >= 3).then_some(Geometry::Polygon { vertices: kept })
                    }
                    Geometry::Keypoints { points } => {
                        let kept = project_points_in_frame(points, mapping, width, height);
                        (!kept.is_empty()).then_some(Geometry::Keypoints { points: kept })
                    }
                };
                geometry.map(|geometry| Annotation {
                    image_id: ann.image_id.clone(),
                    class_label: ann.class_label.clone(),
                    geometry,
                })
            })
            .collect()
    }

    fn project_box(
        &self,
        b: &BoundingBox,
        mapping: &GeometricMapping,
        width: f64,
        height: f64,
    ) -> Option<BoundingBox> {
        let corners: Vec<Point> = b.corners().iter().map(|&c| mapping.apply_point(c)).collect();
        let hull = BoundingBox::enclosing(&corners)?;

        let pre_clip_area = hull.area();
        if pre_clip_area <= 0.0 {
            return None;
        }

        let clipped = hull.clip(width, height);
        if clipped.area() <= self.min_visibility * pre_clip_area {
            return None;
        }
        Some(clipped)
    }
}

fn project_points_in_frame(
    points: &[Point],
    mapping: &GeometricMapping,
    width: f64,
    height: f64,
) -> Vec<Point> {
    points
        .iter()
        .map(|&p| mapping.apply_point(p))
        .filter(|p| p.x >= 0.0 && p.x <= width && p.y >= 0.0 && p.y <= height)
        .collect()
}
