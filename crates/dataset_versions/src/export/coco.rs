//! COCO object-detection JSON: a single `annotations.json` covering every
//! sample in the version.

use super::{enclosing_box, sample_stem, ExportArtifact, ExportFile};
use crate::annotation::Geometry;
use crate::error::{PipelineError, Result};
use crate::store::StoredSample;
use serde::Serialize;

#[derive(Serialize)]
struct CocoFile {
    images: Vec<CocoImage>,
    annotations: Vec<CocoAnnotation>,
    categories: Vec<CocoCategory>,
}

#[derive(Serialize)]
struct CocoImage {
    id: u32,
    file_name: String,
    width: u32,
    height: u32,
}

#[derive(Serialize)]
struct CocoAnnotation {
    id: u32,
    image_id: u32,
    category_id: u32,
    bbox: [f64; 4],
    area: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    segmentation: Vec<Vec<f64>>,
    iscrowd: u8,
}

#[derive(Serialize)]
struct CocoCategory {
    id: u32,
    name: String,
}

pub(super) fn render(samples: &[StoredSample], categories: &[String]) -> Result<ExportArtifact> {
    let category_id = |label: &str| -> Result<u32> {
        categories
            .iter()
            .position(|c| c == label)
            .map(|i| i as u32)
            .ok_or_else(|| PipelineError::config(format!("unknown class label '{}'", label)))
    };

    let mut images = Vec::with_capacity(samples.len());
    let mut annotations = Vec::new();
    for (image_idx, sample) in samples.iter().enumerate() {
        let image_id = image_idx as u32;
        images.push(CocoImage {
            id: image_id,
            file_name: format!("{}.png", sample_stem(sample)),
            width: sample.width,
            height: sample.height,
        });
        for ann in &sample.annotations {
            let Some(bbox) = enclosing_box(&ann.geometry) else {
                continue;
            };
            let segmentation = match &ann.geometry {
                Geometry::Polygon { vertices } => {
                    vec![vertices.iter().flat_map(|p| [p.x, p.y]).collect()]
                }
                _ => Vec::new(),
            };
            annotations.push(CocoAnnotation {
                id: annotations.len() as u32,
                image_id,
                category_id: category_id(&ann.class_label)?,
                bbox: [bbox.x, bbox.y, bbox.w, bbox.h],
                area: bbox.area(),
                segmentation,
                iscrowd: 0,
            });
        }
    }

    let file = CocoFile {
        images,
        annotations,
        categories: categories
            .iter()
            .enumerate()
            .map(|(i, name)| CocoCategory { id: i as u32, name: name.clone() })
            .collect(),
    };

    let bytes = serde_json::to_vec_pretty(&file)
        .map_err(|e| PipelineError::config(format!("failed to serialize coco json: {}", e)))?;
    Ok(ExportArtifact {
        files: vec![ExportFile {
            path: "annotations.json".into(),
            content_type: "application/json",
            bytes,
        }],
    })
}
