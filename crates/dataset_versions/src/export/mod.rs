//! Serialization of a completed dataset version into interchange layouts.
//!
//! The formatter never re-invokes the transform engine: it operates purely
//! on already-projected annotations, doing only the coordinate convention
//! conversion each format requires (absolute -> normalized center form for
//! YOLO, top-left-wh -> corner pairs for VOC).

mod coco;
mod voc;
mod yolo;

use crate::annotation::{BoundingBox, Geometry};
use crate::error::{PipelineError, Result};
use crate::store::StoredSample;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Supported interchange layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Coco,
    Yolo,
    Voc,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Coco => "coco",
            ExportFormat::Yolo => "yolo",
            ExportFormat::Voc => "voc",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "coco" => Ok(ExportFormat::Coco),
            "yolo" => Ok(ExportFormat::Yolo),
            "voc" => Ok(ExportFormat::Voc),
            other => Err(PipelineError::config(format!("unknown export format '{}'", other))),
        }
    }
}

/// One file of an export artifact, relative to the artifact's key prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub path: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// A rendered export: the set of files to place under one key prefix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExportArtifact {
    pub files: Vec<ExportFile>,
}

/// Serializes stored samples into the requested layout.
pub struct ExportFormatter;

impl ExportFormatter {
    pub fn export(samples: &[StoredSample], format: ExportFormat) -> Result<ExportArtifact> {
        let categories = category_list(samples);
        match format {
            ExportFormat::Coco => coco::render(samples, &categories),
            ExportFormat::Yolo => yolo::render(samples, &categories),
            ExportFormat::Voc => voc::render(samples),
        }
    }
}

/// Sorted, de-duplicated class labels; indices double as 0-based contiguous
/// category ids across all formats.
fn category_list(samples: &[StoredSample]) -> Vec<String> {
    samples
        .iter()
        .flat_map(|s| s.annotations.iter().map(|a| a.class_label.clone()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// File stem of a sample, shared by image and label files across formats.
fn sample_stem(sample: &StoredSample) -> String {
    let base = sample.blob_key.rsplit('/').next().unwrap_or(&sample.blob_key);
    base.strip_suffix(".png").unwrap_or(base).to_string()
}

/// Axis-aligned box of any geometry kind: boxes pass through, polygons and
/// keypoints use their enclosing rectangle.
fn enclosing_box(geometry: &Geometry) -> Option<BoundingBox> {
    match geometry {
        Geometry::BoundingBox(b) => Some(*b),
        Geometry::Polygon { vertices } => BoundingBox::enclosing(vertices),
        Geometry::Keypoints { points } => BoundingBox::enclosing(points),
    }
}
