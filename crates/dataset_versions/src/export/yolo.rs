//! YOLO layout: one `labels/<stem>.txt` per sample with normalized
//! center-form boxes, plus a `classes.txt` giving the class index order.

use super::{enclosing_box, sample_stem, ExportArtifact, ExportFile};
use crate::error::{PipelineError, Result};
use crate::store::StoredSample;
use std::fmt::Write as _;

pub(super) fn render(samples: &[StoredSample], categories: &[String]) -> Result<ExportArtifact> {
    let mut files = Vec::with_capacity(samples.len() + 1);
    for sample in samples {
        let (w, h) = (sample.width as f64, sample.height as f64);
        if w <= 0.0 || h <= 0.0 {
            return Err(PipelineError::config(format!(
                "sample '{}' has zero-sized image",
                sample.blob_key
            )));
        }
        let mut lines = String::new();
        for ann in &sample.annotations {
            let Some(bbox) = enclosing_box(&ann.geometry) else {
                continue;
            };
            let class_id = categories
                .iter()
                .position(|c| *c == ann.class_label)
                .ok_or_else(|| {
                    PipelineError::config(format!("unknown class label '{}'", ann.class_label))
                })?;
            let x_center = ((bbox.x + bbox.w / 2.0) / w).clamp(0.0, 1.0);
            let y_center = ((bbox.y + bbox.h / 2.0) / h).clamp(0.0, 1.0);
            let bw = (bbox.w / w).clamp(0.0, 1.0);
            let bh = (bbox.h / h).clamp(0.0, 1.0);
            // Infallible for String targets.
            let _ = writeln!(lines, "{} {:.6} {:.6} {:.6} {:.6}", class_id, x_center, y_center, bw, bh);
        }
        files.push(ExportFile {
            path: format!("labels/{}.txt", sample_stem(sample)),
            content_type: "text/plain",
            bytes: lines.into_bytes(),
        });
    }
    files.push(ExportFile {
        path: "classes.txt".into(),
        content_type: "text/plain",
        bytes: (categories.join("\n") + "\n").into_bytes(),
    });
    Ok(ExportArtifact { files })
}

#[cfg(test)]
mod tests {
    use super::super::tests::sample_with_boxes;
    use crate::annotation::BoundingBox;
    use crate::export::{ExportFormat, ExportFormatter};

    #[test]
    fn test_yolo_normalized_center_form() {
        let samples = vec![sample_with_boxes("img_a", 640, 480, &[
            ("dog", BoundingBox::new(160.0, 120.0, 320.0, 240.0)),
        ])];
        let artifact = ExportFormatter::export(&samples, ExportFormat::Yolo).unwrap();
        let label = artifact.files.iter().find(|f| f.path == "labels/img_a.txt").unwrap();
        assert_eq!(
            String::from_utf8(label.bytes.clone()).unwrap(),
            "0 0.500000 0.500000 0.500000 0.500000\n"
        );
        let classes = artifact.files.iter().find(|f| f.path == "classes.txt").unwrap();
        assert_eq!(String::from_utf8(classes.bytes.clone()).unwrap(), "dog\n");
    }

    #[test]
    fn test_yolo_empty_annotations_still_emits_label_file() {
        let samples = vec![sample_with_boxes("img_empty", 100, 100, &[])];
        let artifact = ExportFormatter::export(&samples, ExportFormat::Yolo).unwrap();
        let label = artifact.files.iter().find(|f| f.path == "labels/img_empty.txt").unwrap();
        assert!(label.bytes.is_empty());
    }
}
