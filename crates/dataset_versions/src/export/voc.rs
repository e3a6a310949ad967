//! Pascal VOC layout: one `<stem>.xml` per sample with corner-form boxes
//! in absolute pixels.

use super::{enclosing_box, sample_stem, ExportArtifact, ExportFile};
use crate::error::Result;
use crate::store::StoredSample;
use std::fmt::Write as _;

pub(super) fn render(samples: &[StoredSample]) -> Result<ExportArtifact> {
    let mut files = Vec::with_capacity(samples.len());
    for sample in samples {
        let stem = sample_stem(sample);
        let mut xml = String::new();
        let _ = writeln!(xml, "<annotation>");
        let _ = writeln!(xml, "  <filename>{}.png</filename>", stem);
        let _ = writeln!(xml, "  <size>");
        let _ = writeln!(xml, "    <width>{}</width>", sample.width);
        let _ = writeln!(xml, "    <height>{}</height>", sample.height);
        let _ = writeln!(xml, "    <depth>3</depth>");
        let _ = writeln!(xml, "  </size>");
        for ann in &sample.annotations {
            let Some(bbox) = enclosing_box(&ann.geometry) else {
                continue;
            };
            let _ = writeln!(xml, "  <object>");
            let _ = writeln!(xml, "    <name>{}</name>", escape(&ann.class_label));
            let _ = writeln!(xml, "    <bndbox>");
            let _ = writeln!(xml, "      <xmin>{}</xmin>", bbox.x.round() as i64);
            let _ = writeln!(xml, "      <ymin>{}</ymin>", bbox.y.round() as i64);
            let _ = writeln!(xml, "      <xmax>{}</xmax>", (bbox.x + bbox.w).round() as i64);
            let _ = writeln!(xml, "      <ymax>{}</ymax>", (bbox.y + bbox.h).round() as i64);
            let _ = writeln!(xml, "    </bndbox>");
            let _ = writeln!(xml, "  </object>");
        }
        let _ = writeln!(xml, "</annotation>");
        files.push(ExportFile {
            path: format!("{}.xml", stem),
            content_type: "application/xml",
            bytes: xml.into_bytes(),
        });
    }
    Ok(ExportArtifact { files })
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::super::tests::sample_with_boxes;
    use crate::annotation::BoundingBox;
    use crate::export::{ExportFormat, ExportFormatter};

    #[test]
    fn test_voc_corner_form_boxes() {
        let samples = vec![sample_with_boxes("img_a", 640, 480, &[
            ("dog", BoundingBox::new(10.0, 20.0, 100.0, 50.0)),
        ])];
        let artifact = ExportFormatter::export(&samples, ExportFormat::Voc).unwrap();
        assert_eq!(artifact.files.len(), 1);
        assert_eq!(artifact.files[0].path, "img_a.xml");
        let xml = String::from_utf8(artifact.files[0].bytes.clone()).unwrap();
        assert!(xml.contains("<xmin>10</xmin>"));
        assert!(xml.contains("<ymin>20</ymin>"));
        assert!(xml.contains("<xmax>110</xmax>"));
        assert!(xml.contains("<ymax>70</ymax>"));
        assert!(xml.contains("<name>dog</name>"));
        assert!(xml.contains("<width>640</width>"));
    }
}
