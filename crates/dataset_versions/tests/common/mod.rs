use dataset_versions::{
    Annotation, AnnotationSet, BlobStore, BoundingBox, DatasetVersionJob, InMemoryBlobStore,
    InMemoryMetadataStore, SourceImage, Split,
};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;

/// PNG bytes of a solid-gray image with a red marker at (1, 1) so flips and
/// crops are observable in decoded output.
pub fn fixture_png(width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbImage::from_pixel(width, height, Rgb([90, 90, 90]));
    if width > 1 && height > 1 {
        img.put_pixel(1, 1, Rgb([220, 30, 30]));
    }
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn stores() -> (Arc<InMemoryBlobStore>, Arc<InMemoryMetadataStore>) {
    (
        Arc::new(InMemoryBlobStore::new()),
        Arc::new(InMemoryMetadataStore::new()),
    )
}

/// Registers one source image with a PNG blob and the given annotations.
pub fn seed_image(
    blob: &InMemoryBlobStore,
    meta: &InMemoryMetadataStore,
    dataset_id: &str,
    image_id: &str,
    split: Split,
    width: u32,
    height: u32,
    annotations: AnnotationSet,
) {
    let blob_key = format!("datasets/{}/{}.png", dataset_id, image_id);
    blob.put(&blob_key, fixture_png(width, height), "image/png")
        .unwrap();
    meta.insert_image(
        dataset_id,
        SourceImage {
            id: image_id.to_string(),
            blob_key,
            file_name: format!("{}.png", image_id),
            split,
        },
        annotations,
    )
    .unwrap();
}

pub fn box_annotation(image_id: &str, label: &str, x: f64, y: f64, w: f64, h: f64) -> Annotation {
    Annotation::bbox(image_id, label, BoundingBox::new(x, y, w, h))
}

pub fn queued_job(
    job_id: &str,
    dataset_id: &str,
    version_id: &str,
    config: serde_json::Value,
) -> DatasetVersionJob {
    DatasetVersionJob::new(job_id, dataset_id, version_id, config)
}
