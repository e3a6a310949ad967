//! External storage seams.
//!
//! The pipeline never owns storage: it is handed a [`BlobStore`] for raster
//! bytes and a [`MetadataStore`] for job/image/sample records at
//! construction time. Both are object-safe traits so tests and parallel
//! jobs can inject their own implementations. The in-memory variants here
//! back the integration tests and small local runs.

use crate::annotation::AnnotationSet;
use crate::error::{PipelineError, Result};
use crate::job::{DatasetVersionJob, JobErrorEntry, JobStatus};
use crate::transforms::spec::TransformSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Dataset split. Only `train` receives randomized augmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Valid, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }
}

/// A source image record as the metadata store presents it: the pipeline is
/// handed resolved object keys, never URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceImage {
    pub id: String,
    pub blob_key: String,
    pub file_name: String,
    pub split: Split,
}

/// The persisted form of an [`crate::pipeline::AugmentedSample`]: raster
/// bytes live in the blob store, everything else here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSample {
    pub version_id: String,
    pub source_image_id: String,
    pub augmentation_index: Option<u32>,
    pub blob_key: String,
    pub width: u32,
    pub height: u32,
    pub split: Split,
    pub annotations: AnnotationSet,
    pub provenance: Vec<TransformSpec>,
}

/// Raw object storage. Writes must be idempotent per key: the job queue is
/// at-least-once and a retried unit overwrites the same key.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Vec<u8>>;
    fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
    fn exists(&self, key: &str) -> Result<bool>;
}

/// Record storage for jobs, source images, and generated samples.
pub trait MetadataStore: Send + Sync {
    fn get_job(&self, job_id: &str) -> Result<DatasetVersionJob>;
    fn list_images(&self, dataset_id: &str, split: Split) -> Result<Vec<(SourceImage, AnnotationSet)>>;
    fn write_sample(&self, sample: &StoredSample) -> Result<()>;
    fn list_samples(&self, version_id: &str) -> Result<Vec<StoredSample>>;
    fn update_job_status(&self, job_id: &str, status: JobStatus, error_log: &[JobErrorEntry]) -> Result<()>;
}

// ----------------------------------------------------------------------------
// In-memory implementations
// ----------------------------------------------------------------------------

/// HashMap-backed blob store.
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let objects = self.objects.lock().map_err(|e| PipelineError::storage(e.to_string()))?;
        objects
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| PipelineError::storage(format!("no object at key '{}'", key)))
    }

    fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let mut objects = self.objects.lock().map_err(|e| PipelineError::storage(e.to_string()))?;
        objects.insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let objects = self.objects.lock().map_err(|e| PipelineError::storage(e.to_string()))?;
        Ok(objects.contains_key(key))
    }
}

#[derive(Default)]
struct MetadataTables {
    jobs: HashMap<String, DatasetVersionJob>,
    // dataset id -> images with their annotations
    images: HashMap<String, Vec<(SourceImage, AnnotationSet)>>,
    // version id -> samples, keyed by blob key for idempotent rewrites
    samples: HashMap<String, Vec<StoredSample>>,
}

/// HashMap-backed metadata store.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    tables: Mutex<MetadataTables>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_job(&self, job: DatasetVersionJob) -> Result<()> {
        let mut tables = self.tables.lock().map_err(|e| PipelineError::storage(e.to_string()))?;
        tables.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    pub fn insert_image(
        &self,
        dataset_id: &str,
        image: SourceImage,
        annotations: AnnotationSet,
    ) -> Result<()> {
        let mut tables = self.tables.lock().map_err(|e| PipelineError::storage(e.to_string()))?;
        tables
            .images
            .entry(dataset_id.to_string())
            .or_default()
            .push((image, annotations));
        Ok(())
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn get_job(&self, job_id: &str) -> Result<DatasetVersionJob> {
        let tables = self.tables.lock().map_err(|e| PipelineError::storage(e.to_string()))?;
        tables
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| PipelineError::storage(format!("no job '{}'", job_id)))
    }

    fn list_images(&self, dataset_id: &str, split: Split) -> Result<Vec<(SourceImage, AnnotationSet)>> {
        let tables = self.tables.lock().map_err(|e| PipelineError::storage(e.to_string()))?;
        Ok(tables
            .images
            .get(dataset_id)
            .map(|images| {
                images
                    .iter()
                    .filter(|(img, _)| img.split == split)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn write_sample(&self, sample: &StoredSample) -> Result<()> {
        let mut tables = self.tables.lock().map_err(|e| PipelineError::storage(e.to_string()))?;
        let samples = tables.samples.entry(sample.version_id.clone()).or_default();
        // At-least-once delivery: a retried unit replaces its previous row.
        samples.retain(|s| s.blob_key != sample.blob_key);
        samples.push(sample.clone());
        Ok(())
    }

    fn list_samples(&self, version_id: &str) -> Result<Vec<StoredSample>> {
        let tables = self.tables.lock().map_err(|e| PipelineError::storage(e.to_string()))?;
        Ok(tables.samples.get(version_id).cloned().unwrap_or_default())
    }

    fn update_job_status(&self, job_id: &str, status: JobStatus, error_log: &[JobErrorEntry]) -> Result<()> {
        let mut tables = self.tables.lock().map_err(|e| PipelineError::storage(e.to_string()))?;
        let job = tables
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| PipelineError::storage(format!("no job '{}'", job_id)))?;
        job.status = status;
        job.error_log = error_log.to_vec();
        job.updated_at = chrono::Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blob_put_get_exists() {
        let store = InMemoryBlobStore::new();
        assert!(!store.exists("a/b").unwrap());
        store.put("a/b", vec![1, 2, 3], "image/png").unwrap();
        assert!(store.exists("a/b").unwrap());
        assert_eq!(store.get("a/b").unwrap(), vec![1, 2, 3]);
        assert!(store.get("missing").is_err());
    }

    #[test]
    fn test_rewriting_a_sample_key_replaces_the_row() {
        let store = InMemoryMetadataStore::new();
        let mut sample = StoredSample {
            version_id: "v1".into(),
            source_image_id: "img".into(),
            augmentation_index: Some(0),
            blob_key: "versions/v1/img_aug0.png".into(),
            width: 10,
            height: 10,
            split: Split::Train,
            annotations: vec![],
            provenance: vec![],
        };
        store.write_sample(&sample).unwrap();
        sample.width = 20;
        store.write_sample(&sample).unwrap();

        let samples = store.list_samples("v1").unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].width, 20);
    }

    #[test]
    fn test_list_images_filters_by_split() {
        let store = InMemoryMetadataStore::new();
        for (id, split) in [("a", Split::Train), ("b", Split::Valid)] {
            store.insert_image(
                "ds",
                SourceImage {
                    id: id.into(),
                    blob_key: format!("raw/{}.png", id),
                    file_name: format!("{}.png", id),
                    split,
                },
                vec![],
            )
            .unwrap();
        }
        let train = store.list_images("ds", Split::Train).unwrap();
        assert_eq!(train.len(), 1);
        assert_eq!(train[0].0.id, "a");
        assert!(store.list_images("other", Split::Train).unwrap().is_empty());
    }

    #[test]
    fn test_update_job_status_persists_error_log() {
        let store = InMemoryMetadataStore::new();
        store.insert_job(DatasetVersionJob::new("j1", "ds", "v1", json!({}))).unwrap();

        let log = vec![JobErrorEntry::for_image("img-3", "crop window degenerate")];
        store
            .update_job_status("j1", JobStatus::Processing, &log)
            .unwrap();

        let job = store.get_job("j1").unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.error_log.len(), 1);
    }
}
