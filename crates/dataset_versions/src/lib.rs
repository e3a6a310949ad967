//! Dataset version generation pipeline.
//!
//! Turns a source dataset (images + annotations) into an immutable,
//! reproducible "version": a declarative transform configuration is parsed
//! into fixed-order preprocessing and augmentation pipelines, every image is
//! processed on a worker pool with per-iteration seeded RNG, annotations are
//! projected through the exact coordinate changes applied to the pixels, and
//! the resulting samples can be exported as COCO, YOLO, or Pascal VOC.

pub mod annotation;
pub mod config;
pub mod error;
pub mod export;
pub mod job;
pub mod pipeline;
pub mod store;
pub mod transforms;

pub use annotation::{Annotation, AnnotationSet, BoundingBox, Geometry, Point};
pub use config::{ParsedJobConfig, TransformSpecParser, VersionConfig};
pub use error::{PipelineError, Result};
pub use export::{ExportArtifact, ExportFile, ExportFormat, ExportFormatter};
pub use job::{
    DatasetVersionJob, JobErrorEntry, JobReport, JobStatus, OrchestratorConfig,
    VersionJobOrchestrator,
};
pub use pipeline::{AugmentationSampler, AugmentedSample, PreprocessingStage};
pub use store::{
    BlobStore, InMemoryBlobStore, InMemoryMetadataStore, MetadataStore, SourceImage, Split,
    StoredSample,
};
pub use transforms::{AnnotationProjector, GeometricMapping, TransformPipeline, TransformSpec};
