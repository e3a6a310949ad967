//! Transform vocabulary and the two engines that consume it.
//!
//! ```text
//! transforms/
//! ├── spec.rs     → TransformSpec enum + TransformPipeline (what to do)
//! ├── mapping.rs  → GeometricMapping (what a geometric op did to coordinates)
//! ├── engine.rs   → raster application (pixels)
//! ├── project.rs  → annotation projection (geometry)
//! └── color.rs    → HSV helpers and histogram equalization
//! ```
//!
//! The raster engine and the annotation projector never talk to each other
//! directly: the engine emits a [`mapping::GeometricMapping`] for every
//! application, and the projector replays it on the symbolic side. That pair
//! is the synchronization contract of the whole pipeline.

pub mod color;
pub mod engine;
pub mod mapping;
pub mod project;
pub mod spec;

pub use engine::{apply, TransformOutcome};
pub use mapping::GeometricMapping;
pub use project::AnnotationProjector;
pub use spec::{ResizeMode, TransformPipeline, TransformSpec};
