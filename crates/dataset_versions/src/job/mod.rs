//! Dataset version job records and status lifecycle.

pub mod orchestrator;
pub mod pool;

pub use orchestrator::{JobReport, OrchestratorConfig, VersionJobOrchestrator};

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a version generation job. Transitions are monotonic:
/// QUEUED -> PROCESSING -> {COMPLETED | FAILED}, never reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One entry in a job's error log: a per-image or per-iteration failure
/// that was recovered locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobErrorEntry {
    pub image_id: Option<String>,
    pub augmentation_index: Option<u32>,
    pub transform: Option<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl JobErrorEntry {
    pub fn job_level(message: impl Into<String>) -> Self {
        Self {
            image_id: None,
            augmentation_index: None,
            transform: None,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn for_image(image_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            image_id: Some(image_id.into()),
            augmentation_index: None,
            transform: None,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn for_iteration(
        image_id: impl Into<String>,
        augmentation_index: u32,
        transform: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            image_id: Some(image_id.into()),
            augmentation_index: Some(augmentation_index),
            transform: Some(transform.into()),
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// A dataset version generation job as persisted by the metadata store.
/// Mutated only by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetVersionJob {
    pub id: String,
    pub source_dataset_id: String,
    /// The dataset version this job produces.
    pub version_id: String,
    /// Raw configuration mapping; parsed by the orchestrator at start so a
    /// bad config surfaces before the job leaves QUEUED.
    pub config: serde_json::Value,
    pub status: JobStatus,
    pub error_log: Vec<JobErrorEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DatasetVersionJob {
    pub fn new(
        id: impl Into<String>,
        source_dataset_id: impl Into<String>,
        version_id: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            source_dataset_id: source_dataset_id.into(),
            version_id: version_id.into(),
            config,
            status: JobStatus::Queued,
            error_log: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the job to `next`, enforcing monotonicity.
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::storage(format!(
                "illegal job status transition {:?} -> {:?} for job {}",
                self.status, next, self.id
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_transitions_are_monotonic() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));

        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_transition_updates_timestamp() {
        let mut job = DatasetVersionJob::new("job-1", "ds-1", "v-1", json!({}));
        let before = job.updated_at;
        job.transition(JobStatus::Processing).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.updated_at >= before);

        let err = job.transition(JobStatus::Queued).unwrap_err();
        assert!(err.to_string().contains("illegal"));
    }

    #[test]
    fn test_status_serializes_screaming() {
        assert_eq!(serde_json::to_string(&JobStatus::Queued).unwrap(), "\"QUEUED\"");
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"PROCESSING\""
        );
    }
}
