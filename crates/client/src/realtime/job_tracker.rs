//! Lifecycle of a long-running server job, fed by `<feature>-update` frames.
//!
//! ```text
//! Idle ──processing──▶ Processing ──completed──▶ Completed
//!   ▲                      │
//!   └──(after a delay)── Error ◀──error──┘
//! ```
//!
//! AI document extraction and framework comparison both report progress
//! this way; the tracker is the same for every feature.

use chrono::{DateTime, Utc};
use frameworks_shared::{job_update_type, JobStatus, JobUpdate};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobPhase {
    #[default]
    Idle,
    Processing,
    Completed,
    Error,
}

/// What a single update did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTransition {
    Started,
    Progressed,
    Completed,
    Failed,
    /// Unknown status; state untouched.
    Ignored,
}

const DEFAULT_FAILURE_MESSAGE: &str = "Processing failed";

#[derive(Debug, Clone, PartialEq)]
pub struct JobTracker {
    feature: String,
    pub phase: JobPhase,
    pub job_id: Option<String>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    /// Result payload of the last completed run.
    pub result: Option<Value>,
    /// Item count of the last completed run.
    pub count: u64,
    pub completed_at: Option<DateTime<Utc>>,
    /// Bumped on every failure; identifies the error a reset timer is for.
    failures: u64,
}

impl JobTracker {
    pub fn new(feature: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            phase: JobPhase::Idle,
            job_id: None,
            progress: None,
            message: None,
            result: None,
            count: 0,
            completed_at: None,
            failures: 0,
        }
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// Message type this tracker listens to.
    pub fn update_type(&self) -> String {
        job_update_type(&self.feature)
    }

    pub fn is_processing(&self) -> bool {
        self.phase == JobPhase::Processing
    }

    /// Sequence number of the latest failure.
    pub fn failure(&self) -> u64 {
        self.failures
    }

    pub fn apply(&mut self, update: &JobUpdate) -> JobTransition {
        match update.status {
            JobStatus::Processing => {
                let transition = if self.phase == JobPhase::Processing {
                    JobTransition::Progressed
                } else {
                    JobTransition::Started
                };
                self.phase = JobPhase::Processing;
                self.job_id = update.job_id.clone().or_else(|| self.job_id.take());
                self.progress = update.progress;
                self.message = update.message.clone();
                transition
            }
            JobStatus::Completed => {
                self.phase = JobPhase::Completed;
                self.job_id = update.job_id.clone().or_else(|| self.job_id.take());
                self.progress = Some(100.0);
                self.message = update.message.clone();
                self.result = update.result.clone();
                self.count = update.result_count();
                self.completed_at = Some(Utc::now());
                JobTransition::Completed
            }
            JobStatus::Error => {
                self.phase = JobPhase::Error;
                self.failures += 1;
                self.progress = None;
                self.message = Some(
                    update
                        .message
                        .clone()
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
                );
                JobTransition::Failed
            }
            JobStatus::Unknown => JobTransition::Ignored,
        }
    }

    /// Leave the error state entered by `failure`. Returns `false` if the
    /// job has moved on, including to a newer failure.
    pub fn clear_error(&mut self, failure: u64) -> bool {
        if self.phase != JobPhase::Error || self.failures != failure {
            return false;
        }
        self.phase = JobPhase::Idle;
        self.message = None;
        true
    }

    /// Forget everything, including the last result. The failure sequence
    /// carries on so pending reset timers stay stale.
    pub fn reset(&mut self) {
        let failures = self.failures;
        *self = Self::new(std::mem::take(&mut self.feature));
        self.failures = failures;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(status: JobStatus) -> JobUpdate {
        JobUpdate {
            status,
            job_id: None,
            message: None,
            progress: None,
            result: None,
            count: None,
        }
    }

    #[test]
    fn processing_then_completed_snapshots_result() {
        let mut tracker = JobTracker::new("comparison");
        assert_eq!(tracker.update_type(), "comparison-update");

        let mut started = update(JobStatus::Processing);
        started.job_id = Some("job-1".into());
        assert_eq!(tracker.apply(&started), JobTransition::Started);
        assert!(tracker.is_processing());

        let mut progress = update(JobStatus::Processing);
        progress.progress = Some(40.0);
        assert_eq!(tracker.apply(&progress), JobTransition::Progressed);
        assert_eq!(tracker.job_id.as_deref(), Some("job-1"));

        let mut done = update(JobStatus::Completed);
        done.result = Some(json!([{"control": "A.5.1"}, {"control": "A.5.2"}]));
        assert_eq!(tracker.apply(&done), JobTransition::Completed);
        assert_eq!(tracker.phase, JobPhase::Completed);
        assert_eq!(tracker.count, 2);
        assert!(tracker.completed_at.is_some());
    }

    #[test]
    fn error_surfaces_message_then_clears_to_idle() {
        let mut tracker = JobTracker::new("ai-processing");
        tracker.apply(&update(JobStatus::Processing));

        let mut failed = update(JobStatus::Error);
        failed.message = Some("Document could not be parsed".into());
        assert_eq!(tracker.apply(&failed), JobTransition::Failed);
        assert_eq!(tracker.message.as_deref(), Some("Document could not be parsed"));

        let failure = tracker.failure();
        assert!(tracker.clear_error(failure));
        assert_eq!(tracker.phase, JobPhase::Idle);
        assert_eq!(tracker.message, None);
        assert!(!tracker.clear_error(failure));
    }

    #[test]
    fn error_without_message_gets_a_default() {
        let mut tracker = JobTracker::new("ai-processing");
        tracker.apply(&update(JobStatus::Error));
        assert_eq!(tracker.message.as_deref(), Some("Processing failed"));
    }

    #[test]
    fn clear_error_does_not_undo_a_newer_run() {
        let mut tracker = JobTracker::new("ai-processing");
        tracker.apply(&update(JobStatus::Error));
        let failure = tracker.failure();
        tracker.apply(&update(JobStatus::Processing));
        assert!(!tracker.clear_error(failure));
        assert!(tracker.is_processing());
    }

    #[test]
    fn clear_error_only_clears_its_own_failure() {
        let mut tracker = JobTracker::new("ai-processing");
        tracker.apply(&update(JobStatus::Error));
        let first = tracker.failure();
        tracker.apply(&update(JobStatus::Processing));

        let mut second = update(JobStatus::Error);
        second.message = Some("Quota exceeded".into());
        tracker.apply(&second);

        // The first failure's timer fires while the second is on screen.
        assert!(!tracker.clear_error(first));
        assert_eq!(tracker.phase, JobPhase::Error);
        assert_eq!(tracker.message.as_deref(), Some("Quota exceeded"));

        assert!(tracker.clear_error(tracker.failure()));
        assert_eq!(tracker.phase, JobPhase::Idle);
    }

    #[test]
    fn unknown_status_is_ignored() {
        let mut tracker = JobTracker::new("comparison");
        assert_eq!(tracker.apply(&update(JobStatus::Unknown)), JobTransition::Ignored);
        assert_eq!(tracker, JobTracker::new("comparison"));
    }

    #[test]
    fn reset_keeps_feature_only() {
        let mut tracker = JobTracker::new("comparison");
        let mut done = update(JobStatus::Completed);
        done.count = Some(3);
        tracker.apply(&done);
        tracker.reset();
        assert_eq!(tracker, JobTracker::new("comparison"));
    }

    #[test]
    fn reset_does_not_revive_stale_timers() {
        let mut tracker = JobTracker::new("comparison");
        tracker.apply(&update(JobStatus::Error));
        let stale = tracker.failure();
        tracker.reset();
        tracker.apply(&update(JobStatus::Error));
        assert!(!tracker.clear_error(stale));
    }
}
