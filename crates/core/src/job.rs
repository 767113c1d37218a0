//! Report job record and its state machine.
//!
//! ```text
//!            start            complete
//! PENDING ─────────► IN_PROGRESS ─────────► COMPLETED
//!    ▲                 │    │                   │
//!    │ requeue/reclaim │    │ fail              │
//!    └─────────────────┘    ▼                   │
//!    ▲                    ERROR                 │
//!    │  reset_for_regeneration │                │
//!    └─────────────────────────┴────────────────┘
//! ```
//!
//! Only the dispatcher creates jobs and only a worker (or the recovery sweep)
//! moves them. A terminal job leaves its state only through an explicit reset
//! when the same date is triggered again.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::date::ReportDate;
use crate::error::{DomainError, DomainResult};
use crate::id::{CampaignId, JobId};

/// Report job state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Created, waiting for a worker
    Pending,
    /// A worker holds the job
    InProgress,
    /// Artifact written
    Completed,
    /// Generation failed and the retry budget is spent
    Error,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::InProgress => "IN_PROGRESS",
            JobState::Completed => "COMPLETED",
            JobState::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }
}

impl core::fmt::Display for JobState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "ERROR" => Ok(Self::Error),
            other => Err(DomainError::validation(format!("unknown job state '{other}'"))),
        }
    }
}

/// One report-generation record for a (campaign, date) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportJob {
    pub id: JobId,
    pub campaign_id: CampaignId,
    pub date: ReportDate,
    pub state: JobState,
    /// Retries consumed so far (the first attempt is not a retry).
    pub retry_count: u32,
    /// Set only while `state == Completed`.
    pub artifact_path: Option<String>,
    /// Message of the most recent failed attempt.
    pub last_error: Option<String>,
    /// Set only while `state == InProgress`.
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Bumped on every transition; stores use it for optimistic concurrency.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportJob {
    /// Create a new PENDING job.
    pub fn new(campaign_id: CampaignId, date: ReportDate) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            campaign_id,
            date,
            state: JobState::Pending,
            retry_count: 0,
            artifact_path: None,
            last_error: None,
            lease_expires_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, allowed: &[JobState], to: JobState) -> DomainResult<()> {
        if !allowed.contains(&self.state) {
            return Err(DomainError::InvalidTransition {
                from: self.state.as_str(),
                to: to.as_str(),
            });
        }
        self.state = to;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// PENDING -> IN_PROGRESS, taking a lease until `lease_until`.
    pub fn start(&mut self, lease_until: DateTime<Utc>) -> DomainResult<()> {
        self.transition(&[JobState::Pending], JobState::InProgress)?;
        self.lease_expires_at = Some(lease_until);
        Ok(())
    }

    /// Extend the lease of a running job.
    pub fn heartbeat(&mut self, lease_until: DateTime<Utc>) -> DomainResult<()> {
        self.transition(&[JobState::InProgress], JobState::InProgress)?;
        self.lease_expires_at = Some(lease_until);
        Ok(())
    }

    /// IN_PROGRESS -> COMPLETED.
    pub fn complete(&mut self, artifact_path: impl Into<String>) -> DomainResult<()> {
        self.transition(&[JobState::InProgress], JobState::Completed)?;
        self.artifact_path = Some(artifact_path.into());
        self.lease_expires_at = None;
        self.last_error = None;
        Ok(())
    }

    /// IN_PROGRESS -> ERROR.
    pub fn fail(&mut self, error: impl Into<String>) -> DomainResult<()> {
        self.transition(&[JobState::InProgress], JobState::Error)?;
        self.artifact_path = None;
        self.lease_expires_at = None;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// IN_PROGRESS -> PENDING after a failed attempt, consuming one retry.
    pub fn requeue_for_retry(&mut self, error: impl Into<String>) -> DomainResult<()> {
        self.transition(&[JobState::InProgress], JobState::Pending)?;
        self.retry_count += 1;
        self.lease_expires_at = None;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// COMPLETED | ERROR -> PENDING when the same date is triggered again.
    pub fn reset_for_regeneration(&mut self) -> DomainResult<()> {
        self.transition(&[JobState::Completed, JobState::Error], JobState::Pending)?;
        self.retry_count = 0;
        self.artifact_path = None;
        self.last_error = None;
        self.lease_expires_at = None;
        Ok(())
    }

    /// IN_PROGRESS with an expired lease -> PENDING.
    pub fn reclaim(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.lease_expired(now) {
            return Err(DomainError::conflict(format!(
                "job {} still holds a live lease",
                self.id
            )));
        }
        self.transition(&[JobState::InProgress], JobState::Pending)?;
        self.lease_expires_at = None;
        self.last_error = Some("lease expired".to_string());
        Ok(())
    }

    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::InProgress
            && self.lease_expires_at.map_or(true, |until| until < now)
    }

    /// Artifact location as shown to callers: hidden unless the job completed.
    pub fn visible_artifact(&self) -> Option<&str> {
        match self.state {
            JobState::Completed => self.artifact_path.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job() -> ReportJob {
        ReportJob::new(CampaignId::new(1), ReportDate::from_ymd(2025, 1, 10).unwrap())
    }

    #[test]
    fn job_lifecycle_success() {
        let mut job = job();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.retry_count, 0);

        job.start(Utc::now() + Duration::seconds(60)).unwrap();
        assert_eq!(job.state, JobState::InProgress);
        assert_eq!(job.version, 1);
        assert!(job.lease_expires_at.is_some());
        assert_eq!(job.visible_artifact(), None);

        job.complete("reports/summary_1.csv").unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.version, 2);
        assert_eq!(job.visible_artifact(), Some("reports/summary_1.csv"));
        assert!(job.lease_expires_at.is_none());
    }

    #[test]
    fn job_failure_hides_artifact() {
        let mut job = job();
        job.start(Utc::now()).unwrap();
        job.fail("disk full").unwrap();

        assert_eq!(job.state, JobState::Error);
        assert_eq!(job.artifact_path, None);
        assert_eq!(job.visible_artifact(), None);
        assert_eq!(job.last_error.as_deref(), Some("disk full"));
    }

    #[test]
    fn cannot_complete_without_starting() {
        let mut job = job();
        let err = job.complete("x.csv").unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: "PENDING",
                to: "COMPLETED"
            }
        );
    }

    #[test]
    fn terminal_states_are_sticky_except_reset() {
        let mut job = job();
        job.start(Utc::now()).unwrap();
        job.complete("a.csv").unwrap();

        assert!(job.start(Utc::now()).is_err());
        assert!(job.fail("late").is_err());

        job.reset_for_regeneration().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.artifact_path, None);
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn reset_is_rejected_for_in_flight_jobs() {
        let mut job = job();
        assert!(job.reset_for_regeneration().is_err());
        job.start(Utc::now()).unwrap();
        assert!(job.reset_for_regeneration().is_err());
    }

    #[test]
    fn requeue_consumes_a_retry() {
        let mut job = job();
        job.start(Utc::now()).unwrap();
        job.requeue_for_retry("boom").unwrap();

        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.retry_count, 1);
        assert!(job.lease_expires_at.is_none());
    }

    #[test]
    fn reclaim_requires_expired_lease() {
        let now = Utc::now();
        let mut job = job();
        job.start(now + Duration::seconds(30)).unwrap();

        assert!(job.reclaim(now).is_err());
        assert_eq!(job.state, JobState::InProgress);

        job.reclaim(now + Duration::seconds(31)).unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.last_error.as_deref(), Some("lease expired"));
    }

    #[test]
    fn job_state_labels_round_trip() {
        for s in [
            JobState::Pending,
            JobState::InProgress,
            JobState::Completed,
            JobState::Error,
        ] {
            assert_eq!(s.as_str().parse::<JobState>().unwrap(), s);
        }
        assert_eq!(
            serde_json::to_string(&JobState::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
    }
}
