//! Report job storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use smsreport_core::{CampaignId, JobState, ReportDate, ReportJob};

use crate::db::StoreError;

/// What the batch upsert did with one (campaign, date) key.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UpsertAction {
    /// No row existed; the submitted job was inserted.
    Inserted,
    /// A terminal row was reset to PENDING for a fresh attempt.
    Reset,
    /// A PENDING or IN_PROGRESS row already exists and was left alone.
    InFlight,
}

impl UpsertAction {
    /// Whether this call owns the row and must schedule a worker for it.
    pub fn needs_worker(&self) -> bool {
        matches!(self, UpsertAction::Inserted | UpsertAction::Reset)
    }
}

/// Row state after the upsert plus what happened to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub job: ReportJob,
    pub action: UpsertAction,
}

/// Report job store abstraction.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Insert-or-reuse one row per `(campaign_id, date)`, all or nothing.
    ///
    /// Outcomes are returned in input order.
    async fn upsert_batch(&self, jobs: Vec<ReportJob>) -> Result<Vec<UpsertOutcome>, StoreError>;

    /// Get the job for a (campaign, date) pair.
    async fn find(
        &self,
        campaign_id: CampaignId,
        date: ReportDate,
    ) -> Result<Option<ReportJob>, StoreError>;

    /// Persist `job` if the stored row is still at `expected_version`.
    ///
    /// A version mismatch means another actor moved the job in the meantime
    /// and yields `StoreError::Conflict`.
    async fn update(&self, job: &ReportJob, expected_version: u64) -> Result<(), StoreError>;

    /// Most recently updated job of a campaign, across all dates.
    async fn latest_for_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Option<ReportJob>, StoreError>;

    /// Move every IN_PROGRESS job whose lease ended before `now` back to
    /// PENDING and return the reclaimed rows.
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<ReportJob>, StoreError>;

    /// PENDING jobs untouched since `updated_before`; candidates for a fresh
    /// worker when the one scheduled for them never ran.
    async fn stale_pending(
        &self,
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<ReportJob>, StoreError>;
}

type JobKey = (CampaignId, ReportDate);

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobKey, ReportJob>>,
}

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Every stored job, in no particular order.
    pub fn all(&self) -> Result<Vec<ReportJob>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl JobStore for InMemoryJobStore {
    async fn upsert_batch(&self, jobs: Vec<ReportJob>) -> Result<Vec<UpsertOutcome>, StoreError> {
        let mut stored = self.jobs.write().map_err(|_| poisoned())?;

        // Stage against a copy so a failure leaves the store untouched.
        let mut staged = stored.clone();
        let mut outcomes = Vec::with_capacity(jobs.len());

        for job in jobs {
            let key = (job.campaign_id, job.date);
            let outcome = match staged.get(&key) {
                None => UpsertOutcome {
                    job: job.clone(),
                    action: UpsertAction::Inserted,
                },
                Some(existing) if existing.state.is_terminal() => {
                    let mut reset = existing.clone();
                    reset
                        .reset_for_regeneration()
                        .map_err(|e| StoreError::Conflict(e.to_string()))?;
                    UpsertOutcome {
                        job: reset,
                        action: UpsertAction::Reset,
                    }
                }
                Some(existing) => UpsertOutcome {
                    job: existing.clone(),
                    action: UpsertAction::InFlight,
                },
            };
            if outcome.action.needs_worker() {
                staged.insert(key, outcome.job.clone());
            }
            outcomes.push(outcome);
        }

        *stored = staged;
        Ok(outcomes)
    }

    async fn find(
        &self,
        campaign_id: CampaignId,
        date: ReportDate,
    ) -> Result<Option<ReportJob>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.get(&(campaign_id, date)).cloned())
    }

    async fn update(&self, job: &ReportJob, expected_version: u64) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let Some(current) = jobs.get_mut(&(job.campaign_id, job.date)) else {
            return Err(StoreError::NotFound(format!("job {}", job.id)));
        };
        if current.id != job.id {
            return Err(StoreError::NotFound(format!("job {}", job.id)));
        }
        if current.version != expected_version {
            return Err(StoreError::Conflict(format!(
                "job {}: expected version {}, found {}",
                job.id, expected_version, current.version
            )));
        }
        *current = job.clone();
        Ok(())
    }

    async fn latest_for_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Option<ReportJob>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs
            .values()
            .filter(|j| j.campaign_id == campaign_id)
            .max_by_key(|j| (j.updated_at, *j.id.as_uuid()))
            .cloned())
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<ReportJob>, StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let mut reclaimed = Vec::new();
        for job in jobs.values_mut() {
            if job.lease_expired(now) {
                job.reclaim(now)
                    .map_err(|e| StoreError::Conflict(e.to_string()))?;
                reclaimed.push(job.clone());
            }
        }
        Ok(reclaimed)
    }

    async fn stale_pending(
        &self,
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<ReportJob>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs
            .values()
            .filter(|j| j.state == JobState::Pending && j.updated_at < updated_before)
            .cloned()
            .collect())
    }
}
