//! Report dispatcher: fans a date out into one job per campaign.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use smsreport_core::{CampaignId, JobState, ReportDate, ReportJob};

use super::pool::WorkerPool;
use super::store::JobStore;
use super::worker::{ReportWorker, WorkerOutcome};
use crate::catalog::CampaignStore;
use crate::error::ReportError;

/// One campaign of a submitted batch, with its job state after the upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchEntry {
    pub id: CampaignId,
    pub name: String,
    pub state: JobState,
}

/// Result of `submit_batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub campaigns: Vec<BatchEntry>,
    /// Jobs covered by the batch (one per campaign).
    pub total: usize,
    /// Workers scheduled by this call.
    pub scheduled: usize,
}

type JobKey = (CampaignId, ReportDate);

/// Worker tasks per job that are queued, running or waiting to retry.
#[derive(Debug, Default)]
struct ActiveWorkers(Mutex<HashMap<JobKey, usize>>);

impl ActiveWorkers {
    fn enter(self: &Arc<Self>, key: JobKey) -> ActiveGuard {
        let mut active = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *active.entry(key).or_insert(0) += 1;
        ActiveGuard {
            active: Arc::clone(self),
            key,
        }
    }

    fn contains(&self, key: &JobKey) -> bool {
        let active = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        active.contains_key(key)
    }
}

/// Held by a worker task for its whole lifetime, including when it is
/// dropped unscheduled.
struct ActiveGuard {
    active: Arc<ActiveWorkers>,
    key: JobKey,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut active = self.active.0.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(n) = active.get_mut(&self.key) {
            *n -= 1;
            if *n == 0 {
                active.remove(&self.key);
            }
        }
    }
}

/// Accepts a date, writes the job rows, schedules the workers.
#[derive(Clone)]
pub struct ReportDispatcher {
    catalog: Arc<dyn CampaignStore>,
    jobs: Arc<dyn JobStore>,
    pool: WorkerPool,
    worker: Arc<ReportWorker>,
    active: Arc<ActiveWorkers>,
}

impl ReportDispatcher {
    pub fn new(
        catalog: Arc<dyn CampaignStore>,
        jobs: Arc<dyn JobStore>,
        pool: WorkerPool,
        worker: Arc<ReportWorker>,
    ) -> Self {
        Self {
            catalog,
            jobs,
            pool,
            worker,
            active: Arc::default(),
        }
    }

    /// Create (or re-arm) one job per campaign on `date` and schedule workers.
    ///
    /// Fails with `NotFound` and writes nothing when the date has no
    /// campaigns. Rows are written in one transaction; a worker that cannot be
    /// scheduled leaves its committed job PENDING.
    #[instrument(skip(self), fields(date = %date), err)]
    pub async fn submit_batch(&self, date: ReportDate) -> Result<BatchSummary, ReportError> {
        let campaigns = self.catalog.campaigns_on(date).await?;
        if campaigns.is_empty() {
            return Err(ReportError::NotFound(format!("no campaigns on {date}")));
        }

        let jobs: Vec<ReportJob> = campaigns
            .iter()
            .map(|c| ReportJob::new(c.id, date))
            .collect();
        let outcomes = self.jobs.upsert_batch(jobs).await?;

        let mut scheduled = 0;
        let mut entries = Vec::with_capacity(campaigns.len());
        for (campaign, outcome) in campaigns.into_iter().zip(outcomes) {
            if outcome.action.needs_worker() {
                if self.schedule(campaign.id, date) {
                    scheduled += 1;
                }
            } else {
                info!(
                    campaign_id = %campaign.id,
                    state = %outcome.job.state,
                    "job already in flight; not rescheduled"
                );
            }
            entries.push(BatchEntry {
                id: campaign.id,
                name: campaign.name,
                state: outcome.job.state,
            });
        }

        info!(total = entries.len(), scheduled, "report batch submitted");
        Ok(BatchSummary {
            total: entries.len(),
            campaigns: entries,
            scheduled,
        })
    }

    /// Hand one job to the pool. Returns whether a worker was scheduled.
    pub fn schedule(&self, campaign_id: CampaignId, date: ReportDate) -> bool {
        self.spawn_worker(campaign_id, date, None)
    }

    /// Like `schedule`, but only when no worker task for the job is queued,
    /// running or waiting to retry in this process.
    pub fn schedule_if_idle(&self, campaign_id: CampaignId, date: ReportDate) -> bool {
        if self.active.contains(&(campaign_id, date)) {
            debug!(campaign_id = %campaign_id, %date, "worker already scheduled; skipping");
            return false;
        }
        self.spawn_worker(campaign_id, date, None)
    }

    fn spawn_worker(
        &self,
        campaign_id: CampaignId,
        date: ReportDate,
        delay: Option<Duration>,
    ) -> bool {
        let guard = self.active.enter((campaign_id, date));
        let dispatcher = self.clone();
        let work = async move {
            let _guard = guard;
            // The retry task registers before this one lets go of the key.
            if let WorkerOutcome::Retry(delay) = dispatcher.worker.run(campaign_id, date).await {
                dispatcher.spawn_worker(campaign_id, date, Some(delay));
            }
        };

        let scheduled = match delay {
            None => self.pool.schedule(work),
            Some(delay) => self.pool.schedule_after(delay, work),
        };
        match scheduled {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    campaign_id = %campaign_id,
                    %date,
                    error = %err,
                    "failed to schedule report worker; job stays PENDING"
                );
                false
            }
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}
