//! Recovery sweep for jobs whose worker died or never ran.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use super::dispatcher::ReportDispatcher;
use super::store::JobStore;
use crate::error::ReportError;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// IN_PROGRESS jobs with an expired lease moved back to PENDING
    pub reclaimed: usize,
    /// Workers scheduled for reclaimed or stale PENDING jobs without one
    pub rescheduled: usize,
}

/// Reclaims expired leases and reschedules orphaned jobs.
///
/// A PENDING job is considered orphaned once it has not been touched for a
/// full lease duration. Jobs that still have a worker task in this process
/// (queued behind the pool, running, or backing off) are never rescheduled,
/// so the pool's queue does not grow with each sweep.
#[derive(Clone)]
pub struct RecoverySweeper {
    jobs: Arc<dyn JobStore>,
    dispatcher: ReportDispatcher,
    stale_after: chrono::Duration,
}

impl RecoverySweeper {
    pub fn new(jobs: Arc<dyn JobStore>, dispatcher: ReportDispatcher, stale_after: Duration) -> Self {
        Self {
            jobs,
            dispatcher,
            stale_after: chrono::Duration::from_std(stale_after)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, ReportError> {
        let reclaimed = self.jobs.reclaim_expired(now).await?;
        let stale = self.jobs.stale_pending(now - self.stale_after).await?;

        let mut report = SweepReport {
            reclaimed: reclaimed.len(),
            rescheduled: 0,
        };
        for job in reclaimed.iter().chain(stale.iter()) {
            debug!(job_id = %job.id, campaign_id = %job.campaign_id, "rescheduling job");
            if self.dispatcher.schedule_if_idle(job.campaign_id, job.date) {
                report.rescheduled += 1;
            }
        }

        if report.reclaimed > 0 || report.rescheduled > 0 {
            info!(
                reclaimed = report.reclaimed,
                rescheduled = report.rescheduled,
                "recovery sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweep every `every` until the returned handle is aborted.
    pub fn spawn_interval(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = self.sweep(Utc::now()).await {
                    error!(error = %err, "recovery sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCampaignStore;
    use crate::jobs::pool::WorkerPool;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::worker::{ReportWorker, WorkerConfig};
    use crate::report::ArtifactWriter;
    use smsreport_core::{JobState, ReportDate, ReportJob, RetryPolicy};

    fn date() -> ReportDate {
        ReportDate::from_ymd(2025, 1, 10).unwrap()
    }

    fn setup(dir: &std::path::Path) -> (Arc<InMemoryCampaignStore>, Arc<InMemoryJobStore>, RecoverySweeper) {
        setup_with_pool(dir, WorkerPool::new(2))
    }

    fn setup_with_pool(
        dir: &std::path::Path,
        pool: WorkerPool,
    ) -> (Arc<InMemoryCampaignStore>, Arc<InMemoryJobStore>, RecoverySweeper) {
        let catalog = InMemoryCampaignStore::arc();
        let jobs = InMemoryJobStore::arc();
        let worker = Arc::new(ReportWorker::new(
            jobs.clone(),
            catalog.clone(),
            ArtifactWriter::new(dir),
            WorkerConfig::default().with_retry_policy(RetryPolicy::no_retry()),
        ));
        let dispatcher = ReportDispatcher::new(catalog.clone(), jobs.clone(), pool, worker);
        let sweeper = RecoverySweeper::new(jobs.clone(), dispatcher, Duration::from_secs(60));
        (catalog, jobs, sweeper)
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimed_then_completed() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog, jobs, sweeper) = setup(dir.path());
        let c1 = catalog.add_campaign(date(), "C1", "ACTIVE").unwrap();
        jobs.upsert_batch(vec![ReportJob::new(c1.id, date())])
            .await
            .unwrap();

        // A worker that claimed the job and then vanished.
        let now = Utc::now();
        let mut crashed = jobs.find(c1.id, date()).await.unwrap().unwrap();
        crashed.start(now - chrono::Duration::seconds(5)).unwrap();
        jobs.update(&crashed, 0).await.unwrap();

        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report, SweepReport { reclaimed: 1, rescheduled: 1 });

        sweeper.dispatcher.pool().wait_idle().await;
        let job = jobs.find(c1.id, date()).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.artifact_path.is_some());
    }

    #[tokio::test]
    async fn live_leases_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog, jobs, sweeper) = setup(dir.path());
        let c1 = catalog.add_campaign(date(), "C1", "ACTIVE").unwrap();
        jobs.upsert_batch(vec![ReportJob::new(c1.id, date())])
            .await
            .unwrap();

        let now = Utc::now();
        let mut running = jobs.find(c1.id, date()).await.unwrap().unwrap();
        running.start(now + chrono::Duration::seconds(30)).unwrap();
        jobs.update(&running, 0).await.unwrap();

        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report, SweepReport::default());
        let job = jobs.find(c1.id, date()).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::InProgress);
    }

    #[tokio::test]
    async fn orphaned_pending_jobs_get_a_worker() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog, jobs, sweeper) = setup(dir.path());
        let c1 = catalog.add_campaign(date(), "C1", "ACTIVE").unwrap();
        jobs.upsert_batch(vec![ReportJob::new(c1.id, date())])
            .await
            .unwrap();

        // Pretend the job was committed long ago and its worker never ran.
        let later = Utc::now() + chrono::Duration::seconds(120);
        let report = sweeper.sweep(later).await.unwrap();
        assert_eq!(report, SweepReport { reclaimed: 0, rescheduled: 1 });

        sweeper.dispatcher.pool().wait_idle().await;
        let job = jobs.find(c1.id, date()).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
    }

    #[tokio::test]
    async fn repeated_sweeps_do_not_grow_a_saturated_queue() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog, jobs, sweeper) = setup_with_pool(dir.path(), WorkerPool::new(1));
        for i in 0..3 {
            catalog.add_campaign(date(), format!("C{i}"), "ACTIVE").unwrap();
        }

        // Occupy the only slot so every report worker stays queued.
        let pool = sweeper.dispatcher.pool().clone();
        let (release, hold) = tokio::sync::oneshot::channel::<()>();
        pool.schedule(async move {
            let _ = hold.await;
        })
        .unwrap();

        sweeper.dispatcher.submit_batch(date()).await.unwrap();
        assert_eq!(pool.in_flight(), 4);

        for step in 1..=4 {
            let later = Utc::now() + chrono::Duration::seconds(90 * step);
            let report = sweeper.sweep(later).await.unwrap();
            assert_eq!(report, SweepReport::default(), "sweep {step}");
            assert_eq!(pool.in_flight(), 4, "sweep {step}");
        }

        release.send(()).unwrap();
        pool.wait_idle().await;
        let stored = jobs.all().unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|j| j.state == JobState::Completed));
    }
}
