//! Report worker: drives one job from PENDING to a terminal state.
//!
//! Every transition is persisted with a compare-and-set on the job version.
//! A conflict means another actor (the recovery sweep, or a duplicate worker)
//! owns the job now, and this worker stops without touching it again.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use smsreport_core::{
    CampaignId, DeliveryCounts, DomainResult, JobState, ReportDate, ReportJob, RetryPolicy,
};

use super::store::JobStore;
use crate::catalog::CampaignStore;
use crate::db::StoreError;
use crate::error::ReportError;
use crate::report::{ArtifactWriter, ReportKind, SummaryRow};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bounded retry budget and backoff
    pub retry_policy: RetryPolicy,
    /// How long an IN_PROGRESS job stays owned without a heartbeat
    pub lease_duration: Duration,
    /// Lease refresh period; must be shorter than `lease_duration`
    pub heartbeat_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            lease_duration: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(20),
        }
    }
}

impl WorkerConfig {
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = lease;
        self
    }

    pub fn with_heartbeat_interval(mut self, every: Duration) -> Self {
        self.heartbeat_interval = every;
        self
    }
}

/// How a worker run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Artifact written, job COMPLETED
    Completed(PathBuf),
    /// Attempt failed, job back to PENDING; run again after the delay
    Retry(Duration),
    /// Retry budget spent, job ERROR
    Failed,
    /// No job row for the (campaign, date) pair
    Missing,
    /// The job was not PENDING when the worker looked at it
    NotPending(JobState),
    /// Ownership lost or a state write failed; the job is left for the sweep
    Abandoned,
}

/// Reason a persisted transition did not happen.
#[derive(Debug)]
enum Interrupt {
    Transition(smsreport_core::DomainError),
    Store(StoreError),
}

impl std::fmt::Display for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interrupt::Transition(e) => write!(f, "{e}"),
            Interrupt::Store(e) => write!(f, "{e}"),
        }
    }
}

/// Generates the summary artifact for one job.
pub struct ReportWorker {
    jobs: Arc<dyn JobStore>,
    catalog: Arc<dyn CampaignStore>,
    artifacts: ArtifactWriter,
    config: WorkerConfig,
}

impl ReportWorker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn CampaignStore>,
        artifacts: ArtifactWriter,
        config: WorkerConfig,
    ) -> Self {
        Self {
            jobs,
            catalog,
            artifacts,
            config,
        }
    }

    /// Make one attempt at the job for `(campaign_id, date)`.
    ///
    /// Never returns an error: failures end up in the job row (or, if even
    /// that write fails, in the log and the lease sweep). A failed attempt
    /// with budget left requeues the job and returns `Retry`; the caller
    /// decides when to run it again, so no pool slot is held while backing
    /// off.
    #[instrument(skip(self), fields(campaign_id = %campaign_id, date = %date))]
    pub async fn run(&self, campaign_id: CampaignId, date: ReportDate) -> WorkerOutcome {
        let mut job = match self.jobs.find(campaign_id, date).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                debug!("no job row; nothing to do");
                return WorkerOutcome::Missing;
            }
            Err(err) => {
                warn!(error = %err, "failed to load job");
                return WorkerOutcome::Abandoned;
            }
        };

        if job.state != JobState::Pending {
            debug!(job_id = %job.id, state = %job.state, "job is not pending; skipping");
            return WorkerOutcome::NotPending(job.state);
        }

        let lease_until = Utc::now() + self.lease();
        if let Err(err) = self.persist(&mut job, |j| j.start(lease_until)).await {
            warn!(job_id = %job.id, error = %err, "could not claim job");
            return WorkerOutcome::Abandoned;
        }
        debug!(job_id = %job.id, attempt = job.retry_count + 1, "job in progress");

        let generated = match self.generate_with_heartbeat(&mut job).await {
            Ok(result) => result,
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "lost job ownership during generation");
                return WorkerOutcome::Abandoned;
            }
        };

        match generated {
            Ok(path) => {
                let artifact = path.to_string_lossy().into_owned();
                if let Err(err) = self.persist(&mut job, |j| j.complete(artifact)).await {
                    error!(job_id = %job.id, error = %err, "failed to persist COMPLETED");
                    discard_artifact(&path);
                    return WorkerOutcome::Abandoned;
                }
                info!(job_id = %job.id, path = %path.display(), "report job completed");
                WorkerOutcome::Completed(path)
            }
            Err(cause) if self.config.retry_policy.should_retry(job.retry_count) => {
                let message = cause.to_string();
                if let Err(err) = self.persist(&mut job, |j| j.requeue_for_retry(message)).await {
                    error!(job_id = %job.id, error = %err, "failed to persist retry");
                    return WorkerOutcome::Abandoned;
                }
                let delay = self.config.retry_policy.delay_for_retry(job.retry_count);
                warn!(
                    job_id = %job.id,
                    error = %cause,
                    retry = job.retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "report generation failed; retrying"
                );
                WorkerOutcome::Retry(delay)
            }
            Err(cause) => {
                let message = cause.to_string();
                if let Err(err) = self.persist(&mut job, |j| j.fail(message)).await {
                    error!(job_id = %job.id, error = %err, "failed to persist ERROR");
                    return WorkerOutcome::Abandoned;
                }
                warn!(
                    job_id = %job.id,
                    error = %cause,
                    retries = job.retry_count,
                    "report job failed"
                );
                WorkerOutcome::Failed
            }
        }
    }

    fn lease(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.lease_duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(60))
    }

    /// Apply `transition` to a copy of `job` and write it back; `job` only
    /// changes if the write succeeded.
    async fn persist<F>(&self, job: &mut ReportJob, transition: F) -> Result<(), Interrupt>
    where
        F: FnOnce(&mut ReportJob) -> DomainResult<()>,
    {
        let mut next = job.clone();
        transition(&mut next).map_err(Interrupt::Transition)?;
        self.jobs
            .update(&next, job.version)
            .await
            .map_err(Interrupt::Store)?;
        *job = next;
        Ok(())
    }

    /// Generate the artifact while refreshing the lease.
    ///
    /// The outer error means ownership was lost; the inner result is the
    /// generation outcome.
    async fn generate_with_heartbeat(
        &self,
        job: &mut ReportJob,
    ) -> Result<Result<PathBuf, ReportError>, Interrupt> {
        let generation = self.generate(job.campaign_id, job.date);
        tokio::pin!(generation);

        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                result = &mut generation => return Ok(result),
                _ = ticker.tick() => {
                    let lease_until = Utc::now() + self.lease();
                    match self.persist(job, |j| j.heartbeat(lease_until)).await {
                        Ok(()) => debug!(job_id = %job.id, "lease extended"),
                        Err(Interrupt::Store(StoreError::Storage(msg))) => {
                            warn!(job_id = %job.id, error = %msg, "heartbeat write failed");
                        }
                        Err(other) => {
                            // The blocking write is already under way; let it
                            // finish so its file can be removed.
                            if let Ok(path) = (&mut generation).await {
                                discard_artifact(&path);
                            }
                            return Err(other);
                        }
                    }
                }
            }
        }
    }

    /// Aggregate the campaign's details and write the one-row summary.
    async fn generate(
        &self,
        campaign_id: CampaignId,
        date: ReportDate,
    ) -> Result<PathBuf, ReportError> {
        let campaign = self
            .catalog
            .get(campaign_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("campaign {campaign_id}")))?;
        let details = self.catalog.details_for(campaign_id).await?;
        let counts = DeliveryCounts::from_details(&details);
        debug!(
            %date,
            total = counts.total(),
            sent = counts.sent(),
            pending = counts.pending(),
            failed = counts.failed(),
            "details aggregated"
        );

        let row = SummaryRow::new(&campaign, counts);
        let artifacts = self.artifacts.clone();
        let subject = campaign_id.to_string();
        let path = tokio::task::spawn_blocking(move || {
            artifacts.write_summary(ReportKind::Summary, &subject, &[row])
        })
        .await??;
        Ok(path)
    }
}

/// Remove an artifact no job row will ever point at.
fn discard_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "orphaned artifact removed"),
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove orphaned artifact"),
    }
}
