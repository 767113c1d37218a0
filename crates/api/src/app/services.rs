use std::sync::Arc;

use tracing::{info, warn};

use smsreport_infra::catalog::{CampaignStore, InMemoryCampaignStore, PostgresCampaignStore};
use smsreport_infra::db;
use smsreport_infra::jobs::{
    InMemoryJobStore, JobStatusQuery, JobStore, PostgresJobStore, RecoverySweeper,
    ReportDispatcher, ReportWorker, WorkerPool,
};
use smsreport_infra::listing::PaginationGateway;
use smsreport_infra::report::{ArtifactWriter, OnDemandReports};
use smsreport_infra::{ServiceConfig, StoreError};

/// Connections kept beyond one per worker, for request handlers and the sweep.
const EXTRA_CONNECTIONS: u32 = 4;

/// Everything the handlers need, built once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub dispatcher: ReportDispatcher,
    pub status: JobStatusQuery,
    pub listing: PaginationGateway,
    pub on_demand: OnDemandReports,
    pub sweeper: RecoverySweeper,
}

impl AppServices {
    /// Wire the report services over the given stores.
    pub fn new(
        catalog: Arc<dyn CampaignStore>,
        jobs: Arc<dyn JobStore>,
        config: &ServiceConfig,
    ) -> Self {
        let artifacts = ArtifactWriter::new(config.reports_dir.clone());
        let worker = Arc::new(ReportWorker::new(
            jobs.clone(),
            catalog.clone(),
            artifacts.clone(),
            config.worker_config(),
        ));
        let pool = WorkerPool::named("report-workers", config.max_concurrent_workers);
        let dispatcher = ReportDispatcher::new(catalog.clone(), jobs.clone(), pool, worker);
        let sweeper = RecoverySweeper::new(jobs.clone(), dispatcher.clone(), config.lease_duration);

        Self {
            status: JobStatusQuery::new(jobs),
            listing: PaginationGateway::new(catalog.clone()),
            on_demand: OnDemandReports::new(catalog, artifacts),
            dispatcher,
            sweeper,
        }
    }

    /// Empty in-memory stores; nothing survives a restart.
    pub fn in_memory(config: &ServiceConfig) -> Self {
        Self::new(InMemoryCampaignStore::arc(), InMemoryJobStore::arc(), config)
    }

    /// Postgres-backed stores; applies the schema before returning.
    pub async fn postgres(config: &ServiceConfig, database_url: &str) -> Result<Self, StoreError> {
        let max_connections = u32::try_from(config.max_concurrent_workers)
            .unwrap_or(u32::MAX)
            .saturating_add(EXTRA_CONNECTIONS);
        let pool = db::connect(database_url, max_connections).await?;
        db::apply_schema(&pool).await?;
        info!(max_connections, "connected to postgres");

        let catalog: Arc<dyn CampaignStore> = Arc::new(PostgresCampaignStore::new(pool.clone()));
        let jobs: Arc<dyn JobStore> = Arc::new(PostgresJobStore::new(pool));
        Ok(Self::new(catalog, jobs, config))
    }

    /// Postgres when `DATABASE_URL` is configured, in-memory otherwise.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, StoreError> {
        match config.database_url.as_deref() {
            Some(url) => Self::postgres(config, url).await,
            None => {
                warn!("DATABASE_URL not set; running on empty in-memory stores");
                Ok(Self::in_memory(config))
            }
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        self.dispatcher.pool()
    }
}
