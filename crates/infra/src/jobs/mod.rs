//! Report jobs: storage, bounded worker pool, dispatch, recovery, status.
//!
//! ## Design
//!
//! - One job row per (campaign, date); re-triggering re-arms terminal rows
//! - Workers run on a semaphore-bounded pool of tokio tasks
//! - Transitions are compare-and-set on the job version
//! - Failed attempts retry with backoff until the budget is spent
//! - IN_PROGRESS jobs hold a lease; the sweep reclaims expired ones
//!
//! ## Components
//!
//! - `JobStore`: persistence for jobs (in-memory or Postgres)
//! - `WorkerPool`: bounded task runner
//! - `ReportWorker`: drives one job through its state machine
//! - `ReportDispatcher`: `submit_batch` fan-out
//! - `RecoverySweeper`: lease reclaim + rescheduling
//! - `JobStatusQuery`: caller-facing status view

pub mod dispatcher;
pub mod pool;
pub mod postgres;
pub mod status;
pub mod store;
pub mod sweeper;
pub mod worker;

pub use dispatcher::{BatchEntry, BatchSummary, ReportDispatcher};
pub use pool::{ScheduleError, WorkerPool};
pub use postgres::PostgresJobStore;
pub use status::{JobStatusQuery, JobStatusView};
pub use store::{InMemoryJobStore, JobStore, UpsertAction, UpsertOutcome};
pub use sweeper::{RecoverySweeper, SweepReport};
pub use worker::{ReportWorker, WorkerConfig, WorkerOutcome};
