//! Postgres-backed report job store.
//!
//! ## Concurrency
//!
//! - `upsert_batch` runs in one transaction and relies on the unique key
//!   `(campaign_id, report_date)`: `ON CONFLICT ... DO UPDATE ... WHERE` only
//!   resets terminal rows, so a PENDING or IN_PROGRESS row is never handed to
//!   a second worker.
//! - `update` is a compare-and-set on `version`; zero affected rows means the
//!   caller lost ownership (or the row is gone).
//! - `reclaim_expired` is a single guarded `UPDATE`, so a job whose worker
//!   heartbeated in the meantime is not stolen.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use tracing::{Span, debug, instrument};
use uuid::Uuid;

use smsreport_core::{CampaignId, JobId, JobState, ReportDate, ReportJob};

use super::store::{JobStore, UpsertAction, UpsertOutcome};
use crate::db::{StoreError, map_sqlx_error};

/// Postgres report job store (table `report_jobs`).
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, jobs), fields(batch_size = jobs.len(), inserted = tracing::field::Empty), err)]
    async fn upsert_batch(&self, jobs: Vec<ReportJob>) -> Result<Vec<UpsertOutcome>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("upsert_batch_begin", e))?;

        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            let upserted = sqlx::query(
                r#"
                INSERT INTO report_jobs (
                    id, campaign_id, report_date, state, retry_count,
                    artifact_path, last_error, lease_expires_at, version,
                    created_at, updated_at
                )
                VALUES ($1, $2, $3, 'PENDING', 0, NULL, NULL, NULL, 0, $4, $4)
                ON CONFLICT (campaign_id, report_date) DO UPDATE
                SET state = 'PENDING',
                    retry_count = 0,
                    artifact_path = NULL,
                    last_error = NULL,
                    lease_expires_at = NULL,
                    version = report_jobs.version + 1,
                    updated_at = EXCLUDED.updated_at
                WHERE report_jobs.state IN ('COMPLETED', 'ERROR')
                RETURNING
                    id, campaign_id, report_date, state, retry_count,
                    artifact_path, last_error, lease_expires_at, version,
                    created_at, updated_at,
                    (xmax = 0) AS inserted
                "#,
            )
            .bind(job.id.as_uuid())
            .bind(job.campaign_id.get())
            .bind(job.date.as_naive())
            .bind(job.created_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_batch_insert", e))?;

            let outcome = match upserted {
                Some(row) => {
                    let inserted: bool = row
                        .try_get("inserted")
                        .map_err(|e| map_sqlx_error("upsert_batch_decode", e))?;
                    let stored = job_from_row(&row)?;
                    UpsertOutcome {
                        job: stored,
                        action: if inserted {
                            UpsertAction::Inserted
                        } else {
                            UpsertAction::Reset
                        },
                    }
                }
                None => {
                    let row = sqlx::query(
                        r#"
                        SELECT
                            id, campaign_id, report_date, state, retry_count,
                            artifact_path, last_error, lease_expires_at, version,
                            created_at, updated_at
                        FROM report_jobs
                        WHERE campaign_id = $1 AND report_date = $2
                        "#,
                    )
                    .bind(job.campaign_id.get())
                    .bind(job.date.as_naive())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("upsert_batch_select_existing", e))?;

                    UpsertOutcome {
                        job: job_from_row(&row)?,
                        action: UpsertAction::InFlight,
                    }
                }
            };
            debug!(
                job_id = %outcome.job.id,
                campaign_id = %outcome.job.campaign_id,
                action = ?outcome.action,
                "job row upserted"
            );
            outcomes.push(outcome);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("upsert_batch_commit", e))?;

        let inserted = outcomes
            .iter()
            .filter(|o| o.action == UpsertAction::Inserted)
            .count();
        Span::current().record("inserted", inserted as u64);

        Ok(outcomes)
    }

    #[instrument(skip(self), fields(campaign_id = %campaign_id, date = %date), err)]
    async fn find(
        &self,
        campaign_id: CampaignId,
        date: ReportDate,
    ) -> Result<Option<ReportJob>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                id, campaign_id, report_date, state, retry_count,
                artifact_path, last_error, lease_expires_at, version,
                created_at, updated_at
            FROM report_jobs
            WHERE campaign_id = $1 AND report_date = $2
            "#,
        )
        .bind(campaign_id.get())
        .bind(date.as_naive())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_job", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(
        skip(self, job),
        fields(job_id = %job.id, state = %job.state),
        err
    )]
    async fn update(&self, job: &ReportJob, expected_version: u64) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE report_jobs
            SET state = $3,
                retry_count = $4,
                artifact_path = $5,
                last_error = $6,
                lease_expires_at = $7,
                version = $8,
                updated_at = $9
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(to_db_version(expected_version)?)
        .bind(job.state.as_str())
        .bind(i32::try_from(job.retry_count).map_err(|_| {
            StoreError::Storage(format!("retry_count {} out of range", job.retry_count))
        })?)
        .bind(job.artifact_path.as_deref())
        .bind(job.last_error.as_deref())
        .bind(job.lease_expires_at)
        .bind(to_db_version(job.version)?)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_job", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current: Option<i64> =
            sqlx::query_scalar(r#"SELECT version FROM report_jobs WHERE id = $1"#)
                .bind(job.id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("update_job_version_check", e))?;

        match current {
            None => Err(StoreError::NotFound(format!("job {}", job.id))),
            Some(found) => Err(StoreError::Conflict(format!(
                "job {}: expected version {}, found {}",
                job.id, expected_version, found
            ))),
        }
    }

    #[instrument(skip(self), fields(campaign_id = %campaign_id), err)]
    async fn latest_for_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Option<ReportJob>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                id, campaign_id, report_date, state, retry_count,
                artifact_path, last_error, lease_expires_at, version,
                created_at, updated_at
            FROM report_jobs
            WHERE campaign_id = $1
            ORDER BY updated_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(campaign_id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_for_campaign", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self), fields(reclaimed = tracing::field::Empty), err)]
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<ReportJob>, StoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE report_jobs
            SET state = 'PENDING',
                lease_expires_at = NULL,
                last_error = 'lease expired',
                version = version + 1,
                updated_at = $1
            WHERE state = 'IN_PROGRESS'
              AND (lease_expires_at IS NULL OR lease_expires_at < $1)
            RETURNING
                id, campaign_id, report_date, state, retry_count,
                artifact_path, last_error, lease_expires_at, version,
                created_at, updated_at
            "#,
        )
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("reclaim_expired", e))?;

        Span::current().record("reclaimed", rows.len() as u64);

        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn stale_pending(
        &self,
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<ReportJob>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id, campaign_id, report_date, state, retry_count,
                artifact_path, last_error, lease_expires_at, version,
                created_at, updated_at
            FROM report_jobs
            WHERE state = 'PENDING' AND updated_at < $1
            ORDER BY updated_at ASC
            "#,
        )
        .bind(updated_before)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stale_pending", e))?;

        rows.iter().map(job_from_row).collect()
    }
}

fn to_db_version(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Storage(format!("version {version} out of range")))
}

/// Decode a `report_jobs` row.
fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<ReportJob, StoreError> {
    let decode = |e| map_sqlx_error("decode_job", e);

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let campaign_id: i64 = row.try_get("campaign_id").map_err(decode)?;
    let report_date: NaiveDate = row.try_get("report_date").map_err(decode)?;
    let state: String = row.try_get("state").map_err(decode)?;
    let retry_count: i32 = row.try_get("retry_count").map_err(decode)?;
    let version: i64 = row.try_get("version").map_err(decode)?;

    let state = state
        .parse::<JobState>()
        .map_err(|e| StoreError::Decode(format!("job {id}: {e}")))?;

    Ok(ReportJob {
        id: JobId::from_uuid(id),
        campaign_id: CampaignId::new(campaign_id),
        date: ReportDate::from(report_date),
        state,
        retry_count: u32::try_from(retry_count)
            .map_err(|_| StoreError::Decode(format!("job {id}: negative retry_count")))?,
        artifact_path: row.try_get("artifact_path").map_err(decode)?,
        last_error: row.try_get("last_error").map_err(decode)?,
        lease_expires_at: row.try_get("lease_expires_at").map_err(decode)?,
        version: u64::try_from(version)
            .map_err(|_| StoreError::Decode(format!("job {id}: negative version")))?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_beyond_i64_are_rejected() {
        assert_eq!(to_db_version(3).unwrap(), 3);
        assert!(matches!(
            to_db_version(u64::MAX),
            Err(StoreError::Storage(_))
        ));
    }
}
