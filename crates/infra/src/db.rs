//! Database adapters: connection pool, schema, SQLx error mapping.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate `(campaign_id, report_date)` job row |
//! | Database (foreign key violation) | `23503` | `Conflict` | Detail referencing a missing campaign |
//! | Database (check constraint violation) | `23514` | `Decode` | Unknown job state written |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed | N/A | `Storage` | Connection pool was closed |
//! | RowNotFound | N/A | `NotFound` | `fetch_one` on a missing row |
//! | ColumnDecode | N/A | `Decode` | Row shape does not match the model |
//! | Other | N/A | `Storage` | Network errors, connection failures, etc. |

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// Storage operation error, shared by the in-memory and Postgres stores.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Tables, indexes and the storage-side paging function.
///
/// `list_campaigns_page` returns the page's campaign rows, each carrying the
/// total match count and page count of the whole result set. When the page is
/// past the end of a non-empty result set it returns a single totals-only row
/// (campaign columns NULL); an empty result set returns no rows at all.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS campaigns (
    id            BIGSERIAL PRIMARY KEY,
    campaign_date DATE NOT NULL,
    name          TEXT NOT NULL,
    state         TEXT NOT NULL,
    description   TEXT
);

CREATE INDEX IF NOT EXISTS idx_campaigns_date ON campaigns (campaign_date, id);

CREATE TABLE IF NOT EXISTS message_details (
    id             BIGSERIAL PRIMARY KEY,
    campaign_id    BIGINT NOT NULL REFERENCES campaigns (id) ON DELETE CASCADE,
    message_text   TEXT NOT NULL,
    delivery_state TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_message_details_campaign ON message_details (campaign_id);

CREATE TABLE IF NOT EXISTS report_jobs (
    id               UUID PRIMARY KEY,
    campaign_id      BIGINT NOT NULL,
    report_date      DATE NOT NULL,
    state            TEXT NOT NULL
                     CHECK (state IN ('PENDING', 'IN_PROGRESS', 'COMPLETED', 'ERROR')),
    retry_count      INTEGER NOT NULL DEFAULT 0,
    artifact_path    TEXT,
    last_error       TEXT,
    lease_expires_at TIMESTAMPTZ,
    version          BIGINT NOT NULL DEFAULT 0,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT report_jobs_campaign_date_key UNIQUE (campaign_id, report_date)
);

CREATE INDEX IF NOT EXISTS idx_report_jobs_campaign_updated
    ON report_jobs (campaign_id, updated_at DESC);

CREATE INDEX IF NOT EXISTS idx_report_jobs_lease
    ON report_jobs (lease_expires_at)
    WHERE state = 'IN_PROGRESS';

DROP FUNCTION IF EXISTS list_campaigns_page(DATE, INTEGER, INTEGER);

CREATE OR REPLACE FUNCTION list_campaigns_page(p_date DATE, p_page BIGINT, p_page_size BIGINT)
RETURNS TABLE (
    id            BIGINT,
    campaign_date DATE,
    name          TEXT,
    state         TEXT,
    description   TEXT,
    total_count   BIGINT,
    total_pages   BIGINT
)
LANGUAGE sql STABLE
AS $$
    WITH matching AS (
        SELECT c.id, c.campaign_date, c.name, c.state, c.description
        FROM campaigns c
        WHERE c.campaign_date = p_date
    ),
    totals AS (
        SELECT COUNT(*)::BIGINT AS total_count,
               CEIL(COUNT(*)::NUMERIC / p_page_size)::BIGINT AS total_pages
        FROM matching
    ),
    requested AS (
        SELECT m.*
        FROM matching m
        ORDER BY m.id
        OFFSET (p_page - 1) * p_page_size
        LIMIT p_page_size
    )
    SELECT r.id, r.campaign_date, r.name, r.state, r.description, t.total_count, t.total_pages
    FROM totals t
    LEFT JOIN requested r ON TRUE
    WHERE t.total_count > 0
    ORDER BY r.id NULLS LAST;
$$;
"#;

/// Open a connection pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Apply `SCHEMA` (idempotent).
pub async fn apply_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("apply_schema", e))?;
    info!("database schema applied");
    Ok(())
}

/// Map SQLx errors to StoreError.
pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                Some("23505") | Some("23503") => StoreError::Conflict(msg),
                Some("23514") => StoreError::Decode(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::NotFound(format!("unexpected row not found in {}", operation))
        }
        sqlx::Error::ColumnDecode { index, source } => StoreError::Decode(format!(
            "column {} failed to decode in {}: {}",
            index, operation, source
        )),
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
