//! Postgres-backed campaign catalogue.
//!
//! Every method acquires its own pooled connection for the duration of the
//! query, so concurrent workers never share a connection.

use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use smsreport_core::{
    Campaign, CampaignId, DeliveryState, MessageDetail, MessageId, PageRequest, ReportDate,
};

use super::{CampaignPageRow, CampaignStore};
use crate::db::{StoreError, map_sqlx_error};

/// Postgres campaign catalogue (tables `campaigns`, `message_details`).
#[derive(Debug, Clone)]
pub struct PostgresCampaignStore {
    pool: Arc<PgPool>,
}

impl PostgresCampaignStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl CampaignStore for PostgresCampaignStore {
    #[instrument(skip(self), fields(date = %date), err)]
    async fn campaigns_on(&self, date: ReportDate) -> Result<Vec<Campaign>, StoreError> {
        let rows = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT id, campaign_date, name, state, description
            FROM campaigns
            WHERE campaign_date = $1
            ORDER BY id ASC
            "#,
        )
        .bind(date.as_naive())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("campaigns_on", e))?;

        Ok(rows.into_iter().map(Campaign::from).collect())
    }

    #[instrument(skip(self), fields(campaign_id = %id), err)]
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        let row = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT id, campaign_date, name, state, description
            FROM campaigns
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_campaign", e))?;

        Ok(row.map(Campaign::from))
    }

    #[instrument(skip(self), fields(campaign_id = %id, rows = tracing::field::Empty), err)]
    async fn details_for(&self, id: CampaignId) -> Result<Vec<MessageDetail>, StoreError> {
        let rows = sqlx::query_as::<_, DetailRow>(
            r#"
            SELECT id, campaign_id, message_text, delivery_state
            FROM message_details
            WHERE campaign_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("details_for", e))?;

        Span::current().record("rows", rows.len() as u64);

        rows.into_iter().map(MessageDetail::try_from).collect()
    }

    #[instrument(
        skip(self),
        fields(date = %date, page = request.page(), page_size = request.page_size()),
        err
    )]
    async fn page_by_date(
        &self,
        date: ReportDate,
        request: PageRequest,
    ) -> Result<Vec<CampaignPageRow>, StoreError> {
        let (page, page_size) = page_params(request);

        let rows = sqlx::query_as::<_, PageRow>(
            r#"
            SELECT id, campaign_date, name, state, description, total_count, total_pages
            FROM list_campaigns_page($1, $2, $3)
            "#,
        )
        .bind(date.as_naive())
        .bind(page)
        .bind(page_size)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("page_by_date", e))?;

        rows.into_iter().map(CampaignPageRow::try_from).collect()
    }

    #[instrument(skip(self), err)]
    async fn distinct_dates(&self) -> Result<Vec<ReportDate>, StoreError> {
        let dates = sqlx::query_scalar::<_, NaiveDate>(
            r#"
            SELECT DISTINCT campaign_date
            FROM campaigns
            ORDER BY campaign_date DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("distinct_dates", e))?;

        Ok(dates.into_iter().map(ReportDate::from).collect())
    }
}

#[derive(Debug)]
struct CampaignRow {
    id: i64,
    campaign_date: NaiveDate,
    name: String,
    state: String,
    description: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for CampaignRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(CampaignRow {
            id: row.try_get("id")?,
            campaign_date: row.try_get("campaign_date")?,
            name: row.try_get("name")?,
            state: row.try_get("state")?,
            description: row.try_get("description")?,
        })
    }
}

impl From<CampaignRow> for Campaign {
    fn from(row: CampaignRow) -> Self {
        Campaign {
            id: CampaignId::new(row.id),
            date: ReportDate::from(row.campaign_date),
            name: row.name,
            state: row.state,
            description: row.description,
        }
    }
}

#[derive(Debug)]
struct DetailRow {
    id: i64,
    campaign_id: i64,
    message_text: String,
    delivery_state: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for DetailRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(DetailRow {
            id: row.try_get("id")?,
            campaign_id: row.try_get("campaign_id")?,
            message_text: row.try_get("message_text")?,
            delivery_state: row.try_get("delivery_state")?,
        })
    }
}

impl TryFrom<DetailRow> for MessageDetail {
    type Error = StoreError;

    fn try_from(row: DetailRow) -> Result<Self, Self::Error> {
        let delivery_state = row.delivery_state.parse::<DeliveryState>().map_err(|e| {
            StoreError::Decode(format!("message {}: {}", row.id, e))
        })?;
        Ok(MessageDetail {
            id: MessageId::new(row.id),
            campaign_id: CampaignId::new(row.campaign_id),
            text: row.message_text,
            delivery_state,
        })
    }
}

/// Campaign columns are NULL on the totals-only row.
#[derive(Debug)]
struct PageRow {
    id: Option<i64>,
    campaign_date: Option<NaiveDate>,
    name: Option<String>,
    state: Option<String>,
    description: Option<String>,
    total_count: i64,
    total_pages: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for PageRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(PageRow {
            id: row.try_get("id")?,
            campaign_date: row.try_get("campaign_date")?,
            name: row.try_get("name")?,
            state: row.try_get("state")?,
            description: row.try_get("description")?,
            total_count: row.try_get("total_count")?,
            total_pages: row.try_get("total_pages")?,
        })
    }
}

impl TryFrom<PageRow> for CampaignPageRow {
    type Error = StoreError;

    fn try_from(row: PageRow) -> Result<Self, Self::Error> {
        let total_count = u64::try_from(row.total_count)
            .map_err(|_| StoreError::Decode(format!("negative total_count {}", row.total_count)))?;
        let total_pages = u64::try_from(row.total_pages)
            .map_err(|_| StoreError::Decode(format!("negative total_pages {}", row.total_pages)))?;

        let campaign = match (row.id, row.campaign_date, row.name, row.state) {
            (Some(id), Some(date), Some(name), Some(state)) => Some(Campaign {
                id: CampaignId::new(id),
                date: ReportDate::from(date),
                name,
                state,
                description: row.description,
            }),
            (None, ..) => None,
            (Some(id), ..) => {
                return Err(StoreError::Decode(format!(
                    "campaign {id} has NULL required columns"
                )));
            }
        };

        Ok(CampaignPageRow {
            campaign,
            total_count,
            total_pages,
        })
    }
}

/// Paging arguments as `BIGINT`s; every `u32` page is representable, so
/// far out-of-range pages still come back as a totals-only row.
fn page_params(request: PageRequest) -> (i64, i64) {
    (i64::from(request.page()), i64::from(request.page_size()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_page_number_binds() {
        let request = PageRequest::new(u32::MAX, 100).unwrap();
        assert_eq!(page_params(request), (4_294_967_295, 100));
        assert_eq!(page_params(PageRequest::default()), (1, 10));
    }

    fn page_row(id: Option<i64>) -> PageRow {
        PageRow {
            id,
            campaign_date: id.map(|_| NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()),
            name: id.map(|i| format!("C{i}")),
            state: id.map(|_| "ACTIVE".to_string()),
            description: None,
            total_count: 15,
            total_pages: 2,
        }
    }

    #[test]
    fn totals_only_row_has_no_campaign() {
        let row = CampaignPageRow::try_from(page_row(None)).unwrap();
        assert!(row.campaign.is_none());
        assert_eq!(row.total_count, 15);
        assert_eq!(row.total_pages, 2);
    }

    #[test]
    fn campaign_row_is_decoded() {
        let row = CampaignPageRow::try_from(page_row(Some(7))).unwrap();
        let campaign = row.campaign.unwrap();
        assert_eq!(campaign.id, CampaignId::new(7));
        assert_eq!(campaign.date.to_string(), "2025/01/10");
    }

    #[test]
    fn legacy_delivery_labels_decode() {
        let detail = MessageDetail::try_from(DetailRow {
            id: 1,
            campaign_id: 2,
            message_text: "hola".into(),
            delivery_state: "ENVIADO".into(),
        })
        .unwrap();
        assert_eq!(detail.delivery_state, DeliveryState::Sent);
    }

    #[test]
    fn unknown_delivery_label_is_a_decode_error() {
        let err = MessageDetail::try_from(DetailRow {
            id: 1,
            campaign_id: 2,
            message_text: "x".into(),
            delivery_state: "BOUNCED".into(),
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }
}
