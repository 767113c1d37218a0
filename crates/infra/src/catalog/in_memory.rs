use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use smsreport_core::{
    Campaign, CampaignId, DeliveryState, MessageDetail, MessageId, PageRequest, ReportDate,
};

use super::{CampaignPageRow, CampaignStore};
use crate::db::StoreError;

#[derive(Debug, Default)]
struct Catalog {
    campaigns: BTreeMap<CampaignId, Campaign>,
    details: BTreeMap<MessageId, MessageDetail>,
    next_campaign_id: i64,
    next_message_id: i64,
}

/// In-memory campaign catalogue.
///
/// Intended for tests/dev. Ids are assigned serially, starting at 1, the way
/// the database sequences do.
#[derive(Debug, Default)]
pub struct InMemoryCampaignStore {
    inner: RwLock<Catalog>,
}

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

impl InMemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a campaign and return it with its assigned id.
    pub fn add_campaign(
        &self,
        date: ReportDate,
        name: impl Into<String>,
        state: impl Into<String>,
    ) -> Result<Campaign, StoreError> {
        let mut catalog = self.inner.write().map_err(|_| poisoned())?;
        catalog.next_campaign_id += 1;
        let campaign = Campaign {
            id: CampaignId::new(catalog.next_campaign_id),
            date,
            name: name.into(),
            state: state.into(),
            description: None,
        };
        catalog.campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    /// Attach a message to an existing campaign.
    pub fn add_detail(
        &self,
        campaign_id: CampaignId,
        text: impl Into<String>,
        delivery_state: DeliveryState,
    ) -> Result<MessageDetail, StoreError> {
        let mut catalog = self.inner.write().map_err(|_| poisoned())?;
        if !catalog.campaigns.contains_key(&campaign_id) {
            return Err(StoreError::Conflict(format!(
                "campaign {campaign_id} does not exist"
            )));
        }
        catalog.next_message_id += 1;
        let detail = MessageDetail {
            id: MessageId::new(catalog.next_message_id),
            campaign_id,
            text: text.into(),
            delivery_state,
        };
        catalog.details.insert(detail.id, detail.clone());
        Ok(detail)
    }

    /// Remove a campaign together with its details.
    pub fn remove_campaign(&self, id: CampaignId) -> Result<bool, StoreError> {
        let mut catalog = self.inner.write().map_err(|_| poisoned())?;
        let removed = catalog.campaigns.remove(&id).is_some();
        catalog.details.retain(|_, d| d.campaign_id != id);
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn campaigns_on(&self, date: ReportDate) -> Result<Vec<Campaign>, StoreError> {
        let catalog = self.inner.read().map_err(|_| poisoned())?;
        Ok(catalog
            .campaigns
            .values()
            .filter(|c| c.date == date)
            .cloned()
            .collect())
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        let catalog = self.inner.read().map_err(|_| poisoned())?;
        Ok(catalog.campaigns.get(&id).cloned())
    }

    async fn details_for(&self, id: CampaignId) -> Result<Vec<MessageDetail>, StoreError> {
        let catalog = self.inner.read().map_err(|_| poisoned())?;
        Ok(catalog
            .details
            .values()
            .filter(|d| d.campaign_id == id)
            .cloned()
            .collect())
    }

    async fn page_by_date(
        &self,
        date: ReportDate,
        request: PageRequest,
    ) -> Result<Vec<CampaignPageRow>, StoreError> {
        let matching = self.campaigns_on(date).await?;
        let total_count = matching.len() as u64;
        if total_count == 0 {
            return Ok(vec![]);
        }
        let total_pages = request.total_pages(total_count);

        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let rows: Vec<CampaignPageRow> = matching
            .into_iter()
            .skip(offset)
            .take(request.page_size() as usize)
            .map(|campaign| CampaignPageRow {
                campaign: Some(campaign),
                total_count,
                total_pages,
            })
            .collect();

        if rows.is_empty() {
            return Ok(vec![CampaignPageRow {
                campaign: None,
                total_count,
                total_pages,
            }]);
        }
        Ok(rows)
    }

    async fn distinct_dates(&self) -> Result<Vec<ReportDate>, StoreError> {
        let catalog = self.inner.read().map_err(|_| poisoned())?;
        let dates: BTreeSet<ReportDate> = catalog.campaigns.values().map(|c| c.date).collect();
        Ok(dates.into_iter().rev().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> ReportDate {
        ReportDate::from_ymd(2025, 1, d).unwrap()
    }

    #[tokio::test]
    async fn campaigns_are_filtered_by_date_in_id_order() {
        let store = InMemoryCampaignStore::new();
        let a = store.add_campaign(date(10), "A", "ACTIVE").unwrap();
        store.add_campaign(date(11), "B", "ACTIVE").unwrap();
        let c = store.add_campaign(date(10), "C", "PAUSED").unwrap();

        let on_tenth = store.campaigns_on(date(10)).await.unwrap();
        let ids: Vec<_> = on_tenth.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
    }

    #[tokio::test]
    async fn details_belong_to_their_campaign() {
        let store = InMemoryCampaignStore::new();
        let a = store.add_campaign(date(10), "A", "ACTIVE").unwrap();
        let b = store.add_campaign(date(10), "B", "ACTIVE").unwrap();
        store.add_detail(a.id, "hi", DeliveryState::Sent).unwrap();
        store.add_detail(b.id, "yo", DeliveryState::Failed).unwrap();

        let details = store.details_for(a.id).await.unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].text, "hi");
    }

    #[tokio::test]
    async fn detail_for_unknown_campaign_is_rejected() {
        let store = InMemoryCampaignStore::new();
        let err = store
            .add_detail(CampaignId::new(42), "x", DeliveryState::Sent)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn removing_a_campaign_cascades_to_details() {
        let store = InMemoryCampaignStore::new();
        let a = store.add_campaign(date(10), "A", "ACTIVE").unwrap();
        store.add_detail(a.id, "hi", DeliveryState::Sent).unwrap();

        assert!(store.remove_campaign(a.id).unwrap());
        assert!(store.details_for(a.id).await.unwrap().is_empty());
        assert!(store.get(a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn page_past_the_end_yields_totals_only_row() {
        let store = InMemoryCampaignStore::new();
        for i in 0..3 {
            store.add_campaign(date(10), format!("C{i}"), "ACTIVE").unwrap();
        }

        let rows = store
            .page_by_date(date(10), PageRequest::new(5, 2).unwrap())
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![CampaignPageRow {
                campaign: None,
                total_count: 3,
                total_pages: 2
            }]
        );
    }

    #[tokio::test]
    async fn empty_date_yields_no_rows() {
        let store = InMemoryCampaignStore::new();
        let rows = store
            .page_by_date(date(10), PageRequest::default())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn distinct_dates_are_newest_first() {
        let store = InMemoryCampaignStore::new();
        store.add_campaign(date(10), "A", "ACTIVE").unwrap();
        store.add_campaign(date(12), "B", "ACTIVE").unwrap();
        store.add_campaign(date(10), "C", "ACTIVE").unwrap();

        assert_eq!(store.distinct_dates().await.unwrap(), vec![date(12), date(10)]);
    }
}
