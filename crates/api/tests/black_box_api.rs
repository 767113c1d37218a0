use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;

use smsreport_api::app::{build_app, AppServices};
use smsreport_core::{CampaignId, DeliveryState, ReportDate};
use smsreport_infra::catalog::InMemoryCampaignStore;
use smsreport_infra::jobs::InMemoryJobStore;
use smsreport_infra::ServiceConfig;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    // Keeps the artifact directory alive for the duration of the test.
    _reports: tempfile::TempDir,
}

impl TestServer {
    async fn spawn(catalog: Arc<InMemoryCampaignStore>) -> Self {
        let reports = tempfile::tempdir().expect("failed to create reports dir");
        let config = ServiceConfig::default()
            .with_reports_dir(reports.path())
            .with_max_concurrent_workers(4)
            .with_retry_base_delay(Duration::from_millis(10));
        let services = Arc::new(AppServices::new(catalog, InMemoryJobStore::arc(), &config));

        // Same router as prod, bound to an ephemeral port.
        let app = build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            handle,
            _reports: reports,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn day(d: u32) -> ReportDate {
    ReportDate::from_ymd(2025, 1, d).unwrap()
}

/// C1 "New Year" on 2025/01/10 with SENT, SENT, FAILED.
fn scenario_a_catalog() -> (Arc<InMemoryCampaignStore>, CampaignId) {
    let catalog = InMemoryCampaignStore::arc();
    let c1 = catalog.add_campaign(day(10), "New Year", "ACTIVE").unwrap();
    catalog.add_detail(c1.id, "Happy new year", DeliveryState::Sent).unwrap();
    catalog.add_detail(c1.id, "Happy new year!", DeliveryState::Sent).unwrap();
    catalog.add_detail(c1.id, "Happy new year!!", DeliveryState::Failed).unwrap();
    (catalog, c1.id)
}

async fn status_eventually(
    client: &reqwest::Client,
    base_url: &str,
    campaign_id: CampaignId,
    wanted: &str,
) -> serde_json::Value {
    // Workers run after the 202 is sent; poll until the job settles.
    for _ in 0..100 {
        let res = client
            .get(format!("{}/reports/status/{}", base_url, campaign_id))
            .send()
            .await
            .unwrap();

        if res.status() == StatusCode::OK {
            let body: serde_json::Value = res.json().await.unwrap();
            if body["state"] == wanted {
                return body;
            }
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    panic!("job for campaign {campaign_id} did not reach {wanted} within timeout");
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn(InMemoryCampaignStore::arc()).await;

    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn submitted_batch_completes_with_summary_artifact() {
    let (catalog, c1) = scenario_a_catalog();
    let srv = TestServer::spawn(catalog).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/reports", srv.base_url))
        .json(&json!({ "date": "2025/01/10" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["total"], 1);
    assert_eq!(body["campaigns"][0]["id"], c1.get());
    assert_eq!(body["campaigns"][0]["name"], "New Year");
    assert_eq!(body["campaigns"][0]["state"], "PENDING");
    assert!(body["message"].is_string());

    let status = status_eventually(&client, &srv.base_url, c1, "COMPLETED").await;
    assert_eq!(status["date"], "2025/01/10");
    assert_eq!(status["campaign_id"], c1.get());

    let path = status["artifact_path"].as_str().expect("artifact path set");
    let csv = std::fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Campaign ID,"));
    assert_eq!(lines[1], format!("{},New Year,ACTIVE,3,2,0,1", c1));
}

#[tokio::test]
async fn empty_date_is_not_found() {
    let (catalog, _) = scenario_a_catalog();
    let srv = TestServer::spawn(catalog).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/reports", srv.base_url))
        .json(&json!({ "date": "2025/01/11" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let (catalog, _) = scenario_a_catalog();
    let srv = TestServer::spawn(catalog).await;
    let client = reqwest::Client::new();

    for date in ["2025-01-10", "2025/1/10", "2025/02/30", ""] {
        let res = client
            .post(format!("{}/reports", srv.base_url))
            .json(&json!({ "date": date }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "date {date:?}");
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "validation_error");
    }

    let res = client
        .post(format!("{}/reports", srv.base_url))
        .header("content-type", "application/json")
        .body("{\"day\": 1}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(format!("{}/reports/status/abc", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn retrigger_rearms_the_same_job() {
    let (catalog, c1) = scenario_a_catalog();
    let srv = TestServer::spawn(catalog).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let res = client
            .post(format!("{}/reports", srv.base_url))
            .json(&json!({ "date": "2025/01/10" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["total"], 1);
        assert_eq!(body["campaigns"].as_array().unwrap().len(), 1);

        status_eventually(&client, &srv.base_url, c1, "COMPLETED").await;
    }
}

#[tokio::test]
async fn status_for_never_batched_campaign_is_not_found() {
    let (catalog, c1) = scenario_a_catalog();
    let srv = TestServer::spawn(catalog).await;

    let res = reqwest::get(format!("{}/reports/status/{}", srv.base_url, c1))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn campaigns_are_paged_by_date() {
    let catalog = InMemoryCampaignStore::arc();
    for i in 0..15 {
        catalog.add_campaign(day(10), format!("C{i}"), "ACTIVE").unwrap();
    }
    catalog.add_campaign(day(11), "Other day", "PAUSED").unwrap();
    let srv = TestServer::spawn(catalog).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/campaigns", srv.base_url))
        .query(&[("date", "2025/01/10"), ("page", "2"), ("page_size", "10")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 5);
    assert_eq!(body["total"], 15);
    assert_eq!(body["total_pages"], 2);
    assert_eq!(body["page"], 2);
    assert_eq!(body["items"][0]["name"], "C10");
    assert_eq!(body["items"][0]["date"], "2025/01/10");

    // Defaults: page 1, size 10.
    let res = client
        .get(format!("{}/campaigns", srv.base_url))
        .query(&[("date", "2025/01/10")])
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 10);
    assert_eq!(body["page_size"], 10);

    let res = client
        .get(format!("{}/campaigns", srv.base_url))
        .query(&[("date", "2025/01/10"), ("page", "3000000000")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["items"].as_array().unwrap().is_empty());
    assert_eq!(body["total"], 15);
    assert_eq!(body["total_pages"], 2);

    let res = client
        .get(format!("{}/campaigns", srv.base_url))
        .query(&[("date", "2025/01/10"), ("page_size", "0")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(format!("{}/campaigns", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn distinct_dates_are_listed_newest_first() {
    let catalog = InMemoryCampaignStore::arc();
    catalog.add_campaign(day(10), "A", "ACTIVE").unwrap();
    catalog.add_campaign(day(10), "B", "ACTIVE").unwrap();
    catalog.add_campaign(day(11), "C", "ACTIVE").unwrap();
    let srv = TestServer::spawn(catalog).await;

    let res = reqwest::get(format!("{}/campaigns/dates", srv.base_url))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["total"], 2);
    assert_eq!(body["dates"], json!(["2025/01/11", "2025/01/10"]));
}

#[tokio::test]
async fn on_demand_reports_write_artifacts() {
    let (catalog, c1) = scenario_a_catalog();
    let srv = TestServer::spawn(catalog).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/reports/summary", srv.base_url))
        .json(&json!({ "date": "2025/01/10" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let summary = std::fs::read_to_string(body["artifact_path"].as_str().unwrap()).unwrap();
    assert!(summary.lines().any(|l| l.ends_with(",3,2,0,1")));

    let res = client
        .post(format!("{}/reports/campaigns/{}/detail", srv.base_url, c1))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let detail = std::fs::read_to_string(body["artifact_path"].as_str().unwrap()).unwrap();
    assert_eq!(detail.lines().count(), 4);
    assert!(detail.lines().nth(1).unwrap().contains("2025-01-10"));

    let res = client
        .post(format!("{}/reports/campaigns/999/detail", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(format!("{}/reports/summary", srv.base_url))
        .json(&json!({ "date": "2025/01/11" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn manual_sweep_reports_counts() {
    let srv = TestServer::spawn(InMemoryCampaignStore::arc()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/reports/sweep", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "reclaimed": 0, "rescheduled": 0 }));
}
