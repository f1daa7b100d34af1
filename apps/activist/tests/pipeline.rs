use activist::{
    config::{AppConfig, DaoConfig, JitterConfig, SourceConfig, WindowConfig},
    models::prices::{PriceSource, TokenMapping},
    pipeline,
};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

// 2022-02-27 .. 2022-03-03, midnight UTC, in ms
const DAYS_MS: [i64; 5] = [
    1_645_920_000_000,
    1_646_006_400_000,
    1_646_092_800_000,
    1_646_179_200_000,
    1_646_265_600_000,
];

async fn snapshot_server() -> ServerGuard {
    let mut server = Server::new_async().await;
    let proposals = json!({ "data": { "proposals": [
        {
            "id": "0xfei",
            "title": "Emergency proposal: remove treasury lead and reallocate funds to community initiative",
            "body": "",
            "author": "0xAAA",
            "created": 1646092800,
            "state": "closed",
            "votes": 3
        },
        {
            "id": "0xsite",
            "title": "Website refresh",
            "body": "Notes from the design sync about fonts and colors for the landing page",
            "author": "0xBBB",
            "created": 1646092800,
            "state": "closed",
            "votes": 40
        }
    ] } });
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "variables": { "skip": 0 } })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(proposals.to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "variables": { "skip": 2 } })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "data": { "proposals": [] } }).to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "variables": { "proposal": "0xfei" } })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({ "data": { "votes": [
                { "voter": "0xccc", "vp": 75.0 },
                { "voter": "0xaaa", "vp": 25.0 }
            ] } })
            .to_string(),
        )
        .create_async()
        .await;
    server
}

fn config(dir: &std::path::Path, snapshot_url: String, prices_url: String) -> AppConfig {
    let mut config = AppConfig::default();
    config.daos = vec![DaoConfig {
        space: "fei.eth".into(),
        token: TokenMapping {
            symbol: "FEI".into(),
            coingecko_id: Some("fei-usd".into()),
            ..TokenMapping::default()
        },
    }];
    config.window = WindowConfig {
        days_before: 2,
        days_after: 2,
    };
    config.output.dir = dir.to_path_buf();
    config.snapshot.endpoint = snapshot_url;
    config.snapshot.retry_delay_ms = 5;
    config.sources.priority = vec![PriceSource::CoinGecko];
    config.sources.coingecko = SourceConfig {
        base_url: prices_url,
        request_delay_ms: 0,
        max_attempts: 1,
        base_backoff_ms: 0,
        max_backoff_ms: 0,
        rate_limit_backoff_ms: 0,
        max_batch_days: 90,
        timeout_secs: 5,
    };
    config.jitter = JitterConfig {
        min_ms: 0,
        max_ms: 0,
    };
    config
}

#[tokio::test]
async fn end_to_end_run_writes_activist_proposals_and_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = snapshot_server().await;

    let mut prices = Server::new_async().await;
    let samples: Vec<_> = DAYS_MS
        .iter()
        .enumerate()
        .map(|(i, ms)| json!([ms, 1.0 + i as f64]))
        .collect();
    let chart = prices
        .mock("GET", "/coins/fei-usd/market_chart/range")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({ "prices": samples, "total_volumes": samples, "market_caps": samples })
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let config = config(dir.path(), snapshot.url(), prices.url());
    config.validate().unwrap();

    let summary = pipeline::run(&config).await.unwrap();

    assert_eq!(summary.daos_processed, 1);
    assert_eq!(summary.proposals_fetched, 2);
    assert_eq!(summary.activist_proposals, 1);
    assert_eq!(summary.proposals_written, 1);
    assert_eq!(summary.total_rows, 5);
    assert_eq!(summary.total_gap_days, 0);
    assert_eq!(summary.source_days.get(&PriceSource::CoinGecko), Some(&5));
    assert_eq!(summary.activist_by_dao.get("fei.eth"), Some(&1));
    assert!(summary.daos_abandoned.is_empty());

    let per_proposal = dir
        .path()
        .join("fei.eth_0xfei_Emergency_proposal_remove_treasury_lead.csv");
    assert!(per_proposal.exists());

    let mut reader = csv::Reader::from_path(config.output.master_path()).unwrap();
    let rows: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 5);
    assert_eq!(&rows[0][2], "2022-02-27");
    assert_eq!(&rows[0][13], "pattern");
    assert_eq!(&rows[0][14], "pattern[financial+leadership+emergency+community]");
    assert_eq!(rows[0][15].parse::<f64>().unwrap(), 75.0);
    assert_eq!(rows[0][16].parse::<f64>().unwrap(), 25.0);
    assert_eq!(&rows[0][17], "3");

    assert!(config.output.summary_path().exists());
    assert!(config.output.checkpoint_path().exists());

    // A second run finds the proposal completed and requests no prices.
    let rerun = pipeline::run(&config).await.unwrap();
    assert_eq!(rerun.proposals_skipped_completed, 1);
    assert_eq!(rerun.proposals_written, 0);

    let mut reader = csv::Reader::from_path(config.output.master_path()).unwrap();
    assert_eq!(reader.records().count(), 5);
    chart.assert_async().await;
}

#[tokio::test]
async fn unlisted_token_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = snapshot_server().await;

    let mut prices = Server::new_async().await;
    prices
        .mock("GET", "/coins/fei-usd/market_chart/range")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"error":"coin not found"}"#)
        .create_async()
        .await;

    let config = config(dir.path(), snapshot.url(), prices.url());
    let summary = pipeline::run(&config).await.unwrap();

    assert_eq!(summary.activist_proposals, 1);
    assert_eq!(summary.proposals_without_prices, 1);
    assert_eq!(summary.proposals_written, 0);
    assert_eq!(summary.total_gap_days, 5);
    assert!(!config.output.master_path().exists());
}
