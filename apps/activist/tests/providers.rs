use activist::{
    errors::SourceError,
    models::prices::PriceSource,
    prices::providers::{BinanceProvider, CoinGeckoProvider, PriceProvider, YahooProvider},
};
use chrono::NaiveDate;
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);
// 2022-01-01 .. 2022-01-03, midnight UTC
const DAY1_S: i64 = 1_640_995_200;
const DAY2_S: i64 = 1_641_081_600;
const DAY3_S: i64 = 1_641_168_000;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, d).unwrap()
}

#[tokio::test]
async fn coingecko_collapses_samples_per_day() {
    let mut server = Server::new_async().await;
    let body = json!({
        "prices": [
            [DAY1_S * 1000, 10.0],
            [DAY1_S * 1000 + 3_600_000, 11.0],
            [DAY2_S * 1000, 12.0]
        ],
        "total_volumes": [[DAY1_S * 1000 + 3_600_000, 500.0], [DAY2_S * 1000, 600.0]],
        "market_caps": [[DAY2_S * 1000, 9000.0]]
    });
    let mock = server
        .mock("GET", "/coins/uniswap/market_chart/range")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("vs_currency".into(), "usd".into()),
            Matcher::UrlEncoded("from".into(), DAY1_S.to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await;

    let provider = CoinGeckoProvider::new(&server.url(), TIMEOUT).unwrap();
    let records = provider.fetch_daily("uniswap", date(1), date(2)).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].date, date(1));
    assert_eq!(records[0].price_usd, 11.0);
    assert_eq!(records[0].volume_usd, 500.0);
    assert_eq!(records[0].market_cap_usd, 0.0);
    assert_eq!(records[1].market_cap_usd, 9000.0);
    assert!(records.iter().all(|r| r.source == PriceSource::CoinGecko));
    mock.assert_async().await;
}

#[tokio::test]
async fn yahoo_skips_null_closes() {
    let mut server = Server::new_async().await;
    let body = json!({
        "chart": {
            "result": [{
                "timestamp": [DAY1_S, DAY2_S, DAY3_S],
                "indicators": { "quote": [{
                    "close": [2.0, null, 4.0],
                    "volume": [100.0, 200.0, null]
                }] }
            }],
            "error": null
        }
    });
    server
        .mock("GET", "/v8/finance/chart/UNI7083-USD")
        .match_query(Matcher::UrlEncoded("interval".into(), "1d".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await;

    let provider = YahooProvider::new(&server.url(), TIMEOUT).unwrap();
    let records = provider.fetch_daily("UNI7083-USD", date(1), date(3)).await.unwrap();

    let dates: Vec<_> = records.iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![date(1), date(3)]);
    assert_eq!(records[0].volume_usd, 200.0);
    assert_eq!(records[1].volume_usd, 0.0);
    assert_eq!(records[1].source, PriceSource::Yahoo);
}

#[tokio::test]
async fn binance_uses_close_price() {
    let mut server = Server::new_async().await;
    let body = json!([
        [DAY1_S * 1000, "1.0", "1.5", "0.9", "1.2", "1000", DAY2_S * 1000 - 1, "0", 10, "0", "0", "0"],
        [DAY2_S * 1000, "1.2", "1.3", "1.1", "1.25", "800", DAY3_S * 1000 - 1, "0", 10, "0", "0", "0"]
    ]);
    server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "UNIUSDT".into()),
            Matcher::UrlEncoded("interval".into(), "1d".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await;

    let provider = BinanceProvider::new(&server.url(), TIMEOUT).unwrap();
    let records = provider.fetch_daily("UNIUSDT", date(1), date(2)).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].price_usd, 1.2);
    assert_eq!(records[0].volume_usd, 1200.0);
    assert_eq!(records[1].date, date(2));
}

#[tokio::test]
async fn status_codes_map_to_error_classes() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/coins/limited/market_chart/range")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("retry-after", "7")
        .create_async()
        .await;
    server
        .mock("GET", "/coins/down/market_chart/range")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;
    server
        .mock("GET", "/coins/unknown/market_chart/range")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"error":"coin not found"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/coins/garbled/market_chart/range")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>")
        .create_async()
        .await;

    let provider = CoinGeckoProvider::new(&server.url(), TIMEOUT).unwrap();

    let err = provider.fetch_daily("limited", date(1), date(2)).await.unwrap_err();
    assert!(matches!(
        err,
        SourceError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(7)
    ));

    let err = provider.fetch_daily("down", date(1), date(2)).await.unwrap_err();
    assert!(matches!(err, SourceError::Transient(_)));

    let err = provider.fetch_daily("unknown", date(1), date(2)).await.unwrap_err();
    assert!(matches!(err, SourceError::Permanent(_)));

    let err = provider.fetch_daily("garbled", date(1), date(2)).await.unwrap_err();
    assert!(matches!(err, SourceError::Permanent(_)));
}
