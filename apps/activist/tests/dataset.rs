use activist::{
    classifier::{ActivistClassifier, DEFAULT_THRESHOLD},
    dataset::DatasetWriter,
    models::{
        prices::{PriceRecord, PriceSeries, PriceSource, PriceWindow},
        proposals::{Proposal, VoteTally},
    },
};
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 3, d).unwrap()
}

fn proposal() -> Proposal {
    Proposal {
        dao: "fei.eth".into(),
        id: "0xfei".into(),
        title: "Emergency proposal: remove treasury lead and reallocate funds".into(),
        body: "Details follow.".into(),
        author: "0xAAA".into(),
        created: Utc.with_ymd_and_hms(2022, 3, 2, 12, 0, 0).unwrap(),
        state: "closed".into(),
        tally: VoteTally {
            top_voter_pct: 40.0,
            proposer_pct: 5.5,
            top10_concentration_pct: 90.0,
            total_votes: 321,
        },
    }
}

/// Days 1, 2, 4 and 5 of a five-day window; day 2 has zero volume.
fn series() -> PriceSeries {
    let window = PriceWindow::new(date(1), date(5)).unwrap();
    let mut days = BTreeMap::new();
    for (d, price, volume, source) in [
        (1, 2.0, 100.0, PriceSource::CoinGecko),
        (2, 3.0, 0.0, PriceSource::CoinGecko),
        (4, 1.5, 50.0, PriceSource::Yahoo),
        (5, 1.5, 75.0, PriceSource::Yahoo),
    ] {
        days.insert(date(d), PriceRecord::daily(date(d), price, volume, 0.0, source));
    }
    PriceSeries::from_days("FEI", window, days)
}

fn read_rows(path: &std::path::Path) -> (csv::StringRecord, Vec<csv::StringRecord>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let rows = reader.records().map(|r| r.unwrap()).collect();
    (headers, rows)
}

#[test]
fn writes_per_proposal_and_master_files() {
    let dir = tempfile::tempdir().unwrap();
    let writer = DatasetWriter::new(dir.path(), "master.csv").unwrap();
    let classifier = ActivistClassifier::new(&BTreeMap::new(), DEFAULT_THRESHOLD).unwrap();
    let proposal = proposal();
    let score = classifier.score_proposal(&proposal);

    let written = writer.write_proposal(&proposal, &score, &series()).unwrap();

    assert_eq!(written.rows, 4);
    assert_eq!(
        written.path.file_name().unwrap().to_str().unwrap(),
        "fei.eth_0xfei_Emergency_proposal_remove_treasury_lead.csv"
    );

    let (headers, rows) = read_rows(&written.path);
    let expected_headers = [
        "timestamp",
        "datetime",
        "date",
        "price_usd",
        "volume_usd",
        "market_cap_usd",
        "source",
        "price_change_pct",
        "volume_change_pct",
        "dao",
        "proposal_id",
        "proposal_title",
        "activist_score",
        "detection_methods",
        "detection_summary",
        "top_voter_percentage",
        "proposer_percentage",
        "total_votes",
        "proposal_state",
        "proposal_author",
        "proposal_created",
    ];
    assert_eq!(headers.iter().collect::<Vec<_>>(), expected_headers);
    assert_eq!(rows.len(), 4);

    let first = &rows[0];
    assert_eq!(&first[0], "1646092800000");
    assert_eq!(&first[1], "2022-03-01T00:00:00Z");
    assert_eq!(&first[2], "2022-03-01");
    assert_eq!(&first[6], "coingecko");
    assert_eq!(&first[7], "");
    assert_eq!(&first[9], "fei.eth");
    assert_eq!(&first[17], "321");
    assert_eq!(&first[20], "2022-03-02T12:00:00Z");
    assert!(first[13].starts_with("pattern"));

    // 2 -> 3 is +50%
    assert_eq!(rows[1][7].parse::<f64>().unwrap(), 50.0);
    // Day 4 follows day 2 across the gap; zero volume leaves the cell empty.
    assert_eq!(rows[2][7].parse::<f64>().unwrap(), -50.0);
    assert_eq!(&rows[2][8], "");
    assert_eq!(&rows[2][6], "yahoo");
    assert_eq!(rows[3][8].parse::<f64>().unwrap(), 50.0);

    // Metadata repeats on every row.
    assert!(rows.iter().all(|r| &r[10] == "0xfei" && &r[19] == "0xAAA"));
}

#[test]
fn rewriting_overwrites_proposal_file_and_appends_master() {
    let dir = tempfile::tempdir().unwrap();
    let writer = DatasetWriter::new(dir.path().join("nested"), "master.csv").unwrap();
    let classifier = ActivistClassifier::new(&BTreeMap::new(), DEFAULT_THRESHOLD).unwrap();
    let proposal = proposal();
    let score = classifier.score_proposal(&proposal);

    let first = writer.write_proposal(&proposal, &score, &series()).unwrap();
    let second = writer.write_proposal(&proposal, &score, &series()).unwrap();
    assert_eq!(first.path, second.path);

    let (_, proposal_rows) = read_rows(&second.path);
    assert_eq!(proposal_rows.len(), 4);

    let (headers, master_rows) = read_rows(&dir.path().join("nested").join("master.csv"));
    assert_eq!(&headers[0], "timestamp");
    // Header once, rows twice.
    assert_eq!(master_rows.len(), 8);
    assert!(master_rows.iter().all(|r| &r[0] != "timestamp"));
}
