pub mod common;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use common::{MockZone, TestStore};
use dkim_archive::{
    batch::{self, BatchConfig},
    guesser, Config, DomainAndSelector, MemoryStore, SourceIdentifier, Store, UpsertEngine,
};
use std::sync::Arc;

fn nov(day: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, day, h, 0, 0).unwrap()
}

fn engine_at<S: Store + ?Sized>(
    store: &Arc<S>,
    zone: &MockZone,
    now: DateTime<Utc>,
) -> UpsertEngine<S, common::MockLookup> {
    let config = Config {
        fixed_time: Some(now),
        ..Default::default()
    };
    UpsertEngine::new(store.clone(), zone.lookup(), config)
}

async fn add_at<S: Store + ?Sized>(
    store: &Arc<S>,
    zone: &MockZone,
    now: DateTime<Utc>,
    domain: &str,
    selector: &str,
) {
    let outcome = engine_at(store, zone, now)
        .add_or_refresh(domain, selector, SourceIdentifier::Seed)
        .await
        .unwrap();
    assert!(outcome.created);
}

#[tokio::test]
async fn update_stale_pairs_oldest_first() {
    let _ = tracing_subscriber::fmt::try_init();

    let zone = MockZone::new();
    for domain in ["a.example", "b.example", "c.example", "d.example"] {
        zone.publish(domain, "sel", &[&common::rsa_record()]);
    }

    let store = Arc::new(MemoryStore::new());
    add_at(&store, &zone, nov(20, 14), "c.example", "sel").await;
    add_at(&store, &zone, nov(20, 12), "a.example", "sel").await;
    add_at(&store, &zone, nov(20, 13), "b.example", "sel").await;
    add_at(&store, &zone, nov(22, 12), "d.example", "sel").await;

    let engine = engine_at(&store, &zone, nov(22, 15));
    let config = BatchConfig {
        batch_size: 2,
        ..Default::default()
    };

    let report = batch::update_stale_pairs(&engine, &config).await.unwrap();

    let updated: Vec<_> = report.updated.iter().map(|p| p.domain.as_str()).collect();
    assert_eq!(updated, ["a.example", "b.example"]);
    assert!(report.added_alternatives.is_empty());
    assert!(report.failures.is_empty());

    let pair = store.find_pair("a.example", "sel").await.unwrap().unwrap();
    assert_eq!(pair.last_record_update, Some(nov(22, 15)));

    let report = batch::update_stale_pairs(&engine, &config).await.unwrap();

    let updated: Vec<_> = report.updated.iter().map(|p| p.domain.as_str()).collect();
    assert_eq!(updated, ["c.example"]);
}

#[tokio::test]
async fn update_stale_pairs_guesses_current_selector() {
    let _ = tracing_subscriber::fmt::try_init();

    let zone = MockZone::new();
    zone.publish("example.com", "s20230131", &[&common::rsa_record()]);
    zone.publish("example.com", "s20241122", &[&common::ed25519_record()]);

    let store = Arc::new(MemoryStore::new());
    add_at(&store, &zone, nov(20, 12), "example.com", "s20230131").await;

    let engine = engine_at(&store, &zone, nov(22, 12));

    let report = batch::update_stale_pairs(&engine, &BatchConfig::default())
        .await
        .unwrap();

    assert_eq!(report.updated.len(), 1);
    assert_eq!(
        report.added_alternatives,
        [DomainAndSelector::new("example.com", "s20241122")]
    );

    let pair = store.find_pair("example.com", "s20241122").await.unwrap().unwrap();
    assert_eq!(pair.source_identifier, SourceIdentifier::SelectorGuesser);
}

#[tokio::test]
async fn update_stale_pairs_continues_after_failure() {
    let _ = tracing_subscriber::fmt::try_init();

    let zone = MockZone::new();
    zone.publish("a.example", "sel", &[&common::rsa_record()]);
    zone.publish("b.example", "sel", &[&common::rsa_record()]);

    let store = Arc::new(TestStore::new());
    add_at(&store, &zone, nov(20, 12), "a.example", "sel").await;
    add_at(&store, &zone, nov(20, 13), "b.example", "sel").await;

    let broken = store.find_pair("a.example", "sel").await.unwrap().unwrap();
    store.break_pair(broken.id);

    let engine = engine_at(&store, &zone, nov(22, 12));

    let report = batch::update_stale_pairs(&engine, &BatchConfig::default())
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, broken);
    assert_eq!(report.updated.len(), 1);
    assert_eq!(report.updated[0].domain, "b.example");
}

#[tokio::test]
async fn guess_selectors_adds_only_new_pairs() {
    let _ = tracing_subscriber::fmt::try_init();

    let zone = MockZone::new();
    zone.publish("example.com", "k11222024", &[&common::rsa_record()]);
    zone.publish("example.com", "k22112024", &[&common::rsa_record()]);

    let store = Arc::new(MemoryStore::new());
    add_at(&store, &zone, nov(22, 9), "example.com", "k22112024").await;

    let engine = engine_at(&store, &zone, nov(22, 12));
    let date = NaiveDate::from_ymd_opt(2024, 11, 22).unwrap();

    let added = guesser::guess_selectors(&engine, "example.com", "k12122023", date).await;

    assert_eq!(added, [DomainAndSelector::new("example.com", "k11222024")]);
}

#[tokio::test]
async fn try_selectors_probes_cross_product() {
    let _ = tracing_subscriber::fmt::try_init();

    let zone = MockZone::new();
    zone.publish("a.example", "google", &[&common::rsa_record()]);
    zone.publish("b.example", "selector1", &[&common::rsa_record()]);

    let store = Arc::new(MemoryStore::new());
    let engine = engine_at(&store, &zone, nov(22, 12));

    let domains = ["a.example", "B.example"];
    let selectors = ["google", "selector1", "default"];

    let found = batch::try_selectors(&engine, &domains, &selectors).await;

    assert_eq!(
        found,
        [
            DomainAndSelector::new("a.example", "google"),
            DomainAndSelector::new("b.example", "selector1"),
        ]
    );
    assert_eq!(zone.query_count(), 6);

    let pair = store.find_pair("b.example", "selector1").await.unwrap().unwrap();
    assert_eq!(pair.source_identifier, SourceIdentifier::TrySelectors);

    let found = batch::try_selectors(&engine, &domains, &selectors).await;
    assert!(found.is_empty());
}

#[test]
fn tsv_input_feeds_pairs() {
    let pairs = batch::parse_pairs_tsv("example.com\tsel\nexample.org\tdefault\n");

    assert_eq!(
        pairs,
        [
            DomainAndSelector::new("example.com", "sel"),
            DomainAndSelector::new("example.org", "default"),
        ]
    );
}
