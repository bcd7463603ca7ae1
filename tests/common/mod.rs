use chrono::{DateTime, TimeZone, Utc};
use dkim_archive::{
    notary::{Notary, NotaryFuture},
    store::{
        DkimKeyRecord, DomainSelectorPair, MemoryStore, NewPair, NewRecord, PairId, RecordId,
        Store, StoreError, StoreFuture,
    },
    LookupTxt,
};
use std::{
    collections::HashMap,
    future::Future,
    io::{self, ErrorKind},
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

pub const RSA_KEY_BASE64: &str = "\
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAvXEn6j24wx68Zs5djoKQ\
LFXcGUUPzvAAfrc9RKzBQG+dglfdCqZy2ZFai4SlLivvkkCU+0wXl+ExSSY5xEiQ\
k7m3YQZbeIAeSWUTLe7asTri73c7nX5D7+1KKWUarMHKLeWN5F9Re8uOfWrgZdYC\
20bfoptbMQLLPcbfchP9Z7epZRwdi6xeZySFO2JnwyK2kEay7VpF7YivwQzMohF2\
hlQ9OshDIa2w7uudKp5jAcOVymPTi3iu6tEI/3NNkcezukVawN6bLkZf6IEE3Gap\
2oD3pidf51iAfb7BBbeE36Hl3dPxAgfsSrc/v2HTRMYeeBb7fjFC50ImvxjtmFUI\
xQIDAQAB";

pub const ED25519_KEY_BASE64: &str = "11qYAYKxCrfVS/7TyWQHOg7hcvPapiMlrwIaaPcHURo=";

pub fn rsa_record() -> String {
    format!("v=DKIM1; k=rsa; p={RSA_KEY_BASE64}")
}

pub fn ed25519_record() -> String {
    format!("v=DKIM1; k=ed25519; p={ED25519_KEY_BASE64}")
}

pub fn time(h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 22, h, min, 0).unwrap()
}

pub type LookupOutput = Vec<io::Result<Vec<Vec<u8>>>>;
pub type LookupFuture<'a> = Pin<Box<dyn Future<Output = io::Result<LookupOutput>> + Send + 'a>>;

#[derive(Clone)]
pub struct MockLookup(Arc<dyn Fn(&str) -> LookupFuture<'_> + Send + Sync>);

impl MockLookup {
    pub fn new(f: impl Fn(&str) -> LookupFuture<'_> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl LookupTxt for MockLookup {
    type Answer = LookupOutput;
    type Query<'a> = Pin<Box<dyn Future<Output = io::Result<Self::Answer>> + Send + 'a>>;

    fn lookup_txt(&self, domain: &str) -> Self::Query<'_> {
        let domain = domain.to_owned();

        Box::pin(async move { self.0(&domain).await })
    }
}

/// A DNS zone that can be changed while an engine is using it.
#[derive(Clone, Default)]
pub struct MockZone {
    records: Arc<Mutex<HashMap<String, Vec<String>>>>,
    queries: Arc<AtomicUsize>,
}

impl MockZone {
    pub fn new() -> Self {
        Default::default()
    }

    /// Publishes the given TXT records at `selector._domainkey.domain.`,
    /// replacing earlier ones.
    pub fn publish(&self, domain: &str, selector: &str, values: &[&str]) {
        let name = format!("{selector}._domainkey.{domain}.");
        let values = values.iter().map(|v| v.to_string()).collect();
        self.records.lock().unwrap().insert(name, values);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Returns a resolver answering from this zone, splitting each record into
    /// chunks of at most 255 bytes as DNS does.
    pub fn lookup(&self) -> MockLookup {
        let zone = self.clone();

        MockLookup::new(move |name| {
            zone.queries.fetch_add(1, Ordering::SeqCst);
            let values = zone.records.lock().unwrap().get(name).cloned();

            Box::pin(async move {
                let answer: io::Result<LookupOutput> = match values {
                    Some(values) => Ok(values
                        .into_iter()
                        .map(|v| Ok(v.as_bytes().chunks(255).map(|c| c.to_vec()).collect()))
                        .collect()),
                    None => Err(ErrorKind::NotFound.into()),
                };
                answer
            })
        })
    }
}

/// A notary that records submitted leaf hashes.
#[derive(Default)]
pub struct MockNotary {
    pub posted: Mutex<Vec<String>>,
    pub unavailable: AtomicBool,
}

impl Notary for MockNotary {
    type Proof = String;

    fn post_leaf_and_get_timestamp<'a>(
        &'a self,
        leaf_hash: &'a str,
    ) -> NotaryFuture<'a, DateTime<Utc>> {
        Box::pin(async move {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(io::Error::new(ErrorKind::ConnectionRefused, "notary unavailable"));
            }
            self.posted.lock().unwrap().push(leaf_hash.to_owned());
            Ok(time(0, 0))
        })
    }

    fn get_proof_for_leaf_hash<'a>(&'a self, leaf_hash: &'a str) -> NotaryFuture<'a, String> {
        Box::pin(async move { Ok(format!("proof:{leaf_hash}")) })
    }

    fn verify_proof_chain<'a>(&'a self, proof: &'a String) -> NotaryFuture<'a, bool> {
        Box::pin(async move { Ok(proof.starts_with("proof:")) })
    }
}

/// A memory store that can simulate concurrent writers and failures.
#[derive(Default)]
pub struct TestStore {
    pub inner: MemoryStore,
    /// When set, a competing writer creates the pair (with only its first
    /// record) just before the next pair creation.
    pub race_pair_creation: AtomicBool,
    /// When set, a competing writer creates the record just before the next
    /// record creation.
    pub race_record_creation: AtomicBool,
    /// Pairs for which record lookups fail.
    pub broken_pairs: Mutex<Vec<PairId>>,
}

impl TestStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn break_pair(&self, pair_id: PairId) {
        self.broken_pairs.lock().unwrap().push(pair_id);
    }
}

impl Store for TestStore {
    fn find_pair<'a>(
        &'a self,
        domain: &'a str,
        selector: &'a str,
    ) -> StoreFuture<'a, Option<DomainSelectorPair>> {
        self.inner.find_pair(domain, selector)
    }

    fn create_pair(
        &self,
        pair: NewPair,
        records: Vec<NewRecord>,
    ) -> StoreFuture<'_, (DomainSelectorPair, Vec<DkimKeyRecord>)> {
        if !self.race_pair_creation.swap(false, Ordering::SeqCst) {
            return self.inner.create_pair(pair, records);
        }

        Box::pin(async move {
            let competing = records.iter().take(1).cloned().collect();
            self.inner.create_pair(pair.clone(), competing).await?;
            self.inner.create_pair(pair, records).await
        })
    }

    fn find_record<'a>(
        &'a self,
        pair_id: PairId,
        value: &'a str,
    ) -> StoreFuture<'a, Option<DkimKeyRecord>> {
        if self.broken_pairs.lock().unwrap().contains(&pair_id) {
            return Box::pin(async { Err(StoreError::Backend("connection reset".into())) });
        }
        self.inner.find_record(pair_id, value)
    }

    fn create_record(&self, pair_id: PairId, record: NewRecord) -> StoreFuture<'_, DkimKeyRecord> {
        if !self.race_record_creation.swap(false, Ordering::SeqCst) {
            return self.inner.create_record(pair_id, record);
        }

        Box::pin(async move {
            self.inner.create_record(pair_id, record.clone()).await?;
            self.inner.create_record(pair_id, record).await
        })
    }

    fn touch_record(
        &self,
        record_id: RecordId,
        seen_at: DateTime<Utc>,
    ) -> StoreFuture<'_, DkimKeyRecord> {
        self.inner.touch_record(record_id, seen_at)
    }

    fn set_last_record_update(
        &self,
        pair_id: PairId,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, DomainSelectorPair> {
        self.inner.set_last_record_update(pair_id, at)
    }

    fn set_provenance_verified(&self, record_id: RecordId) -> StoreFuture<'_, ()> {
        self.inner.set_provenance_verified(record_id)
    }

    fn records_of(&self, pair_id: PairId) -> StoreFuture<'_, Vec<DkimKeyRecord>> {
        self.inner.records_of(pair_id)
    }

    fn stale_pairs(
        &self,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<DomainSelectorPair>> {
        self.inner.stale_pairs(updated_before, limit)
    }

    fn find_records_by_domain<'a>(
        &'a self,
        query: &'a str,
    ) -> StoreFuture<'a, Vec<(DomainSelectorPair, DkimKeyRecord)>> {
        self.inner.find_records_by_domain(query)
    }
}
