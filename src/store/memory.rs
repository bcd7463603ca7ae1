use crate::store::{
    DkimKeyRecord, DomainSelectorPair, NewPair, NewRecord, PairId, RecordId, Store, StoreError,
    StoreFuture,
};
use chrono::{DateTime, Utc};
use std::{
    future,
    sync::{Mutex, MutexGuard},
};

#[derive(Default)]
struct Tables {
    next_id: u64,
    pairs: Vec<DomainSelectorPair>,
    records: Vec<DkimKeyRecord>,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn pair(&self, domain: &str, selector: &str) -> Option<&DomainSelectorPair> {
        self.pairs.iter().find(|p| {
            p.domain.eq_ignore_ascii_case(domain) && p.selector.eq_ignore_ascii_case(selector)
        })
    }

    fn pair_mut(&mut self, pair_id: PairId) -> Result<&mut DomainSelectorPair, StoreError> {
        self.pairs
            .iter_mut()
            .find(|p| p.id == pair_id)
            .ok_or_else(|| StoreError::NotFound(format!("domain/selector pair #{pair_id}")))
    }

    fn record_mut(&mut self, record_id: RecordId) -> Result<&mut DkimKeyRecord, StoreError> {
        self.records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| StoreError::NotFound(format!("record #{record_id}")))
    }

    fn has_record(&self, pair_id: PairId, value: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.pair_id == pair_id && r.value == value)
    }

    fn insert_record(&mut self, pair_id: PairId, record: NewRecord) -> DkimKeyRecord {
        let record = DkimKeyRecord {
            id: self.next_id(),
            pair_id,
            value: record.value,
            first_seen_at: record.seen_at,
            last_seen_at: record.seen_at,
            provenance_verified: false,
            key_type: record.key_type,
            key_data: record.key_data,
        };
        self.records.push(record.clone());
        record
    }
}

/// A store keeping the archive in memory.
///
/// Each operation runs under a single lock, so every operation is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }

    fn with_tables<T, F>(&self, f: F) -> StoreFuture<'_, T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Tables) -> Result<T, StoreError>,
    {
        let result = self.lock().and_then(|mut tables| f(&mut *tables));
        Box::pin(future::ready(result))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

impl Store for MemoryStore {
    fn find_pair<'a>(
        &'a self,
        domain: &'a str,
        selector: &'a str,
    ) -> StoreFuture<'a, Option<DomainSelectorPair>> {
        self.with_tables(|t| Ok(t.pair(domain, selector).cloned()))
    }

    fn create_pair(
        &self,
        pair: NewPair,
        records: Vec<NewRecord>,
    ) -> StoreFuture<'_, (DomainSelectorPair, Vec<DkimKeyRecord>)> {
        self.with_tables(move |t| {
            if t.pair(&pair.domain, &pair.selector).is_some() {
                return Err(StoreError::Conflict(format!(
                    "domain/selector pair {}, {}",
                    pair.domain, pair.selector
                )));
            }
            for (i, record) in records.iter().enumerate() {
                if records[..i].iter().any(|r| r.value == record.value) {
                    return Err(StoreError::Conflict(format!("record value {:?}", record.value)));
                }
            }

            let pair = DomainSelectorPair {
                id: t.next_id(),
                domain: pair.domain,
                selector: pair.selector,
                source_identifier: pair.source_identifier,
                last_record_update: pair.last_record_update,
                created_at: pair.created_at,
            };
            t.pairs.push(pair.clone());

            let records = records
                .into_iter()
                .map(|r| t.insert_record(pair.id, r))
                .collect::<Vec<_>>();

            Ok((pair, records))
        })
    }

    fn find_record<'a>(
        &'a self,
        pair_id: PairId,
        value: &'a str,
    ) -> StoreFuture<'a, Option<DkimKeyRecord>> {
        self.with_tables(move |t| {
            Ok(t.records
                .iter()
                .find(|r| r.pair_id == pair_id && r.value == value)
                .cloned())
        })
    }

    fn create_record(&self, pair_id: PairId, record: NewRecord) -> StoreFuture<'_, DkimKeyRecord> {
        self.with_tables(move |t| {
            t.pair_mut(pair_id)?;
            if t.has_record(pair_id, &record.value) {
                return Err(StoreError::Conflict(format!("record value {:?}", record.value)));
            }
            Ok(t.insert_record(pair_id, record))
        })
    }

    fn touch_record(
        &self,
        record_id: RecordId,
        seen_at: DateTime<Utc>,
    ) -> StoreFuture<'_, DkimKeyRecord> {
        self.with_tables(move |t| {
            let record = t.record_mut(record_id)?;
            record.last_seen_at = record.last_seen_at.max(seen_at);
            Ok(record.clone())
        })
    }

    fn set_last_record_update(
        &self,
        pair_id: PairId,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, DomainSelectorPair> {
        self.with_tables(move |t| {
            let pair = t.pair_mut(pair_id)?;
            pair.last_record_update = Some(at);
            Ok(pair.clone())
        })
    }

    fn set_provenance_verified(&self, record_id: RecordId) -> StoreFuture<'_, ()> {
        self.with_tables(move |t| {
            t.record_mut(record_id)?.provenance_verified = true;
            Ok(())
        })
    }

    fn records_of(&self, pair_id: PairId) -> StoreFuture<'_, Vec<DkimKeyRecord>> {
        self.with_tables(move |t| {
            Ok(t.records
                .iter()
                .filter(|r| r.pair_id == pair_id)
                .cloned()
                .collect::<Vec<_>>())
        })
    }

    fn stale_pairs(
        &self,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<DomainSelectorPair>> {
        self.with_tables(move |t| {
            let mut stale: Vec<_> = t
                .pairs
                .iter()
                .filter(|p| match p.last_record_update {
                    Some(at) => at < updated_before,
                    None => true,
                })
                .cloned()
                .collect();

            // None sorts before Some
            stale.sort_by_key(|p| (p.last_record_update, p.id));
            stale.truncate(limit);

            Ok(stale)
        })
    }

    fn find_records_by_domain<'a>(
        &'a self,
        query: &'a str,
    ) -> StoreFuture<'a, Vec<(DomainSelectorPair, DkimKeyRecord)>> {
        self.with_tables(move |t| {
            let query = query.to_ascii_lowercase();
            let suffix = format!(".{query}");

            let mut found = vec![];
            for pair in &t.pairs {
                let domain = pair.domain.to_ascii_lowercase();
                if domain != query && !domain.ends_with(&suffix) {
                    continue;
                }
                for record in t.records.iter().filter(|r| r.pair_id == pair.id) {
                    if record.value != "p=" {
                        found.push((pair.clone(), record.clone()));
                    }
                }
            }

            Ok(found)
        })
    }
}
