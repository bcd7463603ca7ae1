// dkim-archive – archive of historical DKIM public key records
// Copyright © 2023–2024 The dkim-archive contributors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! Persistent archive entities and the store they live in.
//!
//! A [`DomainSelectorPair`] is created once per case-insensitive
//! domain/selector identity and owns the history of [`DkimKeyRecord`]s seen
//! for it. History is append-only: records are never deleted, only their
//! `last_seen_at` moves forward and `provenance_verified` may flip to `true`.

mod memory;

pub use memory::MemoryStore;

use crate::{
    crypto::KeyType,
    pair::{DomainAndSelector, SourceIdentifier},
};
use chrono::{DateTime, Utc};
use std::{
    fmt::{self, Display, Formatter},
    future::Future,
    pin::Pin,
};
use thiserror::Error;

pub type PairId = u64;
pub type RecordId = u64;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint was violated.
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store failure: {0}")]
    Backend(String),
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainSelectorPair {
    pub id: PairId,
    pub domain: String,
    pub selector: String,
    pub source_identifier: SourceIdentifier,
    pub last_record_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DomainSelectorPair {
    pub fn domain_and_selector(&self) -> DomainAndSelector {
        DomainAndSelector::new(self.domain.clone(), self.selector.clone())
    }
}

impl Display for DomainSelectorPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}, {}, {}", self.id, self.domain, self.selector)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DkimKeyRecord {
    pub id: RecordId,
    pub pair_id: PairId,
    /// The raw TXT record value, exactly as published.
    pub value: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub provenance_verified: bool,
    pub key_type: KeyType,
    /// Normalized Base64 key data, empty for a revoked key, `None` when the
    /// key data could not be checked independently.
    pub key_data: Option<String>,
}

const DISPLAY_VALUE_LEN: usize = 50;

impl Display for DkimKeyRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.value.chars().count() > DISPLAY_VALUE_LEN {
            let truncated: String = self.value.chars().take(DISPLAY_VALUE_LEN - 1).collect();
            write!(f, "#{}, \"{truncated}…\"", self.id)
        } else {
            write!(f, "#{}, \"{}\"", self.id, self.value)
        }
    }
}

/// Data for a new domain/selector pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPair {
    pub domain: String,
    pub selector: String,
    pub source_identifier: SourceIdentifier,
    pub last_record_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Data for a key record sighted for the first time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRecord {
    pub value: String,
    pub seen_at: DateTime<Utc>,
    pub key_type: KeyType,
    pub key_data: Option<String>,
}

/// Persistence for the archive.
///
/// Implementations must enforce two uniqueness constraints and report their
/// violation as [`StoreError::Conflict`]: one pair per case-insensitive
/// domain/selector, and one record per pair and exact value.
pub trait Store: Send + Sync {
    /// Looks up a pair, comparing domain and selector case-insensitively.
    fn find_pair<'a>(
        &'a self,
        domain: &'a str,
        selector: &'a str,
    ) -> StoreFuture<'a, Option<DomainSelectorPair>>;

    /// Creates a pair together with its initial records, atomically.
    fn create_pair(
        &self,
        pair: NewPair,
        records: Vec<NewRecord>,
    ) -> StoreFuture<'_, (DomainSelectorPair, Vec<DkimKeyRecord>)>;

    fn find_record<'a>(
        &'a self,
        pair_id: PairId,
        value: &'a str,
    ) -> StoreFuture<'a, Option<DkimKeyRecord>>;

    fn create_record(&self, pair_id: PairId, record: NewRecord) -> StoreFuture<'_, DkimKeyRecord>;

    /// Records another sighting of an existing record.
    fn touch_record(
        &self,
        record_id: RecordId,
        seen_at: DateTime<Utc>,
    ) -> StoreFuture<'_, DkimKeyRecord>;

    fn set_last_record_update(
        &self,
        pair_id: PairId,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, DomainSelectorPair>;

    fn set_provenance_verified(&self, record_id: RecordId) -> StoreFuture<'_, ()>;

    fn records_of(&self, pair_id: PairId) -> StoreFuture<'_, Vec<DkimKeyRecord>>;

    /// Returns at most `limit` pairs last updated before the given instant,
    /// never-updated pairs first, then least recently updated first.
    fn stale_pairs(
        &self,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<DomainSelectorPair>>;

    /// Returns the records of all pairs whose domain is the query or a
    /// subdomain of it, leaving out bare revocation records (`p=`).
    fn find_records_by_domain<'a>(
        &'a self,
        query: &'a str,
    ) -> StoreFuture<'a, Vec<(DomainSelectorPair, DkimKeyRecord)>>;
}
