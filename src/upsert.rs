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

//! Adding and refreshing domain/selector pairs.
//!
//! The [`UpsertEngine`] is the entry point of the archive. Given a domain and
//! selector it decides whether the pair is new, recently refreshed, or due for
//! a refresh, and then resolves, validates, and persists its key records.
//!
//! A pair goes through the following states:
//!
//! * [`PairState::Unknown`]: no row exists. The pair is created only if at
//!   least one published value carries usable key material.
//! * [`PairState::KnownFresh`]: the pair was refreshed within the cooldown
//!   period; no DNS query is made.
//! * [`PairState::KnownStale`]: the cooldown has expired (or the pair was never
//!   refreshed); published values are re-resolved and merged into the history.

use crate::{
    crypto::{DerStructure, DerValidator},
    lookup::{self, LookupTxt},
    notary::{NotarizeJob, Notary, NotaryHandle, NotaryQueue, NotaryReport},
    pair::{DomainAndSelector, SourceIdentifier},
    record::KeyMaterial,
    store::{DkimKeyRecord, DomainSelectorPair, NewPair, NewRecord, Store, StoreError},
};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Configuration for an upsert engine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The maximum duration of public key record lookups. When this duration is
    /// exceeded, the lookup yields no records.
    pub lookup_timeout: Duration,

    /// The period after a refresh during which a pair is not looked up again.
    pub cooldown: Duration,

    /// The maximum duration of each step of a notarization.
    pub notarize_timeout: Duration,

    /// If given, this instant is used as the current time.
    pub fixed_time: Option<DateTime<Utc>>,
}

impl Config {
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.fixed_time.unwrap_or_else(Utc::now)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_millis(2500),
            cooldown: Duration::from_secs(60 * 60),
            notarize_timeout: Duration::from_secs(30),
            fixed_time: None,
        }
    }
}

/// The state of a domain/selector pair in the archive.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PairState {
    Unknown,
    KnownFresh,
    KnownStale,
}

/// The result of adding or refreshing a pair.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UpsertOutcome {
    /// Whether the pair was newly created.
    pub created: bool,
    /// The number of key records newly added to the pair's history.
    pub new_record_count: usize,
}

/// Adds domain/selector pairs to the archive and keeps their history current.
pub struct UpsertEngine<S: ?Sized, L, V = DerStructure> {
    store: Arc<S>,
    resolver: L,
    der_validator: V,
    notary: NotaryHandle,
    config: Config,
}

impl<S, L> UpsertEngine<S, L>
where
    S: Store + ?Sized,
    L: LookupTxt,
{
    /// Creates an engine validating RSA key data with [`DerStructure`] and
    /// without notarization.
    pub fn new(store: Arc<S>, resolver: L, config: Config) -> Self {
        Self {
            store,
            resolver,
            der_validator: DerStructure,
            notary: NotaryHandle::disabled(),
            config,
        }
    }
}

impl<S, L, V> UpsertEngine<S, L, V>
where
    S: Store + ?Sized,
    L: LookupTxt,
    V: DerValidator,
{
    pub fn with_der_validator<W: DerValidator>(self, der_validator: W) -> UpsertEngine<S, L, W> {
        UpsertEngine {
            store: self.store,
            resolver: self.resolver,
            der_validator,
            notary: self.notary,
            config: self.config,
        }
    }

    /// Sends records to be notarized to the given queue.
    pub fn with_notary_handle(mut self, notary: NotaryHandle) -> Self {
        self.notary = notary;
        self
    }

    /// Spawns a notary queue worker for this engine's store and routes all
    /// future notarizations to it.
    ///
    /// The worker exits once the engine (and any other handle to the queue)
    /// has been dropped and all pending jobs are done.
    pub fn spawn_notary<N>(&mut self, notary: Arc<N>) -> JoinHandle<NotaryReport>
    where
        S: 'static,
        N: Notary + ?Sized + 'static,
    {
        let (handle, worker) =
            NotaryQueue::spawn(self.store.clone(), notary, self.config.notarize_timeout);
        self.notary = handle;
        worker
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Reports the current state of the given pair.
    pub async fn state_of(&self, domain: &str, selector: &str) -> Result<PairState, StoreError> {
        let target = DomainAndSelector::new(domain, selector).normalized();

        let state = match self.store.find_pair(&target.domain, &target.selector).await? {
            None => PairState::Unknown,
            Some(pair) => self.classify(&pair, self.config.now()),
        };

        Ok(state)
    }

    fn classify(&self, pair: &DomainSelectorPair, now: DateTime<Utc>) -> PairState {
        let Some(last_update) = pair.last_record_update else {
            return PairState::KnownStale;
        };

        // an update timestamp in the future counts as fresh
        let elapsed = now.signed_duration_since(last_update).to_std().unwrap_or_default();

        if elapsed < self.config.cooldown {
            PairState::KnownFresh
        } else {
            PairState::KnownStale
        }
    }

    /// Adds a new pair to the archive or refreshes an existing one.
    ///
    /// Domain and selector are normalized to lower case. Lookup failures and
    /// unusable record values are not errors: they result in no records. Only
    /// store failures are returned as errors.
    pub async fn add_or_refresh(
        &self,
        domain: &str,
        selector: &str,
        source: SourceIdentifier,
    ) -> Result<UpsertOutcome, StoreError> {
        let target = DomainAndSelector::new(domain, selector).normalized();
        let now = self.config.now();

        let existing = self.store.find_pair(&target.domain, &target.selector).await?;

        let pair = match existing {
            Some(pair) => pair,
            None => return self.create_pair(target, source, now).await,
        };

        if self.classify(&pair, now) == PairState::KnownFresh {
            debug!(%pair, "pair refreshed recently, skipping lookup");
            return Ok(UpsertOutcome::default());
        }

        let new_record_count = self.refresh_at(&pair, now).await?;

        Ok(UpsertOutcome {
            created: false,
            new_record_count,
        })
    }

    /// Refreshes a pair regardless of its cooldown.
    ///
    /// Returns the number of newly added key records.
    pub async fn refresh_pair(&self, pair: &DomainSelectorPair) -> Result<usize, StoreError> {
        self.refresh_at(pair, self.config.now()).await
    }

    async fn create_pair(
        &self,
        target: DomainAndSelector,
        source: SourceIdentifier,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let records = self.resolve_records(&target, now).await;

        if records.is_empty() {
            info!(%target, "no usable key records published, pair not added");
            return Ok(UpsertOutcome::default());
        }

        let new_pair = NewPair {
            domain: target.domain.clone(),
            selector: target.selector.clone(),
            source_identifier: source,
            last_record_update: Some(now),
            created_at: now,
        };

        match self.store.create_pair(new_pair, records.clone()).await {
            Ok((pair, created)) => {
                info!(%pair, records = created.len(), %source, "pair added");

                for record in &created {
                    self.schedule_notarization(&pair, record);
                }

                Ok(UpsertOutcome {
                    created: true,
                    new_record_count: created.len(),
                })
            }
            Err(StoreError::Conflict(e)) => {
                debug!(%target, "pair created concurrently, merging records: {e}");

                let pair = self
                    .store
                    .find_pair(&target.domain, &target.selector)
                    .await?
                    .ok_or(StoreError::Conflict(e))?;

                let new_record_count = self.merge_records(&pair, records, now).await?;

                Ok(UpsertOutcome {
                    created: false,
                    new_record_count,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_at(
        &self,
        pair: &DomainSelectorPair,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let records = self.resolve_records(&pair.domain_and_selector(), now).await;

        self.merge_records(pair, records, now).await
    }

    /// Resolves the published values and keeps those with usable key material,
    /// each distinct value once.
    async fn resolve_records(&self, target: &DomainAndSelector, now: DateTime<Utc>) -> Vec<NewRecord> {
        let values = lookup::resolve_key_records(
            &self.resolver,
            &target.domain,
            &target.selector,
            self.config.lookup_timeout,
        )
        .await;

        let mut records: Vec<NewRecord> = Vec::with_capacity(values.len());

        for value in values {
            if records.iter().any(|r| r.value == value) {
                trace!(%target, "skipping repeated record value");
                continue;
            }

            match KeyMaterial::from_record_value(&value, &self.der_validator) {
                Ok(key) => {
                    trace!(%target, key_type = %key.key_type, revoked = key.is_revoked(), "usable key record");

                    records.push(NewRecord {
                        value,
                        seen_at: now,
                        key_type: key.key_type,
                        key_data: Some(key.key_data_base64),
                    });
                }
                Err(e) => {
                    warn!(%target, "ignoring key record: {e}");
                }
            }
        }

        records
    }

    async fn merge_records(
        &self,
        pair: &DomainSelectorPair,
        records: Vec<NewRecord>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut new_record_count = 0;

        for record in records {
            let record = match self.store.find_record(pair.id, &record.value).await? {
                Some(existing) => self.store.touch_record(existing.id, now).await?,
                None => match self.store.create_record(pair.id, record.clone()).await {
                    Ok(created) => {
                        info!(%pair, record = %created, "new key record");
                        new_record_count += 1;
                        created
                    }
                    Err(StoreError::Conflict(e)) => {
                        debug!(%pair, "record created concurrently: {e}");

                        let existing = self
                            .store
                            .find_record(pair.id, &record.value)
                            .await?
                            .ok_or(StoreError::Conflict(e))?;

                        self.store.touch_record(existing.id, now).await?
                    }
                    Err(e) => return Err(e),
                },
            };

            if !record.provenance_verified {
                self.schedule_notarization(pair, &record);
            }
        }

        self.store.set_last_record_update(pair.id, now).await?;

        debug!(%pair, new_record_count, "pair refreshed");

        Ok(new_record_count)
    }

    fn schedule_notarization(&self, pair: &DomainSelectorPair, record: &DkimKeyRecord) {
        self.notary.schedule(NotarizeJob {
            pair: pair.domain_and_selector(),
            record_id: record.id,
            value: record.value.clone(),
        });
    }
}
