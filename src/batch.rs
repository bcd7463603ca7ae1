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

//! Batch operations over many pairs.

use crate::{
    crypto::DerValidator,
    guesser,
    lookup::LookupTxt,
    pair::{DomainAndSelector, SourceIdentifier},
    store::{DomainSelectorPair, Store, StoreError},
    upsert::UpsertEngine,
};
use std::{collections::HashSet, time::Duration};
use tracing::{debug, info, warn};

/// Configuration for a periodic refresh run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchConfig {
    /// The maximum number of pairs refreshed in one run.
    pub batch_size: usize,

    /// Pairs last refreshed longer ago than this are refreshed.
    pub max_age: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// The result of a refresh run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// The pairs that were refreshed, as they were before the refresh.
    pub updated: Vec<DomainSelectorPair>,
    /// Alternatives newly added by selector guessing.
    pub added_alternatives: Vec<DomainAndSelector>,
    /// Pairs whose refresh failed.
    pub failures: Vec<(DomainSelectorPair, StoreError)>,
}

/// Refreshes the pairs that have gone longest without a refresh, and guesses
/// current selectors for each of them.
///
/// An error is returned only when the stale pairs cannot be selected. The
/// failure of a single pair is collected in the report.
pub async fn update_stale_pairs<S, L, V>(
    engine: &UpsertEngine<S, L, V>,
    config: &BatchConfig,
) -> Result<BatchReport, StoreError>
where
    S: Store + ?Sized,
    L: LookupTxt,
    V: DerValidator,
{
    let now = engine.config().now();
    let max_age = chrono::Duration::from_std(config.max_age)
        .map_err(|e| StoreError::Backend(format!("maximum age out of range: {e}")))?;

    let pairs = engine
        .store()
        .stale_pairs(now - max_age, config.batch_size)
        .await?;

    info!(count = pairs.len(), limit = config.batch_size, "refreshing stale pairs");

    let mut report = BatchReport::default();

    for pair in pairs {
        match engine.refresh_pair(&pair).await {
            Ok(new_record_count) => {
                debug!(%pair, new_record_count, "pair updated");

                let added =
                    guesser::guess_selectors(engine, &pair.domain, &pair.selector, now.date_naive())
                        .await;

                report.added_alternatives.extend(added);
                report.updated.push(pair);
            }
            Err(e) => {
                warn!(%pair, "could not update pair: {e}");
                report.failures.push((pair, e));
            }
        }
    }

    Ok(report)
}

/// Tries every selector with every domain, adding the pairs that publish a key.
///
/// Returns the pairs newly added.
pub async fn try_selectors<S, L, V, D, T>(
    engine: &UpsertEngine<S, L, V>,
    domains: &[D],
    selectors: &[T],
) -> Vec<DomainAndSelector>
where
    S: Store + ?Sized,
    L: LookupTxt,
    V: DerValidator,
    D: AsRef<str>,
    T: AsRef<str>,
{
    let mut found = vec![];

    for domain in domains {
        for selector in selectors {
            let (domain, selector) = (domain.as_ref(), selector.as_ref());

            match engine
                .add_or_refresh(domain, selector, SourceIdentifier::TrySelectors)
                .await
            {
                Ok(outcome) if outcome.created => {
                    found.push(DomainAndSelector::new(domain, selector).normalized());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(%domain, %selector, "could not try selector: {e}");
                }
            }
        }
    }

    info!(count = found.len(), "found new pairs");

    found
}

/// Parses tab-separated `domain<TAB>selector` lines.
///
/// Blank and malformed lines are skipped. Pairs occurring more than once are
/// returned once, in the position of their first occurrence.
pub fn parse_pairs_tsv(text: &str) -> Vec<DomainAndSelector> {
    let mut seen = HashSet::new();
    let mut pairs = vec![];

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split('\t').map(str::trim);
        let (domain, selector) = match (fields.next(), fields.next()) {
            (Some(domain), Some(selector)) if !domain.is_empty() && !selector.is_empty() => {
                (domain, selector)
            }
            _ => {
                warn!(line = i + 1, "selector or domain is empty, skipping line");
                continue;
            }
        };

        let pair = DomainAndSelector::new(domain, selector);
        if seen.insert(pair.clone()) {
            pairs.push(pair);
        }
    }

    pairs
}
