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

//! Guessing of current selectors from dated selectors.
//!
//! Many domains rotate keys under selectors carrying the rotation date, for
//! example `s20230131` or `key-01312023`. Given one such selector, a current
//! selector is guessed by replacing the date with a reference date. Dates are
//! recognised only when their year is the reference year or one of the two
//! years before it.

use crate::{
    crypto::DerValidator,
    lookup::LookupTxt,
    pair::{DomainAndSelector, SourceIdentifier},
    store::Store,
    upsert::UpsertEngine,
};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use tracing::{debug, info, warn};

/// Returns alternative domain/selector pairs in which a date found in the
/// selector is replaced with the reference date.
///
/// A date in the form `YYYYMMDD` yields at most one alternative. A date in the
/// form `AABBYYYY` is read both as month-day and as day-month; each reading
/// that is a valid calendar date yields one alternative. The date is replaced
/// in the domain too, where it occurs there.
pub fn find_alternatives(
    domain: &str,
    selector: &str,
    reference_date: NaiveDate,
) -> Vec<DomainAndSelector> {
    let year = reference_date.year();
    let years = format!("({}|{}|{})", year, year - 1, year - 2);

    let mut alternatives = vec![];

    // YYYYDDMM is not in use anywhere and is not considered
    if let Some((old, [y, m, d])) = find_date(&format!("{years}([0-9]{{2}})([0-9]{{2}})"), selector) {
        if is_valid_date(y, m, d) {
            let new = reference_date.format("%Y%m%d").to_string();
            alternatives.push(replace_date(domain, selector, &old, &new));
        }
    }

    if let Some((old, [a, b, y])) = find_date(&format!("([0-9]{{2}})([0-9]{{2}}){years}"), selector) {
        if is_valid_date(y, a, b) {
            let new = reference_date.format("%m%d%Y").to_string();
            alternatives.push(replace_date(domain, selector, &old, &new));
        }
        if is_valid_date(y, b, a) {
            let new = reference_date.format("%d%m%Y").to_string();
            alternatives.push(replace_date(domain, selector, &old, &new));
        }
    }

    alternatives
}

/// Finds the first match of a date pattern with three numeric groups.
fn find_date(pattern: &str, selector: &str) -> Option<(String, [u32; 3])> {
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!(%pattern, "invalid date pattern: {e}");
            return None;
        }
    };

    let caps = re.captures(selector)?;

    let mut parts = [0; 3];
    for (part, i) in parts.iter_mut().zip(1..) {
        *part = caps.get(i)?.as_str().parse().ok()?;
    }

    Some((caps[0].to_owned(), parts))
}

fn is_valid_date(year: u32, month: u32, day: u32) -> bool {
    i32::try_from(year)
        .ok()
        .and_then(|year| NaiveDate::from_ymd_opt(year, month, day))
        .is_some()
}

fn replace_date(domain: &str, selector: &str, old: &str, new: &str) -> DomainAndSelector {
    DomainAndSelector::new(domain.replacen(old, new, 1), selector.replacen(old, new, 1))
}

/// Adds the alternatives guessed for a pair to the archive.
///
/// Returns the alternatives that were newly created. A store failure for one
/// alternative is logged and does not prevent trying the others.
pub async fn guess_selectors<S, L, V>(
    engine: &UpsertEngine<S, L, V>,
    domain: &str,
    selector: &str,
    reference_date: NaiveDate,
) -> Vec<DomainAndSelector>
where
    S: Store + ?Sized,
    L: LookupTxt,
    V: DerValidator,
{
    let mut added = vec![];

    for alternative in find_alternatives(domain, selector, reference_date) {
        debug!(%alternative, "trying guessed alternative");

        match engine
            .add_or_refresh(&alternative.domain, &alternative.selector, SourceIdentifier::SelectorGuesser)
            .await
        {
            Ok(outcome) if outcome.created => {
                info!(%alternative, "added guessed alternative");
                added.push(alternative);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%alternative, "could not add guessed alternative: {e}");
            }
        }
    }

    added
}
