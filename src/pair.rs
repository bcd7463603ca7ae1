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

//! Domain/selector pairs and where they came from.

use crate::util::CanonicalStr;
use std::{
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
    str::FromStr,
};

/// A domain and a selector, naming one DKIM key location in DNS.
///
/// Equivalence comparison is ASCII case-insensitive.
#[derive(Clone, Debug)]
pub struct DomainAndSelector {
    pub domain: String,
    pub selector: String,
}

impl DomainAndSelector {
    pub fn new(domain: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            selector: selector.into(),
        }
    }

    /// Returns this pair with surrounding whitespace removed and in lower case,
    /// the form in which pairs are stored.
    pub fn normalized(&self) -> Self {
        Self {
            domain: self.domain.trim().to_lowercase(),
            selector: self.selector.trim().to_lowercase(),
        }
    }
}

impl Display for DomainAndSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}._domainkey.{}", self.selector, self.domain)
    }
}

impl PartialEq for DomainAndSelector {
    fn eq(&self, other: &Self) -> bool {
        self.domain.eq_ignore_ascii_case(&other.domain)
            && self.selector.eq_ignore_ascii_case(&other.selector)
    }
}

impl Eq for DomainAndSelector {}

impl Hash for DomainAndSelector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.domain.to_ascii_lowercase().hash(state);
        self.selector.to_ascii_lowercase().hash(state);
    }
}

/// The channel through which a domain/selector pair entered the archive.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SourceIdentifier {
    Top1mLookup,
    Api,
    SelectorGuesser,
    Seed,
    TrySelectors,
    ApiAuto,
    Scraper,
    PublicKeyGcdBatch,
    Unknown,
}

impl SourceIdentifier {
    pub const ALL: [Self; 9] = [
        Self::Top1mLookup,
        Self::Api,
        Self::SelectorGuesser,
        Self::Seed,
        Self::TrySelectors,
        Self::ApiAuto,
        Self::Scraper,
        Self::PublicKeyGcdBatch,
        Self::Unknown,
    ];

    /// Interprets a stored source string, mapping anything unrecognised to
    /// `Unknown`.
    pub fn from_str_lossy(s: &str) -> Self {
        s.parse().unwrap_or(Self::Unknown)
    }

    pub fn human_readable(&self) -> &'static str {
        match self {
            Self::Top1mLookup | Self::Scraper => "Scraped",
            Self::Api | Self::ApiAuto => "Inbox upload",
            Self::SelectorGuesser => "Selector guesser",
            Self::Seed => "Seed",
            Self::TrySelectors => "Try selectors",
            Self::PublicKeyGcdBatch => "Mail archive",
            Self::Unknown => "Unknown",
        }
    }
}

impl CanonicalStr for SourceIdentifier {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Top1mLookup => "top_1m_lookup",
            Self::Api => "api",
            Self::SelectorGuesser => "selector_guesser",
            Self::Seed => "seed",
            Self::TrySelectors => "try_selectors",
            Self::ApiAuto => "api_auto",
            Self::Scraper => "scraper",
            Self::PublicKeyGcdBatch => "public_key_gcd_batch",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for SourceIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseSourceIdentifierError;

impl Display for ParseSourceIdentifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown source identifier")
    }
}

impl std::error::Error for ParseSourceIdentifierError {}

impl FromStr for SourceIdentifier {
    type Err = ParseSourceIdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.canonical_str() == s)
            .ok_or(ParseSourceIdentifierError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn domain_and_selector_case_insensitive() {
        let a = DomainAndSelector::new("Example.COM", "Sel1");
        let b = DomainAndSelector::new("example.com", "sel1");

        assert_eq!(a, b);
        assert_eq!(HashSet::from([a.clone(), b]).len(), 1);

        assert_eq!(a.normalized().domain, "example.com");
        assert_eq!(a.normalized().selector, "sel1");
        assert_eq!(a.to_string(), "Sel1._domainkey.Example.COM");
    }

    #[test]
    fn source_identifier_round_trip_names() {
        assert_eq!("selector_guesser".parse(), Ok(SourceIdentifier::SelectorGuesser));
        assert_eq!(SourceIdentifier::from_str_lossy("nonsense"), SourceIdentifier::Unknown);
        assert_eq!(SourceIdentifier::Api.human_readable(), "Inbox upload");
        assert_eq!(SourceIdentifier::PublicKeyGcdBatch.to_string(), "public_key_gcd_batch");
    }
}
