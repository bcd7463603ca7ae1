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

//! DNS lookup of DKIM public key records.

#[cfg(feature = "hickory-resolver")]
mod hickory_resolver;

use std::{
    future::Future,
    io::{self, ErrorKind},
    time::Duration,
};
use tokio::time;
use tracing::{debug, trace, warn};

/// A trait for looking up DNS TXT records containing DKIM public key records.
///
/// The error type used here is `std::io::Error`. The following error kinds on
/// the query result are recognised and logged accordingly; all of them, like
/// any other error, result in no records being found.
///
/// * `ErrorKind::InvalidInput` on the query: the domain argument could not be used
/// * `ErrorKind::NotFound` on the query: NXDOMAIN, no key record found
/// * `ErrorKind::TimedOut` on the query: timeout
///
/// Each answer item is one TXT record, given as its list of character-strings
/// in wire order. The inner, per-record `std::io::Error` can be used to signal
/// errors with individual TXT records.
pub trait LookupTxt: Send + Sync {
    /// The answer consisting of TXT records found.
    type Answer: IntoIterator<Item = io::Result<Vec<Vec<u8>>>>;
    /// The future resolving to the query’s answer.
    type Query<'a>: Future<Output = io::Result<Self::Answer>> + Send + 'a
    where
        Self: 'a;

    /// Looks up the domain’s TXT records in DNS.
    ///
    /// The domain will be passed to this trait as a string in A-label (ASCII)
    /// format with a trailing dot (eg `selector._domainkey.example.com.`).
    fn lookup_txt(&self, domain: &str) -> Self::Query<'_>;
}

/// Returns the absolute DNS name at which the key for the given selector is
/// published.
pub fn query_name(domain: &str, selector: &str) -> String {
    let name = format!("{selector}._domainkey.{domain}");

    // Labels that do not survive IDNA conversion are queried as given; the
    // resolver decides whether it can use them.
    let name = idna::domain_to_ascii(&name).unwrap_or(name);

    format!("{name}.")
}

/// Looks up all DKIM key records published for the domain and selector.
///
/// The character-strings of each TXT record are concatenated without
/// separator. Every record found is returned, in answer order. Lookup errors,
/// NXDOMAIN and timeouts are not errors here: they simply yield no records.
pub async fn resolve_key_records<T>(
    resolver: &T,
    domain: &str,
    selector: &str,
    timeout: Duration,
) -> Vec<String>
where
    T: LookupTxt + ?Sized,
{
    let qname = query_name(domain, selector);

    trace!(%qname, "looking up DKIM key records");

    let answer = match time::timeout(timeout, resolver.lookup_txt(&qname)).await {
        Ok(Ok(answer)) => answer,
        Ok(Err(e)) => {
            match e.kind() {
                ErrorKind::NotFound => debug!(%qname, "no key record found"),
                ErrorKind::TimedOut => debug!(%qname, "key record lookup timed out"),
                ErrorKind::InvalidInput => warn!(%qname, "invalid query name"),
                _ => warn!(%qname, "key record lookup failed: {e}"),
            }
            return vec![];
        }
        Err(_) => {
            debug!(%qname, ?timeout, "key record lookup timed out");
            return vec![];
        }
    };

    let mut records = vec![];

    for (i, txt) in answer.into_iter().enumerate() {
        match txt.and_then(join_chunks) {
            Ok(value) => records.push(value),
            Err(e) => warn!(%qname, index = i, "ignoring unusable TXT record: {e}"),
        }
    }

    debug!(%qname, count = records.len(), "found TXT records");

    records
}

fn join_chunks(chunks: Vec<Vec<u8>>) -> io::Result<String> {
    String::from_utf8(chunks.concat())
        .map_err(|_| io::Error::new(ErrorKind::InvalidData, "TXT record is not valid UTF-8"))
}
