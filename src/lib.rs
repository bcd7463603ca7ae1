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

//! A library archiving the history of DKIM public key records published in
//! DNS, as described in [RFC 6376].
//!
//! DKIM keys are rotated and old keys disappear from DNS, which makes it
//! impossible to check old signatures later. This library keeps every key
//! record ever seen for a domain and selector, together with the time it was
//! first and last seen, and has each record notarized by an external
//! timestamping service.
//!
//! # Usage
//!
//! The type [`UpsertEngine`] provides the entry point: it resolves the key
//! records of a domain/selector pair, validates their key material, and
//! persists them to a [`Store`]. Module `batch` contains the periodic refresh
//! of stale pairs, and module `guesser` the guessing of current selectors from
//! dated ones.
//!
//! ```
//! use dkim_archive::{Config, LookupTxt, MemoryStore, SourceIdentifier, UpsertEngine};
//! use std::{future::Future, io, pin::Pin, sync::Arc};
//!
//! struct Resolver;
//!
//! impl LookupTxt for Resolver {
//!     type Answer = Vec<io::Result<Vec<Vec<u8>>>>;
//!     type Query<'a> = Pin<Box<dyn Future<Output = io::Result<Self::Answer>> + Send + 'a>>;
//!
//!     fn lookup_txt(&self, domain: &str) -> Self::Query<'_> {
//!         let found = domain == "sel._domainkey.example.com.";
//!         Box::pin(async move {
//!             if found {
//!                 Ok(vec![Ok(vec![b"v=DKIM1; p=".to_vec()])])
//!             } else {
//!                 Err(io::ErrorKind::NotFound.into())
//!             }
//!         })
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let engine = UpsertEngine::new(store, Resolver, Config::default());
//!
//! let outcome = engine
//!     .add_or_refresh("Example.com", "sel", SourceIdentifier::Api)
//!     .await?;
//!
//! assert!(outcome.created);
//! assert_eq!(outcome.new_record_count, 1);
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
//!
//! # Cargo features
//!
//! The feature **`hickory-resolver`** makes an implementation of
//! [`LookupTxt`][crate::lookup::LookupTxt] available for the Hickory DNS
//! resolver.
//!
//! [RFC 6376]: https://www.rfc-editor.org/rfc/rfc6376

pub mod batch;
pub mod crypto;
pub mod guesser;
pub mod lookup;
pub mod notary;
pub mod pair;
pub mod record;
pub mod store;
pub mod tag_list;
pub mod upsert;
mod util;

pub use crate::{
    crypto::{DerError, DerStructure, DerValidator, KeyType, RsaPublicKeyDer},
    lookup::LookupTxt,
    notary::{Notary, NotaryHandle, NotaryQueue},
    pair::{DomainAndSelector, SourceIdentifier},
    record::{KeyMaterial, KeyMaterialError},
    store::{DkimKeyRecord, DomainSelectorPair, MemoryStore, Store, StoreError},
    tag_list::TagList,
    upsert::{Config, PairState, UpsertEngine, UpsertOutcome},
    util::{decode_base64_lenient, encode_base64, CanonicalStr},
};
