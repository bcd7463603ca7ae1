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

//! Provenance notarization of archived records.
//!
//! Every archived record is submitted to a timestamping service that attests
//! that the record was published at a point in time. Notarization runs in the
//! background, on a [`NotaryQueue`] worker task: records are queued only after
//! the store has committed them, and a failed notarization leaves the record
//! unverified, to be queued again on the next refresh of its pair.

use crate::{
    pair::DomainAndSelector,
    store::{RecordId, Store, StoreError},
};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::{
    fmt::Write,
    future::Future,
    io,
    pin::Pin,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle, time};
use tracing::{debug, info, trace, warn};

pub type NotaryFuture<'a, T> = Pin<Box<dyn Future<Output = io::Result<T>> + Send + 'a>>;

/// A trait for timestamping and proof services.
pub trait Notary: Send + Sync {
    /// The inclusion proof handed out by the service.
    type Proof: Send + Sync;

    /// Computes the leaf hash of the given content.
    ///
    /// The default is the lower-case hex SHA-256 digest.
    fn hash(&self, content: &str) -> String {
        Sha256::digest(content.as_bytes())
            .iter()
            .fold(String::with_capacity(64), |mut s, b| {
                let _ = write!(s, "{b:02x}");
                s
            })
    }

    /// Submits a leaf hash and returns the time it was timestamped at.
    fn post_leaf_and_get_timestamp<'a>(&'a self, leaf_hash: &'a str)
        -> NotaryFuture<'a, DateTime<Utc>>;

    fn get_proof_for_leaf_hash<'a>(&'a self, leaf_hash: &'a str) -> NotaryFuture<'a, Self::Proof>;

    fn verify_proof_chain<'a>(&'a self, proof: &'a Self::Proof) -> NotaryFuture<'a, bool>;
}

/// Returns the content that is notarized for a record: the record as it would
/// appear in a zone file.
pub fn canonical_record_string(pair: &DomainAndSelector, value: &str) -> String {
    format!("{}._domainkey.{} TXT \"{value}\"", pair.selector, pair.domain)
}

#[derive(Debug, Error)]
pub enum NotarizeError {
    #[error("timestamping failed: {0}")]
    Timestamp(#[source] io::Error),
    #[error("proof retrieval failed: {0}")]
    Proof(#[source] io::Error),
    #[error("proof chain verification failed: {0}")]
    Verification(#[source] io::Error),
    #[error("proof chain invalid")]
    InvalidProofChain,
    #[error("notary timed out")]
    TimedOut,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A record waiting to be notarized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotarizeJob {
    pub pair: DomainAndSelector,
    pub record_id: RecordId,
    pub value: String,
}

/// Notarizes one record and marks it verified in the store.
pub async fn notarize<S, N>(
    store: &S,
    notary: &N,
    job: &NotarizeJob,
    timeout: Duration,
) -> Result<DateTime<Utc>, NotarizeError>
where
    S: Store + ?Sized,
    N: Notary + ?Sized,
{
    let content = canonical_record_string(&job.pair, &job.value);
    let leaf_hash = notary.hash(&content);

    let timestamp = time::timeout(timeout, notary.post_leaf_and_get_timestamp(&leaf_hash))
        .await
        .map_err(|_| NotarizeError::TimedOut)?
        .map_err(NotarizeError::Timestamp)?;

    debug!(%leaf_hash, %timestamp, "leaf timestamped");

    let proof = time::timeout(timeout, notary.get_proof_for_leaf_hash(&leaf_hash))
        .await
        .map_err(|_| NotarizeError::TimedOut)?
        .map_err(NotarizeError::Proof)?;

    let verified = time::timeout(timeout, notary.verify_proof_chain(&proof))
        .await
        .map_err(|_| NotarizeError::TimedOut)?
        .map_err(NotarizeError::Verification)?;

    if !verified {
        return Err(NotarizeError::InvalidProofChain);
    }

    store.set_provenance_verified(job.record_id).await?;

    Ok(timestamp)
}

/// Outcome counts of a finished notary worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NotaryReport {
    pub verified: usize,
    pub failed: usize,
}

/// The sending side of a notary queue.
#[derive(Clone, Debug)]
pub struct NotaryHandle {
    tx: mpsc::UnboundedSender<NotarizeJob>,
}

impl NotaryHandle {
    /// Returns a handle whose jobs are discarded, for running without a
    /// notarization service. Records then stay unverified.
    pub fn disabled() -> Self {
        let (tx, _) = mpsc::unbounded_channel();
        Self { tx }
    }

    /// Queues a record for notarization. Never blocks.
    pub fn schedule(&self, job: NotarizeJob) {
        trace!(pair = %job.pair, record_id = job.record_id, "scheduling notarization");

        if self.tx.send(job).is_err() {
            trace!("notary queue closed, job discarded");
        }
    }
}

/// A background worker notarizing queued records one at a time.
pub struct NotaryQueue;

impl NotaryQueue {
    /// Spawns the worker on the current tokio runtime.
    ///
    /// The worker runs until all handles are dropped and the queue is drained;
    /// the join handle then resolves to the counts of verified and failed jobs.
    pub fn spawn<S, N>(
        store: Arc<S>,
        notary: Arc<N>,
        timeout: Duration,
    ) -> (NotaryHandle, JoinHandle<NotaryReport>)
    where
        S: Store + ?Sized + 'static,
        N: Notary + ?Sized + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<NotarizeJob>();

        let worker = tokio::spawn(async move {
            let mut report = NotaryReport::default();

            while let Some(job) = rx.recv().await {
                match notarize(&*store, &*notary, &job, timeout).await {
                    Ok(timestamp) => {
                        info!(pair = %job.pair, record_id = job.record_id, %timestamp, "provenance verified");
                        report.verified += 1;
                    }
                    Err(e) => {
                        warn!(pair = %job.pair, record_id = job.record_id, "notarization failed: {e}");
                        report.failed += 1;
                    }
                }
            }

            report
        });

        (NotaryHandle { tx }, worker)
    }
}
