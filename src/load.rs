//! Bulk loading.
//!
//! Documents are encrypted in parallel, a chunk at a time, and written with
//! one multi-document insert per chunk. Index entries are kept until the
//! whole input is stored, then each attribute's tree is built from its
//! entries sorted by plaintext. Only the key holder can sort, so this is the
//! one place where balanced construction is possible.
use crate::cancel::{CancelToken, Interrupted};
use crate::client::{Client, EncryptKind};
use crate::query::{BulkInsertReport, EncryptedCollection, PendingEntry};
use crate::store::{Document, DocumentStore};
use crate::Result;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use tracing::{info, instrument, warn};

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: usize,
    pub chunks: usize,
    pub outcome: BulkInsertReport,
    /// Set when the load stopped early. Input after `documents` was not
    /// read, and stored documents that missed their index are listed in
    /// `outcome.unindexed`.
    pub interrupted: Option<Interrupted>,
}

pub struct Loader<'a, S> {
    client: &'a Client,
    collection: &'a EncryptedCollection<S>,
    chunk_size: usize,
}

impl<'a, S: DocumentStore> Loader<'a, S> {
    pub fn new(client: &'a Client, collection: &'a EncryptedCollection<S>) -> Self {
        Self {
            client,
            collection,
            chunk_size: 1000,
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Loads `documents`. Per-document failures end up in the report. A
    /// cancellation stops reading input and skips index building for what
    /// was stored so far; the report then lists those documents as unindexed.
    #[instrument(level = "info", skip_all, fields(collection = self.collection.name()))]
    pub fn load<I>(&self, documents: I, cancel: &CancelToken) -> Result<LoadReport>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut report = LoadReport::default();
        let mut pending = Vec::new();
        let mut documents = documents.into_iter().peekable();

        while documents.peek().is_some() {
            if let Err(reason) = cancel.check() {
                return Ok(interrupt(report, pending, reason));
            }
            let chunk: Vec<Document> = documents.by_ref().take(self.chunk_size).collect();
            let offset = report.documents;
            report.documents += chunk.len();
            report.chunks += 1;

            // Each worker seeds its own generator.
            let client = self.client;
            let encrypted: Vec<_> = chunk
                .par_iter()
                .map_init(ChaCha20Rng::from_entropy, |rng, doc| {
                    client.encrypt_for(doc, EncryptKind::Store, rng)
                })
                .collect();

            let mut ready = Vec::with_capacity(encrypted.len());
            for (i, result) in encrypted.into_iter().enumerate() {
                match result {
                    Ok(doc) => ready.push((offset + i, doc)),
                    Err(e) => report.outcome.failed.push((offset + i, e)),
                }
            }
            pending.extend(self.collection.write_documents(ready, &mut report.outcome));
            info!(
                chunk = report.chunks,
                documents = report.documents,
                failed = report.outcome.failed.len(),
                "chunk stored"
            );
        }

        if let Err(reason) = cancel.check() {
            return Ok(interrupt(report, pending, reason));
        }
        self.collection
            .build_indexes(pending, cancel, &mut report.outcome);
        report.interrupted = report.outcome.interruption();
        info!(
            documents = report.documents,
            stored = report.outcome.stored.len(),
            unindexed = report.outcome.unindexed.len(),
            "load finished"
        );
        Ok(report)
    }
}

fn interrupt(mut report: LoadReport, pending: Vec<PendingEntry>, reason: Interrupted) -> LoadReport {
    warn!(
        documents = report.documents,
        stored = report.outcome.stored.len(),
        unindexed = pending.len(),
        %reason,
        "load interrupted"
    );
    report.outcome.abandon(pending, reason);
    report.interrupted = Some(reason);
    report
}
