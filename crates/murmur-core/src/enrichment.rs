//! Asynchronous enrichment of saved entries.
//!
//! Enrichment (enhanced text, analysis) arrives some time after an entry was
//! recorded, possibly after the user locked the governing tag. The worker
//! applies each result on the blocking pool and commits it through
//! `Journal::update_entry`, so a key that disappears mid-flight yields
//! deferred plaintext instead of unflagged plaintext on disk.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::coordinator::ReconcileReport;
use crate::error::{MurmurError, Result};
use crate::journal::Journal;

/// Default number of enrichment jobs that may wait in the queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 32;

/// Enrichment output for one entry. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Enrichment {
    pub entry_id: Uuid,
    pub enhanced_text: Option<String>,
    pub analysis: Option<String>,
}

impl Enrichment {
    pub fn new(entry_id: Uuid) -> Self {
        Self {
            entry_id,
            ..Self::default()
        }
    }

    pub fn enhanced_text(mut self, text: impl Into<String>) -> Self {
        self.enhanced_text = Some(text.into());
        self
    }

    pub fn analysis(mut self, text: impl Into<String>) -> Self {
        self.analysis = Some(text.into());
        self
    }
}

struct Job {
    enrichment: Enrichment,
    reply: oneshot::Sender<Result<ReconcileReport>>,
}

/// Apply an enrichment synchronously through the journal's save path.
///
/// The entry is re-read and written under the journal's write lock, so a
/// concurrent save of the same entry is never overwritten with stale fields.
pub fn apply_enrichment(journal: &Journal, enrichment: &Enrichment) -> Result<ReconcileReport> {
    journal.update_entry(&enrichment.entry_id, |entry| {
        if let Some(text) = enrichment.enhanced_text.as_deref() {
            entry.enhanced_text.set_text(text);
        }
        if let Some(text) = enrichment.analysis.as_deref() {
            entry.analysis.set_text(text);
        }
        Ok(())
    })
}

/// Handle for submitting enrichment to a running worker.
#[derive(Clone)]
pub struct EnrichmentHandle {
    tx: mpsc::Sender<Job>,
}

impl EnrichmentHandle {
    /// Queue an enrichment and wait for it to be committed.
    pub async fn submit(&self, enrichment: Enrichment) -> Result<ReconcileReport> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Job { enrichment, reply })
            .await
            .map_err(|_| MurmurError::Storage("Enrichment worker has stopped".to_string()))?;
        response
            .await
            .map_err(|_| MurmurError::Storage("Enrichment worker dropped the job".to_string()))?
    }
}

/// Background task that commits enrichment results one at a time.
pub struct EnrichmentWorker;

impl EnrichmentWorker {
    /// Start a worker on the current tokio runtime.
    ///
    /// The worker stops once every `EnrichmentHandle` has been dropped and
    /// the queue is drained.
    pub fn spawn(journal: Arc<Journal>, queue_depth: usize) -> (EnrichmentHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(queue_depth.max(1));

        let task = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let journal = Arc::clone(&journal);
                let entry_id = job.enrichment.entry_id;
                let enrichment = job.enrichment;

                let result =
                    tokio::task::spawn_blocking(move || apply_enrichment(&journal, &enrichment))
                        .await
                        .map_err(|e| {
                            MurmurError::Storage(format!("Enrichment task failed: {}", e))
                        })
                        .and_then(|result| result);

                match &result {
                    Ok(report) if !report.deferred_fields().is_empty() => {
                        tracing::info!(entry_id = %entry_id, "enrichment saved as deferred plaintext");
                    }
                    Ok(_) => tracing::debug!(entry_id = %entry_id, "enrichment saved"),
                    Err(err) => {
                        tracing::warn!(entry_id = %entry_id, error = %err, "enrichment failed")
                    }
                }

                // The submitter may have gone away; the save already happened.
                let _ = job.reply.send(result);
            }
            tracing::debug!("enrichment worker stopped");
        });

        (EnrichmentHandle { tx }, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::WriteOutcome;
    use crate::journal::JournalConfig;
    use crate::secrets::MemorySecretStore;
    use crate::storage::{FieldName, SqliteStorage};

    fn journal() -> Arc<Journal> {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let secrets = Arc::new(MemorySecretStore::new());
        Arc::new(Journal::new(storage, secrets, JournalConfig::default()))
    }

    #[tokio::test]
    async fn test_enrichment_is_sealed_while_unlocked() {
        let journal = journal();
        let tag = journal.create_tag("Private").unwrap();
        journal.protect_tag(&tag.id, "1234").unwrap();
        let mut entry = journal.new_entry();
        journal.assign_tag(&mut entry, &tag.id).unwrap();
        entry.transcript.set_text("raw words");
        journal.save_entry(&mut entry).unwrap();

        let (handle, task) = EnrichmentWorker::spawn(Arc::clone(&journal), DEFAULT_QUEUE_DEPTH);
        let report = handle
            .submit(Enrichment::new(entry.id).enhanced_text("Polished words."))
            .await
            .unwrap();

        assert_eq!(
            report.outcome(FieldName::EnhancedText),
            Some(WriteOutcome::Encrypted)
        );
        let stored = journal.load_entry(&entry.id).unwrap();
        assert!(stored.enhanced_text.plaintext().is_none());

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_before_enrichment_lands_defers() {
        let journal = journal();
        let tag = journal.create_tag("Private").unwrap();
        journal.protect_tag(&tag.id, "1234").unwrap();
        let mut entry = journal.new_entry();
        journal.assign_tag(&mut entry, &tag.id).unwrap();
        journal.save_entry(&mut entry).unwrap();

        let (handle, _task) = EnrichmentWorker::spawn(Arc::clone(&journal), 4);
        journal.lock_all();

        let report = handle
            .submit(Enrichment::new(entry.id).analysis("mood: calm"))
            .await
            .unwrap();

        assert_eq!(report.deferred_fields(), vec![FieldName::Analysis]);
        let stored = journal.load_entry(&entry.id).unwrap();
        assert!(stored.analysis.is_deferred());
        assert_eq!(stored.analysis.plaintext(), Some(b"mood: calm".as_slice()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_lock_never_leaves_unflagged_plaintext() {
        let journal = journal();
        let tag = journal.create_tag("Private").unwrap();
        journal.protect_tag(&tag.id, "1234").unwrap();

        let mut ids = Vec::new();
        for _ in 0..8 {
            let mut entry = journal.new_entry();
            journal.assign_tag(&mut entry, &tag.id).unwrap();
            journal.save_entry(&mut entry).unwrap();
            ids.push(entry.id);
        }

        let (handle, _task) = EnrichmentWorker::spawn(Arc::clone(&journal), 8);
        let submissions: Vec<_> = ids
            .iter()
            .map(|id| {
                let handle = handle.clone();
                let enrichment = Enrichment::new(*id).enhanced_text("late result");
                tokio::spawn(async move { handle.submit(enrichment).await })
            })
            .collect();
        journal.lock_all();

        for submission in submissions {
            submission.await.unwrap().unwrap();
        }
        for id in ids {
            let stored = journal.load_entry(&id).unwrap();
            let field = &stored.enhanced_text;
            assert!(field.plaintext().is_none() || field.is_deferred());
            assert!(!field.is_empty());
        }
    }

    #[tokio::test]
    async fn test_enrichment_keeps_concurrent_user_edit() {
        let journal = journal();
        let mut entry = journal.new_entry();
        entry.transcript.set_text("first draft");
        journal.save_entry(&mut entry).unwrap();

        let (handle, _task) = EnrichmentWorker::spawn(Arc::clone(&journal), 4);
        let editor = {
            let journal = Arc::clone(&journal);
            let id = entry.id;
            tokio::task::spawn_blocking(move || {
                journal.update_entry(&id, |entry| {
                    entry.transcript.set_text("second draft");
                    Ok(())
                })
            })
        };
        handle
            .submit(Enrichment::new(entry.id).analysis("mood: calm"))
            .await
            .unwrap();
        editor.await.unwrap().unwrap();

        let stored = journal.load_entry(&entry.id).unwrap();
        assert_eq!(
            journal
                .reveal_text(&stored, FieldName::Transcript)
                .unwrap()
                .plain()
                .as_deref(),
            Some("second draft")
        );
        assert_eq!(
            journal
                .reveal_text(&stored, FieldName::Analysis)
                .unwrap()
                .plain()
                .as_deref(),
            Some("mood: calm")
        );
    }

    #[tokio::test]
    async fn test_unknown_entry_is_reported() {
        let journal = journal();
        let (handle, _task) = EnrichmentWorker::spawn(journal, 1);

        let result = handle
            .submit(Enrichment::new(Uuid::new_v4()).analysis("x"))
            .await;
        assert!(matches!(result, Err(MurmurError::EntryNotFound(_))));
    }
}
