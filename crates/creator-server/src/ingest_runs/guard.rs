//! Deduplication guard
//!
//! Before a run starts, every other `running` run with the same input
//! fingerprint gets a `cancel` task. The guard does not wait for those
//! cancels to execute, so two duplicates may briefly both be `running`.

use std::sync::Arc;

use creator_common::InputFingerprint;
use futures::future::join_all;
use uuid::Uuid;

use super::queue::{IngestRunTask, QueueError, TaskQueue};
use super::store::{IngestRunStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub struct DeduplicationGuard {
    store: Arc<dyn IngestRunStore>,
    queue: Arc<dyn TaskQueue>,
}

impl DeduplicationGuard {
    pub fn new(store: Arc<dyn IngestRunStore>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { store, queue }
    }

    /// Enqueue a cancel for every running duplicate of `ingest_run_id`
    ///
    /// Returns the ids that were handed to the queue. Submission failures for
    /// individual duplicates are logged; the first one is returned after all
    /// submissions have been attempted.
    #[tracing::instrument(skip(self, fingerprint), fields(fingerprint = %fingerprint))]
    pub async fn cancel_duplicates(
        &self,
        ingest_run_id: Uuid,
        fingerprint: &InputFingerprint,
    ) -> Result<Vec<Uuid>, GuardError> {
        let duplicates = self
            .store
            .find_running_duplicates(fingerprint, ingest_run_id)
            .await?;

        if duplicates.is_empty() {
            tracing::debug!("No running duplicates");
            return Ok(duplicates);
        }

        let submissions = duplicates.iter().map(|&duplicate| async move {
            tracing::info!(duplicate_id = %duplicate, "Canceling previous run");
            let result = self
                .queue
                .enqueue(IngestRunTask::Cancel {
                    ingest_run_id: duplicate,
                    requested_by: None,
                })
                .await;
            (duplicate, result)
        });

        let mut canceled = Vec::with_capacity(duplicates.len());
        let mut first_error = None;
        for (duplicate, result) in join_all(submissions).await {
            match result {
                Ok(()) => canceled.push(duplicate),
                Err(e) => {
                    tracing::warn!(duplicate_id = %duplicate, error = %e, "Failed to enqueue cancel");
                    first_error.get_or_insert(e);
                },
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(canceled),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::ingest_runs::queue::MemoryTaskQueue;
    use crate::ingest_runs::state::StateEvent;
    use crate::ingest_runs::store::{MemoryIngestRunStore, NewIngestRun};

    /// Accepts every task except a cancel of `rejected`
    struct RejectingQueue {
        rejected: Uuid,
        accepted: MemoryTaskQueue,
    }

    #[async_trait]
    impl TaskQueue for RejectingQueue {
        async fn enqueue(&self, task: IngestRunTask) -> Result<(), QueueError> {
            match task {
                IngestRunTask::Cancel { ingest_run_id, .. } if ingest_run_id == self.rejected => {
                    Err(QueueError::Submit {
                        job: task.job_name(),
                        ingest_run_id,
                        reason: "connection refused".to_string(),
                    })
                },
                task => self.accepted.enqueue(task).await,
            }
        }
    }

    fn cancel_of(id: Uuid) -> IngestRunTask {
        IngestRunTask::Cancel {
            ingest_run_id: id,
            requested_by: None,
        }
    }

    async fn running_run(store: &MemoryIngestRunStore, fp: &InputFingerprint) -> Uuid {
        let run = store.create(&NewIngestRun::new(&[], None)).await.unwrap();
        store.store_fingerprint(run.id, fp, "n").await.unwrap();
        store.transition(run.id, StateEvent::Start, None).await.unwrap();
        run.id
    }

    #[tokio::test]
    async fn test_enqueues_cancel_for_running_duplicates() {
        let store = Arc::new(MemoryIngestRunStore::new());
        let queue = Arc::new(MemoryTaskQueue::new());
        let guard = DeduplicationGuard::new(store.clone(), queue.clone());

        let fp = InputFingerprint::from_versions(["FV_1", "FV_2"]);
        let older = running_run(&store, &fp).await;
        let newer = store.create(&NewIngestRun::new(&[], None)).await.unwrap().id;

        let canceled = guard.cancel_duplicates(newer, &fp).await.unwrap();

        assert_eq!(canceled, vec![older]);
        assert_eq!(queue.drain(), vec![cancel_of(older)]);
    }

    #[tokio::test]
    async fn test_ignores_other_fingerprints() {
        let store = Arc::new(MemoryIngestRunStore::new());
        let queue = Arc::new(MemoryTaskQueue::new());
        let guard = DeduplicationGuard::new(store.clone(), queue.clone());

        running_run(&store, &InputFingerprint::from_versions(["FV_3"])).await;
        let fp = InputFingerprint::from_versions(["FV_1"]);
        let me = running_run(&store, &fp).await;

        assert!(guard.cancel_duplicates(me, &fp).await.unwrap().is_empty());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_submission_failure_is_returned_after_all_attempts() {
        let store = Arc::new(MemoryIngestRunStore::new());
        let fp = InputFingerprint::from_versions(["FV_1"]);
        let first = running_run(&store, &fp).await;
        let second = running_run(&store, &fp).await;
        let me = store.create(&NewIngestRun::new(&[], None)).await.unwrap().id;

        let queue = Arc::new(RejectingQueue {
            rejected: first,
            accepted: MemoryTaskQueue::new(),
        });
        let guard = DeduplicationGuard::new(store.clone(), queue.clone());

        let err = guard.cancel_duplicates(me, &fp).await.unwrap_err();

        assert!(matches!(
            err,
            GuardError::Queue(QueueError::Submit { ingest_run_id, .. }) if ingest_run_id == first
        ));
        assert_eq!(queue.accepted.drain(), vec![cancel_of(second)]);
    }
}
