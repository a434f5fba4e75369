//! Background Job Queue Implementation

use async_trait::async_trait;
use bridge_traits::{
    background::{Job, JobCallback, JobId, JobKind, JobOutcome, JobPriority, JobQueue},
    error::{BridgeError, Result},
    storage::FileStore,
};
use core_async::sync::Semaphore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Tokio-based job queue for desktop.
///
/// Jobs run as spawned tasks, at most `max_concurrent` at a time. `High`
/// priority jobs skip the concurrency limit.
pub struct TokioJobQueue {
    store: Arc<dyn FileStore>,
    slots: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
}

impl TokioJobQueue {
    pub fn new(store: Arc<dyn FileStore>, max_concurrent: usize) -> Self {
        Self {
            store,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    async fn run(store: &dyn FileStore, job: &Job) -> JobOutcome {
        match &job.kind {
            JobKind::MaterializeVariant {
                source_uri,
                destination,
                quality,
                ..
            } => {
                debug!(job_id = %job.id, quality = %quality, "Materializing variant");
                match store.download(source_uri, destination, None).await {
                    Ok(bytes) => JobOutcome::Completed { bytes },
                    Err(e) => JobOutcome::Failed(e.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl JobQueue for TokioJobQueue {
    async fn enqueue(
        &self,
        job: Job,
        priority: JobPriority,
        on_complete: JobCallback,
    ) -> Result<JobId> {
        if self.slots.is_closed() {
            return Err(BridgeError::NotAvailable("job queue is closed".to_string()));
        }

        let id = job.id.clone();
        let store = Arc::clone(&self.store);
        let slots = Arc::clone(&self.slots);
        let pending = Arc::clone(&self.pending);
        pending.fetch_add(1, Ordering::SeqCst);

        core_async::spawn(async move {
            let _permit = if priority == JobPriority::High {
                None
            } else {
                match slots.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        pending.fetch_sub(1, Ordering::SeqCst);
                        on_complete(JobOutcome::Failed("job queue closed".to_string())).await;
                        return;
                    }
                }
            };

            let outcome = Self::run(store.as_ref(), &job).await;
            if let JobOutcome::Failed(reason) = &outcome {
                warn!(job_id = %job.id, %reason, "Background job failed");
            }

            pending.fetch_sub(1, Ordering::SeqCst);
            on_complete(outcome).await;
        });

        Ok(id)
    }

    async fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl Drop for TokioJobQueue {
    fn drop(&mut self) {
        self.slots.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::TokioFileStore;
    use bridge_traits::quality::Quality;
    use core_async::sync::oneshot;
    use futures_util::FutureExt;

    #[tokio::test]
    async fn test_variant_job_invokes_callback() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.mp4");
        tokio::fs::write(&source, vec![1u8; 512]).await.unwrap();

        let queue = TokioJobQueue::new(Arc::new(TokioFileStore::new()), 1);
        let destination = dir.path().join("low_quality").join("abc_low.mp4");
        let job = Job::materialize_variant(
            "logical",
            Quality::Low,
            format!("file://{}", source.display()),
            destination.clone(),
        );

        let (tx, rx) = oneshot::channel();
        queue
            .enqueue(
                job,
                JobPriority::Low,
                Box::new(move |outcome: JobOutcome| {
                    async move {
                        let _ = tx.send(outcome);
                    }
                    .boxed()
                }),
            )
            .await
            .unwrap();

        assert_eq!(rx.await.unwrap(), JobOutcome::Completed { bytes: 512 });
        assert!(destination.exists());
        assert_eq!(queue.pending().await, 0);
    }

    #[tokio::test]
    async fn test_failed_job_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let queue = TokioJobQueue::new(Arc::new(TokioFileStore::new()), 1);
        let job = Job::materialize_variant(
            "logical",
            Quality::High,
            format!("file://{}", dir.path().join("absent.mp4").display()),
            dir.path().join("high_quality").join("abc_high.mp4"),
        );

        let (tx, rx) = oneshot::channel();
        queue
            .enqueue(
                job,
                JobPriority::High,
                Box::new(move |outcome: JobOutcome| {
                    async move {
                        let _ = tx.send(outcome);
                    }
                    .boxed()
                }),
            )
            .await
            .unwrap();

        assert!(matches!(rx.await.unwrap(), JobOutcome::Failed(_)));
    }
}
