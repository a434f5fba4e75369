//! Background Job Queue
//!
//! Non-blocking execution of secondary work. The cache only uses it to
//! materialise extra quality variants of a resource after the primary file has
//! already been returned to the caller.

use futures::future::BoxFuture;
use std::fmt;
use std::path::PathBuf;

use crate::error::Result;
use crate::quality::Quality;

/// Job scheduling priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPriority {
    Low,
    Normal,
    High,
}

/// Queued job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a job does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// Fetch `source_uri` into `destination` as an extra encoding of `logical_id`
    MaterializeVariant {
        logical_id: String,
        quality: Quality,
        source_uri: String,
        destination: PathBuf,
    },
}

/// Job description handed to the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
}

impl Job {
    pub fn materialize_variant(
        logical_id: impl Into<String>,
        quality: Quality,
        source_uri: impl Into<String>,
        destination: PathBuf,
    ) -> Self {
        Self {
            id: JobId::generate(),
            kind: JobKind::MaterializeVariant {
                logical_id: logical_id.into(),
                quality,
                source_uri: source_uri.into(),
                destination,
            },
        }
    }
}

/// Result reported to the completion callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Work finished; `bytes` were written to the job's destination
    Completed { bytes: u64 },
    Failed(String),
}

/// Completion callback invoked exactly once per accepted job.
pub type JobCallback = Box<dyn FnOnce(JobOutcome) -> BoxFuture<'static, ()> + Send>;

/// Background job queue trait
///
/// Implementations run jobs off the caller's path and invoke `on_complete`
/// once the job finishes or fails. Rejected jobs return `Err` from `enqueue`
/// and never invoke the callback.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::{Job, JobPriority, JobQueue};
///
/// let job = Job::materialize_variant(id, Quality::Low, uri, dest);
/// queue
///     .enqueue(job, JobPriority::Low, Box::new(|outcome: JobOutcome| {
///         async move { tracing::debug!(?outcome, "variant job finished") }.boxed()
///     }))
///     .await?;
/// ```
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    /// Accept a job for background execution
    async fn enqueue(&self, job: Job, priority: JobPriority, on_complete: JobCallback)
        -> Result<JobId>;

    /// Number of accepted jobs that have not completed yet
    async fn pending(&self) -> usize {
        0
    }
}
