//! In-memory registry of long-running video jobs.
//!
//! [`VideoJobRegistry`] gives every accepted video generation its own
//! [`OperationPoller`]. The poller's result sink writes the terminal
//! status back into the registry; handlers read snapshots and may cancel
//! tracking at any time. Jobs that have stopped running are dropped once
//! they are older than the retention window.
//!
//! Lock order: the registry lock may be held while calling into a poller,
//! never the other way round. Sinks run after the poller has released its
//! own lock.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use imgstudio_core::error::CoreError;
use imgstudio_core::polling::{PollConfig, PollResult};
use imgstudio_core::types::{OperationHandle, Timestamp};
use imgstudio_genmedia::messages::GeneratedVideo;
use imgstudio_genmedia::{BackendStatusCheck, CheckContext, OperationPoller};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

/// Where a video job is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VideoJobStatus {
    Running,
    Succeeded { videos: Vec<GeneratedVideo> },
    Failed { category: &'static str, message: String },
    TimedOut { message: String },
    Cancelled,
}

impl VideoJobStatus {
    fn from_result(result: PollResult<Vec<GeneratedVideo>>) -> Self {
        let category = result.category();
        match result {
            PollResult::Success(videos) => Self::Succeeded { videos },
            PollResult::Failure { message, .. } => Self::Failed { category, message },
            PollResult::Timeout { message, .. } => Self::TimedOut { message },
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Snapshot of one video job, as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct VideoJob {
    pub id: Uuid,
    pub operation: OperationHandle,
    pub prompt: String,
    #[serde(flatten)]
    pub status: VideoJobStatus,
    /// Status checks made so far.
    pub attempts: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

struct TrackedJob {
    job: VideoJob,
    poller: OperationPoller<BackendStatusCheck>,
    /// When the job left `Running`, on the runtime clock.
    finished_at: Option<Instant>,
}

impl TrackedJob {
    fn snapshot(&self) -> VideoJob {
        let mut job = self.job.clone();
        job.attempts = self.poller.attempts();
        job
    }

    fn finish(&mut self, status: VideoJobStatus) {
        self.job.status = status;
        self.job.updated_at = Utc::now();
        self.finished_at = Some(Instant::now());
    }

    /// Stop polling a running job.
    ///
    /// A poller that has already produced its result is left alone: its
    /// sink is waiting on the registry lock and will record the outcome.
    fn stop(&mut self) -> bool {
        if !self.job.status.is_running() || !self.poller.cancel() {
            return false;
        }
        self.finish(VideoJobStatus::Cancelled);
        true
    }

    fn is_expired(&self, now: Instant, retention: Duration) -> bool {
        self.finished_at
            .is_some_and(|at| now.saturating_duration_since(at) >= retention)
    }
}

type JobMap = HashMap<Uuid, TrackedJob>;

/// Tracks every video job the server has accepted.
///
/// Finished and cancelled jobs stay queryable for `retention`, then are
/// dropped the next time a job is tracked or listed.
pub struct VideoJobRegistry {
    jobs: Arc<RwLock<JobMap>>,
    checker: Arc<BackendStatusCheck>,
    poll_config: PollConfig,
    retention: Duration,
}

impl VideoJobRegistry {
    pub fn new(
        checker: Arc<BackendStatusCheck>,
        poll_config: PollConfig,
        retention: Duration,
    ) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            checker,
            poll_config,
            retention,
        }
    }

    /// Register a freshly started operation and begin polling it.
    pub fn track(&self, operation: OperationHandle, prompt: &str) -> VideoJob {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let job = VideoJob {
            id,
            operation: operation.clone(),
            prompt: prompt.to_string(),
            status: VideoJobStatus::Running,
            attempts: 0,
            created_at: now,
            updated_at: now,
        };

        let poller = OperationPoller::new(Arc::clone(&self.checker), self.poll_config.clone());
        let jobs = Arc::clone(&self.jobs);

        let mut map = write(&self.jobs);
        purge_expired(&mut map, self.retention);
        poller.start(operation, CheckContext { job_id: id }, move |result| {
            record_result(&jobs, id, result);
        });
        map.insert(
            id,
            TrackedJob {
                job: job.clone(),
                poller,
                finished_at: None,
            },
        );

        tracing::info!(job_id = %id, operation = %job.operation, "Video job tracked");
        job
    }

    pub fn get(&self, id: Uuid) -> Result<VideoJob, CoreError> {
        read(&self.jobs)
            .get(&id)
            .map(TrackedJob::snapshot)
            .ok_or_else(|| not_found(id))
    }

    /// All retained jobs, newest first.
    pub fn list(&self) -> Vec<VideoJob> {
        let mut map = write(&self.jobs);
        purge_expired(&mut map, self.retention);
        let mut jobs: Vec<VideoJob> = map.values().map(TrackedJob::snapshot).collect();
        drop(map);
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Stop tracking a job. Jobs that already finished keep their status.
    pub fn cancel(&self, id: Uuid) -> Result<VideoJob, CoreError> {
        let mut map = write(&self.jobs);
        let tracked = map.get_mut(&id).ok_or_else(|| not_found(id))?;

        if tracked.stop() {
            tracing::info!(job_id = %id, "Video job cancelled");
        }
        Ok(tracked.snapshot())
    }

    /// Drop finished jobs older than the retention window.
    pub fn purge_expired(&self) -> usize {
        purge_expired(&mut write(&self.jobs), self.retention)
    }

    /// Number of jobs still being polled.
    pub fn running_count(&self) -> usize {
        read(&self.jobs)
            .values()
            .filter(|t| t.job.status.is_running())
            .count()
    }

    pub fn len(&self) -> usize {
        read(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every running poller. Called once during graceful shutdown.
    pub fn shutdown(&self) {
        let mut map = write(&self.jobs);
        let stopped = map.values_mut().map(|t| t.stop()).filter(|&stopped| stopped).count();
        tracing::info!(stopped, "Video job registry shut down");
    }
}

fn purge_expired(map: &mut JobMap, retention: Duration) -> usize {
    let now = Instant::now();
    let before = map.len();
    map.retain(|_, tracked| !tracked.is_expired(now, retention));
    let purged = before - map.len();
    if purged > 0 {
        tracing::debug!(purged, remaining = map.len(), "Expired video jobs dropped");
    }
    purged
}

/// Sink target: store a poller's terminal result on its job.
fn record_result(jobs: &RwLock<JobMap>, id: Uuid, result: PollResult<Vec<GeneratedVideo>>) {
    let mut map = write(jobs);
    let Some(tracked) = map.get_mut(&id) else {
        tracing::warn!(job_id = %id, "Result for unknown video job dropped");
        return;
    };
    if !tracked.job.status.is_running() {
        return;
    }

    let status = VideoJobStatus::from_result(result);
    match &status {
        VideoJobStatus::Succeeded { videos } => {
            tracing::info!(job_id = %id, count = videos.len(), "Video job succeeded");
        }
        VideoJobStatus::Failed { category, message } => {
            tracing::warn!(job_id = %id, category, error = %message, "Video job failed");
        }
        VideoJobStatus::TimedOut { message } => {
            tracing::warn!(job_id = %id, error = %message, "Video job timed out");
        }
        VideoJobStatus::Running | VideoJobStatus::Cancelled => {}
    }
    tracked.finish(status);
}

fn not_found(id: Uuid) -> CoreError {
    CoreError::NotFound {
        entity: "VideoJob",
        id: id.to_string(),
    }
}

fn read(jobs: &RwLock<JobMap>) -> RwLockReadGuard<'_, JobMap> {
    jobs.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(jobs: &RwLock<JobMap>) -> RwLockWriteGuard<'_, JobMap> {
    jobs.write().unwrap_or_else(PoisonError::into_inner)
}
