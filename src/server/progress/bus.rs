use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, broadcast};
use tokio_util::sync::CancellationToken;

use crate::server::extraction::model::{Phase, ProgressEvent};

const CHANNEL_CAPACITY: usize = 32;
const TERMINAL_GRACE: Duration = Duration::from_secs(30);

/// per-job state shared between the engine (producer) and SSE handlers
/// (consumers). small, scoped `Arc<Mutex<...>>` state over one global lock -
/// each job gets its own entry, locked independently.
struct JobEntry {
    sender: broadcast::Sender<ProgressEvent>,
    last_event: Mutex<Option<ProgressEvent>>,
    cancellation: CancellationToken,
}

/// `requestId -> JobHandle` registry, the only shared state between HTTP handlers
/// and the extraction engine.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, Arc<JobEntry>>>>,
}

#[derive(Clone)]
pub struct JobHandle {
    pub request_id: String,
    registry: JobRegistry,
    entry: Arc<JobEntry>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// called by the HTTP front when a new job is accepted. returns a handle the
    /// engine publishes events through.
    pub async fn create(&self, request_id: String) -> JobHandle {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        let entry = Arc::new(JobEntry {
            sender,
            last_event: Mutex::new(None),
            cancellation: CancellationToken::new(),
        });

        self.jobs.write().await.insert(request_id.clone(), entry.clone());

        JobHandle {
            request_id,
            registry: self.clone(),
            entry,
        }
    }

    /// subscribes a caller to an existing job's event stream plus the last event
    /// seen so far (so a caller attaching mid-job gets a snapshot, not a blank
    /// stream), or None if the job doesn't exist or already GC'd past its grace
    /// window.
    pub async fn subscribe(
        &self,
        request_id: &str,
    ) -> Option<(broadcast::Receiver<ProgressEvent>, Option<ProgressEvent>, CancellationToken)> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(request_id)?;
        let receiver = entry.sender.subscribe();
        let snapshot = entry.last_event.lock().await.clone();
        Some((receiver, snapshot, entry.cancellation.clone()))
    }

    async fn remove_after_grace(&self, request_id: String) {
        tokio::time::sleep(TERMINAL_GRACE).await;
        self.jobs.write().await.remove(&request_id);
    }

    /// number of jobs currently tracked, including ones in their terminal grace
    /// window - good enough for a health snapshot, not meant to be exact.
    pub async fn active_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobHandle {
    /// publishes an event to every current and future subscriber. `send` errors
    /// when there are zero subscribers, which is fine - the last_event snapshot
    /// still gets updated for late attachers.
    pub async fn publish(&self, event: ProgressEvent) {
        let is_terminal = event.is_terminal();
        *self.entry.last_event.lock().await = Some(event.clone());
        let _ = self.entry.sender.send(event);

        if is_terminal {
            let registry = self.registry.clone();
            let request_id = self.request_id.clone();
            tokio::spawn(async move { registry.remove_after_grace(request_id).await });
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.entry.cancellation.clone()
    }

    pub fn emit(&self, phase: Phase, progress: u8, message: impl Into<String>) -> ProgressEvent {
        ProgressEvent {
            request_id: self.request_id.clone(),
            phase,
            progress,
            message: message.into(),
            result: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::extraction::model::Phase;

    #[tokio::test]
    async fn subscriber_sees_snapshot_and_subsequent_events_in_order() {
        let registry = JobRegistry::new();
        let handle = registry.create("job-1".to_string()).await;

        handle.publish(handle.emit(Phase::Initializing, 0, "starting")).await;

        let (mut receiver, snapshot, _token) = registry.subscribe("job-1").await.unwrap();
        assert_eq!(snapshot.unwrap().phase, Phase::Initializing);

        handle.publish(handle.emit(Phase::Connecting, 10, "connecting")).await;
        let next = receiver.recv().await.unwrap();
        assert_eq!(next.phase, Phase::Connecting);
        assert_eq!(next.progress, 10);
    }

    #[tokio::test]
    async fn unknown_job_id_subscribes_to_nothing() {
        let registry = JobRegistry::new();
        assert!(registry.subscribe("does-not-exist").await.is_none());
    }
}
