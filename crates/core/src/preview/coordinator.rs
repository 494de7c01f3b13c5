//! Bounded, deduplicating preview generation.
//!
//! One coordinating task owns all preview bookkeeping. Requests run as tasks in
//! a `JoinSet` and report back only through their completion; nothing outside
//! the loop ever touches the queued/loading/errored sets.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, info, warn};

use super::config::PreviewConfig;
use super::types::{PreviewEvent, PreviewSnapshot, PreviewState};
use crate::engine::{EngineError, ImageEngine};
use crate::job::{Job, JobId};
use crate::metrics;

const COMMAND_CHANNEL_CAPACITY: usize = 256;
const EVENT_CHANNEL_CAPACITY: usize = 256;

enum Command {
    Request {
        candidates: Vec<(JobId, PathBuf)>,
        reply: oneshot::Sender<usize>,
    },
    Forget {
        ids: Vec<JobId>,
    },
    State {
        id: JobId,
        reply: oneshot::Sender<PreviewState>,
    },
    Snapshot {
        reply: oneshot::Sender<PreviewSnapshot>,
    },
    WaitIdle {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running coordinator.
///
/// The coordinator stops once every handle has been dropped; requests still
/// running at that point are aborted.
#[derive(Clone)]
pub struct PreviewHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<PreviewEvent>,
    config: Arc<PreviewConfig>,
}

impl PreviewHandle {
    /// Enqueues every eligible job and returns how many were enqueued.
    ///
    /// A job is eligible if its format needs a preview and it is not already
    /// cached, queued, loading or errored.
    pub async fn request(&self, jobs: &[Job]) -> usize {
        let candidates: Vec<(JobId, PathBuf)> = jobs
            .iter()
            .filter(|j| self.config.needs_preview(&j.format))
            .map(|j| (j.id, j.path.clone()))
            .collect();
        if candidates.is_empty() {
            return 0;
        }

        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Request { candidates, reply })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Drops all preview state for removed jobs.
    pub async fn forget(&self, ids: Vec<JobId>) {
        if ids.is_empty() {
            return;
        }
        let _ = self.commands.send(Command::Forget { ids }).await;
    }

    pub async fn state(&self, id: JobId) -> PreviewState {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::State { id, reply }).await.is_err() {
            return PreviewState::Unknown;
        }
        rx.await.unwrap_or(PreviewState::Unknown)
    }

    pub async fn snapshot(&self) -> PreviewSnapshot {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Snapshot { reply }).await.is_err() {
            return PreviewSnapshot::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Resolves once nothing is queued or loading.
    pub async fn wait_until_idle(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::WaitIdle { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }
}

/// The coordinating loop.
pub struct PreviewCoordinator {
    engine: Arc<dyn ImageEngine>,
    max_in_flight: usize,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<PreviewEvent>,

    queue: VecDeque<(JobId, PathBuf)>,
    queued: HashSet<JobId>,
    loading: HashSet<JobId>,
    /// Loading ids whose job was removed; their result is discarded.
    forgotten: HashSet<JobId>,
    errored: HashMap<JobId, String>,
    cache: HashMap<JobId, PathBuf>,

    tasks: JoinSet<Result<PathBuf, EngineError>>,
    task_ids: HashMap<task::Id, JobId>,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl PreviewCoordinator {
    /// Spawns the coordinator on the current runtime.
    pub fn spawn(engine: Arc<dyn ImageEngine>, config: PreviewConfig) -> PreviewHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let coordinator = Self {
            engine,
            max_in_flight: config.max_in_flight.max(1),
            commands: command_rx,
            events: event_tx.clone(),
            queue: VecDeque::new(),
            queued: HashSet::new(),
            loading: HashSet::new(),
            forgotten: HashSet::new(),
            errored: HashMap::new(),
            cache: HashMap::new(),
            tasks: JoinSet::new(),
            task_ids: HashMap::new(),
            idle_waiters: Vec::new(),
        };

        info!(
            max_in_flight = coordinator.max_in_flight,
            formats = ?config.formats,
            "Starting preview coordinator"
        );
        tokio::spawn(coordinator.run());

        PreviewHandle {
            commands: command_tx,
            events: event_tx,
            config: Arc::new(config),
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(joined) = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => {
                    self.complete(joined);
                }
            }

            self.dispatch();
            self.notify_idle();
        }

        debug!("Preview coordinator stopped");
        metrics::PREVIEWS_IN_FLIGHT.set(0);
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Request { candidates, reply } => {
                let mut enqueued = 0;
                for (id, path) in candidates {
                    if self.is_known(id) {
                        continue;
                    }
                    self.queued.insert(id);
                    self.queue.push_back((id, path));
                    enqueued += 1;
                }
                if enqueued > 0 {
                    debug!(enqueued, queued = self.queue.len(), "Previews enqueued");
                }
                let _ = reply.send(enqueued);
            }
            Command::Forget { ids } => {
                for id in ids {
                    if self.queued.remove(&id) {
                        self.queue.retain(|(queued_id, _)| *queued_id != id);
                    }
                    if self.loading.contains(&id) {
                        self.forgotten.insert(id);
                    }
                    self.errored.remove(&id);
                    self.cache.remove(&id);
                }
            }
            Command::State { id, reply } => {
                let _ = reply.send(self.state_of(id));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::WaitIdle { reply } => {
                self.idle_waiters.push(reply);
            }
        }
    }

    fn is_known(&self, id: JobId) -> bool {
        self.cache.contains_key(&id)
            || self.queued.contains(&id)
            || self.loading.contains(&id)
            || self.errored.contains_key(&id)
    }

    fn state_of(&self, id: JobId) -> PreviewState {
        if let Some(path) = self.cache.get(&id) {
            PreviewState::Ready { path: path.clone() }
        } else if let Some(reason) = self.errored.get(&id) {
            PreviewState::Unavailable {
                reason: reason.clone(),
            }
        } else if self.loading.contains(&id) && !self.forgotten.contains(&id) {
            PreviewState::Loading
        } else if self.queued.contains(&id) {
            PreviewState::Queued
        } else {
            PreviewState::Unknown
        }
    }

    fn snapshot(&self) -> PreviewSnapshot {
        PreviewSnapshot {
            max_in_flight: self.max_in_flight,
            queued: self.queue.iter().map(|(id, _)| *id).collect(),
            loading: self.loading.iter().copied().collect(),
            errored: self.errored.keys().copied().collect(),
            ready: self.cache.keys().copied().collect(),
        }
    }

    /// Moves queued ids into free slots, oldest first.
    fn dispatch(&mut self) {
        while self.loading.len() < self.max_in_flight {
            let Some((id, path)) = self.queue.pop_front() else {
                break;
            };
            self.queued.remove(&id);
            self.loading.insert(id);

            let engine = self.engine.clone();
            let handle = self
                .tasks
                .spawn(async move { engine.generate_preview(&path).await });
            self.task_ids.insert(handle.id(), id);
        }

        metrics::PREVIEWS_IN_FLIGHT.set(self.loading.len() as i64);
    }

    fn complete(
        &mut self,
        joined: Result<(task::Id, Result<PathBuf, EngineError>), JoinError>,
    ) {
        let (task_id, outcome) = match joined {
            Ok((task_id, result)) => (task_id, result.map_err(|e| e.to_string())),
            Err(e) => (e.id(), Err(format!("preview task failed: {}", e))),
        };

        let Some(id) = self.task_ids.remove(&task_id) else {
            return;
        };
        self.loading.remove(&id);

        if self.forgotten.remove(&id) {
            debug!(%id, "Discarding preview for removed job");
            metrics::PREVIEW_REQUESTS
                .with_label_values(&["discarded"])
                .inc();
            return;
        }

        let event = match outcome {
            Ok(path) => {
                debug!(%id, path = %path.display(), "Preview ready");
                metrics::PREVIEW_REQUESTS.with_label_values(&["ready"]).inc();
                self.cache.insert(id, path.clone());
                PreviewEvent::Ready { id, path }
            }
            Err(reason) => {
                warn!(%id, error = %reason, "Preview generation failed");
                metrics::PREVIEW_REQUESTS.with_label_values(&["failed"]).inc();
                self.errored.insert(id, reason.clone());
                PreviewEvent::Failed { id, error: reason }
            }
        };

        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn notify_idle(&mut self) {
        if self.idle_waiters.is_empty() || !self.queue.is_empty() || !self.loading.is_empty() {
            return;
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockEngine};
    use std::time::Duration;

    fn spawn(engine: Arc<MockEngine>, max_in_flight: usize) -> PreviewHandle {
        PreviewCoordinator::spawn(
            engine,
            PreviewConfig::default().with_max_in_flight(max_in_flight),
        )
    }

    fn assert_disjoint(snapshot: &PreviewSnapshot) {
        let mut seen = HashSet::new();
        for id in snapshot
            .queued
            .iter()
            .chain(&snapshot.loading)
            .chain(&snapshot.errored)
        {
            assert!(seen.insert(*id), "id {} appears in more than one set", id);
        }
    }

    #[tokio::test]
    async fn test_only_preview_formats_are_enqueued() {
        let engine = Arc::new(MockEngine::new());
        let handle = spawn(engine.clone(), 4);

        let jobs = vec![
            fixtures::job("a.heic"),
            fixtures::job("b.jpg"),
            fixtures::job("c.png"),
            fixtures::job("d.HEIF"),
        ];
        assert_eq!(handle.request(&jobs).await, 2);
        handle.wait_until_idle().await;

        assert!(matches!(handle.state(jobs[0].id).await, PreviewState::Ready { .. }));
        assert_eq!(handle.state(jobs[1].id).await, PreviewState::Unknown);
        assert_eq!(engine.preview_requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_requests_are_ignored() {
        let engine = Arc::new(MockEngine::new());
        engine.set_preview_delay(Duration::from_millis(20)).await;
        let handle = spawn(engine.clone(), 4);

        let jobs = vec![fixtures::job("a.heic")];
        assert_eq!(handle.request(&jobs).await, 1);
        assert_eq!(handle.request(&jobs).await, 0);
        handle.wait_until_idle().await;

        // Cached now, still not re-requested
        assert_eq!(handle.request(&jobs).await, 0);
        assert_eq!(engine.preview_requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_preview_is_isolated_and_not_retried() {
        let engine = Arc::new(MockEngine::new());
        let jobs = fixtures::jobs("heic", 3);
        engine.fail_preview(&jobs[1].path).await;
        let handle = spawn(engine.clone(), 4);
        let mut events = handle.subscribe();

        handle.request(&jobs).await;
        handle.wait_until_idle().await;

        assert!(matches!(handle.state(jobs[0].id).await, PreviewState::Ready { .. }));
        assert!(matches!(handle.state(jobs[1].id).await, PreviewState::Unavailable { .. }));
        assert!(matches!(handle.state(jobs[2].id).await, PreviewState::Ready { .. }));

        let mut failed = 0;
        for _ in 0..3 {
            if let PreviewEvent::Failed { id, .. } = events.recv().await.unwrap() {
                assert_eq!(id, jobs[1].id);
                failed += 1;
            }
        }
        assert_eq!(failed, 1);

        assert_eq!(handle.request(&jobs).await, 0);
        assert_eq!(engine.preview_requests().await.len(), 3);
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_limit() {
        let engine = Arc::new(MockEngine::new());
        engine.set_preview_delay(Duration::from_millis(5)).await;
        let handle = spawn(engine.clone(), 4);

        let jobs = fixtures::jobs("heic", 100);
        assert_eq!(handle.request(&jobs).await, 100);

        let snapshot = handle.snapshot().await;
        assert!(snapshot.loading.len() <= 4);
        assert_disjoint(&snapshot);

        handle.wait_until_idle().await;
        assert_eq!(engine.peak_concurrent_previews(), 4);
        assert_eq!(handle.snapshot().await.ready.len(), 100);
    }

    #[tokio::test]
    async fn test_dispatch_is_fifo() {
        let engine = Arc::new(MockEngine::new());
        engine.set_preview_delay(Duration::from_millis(1)).await;
        let handle = spawn(engine.clone(), 1);

        let jobs = fixtures::jobs("heic", 5);
        handle.request(&jobs).await;
        handle.wait_until_idle().await;

        let expected: Vec<PathBuf> = jobs.iter().map(|j| j.path.clone()).collect();
        assert_eq!(engine.preview_requests().await, expected);
    }

    #[tokio::test]
    async fn test_forget_drops_queued_ids() {
        let engine = Arc::new(MockEngine::new());
        engine.set_preview_delay(Duration::from_millis(30)).await;
        let handle = spawn(engine.clone(), 1);

        let jobs = fixtures::jobs("heic", 3);
        handle.request(&jobs).await;
        handle.forget(vec![jobs[2].id]).await;

        let snapshot = handle.snapshot().await;
        assert!(!snapshot.queued.contains(&jobs[2].id));
        assert_eq!(handle.state(jobs[2].id).await, PreviewState::Unknown);

        handle.wait_until_idle().await;
        assert_eq!(engine.preview_requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_forget_while_loading_discards_result() {
        let engine = Arc::new(MockEngine::new());
        engine.set_preview_delay(Duration::from_millis(30)).await;
        let handle = spawn(engine.clone(), 2);
        let mut events = handle.subscribe();

        let jobs = fixtures::jobs("heic", 2);
        handle.request(&jobs).await;
        assert_eq!(handle.state(jobs[0].id).await, PreviewState::Loading);

        handle.forget(vec![jobs[0].id]).await;
        assert_eq!(handle.state(jobs[0].id).await, PreviewState::Unknown);
        // Still holds its slot until the request resolves
        assert_eq!(handle.snapshot().await.loading.len(), 2);

        handle.wait_until_idle().await;
        assert_eq!(handle.state(jobs[0].id).await, PreviewState::Unknown);
        assert!(matches!(handle.state(jobs[1].id).await, PreviewState::Ready { .. }));

        // Only the surviving job produced an event
        assert_eq!(events.recv().await.unwrap().id(), jobs[1].id);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wait_until_idle_returns_immediately_when_empty() {
        let engine = Arc::new(MockEngine::new());
        let handle = spawn(engine, 4);
        tokio::time::timeout(Duration::from_secs(1), handle.wait_until_idle())
            .await
            .expect("idle coordinator should resolve waiters");
    }
}
