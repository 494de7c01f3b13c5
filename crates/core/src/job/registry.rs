//! Job registry trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::broadcast;

use super::types::{ConversionSettings, Job, JobId, JobStatus, JobUpdate, SettingsUpdate};

/// Capacity of the registry event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notification emitted after every mutation.
///
/// Every event carries the registry revision reached by that mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    JobsAdded { revision: u64, jobs: Vec<Job> },
    JobRemoved { revision: u64, id: JobId },
    JobsUpdated { revision: u64, jobs: Vec<Job> },
    Cleared { revision: u64, ids: Vec<JobId> },
    SettingsChanged { revision: u64, settings: ConversionSettings },
}

impl RegistryEvent {
    pub fn revision(&self) -> u64 {
        match self {
            Self::JobsAdded { revision, .. }
            | Self::JobRemoved { revision, .. }
            | Self::JobsUpdated { revision, .. }
            | Self::Cleared { revision, .. }
            | Self::SettingsChanged { revision, .. } => *revision,
        }
    }
}

/// Consistent view of the registry taken under one lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    pub revision: u64,
    pub jobs: Vec<Job>,
    pub settings: ConversionSettings,
}

impl RegistrySnapshot {
    /// Jobs currently in `Pending`, in insertion order.
    pub fn pending(&self) -> Vec<Job> {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect()
    }
}

/// The single source of truth for jobs and conversion settings.
///
/// All operations are synchronous and atomic with respect to each other.
/// None of them block on I/O.
pub trait JobRegistry: Send + Sync {
    /// Appends jobs in order.
    ///
    /// # Panics
    ///
    /// Panics if any id is already present, or repeated within `jobs`.
    fn add(&self, jobs: Vec<Job>);

    /// Removes one job. Returns the removed job, if it existed.
    fn remove(&self, id: JobId) -> Option<Job>;

    /// Merges an update into one job. Unknown ids are a no-op returning `false`.
    fn update(&self, id: JobId, update: JobUpdate) -> bool;

    /// Merges an update only while the job is in `expected`, under one lock.
    fn update_if(&self, id: JobId, expected: JobStatus, update: JobUpdate) -> bool;

    /// Applies several updates under one lock. Returns the ids that existed.
    fn update_many(&self, updates: Vec<(JobId, JobUpdate)>) -> Vec<JobId>;

    /// Removes every completed job. Returns the removed ids.
    fn clear_completed(&self) -> Vec<JobId>;

    /// Removes every job. Returns the removed ids.
    fn clear_all(&self) -> Vec<JobId>;

    /// Merges a settings update and returns the resulting settings.
    fn update_settings(&self, update: SettingsUpdate) -> ConversionSettings;

    fn get(&self, id: JobId) -> Option<Job>;

    /// All jobs in insertion order.
    fn jobs(&self) -> Vec<Job>;

    fn settings(&self) -> ConversionSettings;

    fn snapshot(&self) -> RegistrySnapshot;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent>;
}

#[derive(Debug)]
struct RegistryInner {
    jobs: Vec<Job>,
    settings: ConversionSettings,
    revision: u64,
}

impl RegistryInner {
    fn bump(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn refresh_estimates(&mut self) -> Vec<Job> {
        let settings = self.settings.clone();
        let mut changed = Vec::new();
        for job in self.jobs.iter_mut().filter(|j| j.status == JobStatus::Pending) {
            let estimate = settings.estimate_output_size(job.width, job.height);
            if job.estimated_size != Some(estimate) {
                job.estimated_size = Some(estimate);
                changed.push(job.clone());
            }
        }
        changed
    }
}

/// In-memory registry guarded by one `RwLock`.
///
/// Notifications are broadcast after the lock is released.
pub struct InMemoryJobRegistry {
    inner: RwLock<RegistryInner>,
    events: broadcast::Sender<RegistryEvent>,
}

impl InMemoryJobRegistry {
    pub fn new() -> Self {
        Self::with_settings(ConversionSettings::default())
    }

    pub fn with_settings(settings: ConversionSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(RegistryInner {
                jobs: Vec::new(),
                settings,
                revision: 0,
            }),
            events,
        }
    }

    // A poisoned lock only means a panic elsewhere mid-mutation; the data is
    // still structurally valid, so keep serving it.
    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: RegistryEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for InMemoryJobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry for InMemoryJobRegistry {
    fn add(&self, mut jobs: Vec<Job>) {
        if jobs.is_empty() {
            return;
        }

        let event = {
            let mut inner = self.write();

            let mut seen: HashSet<JobId> = inner.jobs.iter().map(|j| j.id).collect();
            for job in &jobs {
                if !seen.insert(job.id) {
                    panic!("duplicate job id added to registry: {}", job.id);
                }
            }

            let settings = inner.settings.clone();
            for job in &mut jobs {
                if job.status == JobStatus::Pending && job.estimated_size.is_none() {
                    job.estimated_size = Some(settings.estimate_output_size(job.width, job.height));
                }
            }

            inner.jobs.extend(jobs.iter().cloned());
            let revision = inner.bump();
            RegistryEvent::JobsAdded { revision, jobs }
        };

        self.emit(event);
    }

    fn remove(&self, id: JobId) -> Option<Job> {
        let (removed, revision) = {
            let mut inner = self.write();
            let pos = inner.jobs.iter().position(|j| j.id == id)?;
            let removed = inner.jobs.remove(pos);
            (removed, inner.bump())
        };

        self.emit(RegistryEvent::JobRemoved { revision, id });
        Some(removed)
    }

    fn update(&self, id: JobId, update: JobUpdate) -> bool {
        !self.update_many(vec![(id, update)]).is_empty()
    }

    fn update_if(&self, id: JobId, expected: JobStatus, update: JobUpdate) -> bool {
        let event = {
            let mut inner = self.write();
            let Some(job) = inner
                .jobs
                .iter_mut()
                .find(|j| j.id == id && j.status == expected)
            else {
                return false;
            };
            job.apply(&update);
            let changed = job.clone();
            let revision = inner.bump();
            RegistryEvent::JobsUpdated {
                revision,
                jobs: vec![changed],
            }
        };

        self.emit(event);
        true
    }

    fn update_many(&self, updates: Vec<(JobId, JobUpdate)>) -> Vec<JobId> {
        let mut applied = Vec::new();

        let event = {
            let mut inner = self.write();
            let mut changed: Vec<Job> = Vec::new();

            for (id, update) in &updates {
                if let Some(job) = inner.jobs.iter_mut().find(|j| j.id == *id) {
                    job.apply(update);
                    applied.push(*id);
                    match changed.iter_mut().find(|j| j.id == *id) {
                        Some(existing) => *existing = job.clone(),
                        None => changed.push(job.clone()),
                    }
                }
            }

            if changed.is_empty() {
                None
            } else {
                let revision = inner.bump();
                Some(RegistryEvent::JobsUpdated {
                    revision,
                    jobs: changed,
                })
            }
        };

        if let Some(event) = event {
            self.emit(event);
        }
        applied
    }

    fn clear_completed(&self) -> Vec<JobId> {
        let (ids, revision) = {
            let mut inner = self.write();
            let ids: Vec<JobId> = inner
                .jobs
                .iter()
                .filter(|j| j.status == JobStatus::Completed)
                .map(|j| j.id)
                .collect();
            if ids.is_empty() {
                return ids;
            }
            inner.jobs.retain(|j| j.status != JobStatus::Completed);
            (ids, inner.bump())
        };

        self.emit(RegistryEvent::Cleared {
            revision,
            ids: ids.clone(),
        });
        ids
    }

    fn clear_all(&self) -> Vec<JobId> {
        let (ids, revision) = {
            let mut inner = self.write();
            let ids: Vec<JobId> = inner.jobs.drain(..).map(|j| j.id).collect();
            if ids.is_empty() {
                return ids;
            }
            (ids, inner.bump())
        };

        self.emit(RegistryEvent::Cleared {
            revision,
            ids: ids.clone(),
        });
        ids
    }

    fn update_settings(&self, update: SettingsUpdate) -> ConversionSettings {
        let (settings, revision, refreshed) = {
            let mut inner = self.write();
            inner.settings.apply(&update);
            let refreshed = inner.refresh_estimates();
            let settings = inner.settings.clone();
            (settings, inner.bump(), refreshed)
        };

        self.emit(RegistryEvent::SettingsChanged {
            revision,
            settings: settings.clone(),
        });
        if !refreshed.is_empty() {
            self.emit(RegistryEvent::JobsUpdated {
                revision,
                jobs: refreshed,
            });
        }
        settings
    }

    fn get(&self, id: JobId) -> Option<Job> {
        self.read().jobs.iter().find(|j| j.id == id).cloned()
    }

    fn jobs(&self) -> Vec<Job> {
        self.read().jobs.clone()
    }

    fn settings(&self) -> ConversionSettings {
        self.read().settings.clone()
    }

    fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.read();
        RegistrySnapshot {
            revision: inner.revision,
            jobs: inner.jobs.clone(),
            settings: inner.settings.clone(),
        }
    }

    fn len(&self) -> usize {
        self.read().jobs.len()
    }

    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}
