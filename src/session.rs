use crate::config::AppConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::sync::{default_derivers, Synchronizer, ViewDeriver, Views};
use crate::table::{TableEvent, TableSettings, TableState, TableView};
use crate::types::Dataset;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events held back behind a missing sequence number before the gap is given up on.
const MAX_PENDING_EVENTS: usize = 64;

pub struct Session {
    id: Uuid,
    table: TableView,
    sync: Synchronizer,
    last_seq: u64,
    /// Events that arrived ahead of an earlier one, keyed by seq.
    pending: BTreeMap<u64, TableEvent>,
    last_rejected: Vec<usize>,
    last_active: Instant,
}

/// What the page receives after creating a session or sending an event.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub session_id: Uuid,
    pub seq: u64,
    /// False when the event was a duplicate or is still waiting for an
    /// earlier one.
    pub applied: bool,
    pub pending_events: usize,
    pub state: TableState,
    /// Sort and filters behind `state`, so a client can rebuild it.
    pub table: TableSettings,
    #[serde(flatten)]
    pub views: Views,
    pub rejected_indices: Vec<usize>,
}

impl Session {
    /// `replay` is applied in order before the first publish.
    fn new(dataset: Dataset, mut sync: Synchronizer, replay: Vec<TableEvent>) -> Self {
        let mut table = TableView::new(dataset);
        for event in replay {
            table.apply(event);
        }
        let publication = sync.publish(table.state());
        Self {
            id: Uuid::new_v4(),
            table,
            sync,
            last_seq: 0,
            pending: BTreeMap::new(),
            last_rejected: publication.rejected,
            last_active: Instant::now(),
        }
    }

    /// Applies events in `seq` order, whatever order they arrive in. An event
    /// ahead of a missing one waits in `pending`; the views are derived once
    /// from the state after the last event applied. Returns whether `seq` has
    /// been applied.
    fn apply(&mut self, seq: u64, event: TableEvent) -> bool {
        self.last_active = Instant::now();
        if seq <= self.last_seq || self.pending.contains_key(&seq) {
            debug!(session = %self.id, seq, last = self.last_seq, "Dropping duplicate event");
            return false;
        }
        self.pending.insert(seq, event);

        let mut advanced = false;
        while let Some((next, event)) = self.pending.pop_first() {
            if next != self.last_seq + 1 {
                if self.pending.len() < MAX_PENDING_EVENTS {
                    self.pending.insert(next, event);
                    break;
                }
                warn!(session = %self.id, missing = self.last_seq + 1, next, "Skipping lost events");
            }
            self.table.apply(event);
            self.last_seq = next;
            advanced = true;
        }

        if advanced {
            let publication = self.sync.publish(self.table.state());
            self.last_rejected = publication.rejected;
        } else {
            debug!(session = %self.id, seq, last = self.last_seq, "Holding event until earlier ones arrive");
        }
        seq <= self.last_seq
    }

    fn snapshot(&self, applied: bool) -> Snapshot {
        Snapshot {
            session_id: self.id,
            seq: self.last_seq,
            applied,
            pending_events: self.pending.len(),
            state: self.table.state().clone(),
            table: self.table.settings(),
            views: self.sync.views().clone(),
            rejected_indices: self.last_rejected.clone(),
        }
    }
}

pub struct SessionRegistry {
    dataset: Dataset,
    derivers: Arc<[Arc<dyn ViewDeriver>]>,
    config: Arc<AppConfig>,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new(dataset: Dataset, config: Arc<AppConfig>) -> Self {
        Self {
            dataset,
            derivers: default_derivers(&config),
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn create(&self) -> Snapshot {
        self.create_with(Vec::new())
    }

    /// Creates a session whose table starts from `replay` applied in order,
    /// e.g. the settings and selection of a session that was evicted.
    pub fn create_with(&self, replay: Vec<TableEvent>) -> Snapshot {
        let sync = Synchronizer::new(self.derivers.clone(), self.config.selection.out_of_range);
        let replayed = replay.len();
        let session = Session::new(self.dataset.clone(), sync, replay);
        let snapshot = session.snapshot(true);
        self.sessions
            .write()
            .insert(session.id, Arc::new(Mutex::new(session)));
        info!(session = %snapshot.session_id, replayed, "Session created");
        snapshot
    }

    fn get(&self, id: Uuid) -> DashboardResult<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(DashboardError::SessionNotFound(id))
    }

    pub fn snapshot(&self, id: Uuid) -> DashboardResult<Snapshot> {
        let session = self.get(id)?;
        let mut session = session.lock();
        session.last_active = Instant::now();
        Ok(session.snapshot(true))
    }

    pub fn apply(&self, id: Uuid, seq: u64, event: TableEvent) -> DashboardResult<Snapshot> {
        let session = self.get(id)?;
        let mut session = session.lock();
        let applied = session.apply(seq, event);
        Ok(session.snapshot(applied))
    }

    pub fn remove(&self, id: Uuid) -> DashboardResult<()> {
        self.sessions
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(DashboardError::SessionNotFound(id))
    }

    /// Drops sessions idle for longer than `ttl` as of `now`.
    pub fn evict_idle(&self, now: Instant, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| {
            let idle = now.saturating_duration_since(session.lock().last_active);
            idle <= ttl
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }
}
