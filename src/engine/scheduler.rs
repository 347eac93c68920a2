//! Cross-room session supervision
//!
//! The scheduler owns the room registry and at most one live session per
//! room. Its sweep loop is the only writer of the registry; admin requests
//! are forwarded to the owning session's command queue, never applied to
//! session state from outside.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::engine::bots::{BotController, BotProfile};
use crate::engine::events::{EventBus, SessionEvent};
use crate::engine::room::{RoomConfig, RoomId};
use crate::engine::session::{
    spawn_session, CancelReason, GameSession, SessionClient, SessionDeps, SessionHandle,
    SessionId, SessionSnapshot,
};
use crate::errors::{EngineError, EngineResult, SchedulerError};
use crate::metrics::EngineMonitor;
use crate::store::{CommissionProvider, SessionStore, WalletLedger};

/// Filter for the monitor's session listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListScope {
    All,
    ByRoom(RoomId),
}

pub struct GameScheduler {
    rooms: DashMap<RoomId, RoomConfig>,
    live: DashMap<RoomId, SessionHandle>,
    recent: Mutex<VecDeque<SessionSnapshot>>,
    deps: SessionDeps,
    running: AtomicBool,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl GameScheduler {
    pub fn new(
        config: EngineConfig,
        rooms: Vec<RoomConfig>,
        bots: Vec<BotProfile>,
        store: Arc<dyn SessionStore>,
        wallet: Arc<dyn WalletLedger>,
        commission: Arc<dyn CommissionProvider>,
    ) -> EngineResult<Arc<Self>> {
        config.validate()?;
        for room in &rooms {
            room.validate()?;
        }
        let deps = SessionDeps {
            store,
            wallet,
            commission,
            bots: Arc::new(BotController::new(bots)),
            monitor: Arc::new(EngineMonitor::new()),
            events: EventBus::new(config.observer.event_buffer),
            config,
        };
        Ok(Arc::new(Self {
            rooms: rooms.into_iter().map(|r| (r.id.clone(), r)).collect(),
            live: DashMap::new(),
            recent: Mutex::new(VecDeque::new()),
            deps,
            running: AtomicBool::new(true),
            supervisor: Mutex::new(None),
        }))
    }

    /// Spawn the sweep loop. Idempotent only in the sense that the caller
    /// should invoke it once, right after construction.
    pub fn start(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        let poll = self.deps.config.scheduler_poll();
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(poll);
            while scheduler.running.load(Ordering::SeqCst) {
                tick.tick().await;
                scheduler.sweep().await;
            }
        });
        *self.supervisor.lock().expect("supervisor lock poisoned") = Some(handle);
        tracing::info!(rooms = self.rooms.len(), "scheduler started");
    }

    /// One supervision pass: retire ended sessions, open sessions for
    /// enabled rooms without one. Only this loop mutates the registry.
    async fn sweep(&self) {
        let ended: Vec<RoomId> = self
            .live
            .iter()
            .filter(|e| e.value().is_terminal())
            .map(|e| e.key().clone())
            .collect();
        for room_id in ended {
            if let Some((_, handle)) = self.live.remove(&room_id) {
                tracing::debug!(session = %handle.id(), room = %room_id, "session retired");
                self.remember(handle.snapshot());
            }
        }

        for room in self.rooms.iter() {
            if !room.value().enabled || self.live.contains_key(room.key()) {
                continue;
            }
            let handle = self.open_session(room.value().clone());
            self.live.insert(room.key().clone(), handle);
        }
    }

    fn open_session(&self, room: RoomConfig) -> SessionHandle {
        let patterns = room.patterns.build();
        let commission = self.deps.commission.current();
        let session = GameSession::new(room, patterns, commission);
        spawn_session(session, self.deps.clone())
    }

    fn remember(&self, snapshot: SessionSnapshot) {
        let mut recent = self.recent.lock().expect("history lock poisoned");
        if recent.len() == self.deps.config.observer.history_capacity {
            recent.pop_front();
        }
        recent.push_back(snapshot);
    }

    fn client_for(&self, session_id: SessionId) -> Option<SessionClient> {
        self.live
            .iter()
            .find(|e| e.value().id() == session_id)
            .map(|e| e.value().client())
    }

    fn in_recent(&self, session_id: SessionId) -> bool {
        self.recent
            .lock()
            .expect("history lock poisoned")
            .iter()
            .any(|s| s.id == session_id)
    }

    // ---- surface consumed by the admin/monitor collaborators ----

    /// Seat a human player in the room's open session
    pub async fn join(
        &self,
        room_id: &str,
        participant_id: impl Into<String>,
    ) -> EngineResult<SessionId> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SchedulerError::ShutDown.into());
        }
        if !self.rooms.contains_key(room_id) {
            return Err(SchedulerError::UnknownRoom(room_id.to_string()).into());
        }
        let client = self
            .live
            .get(room_id)
            .map(|h| h.client())
            .ok_or_else(|| EngineError::from(SchedulerError::NoOpenSession(room_id.to_string())))?;
        client.join(participant_id).await?;
        Ok(client.id())
    }

    /// Pause or resume an active session; a no-op on ended sessions
    pub async fn pause(&self, session_id: SessionId, paused: bool) -> EngineResult<()> {
        if let Some(client) = self.client_for(session_id) {
            client.pause(paused).await?;
            return Ok(());
        }
        if self.in_recent(session_id) {
            return Ok(());
        }
        Err(SchedulerError::UnknownSession(session_id).into())
    }

    /// Cancel a session immediately; a no-op on ended sessions
    pub async fn force_end(
        &self,
        session_id: SessionId,
        reason: impl Into<String>,
    ) -> EngineResult<()> {
        if let Some(client) = self.client_for(session_id) {
            client
                .force_end(CancelReason::Administrative {
                    reason: reason.into(),
                })
                .await?;
            return Ok(());
        }
        if self.in_recent(session_id) {
            return Ok(());
        }
        Err(SchedulerError::UnknownSession(session_id).into())
    }

    /// Live sessions first, then recent history newest-first
    pub fn list(&self, scope: ListScope) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = match &scope {
            ListScope::All => self.live.iter().map(|e| e.value().snapshot()).collect(),
            ListScope::ByRoom(room_id) => self
                .live
                .get(room_id)
                .map(|h| vec![h.snapshot()])
                .unwrap_or_default(),
        };
        let recent = self.recent.lock().expect("history lock poisoned");
        match &scope {
            ListScope::All => sessions.extend(recent.iter().rev().cloned()),
            ListScope::ByRoom(room_id) => {
                sessions.extend(recent.iter().rev().filter(|s| &s.room_id == room_id).cloned())
            }
        }
        sessions
    }

    /// Snapshot stream; one event per state change across all sessions
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.deps.events.subscribe()
    }

    pub fn monitor(&self) -> Arc<EngineMonitor> {
        Arc::clone(&self.deps.monitor)
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|e| e.key().clone()).collect()
    }

    // ---- room registry, mutated by the admin surface ----

    /// Add or replace a room. Running sessions keep the stake and rules
    /// they copied at creation.
    pub fn upsert_room(&self, room: RoomConfig) -> EngineResult<()> {
        room.validate()?;
        self.rooms.insert(room.id.clone(), room);
        Ok(())
    }

    /// A disabled room finishes its current session and gets no new one
    pub fn set_room_enabled(&self, room_id: &str, enabled: bool) -> EngineResult<()> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| EngineError::from(SchedulerError::UnknownRoom(room_id.to_string())))?;
        room.enabled = enabled;
        Ok(())
    }

    /// Drop a room and cancel its open session
    pub async fn remove_room(&self, room_id: &str) -> EngineResult<()> {
        self.rooms
            .remove(room_id)
            .ok_or_else(|| EngineError::from(SchedulerError::UnknownRoom(room_id.to_string())))?;
        if let Some((_, handle)) = self.live.remove(room_id) {
            let client = handle.client();
            let _ = client.force_end(CancelReason::RoomClosed).await;
            let _ = handle.task.await;
            self.remember(client.snapshot());
        }
        Ok(())
    }

    /// Stop supervision, cancel every live session and wait for the tasks
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self
            .supervisor
            .lock()
            .expect("supervisor lock poisoned")
            .take()
        {
            handle.abort();
        }

        let rooms: Vec<RoomId> = self.live.iter().map(|e| e.key().clone()).collect();
        let mut handles = Vec::new();
        for room_id in rooms {
            if let Some((_, handle)) = self.live.remove(&room_id) {
                handles.push(handle);
            }
        }
        let clients: Vec<SessionClient> = handles.iter().map(|h| h.client()).collect();
        for client in &clients {
            let _ = client.force_end(CancelReason::RoomClosed).await;
        }
        let tasks: Vec<_> = handles.into_iter().map(|h| h.task).collect();
        futures::future::join_all(tasks).await;
        for client in clients {
            self.remember(client.snapshot());
        }
        tracing::info!("scheduler shut down");
    }
}
