//! One round of play in one room, from formation to settlement
//!
//! A session runs as its own tokio task. Admin operations (join, pause,
//! force-end) are queued on a command channel and applied by the owning loop
//! at tick boundaries, so the loop stays the single writer of session state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::bots::BotController;
use crate::engine::caller::NumberCaller;
use crate::engine::card::{Card, CardEngine};
use crate::engine::events::{EventBus, SessionEvent};
use crate::engine::prize::{CommissionSnapshot, PrizePoolCalculator};
use crate::engine::room::{RoomConfig, RoomId};
use crate::engine::win::{PatternSet, WinEvaluator};
use crate::errors::{CallerError, SessionError};
use crate::metrics::EngineMonitor;
use crate::store::{CommissionProvider, SessionStore, WalletLedger};

pub type SessionId = Uuid;

/// Closed set of session states; unknown values are rejected at the serde
/// boundary rather than defaulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Countdown,
    Active,
    Finished,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Finished | SessionStatus::Cancelled)
    }

    /// The legal transition table. Countdown may revert to Waiting; both
    /// terminal states are absorbing.
    pub fn can_transition(from: SessionStatus, to: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (from, to),
            (Waiting, Countdown)
                | (Countdown, Waiting)
                | (Countdown, Active)
                | (Active, Finished)
                | (Waiting, Cancelled)
                | (Countdown, Cancelled)
                | (Active, Cancelled)
        )
    }
}

/// Why a session ended in `Cancelled`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancelReason {
    Administrative { reason: String },
    RoomClosed,
    StoreFailure { detail: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    Human,
    Bot,
}

/// A seated player, human or bot. `seq` is the join order and the fixed
/// tie-break key for simultaneous claims.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub kind: ParticipantKind,
    pub seq: u32,
    pub joined_at: DateTime<Utc>,
    pub card: Card,
}

/// Immutable record of a settled win
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WinRecord {
    pub session_id: SessionId,
    pub winner: String,
    pub pattern: String,
    pub won_at: DateTime<Utc>,
    pub calls_at_win: u32,
    /// Frozen prize pool; the amount credited to the winner
    pub prize: u64,
    /// The winning card as it stood at the win
    pub card: Card,
}

/// Point-in-time read-only view of a session for observers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub room_id: RoomId,
    pub status: SessionStatus,
    pub paused: bool,
    pub called: Vec<u8>,
    pub humans: Vec<String>,
    pub bots: Vec<String>,
    pub stake: u64,
    pub prize_pool: u64,
    pub commission_bps: u16,
    pub winner: Option<WinRecord>,
    pub cancel_reason: Option<CancelReason>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Shared collaborators handed to every session task
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn SessionStore>,
    pub wallet: Arc<dyn WalletLedger>,
    pub commission: Arc<dyn CommissionProvider>,
    pub bots: Arc<BotController>,
    pub monitor: Arc<EngineMonitor>,
    pub events: EventBus,
    pub config: EngineConfig,
}

/// A bot claim waiting out its sampled response delay, in call ticks
#[derive(Clone, Debug)]
struct PendingClaim {
    seq: u32,
    due_in_ticks: u32,
}

/// The state machine for one round in one room
pub struct GameSession {
    id: SessionId,
    room: RoomConfig,
    status: SessionStatus,
    paused: bool,
    countdown_remaining: u32,
    caller: NumberCaller,
    evaluator: WinEvaluator,
    participants: Vec<Participant>,
    next_seq: u32,
    pending_claims: Vec<PendingClaim>,
    inactive_bots: HashSet<String>,
    prize_pool: u64,
    commission: CommissionSnapshot,
    winner: Option<WinRecord>,
    cancel_reason: Option<CancelReason>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    rng: StdRng,
}

impl GameSession {
    /// The stake and rules are copied out of the room here so later room
    /// edits never touch a running round.
    pub fn new(room: RoomConfig, patterns: PatternSet, commission: CommissionSnapshot) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: SessionStatus::Waiting,
            paused: false,
            countdown_remaining: 0,
            caller: NumberCaller::new(),
            evaluator: WinEvaluator::new(patterns),
            participants: Vec::new(),
            next_seq: 0,
            pending_claims: Vec::new(),
            inactive_bots: HashSet::new(),
            prize_pool: 0,
            commission,
            winner: None,
            cancel_reason: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            rng: StdRng::from_entropy(),
            room,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            room_id: self.room.id.clone(),
            status: self.status,
            paused: self.paused,
            called: self.caller.called().to_vec(),
            humans: self.participant_ids(ParticipantKind::Human),
            bots: self.participant_ids(ParticipantKind::Bot),
            stake: self.room.stake,
            prize_pool: self.prize_pool,
            commission_bps: self.commission.rate_bps,
            winner: self.winner.clone(),
            cancel_reason: self.cancel_reason.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    fn participant_ids(&self, kind: ParticipantKind) -> Vec<String> {
        self.participants
            .iter()
            .filter(|p| p.kind == kind)
            .map(|p| p.id.clone())
            .collect()
    }

    fn bot_count(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.kind == ParticipantKind::Bot)
            .count()
    }

    /// Current tick length: lobby cadence until the round is active, then
    /// the room's call interval (or the simulation override).
    pub(crate) fn cadence(&self, config: &EngineConfig) -> Duration {
        match self.status {
            SessionStatus::Active => self.call_interval(config),
            _ => config.lobby_tick(),
        }
    }

    fn call_interval(&self, config: &EngineConfig) -> Duration {
        config
            .timing
            .call_override_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.room.speed.call_interval())
    }

    fn set_status(&mut self, to: SessionStatus) -> Result<(), SessionError> {
        if !SessionStatus::can_transition(self.status, to) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    fn try_set_status(&mut self, to: SessionStatus) -> bool {
        match self.set_status(to) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(session = %self.id, error = %e, "refused status change");
                false
            }
        }
    }

    // ---- admission ----

    fn can_admit(&self, id: &str) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Waiting | SessionStatus::Countdown => {}
            SessionStatus::Active => return Err(SessionError::JoinsClosed),
            s => return Err(SessionError::Terminal(s)),
        }
        if self.participants.len() >= self.room.max_players {
            return Err(SessionError::Full {
                max_players: self.room.max_players,
            });
        }
        if self.participants.iter().any(|p| p.id == id) {
            return Err(SessionError::AlreadyJoined {
                participant: id.to_string(),
            });
        }
        Ok(())
    }

    fn admit(
        &mut self,
        id: String,
        kind: ParticipantKind,
        card: Card,
        commission: CommissionSnapshot,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.participants.push(Participant {
            id,
            kind,
            seq,
            joined_at: Utc::now(),
            card,
        });
        self.commission = commission;
        self.recompute_pool();
    }

    fn recompute_pool(&mut self) {
        self.prize_pool = PrizePoolCalculator::live_pool(
            self.room.stake,
            self.participants.len(),
            &self.commission,
        );
    }

    async fn apply_join(
        &mut self,
        participant_id: String,
        deps: &SessionDeps,
    ) -> Result<(), SessionError> {
        self.can_admit(&participant_id)?;
        deps.wallet
            .debit_stake(&participant_id, self.room.stake)
            .await
            .map_err(|e| SessionError::StakeRejected {
                participant: participant_id.clone(),
                detail: e.to_string(),
            })?;
        let card = CardEngine::generate(&mut self.rng);
        self.admit(
            participant_id.clone(),
            ParticipantKind::Human,
            card,
            deps.commission.current(),
        );
        deps.monitor.record_stake(self.room.stake);
        tracing::info!(
            session = %self.id,
            player = %participant_id,
            roster = self.participants.len(),
            prize_pool = self.prize_pool,
            "player joined"
        );
        deps.events
            .publish(SessionEvent::StatusChanged(self.snapshot()));
        Ok(())
    }

    fn apply_pause(&mut self, paused: bool, deps: &SessionDeps) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            tracing::debug!(session = %self.id, "pause ignored on ended session");
            return Ok(());
        }
        if self.paused == paused {
            return Ok(());
        }
        self.paused = paused;
        tracing::info!(session = %self.id, paused, "pause flag changed");
        deps.events
            .publish(SessionEvent::StatusChanged(self.snapshot()));
        Ok(())
    }

    async fn apply_force_end(
        &mut self,
        reason: CancelReason,
        deps: &SessionDeps,
    ) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            tracing::debug!(session = %self.id, "force-end ignored on ended session");
            return Ok(());
        }
        self.cancel(reason, deps).await;
        Ok(())
    }

    pub(crate) async fn apply_command(&mut self, cmd: SessionCommand, deps: &SessionDeps) {
        match cmd {
            SessionCommand::Join {
                participant_id,
                resp,
            } => {
                let result = self.apply_join(participant_id, deps).await;
                let _ = resp.send(result);
            }
            SessionCommand::Pause { paused, resp } => {
                let _ = resp.send(self.apply_pause(paused, deps));
            }
            SessionCommand::ForceEnd { reason, resp } => {
                let _ = resp.send(self.apply_force_end(reason, deps).await);
            }
        }
    }

    // ---- tick pipeline ----

    /// One tick of the state machine. The pause flag is honored here, at
    /// the tick boundary, so resuming continues with no skipped or
    /// duplicated draw.
    pub(crate) async fn tick(&mut self, deps: &SessionDeps) {
        if self.paused || self.status.is_terminal() {
            return;
        }
        match self.status {
            SessionStatus::Waiting | SessionStatus::Countdown => self.tick_lobby(deps).await,
            SessionStatus::Active => self.tick_active(deps).await,
            SessionStatus::Finished | SessionStatus::Cancelled => {}
        }
    }

    async fn tick_lobby(&mut self, deps: &SessionDeps) {
        self.fill_bots(deps).await;
        let roster = self.participants.len();
        let min = deps.config.rules.min_participants;
        match self.status {
            SessionStatus::Waiting => {
                if roster >= min {
                    if !self.try_set_status(SessionStatus::Countdown) {
                        return;
                    }
                    self.countdown_remaining = deps.config.timing.countdown_ticks;
                    tracing::info!(session = %self.id, roster, "countdown started");
                    deps.events
                        .publish(SessionEvent::StatusChanged(self.snapshot()));
                    self.persist_status(deps).await;
                }
            }
            SessionStatus::Countdown => {
                if roster < min {
                    if !self.try_set_status(SessionStatus::Waiting) {
                        return;
                    }
                    self.countdown_remaining = 0;
                    tracing::info!(session = %self.id, roster, "countdown reverted to waiting");
                    deps.events
                        .publish(SessionEvent::StatusChanged(self.snapshot()));
                    self.persist_status(deps).await;
                    return;
                }
                self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
                if self.countdown_remaining == 0 {
                    self.begin_active(deps).await;
                }
            }
            _ => {}
        }
    }

    async fn begin_active(&mut self, deps: &SessionDeps) {
        if !self.try_set_status(SessionStatus::Active) {
            return;
        }
        self.started_at = Some(Utc::now());
        tracing::info!(
            session = %self.id,
            room = %self.room.id,
            participants = self.participants.len(),
            prize_pool = self.prize_pool,
            "round active"
        );
        deps.events
            .publish(SessionEvent::StatusChanged(self.snapshot()));
        self.persist_status(deps).await;
    }

    async fn tick_active(&mut self, deps: &SessionDeps) {
        let number = match self.caller.draw() {
            Ok(n) => n,
            Err(CallerError::PoolExhausted) => {
                self.finish_no_winner(deps).await;
                return;
            }
        };
        if !self.persist_draw(number, deps).await {
            return;
        }
        deps.monitor.record_draw();
        tracing::debug!(
            session = %self.id,
            number,
            call = self.caller.called().len(),
            "number called"
        );
        deps.events.publish(SessionEvent::NumberCalled {
            number,
            snapshot: self.snapshot(),
        });

        self.advance_claims();
        self.schedule_bot_claims(deps);
        self.bot_chatter(deps);
        if let Some((seq, pattern)) = self.evaluate_claims() {
            self.finish_with_winner(seq, pattern, deps).await;
        }
    }

    /// Recruit at most one bot per lobby tick while seats and the room's
    /// bot cap allow it.
    async fn fill_bots(&mut self, deps: &SessionDeps) {
        if self.participants.len() >= self.room.max_players
            || self.bot_count() >= self.room.max_bots
        {
            return;
        }
        if self.rng.gen::<f64>() >= deps.config.bots.join_probability {
            return;
        }
        let exclude: HashSet<String> = self
            .participants
            .iter()
            .filter(|p| p.kind == ParticipantKind::Bot)
            .map(|p| p.id.clone())
            .collect();
        let Some(profile) = deps.bots.recruit(&exclude) else {
            return;
        };
        if let Err(e) = deps.wallet.debit_stake(&profile.id, self.room.stake).await {
            tracing::warn!(session = %self.id, bot = %profile.id, error = %e, "bot stake rejected");
            deps.bots.release(&profile.id);
            return;
        }
        let card = CardEngine::generate(&mut self.rng);
        self.admit(
            profile.id.clone(),
            ParticipantKind::Bot,
            card,
            deps.commission.current(),
        );
        deps.monitor.record_stake(self.room.stake);
        tracing::debug!(
            session = %self.id,
            bot = %profile.id,
            roster = self.participants.len(),
            "bot joined"
        );
        deps.events
            .publish(SessionEvent::StatusChanged(self.snapshot()));
    }

    fn advance_claims(&mut self) {
        for claim in &mut self.pending_claims {
            claim.due_in_ticks = claim.due_in_ticks.saturating_sub(1);
        }
    }

    /// Ask each seated bot whether it attempts a claim this tick; sampled
    /// response delays are converted to call ticks (a delay shorter than
    /// one interval resolves this same tick).
    fn schedule_bot_claims(&mut self, deps: &SessionDeps) {
        let interval_ms = self.call_interval(&deps.config).as_millis().max(1) as u64;
        for i in 0..self.participants.len() {
            if self.participants[i].kind != ParticipantKind::Bot {
                continue;
            }
            let seq = self.participants[i].seq;
            if self.inactive_bots.contains(&self.participants[i].id)
                || self.pending_claims.iter().any(|c| c.seq == seq)
            {
                continue;
            }
            let Some(profile) = deps.bots.profile(&self.participants[i].id) else {
                // a bot the roster no longer knows cannot act; isolate it
                // rather than ending the round
                tracing::warn!(
                    session = %self.id,
                    bot = %self.participants[i].id,
                    "bot profile missing; treating bot as inactive this round"
                );
                let id = self.participants[i].id.clone();
                self.inactive_bots.insert(id);
                continue;
            };
            let progress = self
                .evaluator
                .best_progress(&self.participants[i].card, self.caller.called_set());
            if let Some(delay) = deps.bots.consider_claim(profile, progress, &mut self.rng) {
                let due_in_ticks = (delay.as_millis() as u64 / interval_ms) as u32;
                self.pending_claims.push(PendingClaim { seq, due_in_ticks });
            }
        }
    }

    fn bot_chatter(&mut self, deps: &SessionDeps) {
        for i in 0..self.participants.len() {
            if self.participants[i].kind != ParticipantKind::Bot {
                continue;
            }
            if let Some(profile) = deps.bots.profile(&self.participants[i].id) {
                if deps.bots.maybe_chat(profile, &mut self.rng) {
                    tracing::debug!(session = %self.id, bot = %profile.id, "bot chatter");
                }
            }
        }
    }

    /// Evaluate claims in join order and stop at the first validated win.
    /// Humans are auto-claimed every tick; a bot is only considered when
    /// its pending claim has come due. Due claims are consumed either way.
    fn evaluate_claims(&mut self) -> Option<(u32, String)> {
        let due: HashSet<u32> = self
            .pending_claims
            .iter()
            .filter(|c| c.due_in_ticks == 0)
            .map(|c| c.seq)
            .collect();
        let called = self.caller.called_set();
        let mut winner = None;
        for p in &self.participants {
            let eligible = match p.kind {
                ParticipantKind::Human => true,
                ParticipantKind::Bot => {
                    due.contains(&p.seq) && !self.inactive_bots.contains(&p.id)
                }
            };
            if !eligible {
                continue;
            }
            if let Some(pattern) = self.evaluator.check_win(&p.card, called) {
                winner = Some((p.seq, pattern.name().to_string()));
                break;
            }
        }
        self.pending_claims.retain(|c| c.due_in_ticks > 0);
        winner
    }

    // ---- settlement ----

    async fn finish_with_winner(&mut self, seq: u32, pattern: String, deps: &SessionDeps) {
        if self.status.is_terminal() {
            return;
        }
        let Some(participant) = self.participants.iter().find(|p| p.seq == seq) else {
            return;
        };
        let record = WinRecord {
            session_id: self.id,
            winner: participant.id.clone(),
            pattern,
            won_at: Utc::now(),
            calls_at_win: self.caller.called().len() as u32,
            prize: self.prize_pool,
            card: participant.card.clone(),
        };
        // The win must be durable before the session reports it; an
        // unrecordable win forces a cancel, not an unbacked payout.
        if !self.persist_win(&record, deps).await {
            self.cancel(
                CancelReason::StoreFailure {
                    detail: "win record unrecorded".to_string(),
                },
                deps,
            )
            .await;
            return;
        }
        if !self.try_set_status(SessionStatus::Finished) {
            return;
        }
        self.ended_at = Some(Utc::now());
        self.winner = Some(record.clone());
        if let Err(e) = deps.wallet.credit_payout(&record.winner, record.prize).await {
            tracing::error!(
                session = %self.id,
                winner = %record.winner,
                prize = record.prize,
                error = %e,
                "payout credit failed; wallet reconciliation required"
            );
        }
        deps.monitor.record_win(record.prize);
        deps.monitor.record_session_finished();
        self.release_bots(deps);
        tracing::info!(
            session = %self.id,
            winner = %record.winner,
            pattern = %record.pattern,
            prize = record.prize,
            calls = record.calls_at_win,
            "session finished with winner"
        );
        deps.events
            .publish(SessionEvent::StatusChanged(self.snapshot()));
        self.persist_terminal_snapshot(deps).await;
    }

    async fn finish_no_winner(&mut self, deps: &SessionDeps) {
        if !self.try_set_status(SessionStatus::Finished) {
            return;
        }
        self.ended_at = Some(Utc::now());
        deps.monitor.record_session_finished();
        self.release_bots(deps);
        tracing::info!(
            session = %self.id,
            calls = self.caller.called().len(),
            "pool exhausted with no winner"
        );
        deps.events
            .publish(SessionEvent::StatusChanged(self.snapshot()));
        self.persist_terminal_snapshot(deps).await;
    }

    async fn cancel(&mut self, reason: CancelReason, deps: &SessionDeps) {
        if self.status.is_terminal() {
            return;
        }
        if !self.try_set_status(SessionStatus::Cancelled) {
            return;
        }
        self.ended_at = Some(Utc::now());
        self.cancel_reason = Some(reason.clone());
        self.release_bots(deps);
        deps.monitor.record_session_cancelled();
        tracing::warn!(session = %self.id, reason = ?reason, "session cancelled");
        deps.events
            .publish(SessionEvent::StatusChanged(self.snapshot()));
        self.persist_terminal_snapshot(deps).await;
    }

    fn release_bots(&self, deps: &SessionDeps) {
        for p in &self.participants {
            if p.kind == ParticipantKind::Bot {
                deps.bots.release(&p.id);
            }
        }
    }

    // ---- persistence with backoff ----

    async fn persist_draw(&mut self, number: u8, deps: &SessionDeps) -> bool {
        let call_index = self.caller.called().len() as u32 - 1;
        for attempt in 0..deps.config.retry.max_attempts {
            match deps.store.record_draw(self.id, call_index, number).await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(session = %self.id, attempt, error = %e, "draw persistence failed");
                    tokio::time::sleep(deps.config.retry.backoff(attempt)).await;
                }
            }
        }
        self.cancel(
            CancelReason::StoreFailure {
                detail: format!("draw {number} unrecorded"),
            },
            deps,
        )
        .await;
        false
    }

    /// Persist a non-terminal status change; exhausted retries force the
    /// session to `Cancelled` rather than leaving it ambiguous.
    async fn persist_status(&mut self, deps: &SessionDeps) {
        let snapshot = self.snapshot();
        for attempt in 0..deps.config.retry.max_attempts {
            match deps.store.record_status(&snapshot).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(session = %self.id, attempt, error = %e, "status persistence failed");
                    tokio::time::sleep(deps.config.retry.backoff(attempt)).await;
                }
            }
        }
        self.cancel(
            CancelReason::StoreFailure {
                detail: "status transition unrecorded".to_string(),
            },
            deps,
        )
        .await;
    }

    /// Terminal snapshots cannot trigger a cancel; failures are logged for
    /// the reconciliation sweep owned by the persistence layer.
    async fn persist_terminal_snapshot(&self, deps: &SessionDeps) {
        let snapshot = self.snapshot();
        for attempt in 0..deps.config.retry.max_attempts {
            match deps.store.record_status(&snapshot).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(session = %self.id, attempt, error = %e, "terminal snapshot persistence failed");
                    tokio::time::sleep(deps.config.retry.backoff(attempt)).await;
                }
            }
        }
        tracing::error!(session = %self.id, "terminal snapshot unrecorded after retries");
    }

    async fn persist_win(&self, record: &WinRecord, deps: &SessionDeps) -> bool {
        for attempt in 0..deps.config.retry.max_attempts {
            match deps.store.record_win(record).await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(session = %self.id, attempt, error = %e, "win persistence failed");
                    tokio::time::sleep(deps.config.retry.backoff(attempt)).await;
                }
            }
        }
        false
    }
}

// ---- session task plumbing ----

/// Admin operations queued for the session loop
pub enum SessionCommand {
    Join {
        participant_id: String,
        resp: oneshot::Sender<Result<(), SessionError>>,
    },
    Pause {
        paused: bool,
        resp: oneshot::Sender<Result<(), SessionError>>,
    },
    ForceEnd {
        reason: CancelReason,
        resp: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// Cheap cloneable client for a running session task
#[derive(Clone)]
pub struct SessionClient {
    id: SessionId,
    room_id: RoomId,
    commands: mpsc::Sender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionClient {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.snapshot.borrow().status.is_terminal()
    }

    pub async fn join(&self, participant_id: impl Into<String>) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        let cmd = SessionCommand::Join {
            participant_id: participant_id.into(),
            resp: tx,
        };
        if self.commands.send(cmd).await.is_err() {
            return Err(SessionError::Terminal(self.snapshot().status));
        }
        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    /// Idempotent; a no-op once the session has ended
    pub async fn pause(&self, paused: bool) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        let cmd = SessionCommand::Pause { paused, resp: tx };
        if self.commands.send(cmd).await.is_err() {
            return Ok(());
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }

    /// Idempotent; a no-op once the session has ended
    pub async fn force_end(&self, reason: CancelReason) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        let cmd = SessionCommand::ForceEnd { reason, resp: tx };
        if self.commands.send(cmd).await.is_err() {
            return Ok(());
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }
}

/// A spawned session: client plus the task driving it
pub struct SessionHandle {
    client: SessionClient,
    pub(crate) task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn client(&self) -> SessionClient {
        self.client.clone()
    }

    pub fn id(&self) -> SessionId {
        self.client.id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.client.room_id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.client.snapshot()
    }

    pub fn is_terminal(&self) -> bool {
        self.client.is_terminal()
    }
}

/// Spawn the session's own timer loop and hand back its handle
pub fn spawn_session(session: GameSession, deps: SessionDeps) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (watch_tx, watch_rx) = watch::channel(session.snapshot());
    let client = SessionClient {
        id: session.id(),
        room_id: session.room_id().clone(),
        commands: cmd_tx,
        snapshot: watch_rx,
    };
    deps.events
        .publish(SessionEvent::Created(session.snapshot()));
    deps.monitor.record_session_started();
    tracing::info!(session = %session.id(), room = %session.room_id(), "session created");
    let task = tokio::spawn(run_session(session, deps, cmd_rx, watch_tx));
    SessionHandle { client, task }
}

async fn run_session(
    mut session: GameSession,
    deps: SessionDeps,
    mut commands: mpsc::Receiver<SessionCommand>,
    watch_tx: watch::Sender<SessionSnapshot>,
) {
    let mut cadence = session.cadence(&deps.config);
    let mut timer = interval_at(Instant::now() + cadence, cadence);
    loop {
        timer.tick().await;
        // queued admin operations apply at the tick boundary; the loop is
        // the only writer of session state
        while let Ok(cmd) = commands.try_recv() {
            session.apply_command(cmd, &deps).await;
        }
        if session.status().is_terminal() {
            break;
        }
        session.tick(&deps).await;
        watch_tx.send_replace(session.snapshot());
        if session.status().is_terminal() {
            break;
        }
        let next = session.cadence(&deps.config);
        if next != cadence {
            cadence = next;
            timer = interval_at(Instant::now() + cadence, cadence);
        }
    }
    watch_tx.send_replace(session.snapshot());
    deps.events.publish(SessionEvent::Ended(session.snapshot()));
    tracing::debug!(session = %session.id(), status = ?session.status(), "session task ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::bots::{BotProfile, SkillTier};
    use crate::engine::caller::CalledSet;
    use crate::engine::room::RoomConfig;
    use crate::store::{FlakyStore, InMemoryLedger, InMemoryStore, StaticCommission};

    fn room() -> RoomConfig {
        let mut room = RoomConfig::new("bronze", "Bronze Hall", 1_000);
        room.max_bots = 4;
        room
    }

    fn bot_profile(id: &str, win_rate: u8) -> BotProfile {
        BotProfile {
            id: id.to_string(),
            name: format!("Bot {id}"),
            win_rate,
            aggression: 20,
            min_response_ms: 0,
            max_response_ms: 0,
            skill: SkillTier::Seasoned,
            chat_enabled: false,
            chat_frequency: 0,
            auto_join: true,
            max_concurrent_games: 4,
            enabled: true,
        }
    }

    fn deps_with(store: Arc<dyn SessionStore>, bots: Vec<BotProfile>) -> SessionDeps {
        let ledger = InMemoryLedger::new();
        for account in ["p1", "p2", "p3", "p4", "bot-a", "bot-b"] {
            ledger.fund(account, 1_000_000);
        }
        let mut config = EngineConfig::fast_simulation();
        config.retry.base_backoff_ms = 1;
        config.timing.countdown_ticks = 2;
        SessionDeps {
            store,
            wallet: Arc::new(ledger),
            commission: Arc::new(StaticCommission::new(1_000)),
            bots: Arc::new(BotController::new(bots)),
            monitor: Arc::new(EngineMonitor::new()),
            events: EventBus::new(64),
            config,
        }
    }

    fn deps() -> SessionDeps {
        deps_with(Arc::new(InMemoryStore::new()), vec![])
    }

    fn session_with(deps: &SessionDeps, patterns: PatternSet) -> GameSession {
        GameSession::new(room(), patterns, deps.commission.current())
    }

    async fn run_until_terminal(session: &mut GameSession, deps: &SessionDeps, max_ticks: u32) {
        for _ in 0..max_ticks {
            session.tick(deps).await;
            if session.status().is_terminal() {
                return;
            }
        }
        panic!("session not terminal after {max_ticks} ticks");
    }

    #[tokio::test]
    async fn test_pool_tracks_roster() {
        let deps = deps();
        let mut session = session_with(&deps, PatternSet::standard());
        for player in ["p1", "p2", "p3", "p4"] {
            session
                .apply_join(player.to_string(), &deps)
                .await
                .expect("join");
        }
        // stake 10.00 x 4 seats x 10% commission -> 36.00
        assert_eq!(session.snapshot().prize_pool, 3_600);
        assert_eq!(session.snapshot().humans.len(), 4);
    }

    #[tokio::test]
    async fn test_join_rejections() {
        let deps = deps();
        let mut session = session_with(&deps, PatternSet::standard());
        session.apply_join("p1".to_string(), &deps).await.expect("join");

        let dup = session.apply_join("p1".to_string(), &deps).await;
        assert!(matches!(dup, Err(SessionError::AlreadyJoined { .. })));

        let broke = session.apply_join("pauper".to_string(), &deps).await;
        assert!(matches!(broke, Err(SessionError::StakeRejected { .. })));
        // failed joins never seat the player
        assert_eq!(session.snapshot().humans, vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn test_waiting_to_active_flow() {
        let deps = deps();
        let mut session = session_with(&deps, PatternSet::standard());
        session.tick(&deps).await;
        assert_eq!(session.status(), SessionStatus::Waiting);

        session.apply_join("p1".to_string(), &deps).await.expect("join");
        session.apply_join("p2".to_string(), &deps).await.expect("join");
        session.tick(&deps).await;
        assert_eq!(session.status(), SessionStatus::Countdown);

        // countdown_ticks = 2
        session.tick(&deps).await;
        assert_eq!(session.status(), SessionStatus::Countdown);
        session.tick(&deps).await;
        assert_eq!(session.status(), SessionStatus::Active);
        assert!(session.snapshot().started_at.is_some());

        let closed = session.apply_join("p3".to_string(), &deps).await;
        assert!(matches!(closed, Err(SessionError::JoinsClosed)));
    }

    #[tokio::test]
    async fn test_tie_break_prefers_earlier_join() {
        let deps = deps();
        let mut session = session_with(&deps, PatternSet::standard());
        session.apply_join("p1".to_string(), &deps).await.expect("join");
        // identical card: both complete the same pattern on the same draw
        let shared = session.participants[0].card.clone();
        session.admit(
            "p2".to_string(),
            ParticipantKind::Human,
            shared,
            deps.commission.current(),
        );

        run_until_terminal(&mut session, &deps, 200).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Finished);
        let record = snapshot.winner.expect("winner");
        assert_eq!(record.winner, "p1");
        assert_eq!(record.prize, snapshot.prize_pool);

        // the winning card is satisfied using only called numbers
        let called = CalledSet::from_numbers(&snapshot.called);
        let evaluator = WinEvaluator::new(PatternSet::standard());
        let pattern = evaluator
            .check_win(&record.card, &called)
            .expect("winning card validates");
        assert_eq!(pattern.name(), record.pattern);
        assert_eq!(record.calls_at_win as usize, snapshot.called.len());
    }

    #[tokio::test]
    async fn test_called_numbers_unique_and_bounded() {
        let deps = deps();
        let mut session = session_with(&deps, PatternSet::standard());
        session.apply_join("p1".to_string(), &deps).await.expect("join");
        session.apply_join("p2".to_string(), &deps).await.expect("join");
        run_until_terminal(&mut session, &deps, 200).await;

        let called = session.snapshot().called;
        assert!(called.len() <= 75);
        let unique: HashSet<u8> = called.iter().copied().collect();
        assert_eq!(unique.len(), called.len());
    }

    #[tokio::test]
    async fn test_exhaustion_finishes_without_winner() {
        let deps = deps();
        // no recognized pattern: the pool must drain and the session must
        // settle with no winner
        let mut session = session_with(&deps, PatternSet::custom(vec![]));
        session.apply_join("p1".to_string(), &deps).await.expect("join");
        session.apply_join("p2".to_string(), &deps).await.expect("join");
        run_until_terminal(&mut session, &deps, 200).await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Finished);
        assert!(snapshot.winner.is_none());
        assert_eq!(snapshot.called.len(), 75);
    }

    #[tokio::test]
    async fn test_pause_freezes_calls_and_pool() {
        let deps = deps();
        let mut session = session_with(&deps, PatternSet::custom(vec![]));
        session.apply_join("p1".to_string(), &deps).await.expect("join");
        session.apply_join("p2".to_string(), &deps).await.expect("join");
        // through countdown into active, plus a few draws
        for _ in 0..6 {
            session.tick(&deps).await;
        }
        assert_eq!(session.status(), SessionStatus::Active);

        let frozen_calls = session.snapshot().called.len();
        let frozen_pool = session.snapshot().prize_pool;
        session.apply_pause(true, &deps).expect("pause");
        for _ in 0..5 {
            session.tick(&deps).await;
        }
        assert_eq!(session.snapshot().called.len(), frozen_calls);
        assert_eq!(session.snapshot().prize_pool, frozen_pool);
        assert_eq!(session.status(), SessionStatus::Active);

        session.apply_pause(false, &deps).expect("resume");
        session.tick(&deps).await;
        assert_eq!(session.snapshot().called.len(), frozen_calls + 1);
    }

    #[tokio::test]
    async fn test_force_end_stops_draws() {
        let deps = deps();
        let mut session = session_with(&deps, PatternSet::custom(vec![]));
        session.apply_join("p1".to_string(), &deps).await.expect("join");
        session.apply_join("p2".to_string(), &deps).await.expect("join");
        for _ in 0..5 {
            session.tick(&deps).await;
        }
        assert_eq!(session.status(), SessionStatus::Active);

        session
            .apply_force_end(
                CancelReason::Administrative {
                    reason: "maintenance".to_string(),
                },
                &deps,
            )
            .await
            .expect("force end");
        assert_eq!(session.status(), SessionStatus::Cancelled);

        let calls = session.snapshot().called.len();
        for _ in 0..5 {
            session.tick(&deps).await;
        }
        assert_eq!(session.snapshot().called.len(), calls);
        assert!(matches!(
            session.snapshot().cancel_reason,
            Some(CancelReason::Administrative { .. })
        ));

        // terminal admin operations are accepted no-ops
        assert!(session.apply_pause(true, &deps).is_ok());
        assert!(session
            .apply_force_end(CancelReason::RoomClosed, &deps)
            .await
            .is_ok());
        assert_eq!(session.status(), SessionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_store_failure_cancels_session() {
        let deps = deps_with(Arc::new(FlakyStore::always_failing()), vec![]);
        let mut session = session_with(&deps, PatternSet::standard());
        session.apply_join("p1".to_string(), &deps).await.expect("join");
        session.apply_join("p2".to_string(), &deps).await.expect("join");
        run_until_terminal(&mut session, &deps, 50).await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Cancelled);
        assert!(matches!(
            snapshot.cancel_reason,
            Some(CancelReason::StoreFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_win_rate_bots_win_only_through_validation() {
        let deps = deps_with(
            Arc::new(InMemoryStore::new()),
            vec![bot_profile("bot-a", 0), bot_profile("bot-b", 0)],
        );
        let mut session = session_with(&deps, PatternSet::standard());
        run_until_terminal(&mut session, &deps, 400).await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Finished);
        let record = snapshot.winner.expect("a bot still wins once its card is complete");
        assert!(snapshot.bots.contains(&record.winner));

        // the claim stood only because the evaluator validated it
        let called = CalledSet::from_numbers(&snapshot.called);
        let evaluator = WinEvaluator::new(PatternSet::standard());
        let pattern = evaluator
            .check_win(&record.card, &called)
            .expect("validated pattern");
        assert_eq!(pattern.name(), record.pattern);
    }

    #[tokio::test]
    async fn test_bots_released_at_session_end() {
        let deps = deps_with(
            Arc::new(InMemoryStore::new()),
            vec![bot_profile("bot-a", 50), bot_profile("bot-b", 50)],
        );
        let mut session = session_with(&deps, PatternSet::standard());
        run_until_terminal(&mut session, &deps, 400).await;
        assert_eq!(deps.bots.active_games("bot-a"), 0);
        assert_eq!(deps.bots.active_games("bot-b"), 0);
    }

    #[test]
    fn test_transition_table() {
        use SessionStatus::*;
        assert!(SessionStatus::can_transition(Waiting, Countdown));
        assert!(SessionStatus::can_transition(Countdown, Waiting));
        assert!(SessionStatus::can_transition(Countdown, Active));
        assert!(SessionStatus::can_transition(Active, Finished));
        assert!(SessionStatus::can_transition(Active, Cancelled));

        assert!(!SessionStatus::can_transition(Waiting, Active));
        assert!(!SessionStatus::can_transition(Active, Waiting));
        assert!(!SessionStatus::can_transition(Finished, Active));
        assert!(!SessionStatus::can_transition(Finished, Cancelled));
        assert!(!SessionStatus::can_transition(Cancelled, Waiting));
    }

    #[test]
    fn test_status_serde_rejects_unknown() {
        let status: SessionStatus = serde_json::from_str("\"countdown\"").expect("parse");
        assert_eq!(status, SessionStatus::Countdown);
        assert!(serde_json::from_str::<SessionStatus>("\"limbo\"").is_err());
    }
}
