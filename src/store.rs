//! External collaborator interfaces
//!
//! The engine does not own persistence, wallets or platform configuration.
//! It consumes them through these traits; the in-memory implementations back
//! the demo binary and the test suite.

use crate::engine::prize::CommissionSnapshot;
use crate::engine::session::{SessionId, SessionSnapshot, WinRecord};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store write failed: {0}")]
    WriteFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("insufficient funds for {account}: need {needed}, have {available}")]
    InsufficientFunds {
        account: String,
        needed: u64,
        available: u64,
    },

    #[error("wallet rejected the operation: {0}")]
    Rejected(String),
}

/// Persistence of call history, status transitions and win records
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist one draw; `call_index` is the zero-based position in the
    /// session's call sequence.
    async fn record_draw(
        &self,
        session: SessionId,
        call_index: u32,
        number: u8,
    ) -> Result<(), StoreError>;

    /// Persist the session state after a status change
    async fn record_status(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError>;

    /// Persist the immutable win record of a settled session
    async fn record_win(&self, record: &WinRecord) -> Result<(), StoreError>;
}

/// Wallet debit/credit capability owned by the surrounding platform
#[async_trait]
pub trait WalletLedger: Send + Sync {
    async fn debit_stake(&self, account: &str, amount: u64) -> Result<(), WalletError>;

    async fn credit_payout(&self, account: &str, amount: u64) -> Result<(), WalletError>;
}

/// Commission-rate lookup with explicit refresh semantics
pub trait CommissionProvider: Send + Sync {
    /// Snapshot of the current rate; callers must not cache it beyond one
    /// computation.
    fn current(&self) -> CommissionSnapshot;

    /// Drop any cached value so the next `current` re-reads the source
    fn invalidate(&self);
}

/// In-memory session store used by the demo binary and tests
#[derive(Default)]
pub struct InMemoryStore {
    draws: DashMap<SessionId, Vec<u8>>,
    statuses: DashMap<SessionId, SessionSnapshot>,
    wins: DashMap<SessionId, WinRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draws_for(&self, session: SessionId) -> Vec<u8> {
        self.draws
            .get(&session)
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn status_for(&self, session: SessionId) -> Option<SessionSnapshot> {
        self.statuses.get(&session).map(|s| s.clone())
    }

    pub fn win_for(&self, session: SessionId) -> Option<WinRecord> {
        self.wins.get(&session).map(|w| w.clone())
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn record_draw(
        &self,
        session: SessionId,
        call_index: u32,
        number: u8,
    ) -> Result<(), StoreError> {
        let mut draws = self.draws.entry(session).or_default();
        if draws.len() != call_index as usize {
            return Err(StoreError::WriteFailed(format!(
                "call index {} out of sequence (have {})",
                call_index,
                draws.len()
            )));
        }
        draws.push(number);
        Ok(())
    }

    async fn record_status(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        self.statuses.insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    async fn record_win(&self, record: &WinRecord) -> Result<(), StoreError> {
        self.wins.insert(record.session_id, record.clone());
        Ok(())
    }
}

/// Store wrapper that fails a configured number of draw writes, for
/// exercising the retry and forced-cancel paths.
pub struct FlakyStore {
    inner: InMemoryStore,
    draw_failures: AtomicU32,
}

impl FlakyStore {
    pub fn failing_first_draws(failures: u32) -> Self {
        Self {
            inner: InMemoryStore::new(),
            draw_failures: AtomicU32::new(failures),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first_draws(u32::MAX)
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn record_draw(
        &self,
        session: SessionId,
        call_index: u32,
        number: u8,
    ) -> Result<(), StoreError> {
        let remaining = self.draw_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.draw_failures.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(StoreError::WriteFailed("injected failure".to_string()));
        }
        self.inner.record_draw(session, call_index, number).await
    }

    async fn record_status(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        self.inner.record_status(snapshot).await
    }

    async fn record_win(&self, record: &WinRecord) -> Result<(), StoreError> {
        self.inner.record_win(record).await
    }
}

/// In-memory wallet with explicit funding, used by the demo and tests
#[derive(Default)]
pub struct InMemoryLedger {
    balances: DashMap<String, u64>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fund(&self, account: impl Into<String>, amount: u64) {
        *self.balances.entry(account.into()).or_insert(0) += amount;
    }

    pub fn balance_of(&self, account: &str) -> u64 {
        self.balances.get(account).map(|b| *b).unwrap_or(0)
    }
}

#[async_trait]
impl WalletLedger for InMemoryLedger {
    async fn debit_stake(&self, account: &str, amount: u64) -> Result<(), WalletError> {
        let mut balance = self.balances.entry(account.to_string()).or_insert(0);
        if *balance < amount {
            return Err(WalletError::InsufficientFunds {
                account: account.to_string(),
                needed: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        Ok(())
    }

    async fn credit_payout(&self, account: &str, amount: u64) -> Result<(), WalletError> {
        *self.balances.entry(account.to_string()).or_insert(0) += amount;
        Ok(())
    }
}

/// Commission provider backed by a single mutable rate. `set_rate` bumps the
/// snapshot version; `invalidate` re-stamps the fetch time on next read.
pub struct StaticCommission {
    snapshot: RwLock<CommissionSnapshot>,
}

impl StaticCommission {
    pub fn new(rate_bps: u16) -> Self {
        Self {
            snapshot: RwLock::new(CommissionSnapshot::new(rate_bps, 1)),
        }
    }

    pub fn set_rate(&self, rate_bps: u16) {
        let mut snapshot = self.snapshot.write().expect("commission lock poisoned");
        let version = snapshot.version + 1;
        *snapshot = CommissionSnapshot::new(rate_bps, version);
    }
}

impl CommissionProvider for StaticCommission {
    fn current(&self) -> CommissionSnapshot {
        self.snapshot
            .read()
            .expect("commission lock poisoned")
            .clone()
    }

    fn invalidate(&self) {
        let mut snapshot = self.snapshot.write().expect("commission lock poisoned");
        let refreshed = CommissionSnapshot::new(snapshot.rate_bps, snapshot.version);
        *snapshot = refreshed;
    }
}
