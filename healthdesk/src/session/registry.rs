//! Session registry keyed by issue identity.
//!
//! Each key owns one slot guarded by its own async mutex. A connection that
//! investigates an issue holds the slot's guard (a [`SessionLease`]) for as
//! long as it drives the session, so two connections can never race on the
//! same issue's thread references, while different keys never contend.
//! Slots outlive connections: a dropped lease leaves the last committed
//! record in place for a later resume. A lease dropped with no record
//! removes its slot from the map.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::decision::SolutionOutcome;
use crate::issue::{Issue, IssueKey};
use crate::threads::ThreadRef;

#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub issue: Issue,
    pub diagnostic_thread: ThreadRef,
    pub solution_thread: Option<ThreadRef>,
    pub root_cause: Option<String>,
    pub outcome: Option<SolutionOutcome>,
    /// Diagnostic turns run across all connections.
    pub turns: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(issue: Issue, diagnostic_thread: ThreadRef) -> Self {
        let now = Utc::now();
        Self {
            issue,
            diagnostic_thread,
            solution_thread: None,
            root_cause: None,
            outcome: None,
            turns: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// A session is terminal once the solution stage has a thread.
    pub fn is_terminal(&self) -> bool {
        self.solution_thread.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

type Slot = Arc<Mutex<Option<SessionRecord>>>;
type Slots = Arc<DashMap<IssueKey, Slot>>;

#[derive(Debug, thiserror::Error)]
#[error("issue {0} is already under investigation by another connection")]
pub struct SlotBusy(pub IssueKey);

impl From<SlotBusy> for crate::error::SessionError {
    fn from(busy: SlotBusy) -> Self {
        crate::error::SessionError::Busy(busy.to_string())
    }
}

/// Exclusive access to one issue's session record.
#[derive(Debug)]
pub struct SessionLease {
    key: IssueKey,
    guard: OwnedMutexGuard<Option<SessionRecord>>,
    slots: Slots,
}

impl SessionLease {
    pub fn key(&self) -> &IssueKey {
        &self.key
    }

    pub fn record(&self) -> Option<&SessionRecord> {
        (*self.guard).as_ref()
    }

    pub fn record_mut(&mut self) -> Option<&mut SessionRecord> {
        (*self.guard).as_mut()
    }

    pub fn insert(&mut self, record: SessionRecord) -> &mut SessionRecord {
        (*self.guard).insert(record)
    }

    /// Forget the session so the next start for this issue begins afresh.
    pub fn discard(&mut self) -> Option<SessionRecord> {
        (*self.guard).take()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if self.guard.is_some() {
            return;
        }
        // Map and guard hold the only references; any other holder may be a
        // claimer about to lock this very slot, so it must stay reachable.
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 2);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// A connection currently drives the session.
    Active,
    /// Resumable: diagnostic thread only.
    Paused,
    /// Terminal.
    HandedOff,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub issue_key: IssueKey,
    pub state: SlotState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<SessionRecord>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: Slots,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take exclusive ownership of `key`'s slot, creating it if needed.
    pub fn claim(&self, key: &IssueKey) -> Result<SessionLease, SlotBusy> {
        let slot = Arc::clone(self.slots.entry(key.clone()).or_default().value());
        let guard = slot
            .try_lock_owned()
            .map_err(|_| SlotBusy(key.clone()))?;
        Ok(SessionLease {
            key: key.clone(),
            guard,
            slots: Arc::clone(&self.slots),
        })
    }

    /// Current record for `key`, unless a connection holds it.
    pub fn peek(&self, key: &IssueKey) -> Option<SessionRecord> {
        let slot = Arc::clone(self.slots.get(key)?.value());
        let guard = slot.try_lock().ok()?;
        (*guard).clone()
    }

    pub fn snapshot(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .slots
            .iter()
            .filter_map(|entry| match entry.value().try_lock() {
                Err(_) => Some(SessionSummary {
                    issue_key: entry.key().clone(),
                    state: SlotState::Active,
                    record: None,
                }),
                Ok(guard) => (*guard).as_ref().map(|record| SessionSummary {
                    issue_key: entry.key().clone(),
                    state: if record.is_terminal() {
                        SlotState::HandedOff
                    } else {
                        SlotState::Paused
                    },
                    record: Some(record.clone()),
                }),
            })
            .collect();
        summaries.sort_by(|a, b| a.issue_key.cmp(&b.issue_key));
        summaries
    }
}
