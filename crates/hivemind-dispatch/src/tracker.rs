//! Task status tracker — a per-task lifecycle state machine with
//! time-in-state accounting.
//!
//! Transitions are validated against a fixed table; an illegal request
//! changes nothing. Every successful transition emits a `StatusChange` to an
//! optional subscriber callback, invoked outside the tracker's lock and
//! panic-isolated so a bad subscriber can never wedge or corrupt the tracker.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::{DispatchError, Result};

/// Internal dispatch lifecycle of a task.
///
/// This is distinct from the externally-visible [`crate::TaskState`]: it
/// describes where a task sits in the dispatch pipeline, not what the
/// platform shows users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Queued,
    Dispatched,
    Running,
    Complete,
    Failed,
}

impl DispatchStatus {
    /// Terminal statuses have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchStatus::Complete | DispatchStatus::Failed)
    }

    /// The allowed-transition table. Self-transitions are handled separately
    /// (always legal, no-op) and are not listed here.
    pub fn can_transition_to(&self, to: DispatchStatus) -> bool {
        use DispatchStatus::*;
        matches!(
            (self, to),
            (Queued, Dispatched) | (Dispatched, Running) | (Running, Complete) | (Running, Failed)
        )
    }
}

impl FromStr for DispatchStatus {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(DispatchStatus::Queued),
            "dispatched" => Ok(DispatchStatus::Dispatched),
            "running" => Ok(DispatchStatus::Running),
            "complete" => Ok(DispatchStatus::Complete),
            "failed" => Ok(DispatchStatus::Failed),
            other => Err(DispatchError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DispatchStatus::Queued => "queued",
            DispatchStatus::Dispatched => "dispatched",
            DispatchStatus::Running => "running",
            DispatchStatus::Complete => "complete",
            DispatchStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Event emitted on every successful (non-self) transition.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub task_id: String,
    pub from: DispatchStatus,
    pub to: DispatchStatus,
    /// Wall-clock stamp of the transition.
    pub at: DateTime<Utc>,
    /// Time spent in the outgoing status since it was entered.
    pub duration_in_from: Duration,
    /// Snapshot of the full ledger at transition time.
    pub durations: HashMap<DispatchStatus, Duration>,
}

struct TrackerState {
    current: DispatchStatus,
    entered_at: Instant,
    ledger: HashMap<DispatchStatus, Duration>,
}

type ChangeCallback = Arc<dyn Fn(StatusChange) + Send + Sync>;

/// Per-task lifecycle state machine with a duration ledger.
pub struct StatusTracker {
    task_id: String,
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
    on_change: Option<ChangeCallback>,
}

impl std::fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusTracker")
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

impl StatusTracker {
    /// Create a tracker starting in `initial`, on the system clock.
    pub fn new(task_id: &str, initial: DispatchStatus) -> Self {
        Self::with_clock(task_id, initial, Arc::new(SystemClock))
    }

    /// Create a tracker on an injected clock (tests use [`crate::ManualClock`]).
    pub fn with_clock(task_id: &str, initial: DispatchStatus, clock: Arc<dyn Clock>) -> Self {
        let entered_at = clock.now();
        Self {
            task_id: task_id.to_string(),
            clock,
            state: Mutex::new(TrackerState {
                current: initial,
                entered_at,
                ledger: HashMap::new(),
            }),
            on_change: None,
        }
    }

    /// Create a tracker from a status string; rejects unknown statuses.
    pub fn from_status_str(task_id: &str, initial: &str) -> Result<Self> {
        Ok(Self::new(task_id, initial.parse()?))
    }

    /// Subscribe to transition events. The callback runs after the tracker's
    /// lock is released; a panic inside it is contained and logged.
    pub fn set_on_change<F>(&mut self, f: F)
    where
        F: Fn(StatusChange) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(f));
    }

    /// Current status.
    pub fn status(&self) -> DispatchStatus {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current
    }

    /// Request a transition to `to`.
    ///
    /// Self-transition is a legal no-op (`Ok(None)`, no event). An illegal
    /// transition returns an error and leaves status, ledger, and the
    /// entered-timestamp untouched. A legal transition accrues elapsed time
    /// for the outgoing status (clock skew clamps to zero) and returns the
    /// emitted event.
    pub fn transition(&self, to: DispatchStatus) -> Result<Option<StatusChange>> {
        let change = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if to == state.current {
                return Ok(None);
            }
            if !state.current.can_transition_to(to) {
                return Err(DispatchError::InvalidTransition {
                    from: state.current,
                    to,
                });
            }

            let now = self.clock.now();
            let elapsed = now.saturating_duration_since(state.entered_at);
            let from = state.current;
            *state.ledger.entry(from).or_default() += elapsed;
            state.current = to;
            state.entered_at = now;

            StatusChange {
                task_id: self.task_id.clone(),
                from,
                to,
                at: Utc::now(),
                duration_in_from: elapsed,
                durations: state.ledger.clone(),
            }
        };

        tracing::debug!(
            task = %self.task_id,
            from = %change.from,
            to = %change.to,
            "status transition"
        );

        if let Some(callback) = &self.on_change {
            let event = change.clone();
            let emit = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(event)));
            if emit.is_err() {
                tracing::warn!(task = %self.task_id, "status change subscriber panicked");
            }
        }

        Ok(Some(change))
    }

    /// Accumulated time in `status`, including live accrual when it is the
    /// current status.
    pub fn duration(&self, status: DispatchStatus) -> Duration {
        self.durations().get(&status).copied().unwrap_or_default()
    }

    /// Immutable snapshot of the full ledger, with live accrual for the
    /// current status.
    pub fn durations(&self) -> HashMap<DispatchStatus, Duration> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut snapshot = state.ledger.clone();
        let live = self.clock.now().saturating_duration_since(state.entered_at);
        *snapshot.entry(state.current).or_default() += live;
        snapshot
    }
}
