//! Task data model — the snapshot the dispatch core consumes.
//!
//! `TaskState` is the externally-visible task lifecycle (what the platform
//! shows users); the tracker's `DispatchStatus` is the internal dispatch
//! lifecycle. They are deliberately separate vocabularies.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::DispatchError;

/// Dispatch priority — four fixed levels, most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Interrupts everything else (incident response, user-blocking work).
    Critical,
    High,
    Normal,
    Low,
}

impl Priority {
    /// All priorities, most urgent first. Queue buckets scan in this order.
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Bucket index (lower = more urgent).
    pub fn rank(&self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

impl FromStr for Priority {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(DispatchError::UnknownPriority(other.to_string())),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Externally-visible task state, as persisted by the platform.
///
/// Only `Done` satisfies a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Todo,
    InProgress,
    Review,
    Blocked,
    Done,
    Cancelled,
}

impl TaskState {
    /// Whether this state satisfies dependents waiting on the task.
    pub fn is_done(&self) -> bool {
        matches!(self, TaskState::Done)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Todo => "todo",
            TaskState::InProgress => "in_progress",
            TaskState::Review => "review",
            TaskState::Blocked => "blocked",
            TaskState::Done => "done",
            TaskState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A task node as seen by the graph and queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    /// Unique id within one resolution pass.
    pub id: String,
    /// Externally-visible state.
    pub state: TaskState,
    /// Dispatch priority.
    pub priority: Priority,
    /// Ids of direct prerequisites. May reference ids not present in the
    /// pass — the task stays blocked until those appear as done.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl TaskNode {
    /// Create a node with no dependencies.
    pub fn new(id: &str, state: TaskState, priority: Priority) -> Self {
        Self {
            id: id.to_string(),
            state,
            priority,
            depends_on: Vec::new(),
        }
    }

    /// Builder-style: declare prerequisites.
    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }
}
