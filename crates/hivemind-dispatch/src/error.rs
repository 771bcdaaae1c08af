//! Error types for the dispatch core.
//!
//! Every component reports failures synchronously to its caller; nothing is
//! logged-and-swallowed. A rejected operation leaves state untouched.

use thiserror::Error;

use crate::tracker::DispatchStatus;

/// Convenience alias for dispatch-core results.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors produced by the dispatch core.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A task id was empty where one is required.
    #[error("task id must not be empty")]
    EmptyTaskId,

    /// Two task nodes in one resolution pass share an id.
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    /// A task declared a dependency with an empty id.
    #[error("task '{task}' declares an empty dependency id")]
    EmptyDependencyId { task: String },

    /// The declared dependencies contain a directed cycle. The path is the
    /// minimal offending cycle, closed (first element == last element).
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// The queried task id is not part of the graph.
    #[error("unknown task id: {0}")]
    UnknownTask(String),

    /// A priority string outside the fixed set.
    #[error("unknown priority: {0}")]
    UnknownPriority(String),

    /// A status string outside the dispatch lifecycle vocabulary.
    #[error("unknown status: {0}")]
    UnknownStatus(String),

    /// The requested lifecycle transition is not in the allowed table.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: DispatchStatus,
        to: DispatchStatus,
    },

    /// A webhook callback URL was empty.
    #[error("webhook url must not be empty")]
    EmptyUrl,

    /// Webhook delivery failed and no retries remain.
    #[error("webhook delivery failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Payload (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
