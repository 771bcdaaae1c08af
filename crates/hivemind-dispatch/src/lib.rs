//! # Hivemind Dispatch
//!
//! The task-dispatch core of the Hivemind agent-orchestration platform.
//! Decides which tasks are eligible to run, in what order, and notifies
//! external agent workers when dispatch happens.
//!
//! ## Architecture
//! ```text
//! TaskNode snapshots (from persistence)
//!   → DependencyGraph ── ready_tasks() ──→ DispatchQueue
//!                                            │ next()/ack()
//!                                            ▼
//!                                      StatusTracker (queued → dispatched → …)
//!                                            │ on_change
//!                                            ▼
//!                                      WebhookDispatcher (signed POST + retry)
//!
//! Completions feed back: graph.unblocked_by(done_id) → queue.add(…)
//! ```
//!
//! This crate owns no network-facing API of its own; the HTTP/WebSocket
//! gateway, persistence, and auth are external collaborators. The queue is a
//! scheduling cache, not the system of record — ready tasks are re-derived
//! from persisted state after a restart.

pub mod clock;
pub mod error;
pub mod graph;
pub mod queue;
pub mod task;
pub mod tracker;
pub mod webhook;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DispatchError, Result};
pub use graph::DependencyGraph;
pub use queue::{DispatchQueue, QueueItem, QueueStats};
pub use task::{Priority, TaskNode, TaskState};
pub use tracker::{DispatchStatus, StatusChange, StatusTracker};
pub use webhook::{DeliveryRequest, DeliveryStatus, WebhookDispatcher};
