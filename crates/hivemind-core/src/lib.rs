//! # Hivemind Core
//!
//! Shared foundation for the Hivemind agent-orchestration platform:
//! configuration loading and the common error type. Domain crates
//! (dispatch, gateway, persistence) build on top of this.

pub mod config;
pub mod error;

pub use config::{DispatchConfig, WebhookConfig};
pub use error::{HivemindError, Result};
