//! # PHI Common Library
//!
//! Shared code for the PHI fusion workspace:
//! - Error types
//! - TOML configuration loading and validation
//! - Pipeline event types and the event bus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, PipelineEvent};
