//! Core domain types for the document dispatch system.
//!
//! This crate contains shared types used across all packages:
//! - Job and JobId for submitted documents
//! - WorkBuffer and Snapshot for pipeline state and results
//! - StreamConfig and ServerConfig for configuration
//! - Events for observing streams and workers

mod buffer;
mod config;
mod events;
mod job;

pub use buffer::{Snapshot, WorkBuffer};
pub use config::{
    ConfigError, ENV_PREFIX, RestartPolicy, ServerConfig, StreamConfig, workers_env_key,
};
pub use events::DispatchEvent;
pub use job::{Job, JobId};
