//! Request boundary for the document stream server.
//!
//! This crate contains:
//! - Request/response models exchanged with clients
//! - Job submission: validate, dispatch to a stream, serialize the result
//! - Server initialization with the bundled example plugin

mod error;
mod example;
mod init;
mod jobs;
mod models;

pub use error::ApiError;
pub use example::{EXAMPLE_NAME, ExamplePlugin, ExampleStage, example_serializer};
pub use init::{CONFIG_ENV, init_server, load_config, load_config_from};
pub use jobs::submit_job;
pub use models::{ServerRequest, ServerResponse};

// Re-export core types for convenience
pub use dispatch::{DispatchEvent, JobId, Server, ServerConfig, Snapshot};
