//! Job dispatch engine.
//!
//! Bridges asynchronous job submission with a pull-based, synchronous
//! pipeline engine. Each named stream owns a bounded job queue and a fixed
//! pool of worker threads; every worker runs its own pipeline instance and
//! pulls jobs through a queue-backed collection reader. Results travel back
//! to submitters through a shared job correlator.
//!
//! # Architecture
//!
//! - `JobQueue` - Bounded blocking FIFO per stream
//! - `JobCorrelator` - Maps job ids to the pending results callers hold
//! - `StreamReader` - Pull adapter feeding the pipeline from the queue
//! - `PoolSupervisor` - Actor restarting crashed workers with backoff
//! - `Stream` / `StreamRegistry` - Submission front end and name lookup
//! - `Server` - Plugins, streams and serializers for one process
//!
//! # Usage
//!
//! ```ignore
//! use dispatch::{DispatchContext, PipelineDescriptor, StageFactory, Stream};
//!
//! let descriptor = PipelineDescriptor::new().with_stage(StageFactory::new("upper", || Ok(Upper)));
//! let ctx = DispatchContext::default();
//! let stream = Stream::start("docs", StreamConfig::default(), descriptor, ctx).await?;
//!
//! let snapshot = stream.submit("some text", Some("meta".into()))?.await?;
//! stream.shutdown_async()?.await?;
//! ```

mod context;
mod correlator;
mod engine;
mod error;
mod messages;
mod plugin;
mod queue;
mod reader;
mod registry;
mod serializer;
mod server;
mod sink;
mod stream;
mod supervisor;
mod worker;

pub use context::DispatchContext;
pub use correlator::{Completion, JobCorrelator, JobOutcome, PendingResult};
pub use engine::{
    CollectionReader, Pipeline, PipelineDescriptor, Stage, StageFactory, StepOutcome,
    run_pipeline,
};
pub use error::{DispatchError, DispatchResult, EngineError, JobError, QueueError, StageError};
pub use messages::{PoolMessage, SlotStatus};
pub use plugin::{PluginFuture, ServerPlugin};
pub use queue::{JobQueue, Offer, Take};
pub use reader::StreamReader;
pub use registry::StreamRegistry;
pub use serializer::{FnSerializer, ResultSerializer, SerializeResult, SerializerRegistry};
pub use server::{Server, ServerBuilder};
pub use sink::{ResultHandler, ResultSink};
pub use stream::Stream;
pub use worker::PoolHealth;

/// Re-export shared types for convenience.
pub use stream_core::{
    DispatchEvent, Job, JobId, RestartPolicy, ServerConfig, Snapshot, StreamConfig, WorkBuffer,
};
