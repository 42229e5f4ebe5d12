//! Name-keyed registry of running streams.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use stream_core::{DispatchEvent, StreamConfig};

use crate::context::DispatchContext;
use crate::engine::PipelineDescriptor;
use crate::error::{DispatchError, DispatchResult};
use crate::stream::Stream;

/// Streams by lowercase name.
///
/// A stream only becomes visible once it has been fully constructed, and
/// registering a name twice (ignoring case) fails.
#[derive(Debug)]
pub struct StreamRegistry {
    ctx: DispatchContext,
    streams: RwLock<HashMap<String, Stream>>,
}

impl StreamRegistry {
    pub fn new(ctx: DispatchContext) -> Self {
        Self {
            ctx,
            streams: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Stream>> {
        self.streams.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Stream>> {
        self.streams.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build and register a stream.
    pub async fn register(
        &self,
        name: &str,
        config: StreamConfig,
        descriptor: PipelineDescriptor,
    ) -> DispatchResult<Stream> {
        let key = name.to_lowercase();
        if self.read().contains_key(&key) {
            return Err(DispatchError::DuplicateStream(key));
        }

        let stream = Stream::start(&key, config, descriptor, self.ctx.clone()).await?;

        {
            let mut streams = self.write();
            if streams.contains_key(&key) {
                drop(streams);
                // Lost a race with a concurrent registration of the same name.
                stream.shutdown_now();
                return Err(DispatchError::DuplicateStream(key));
            }
            streams.insert(key.clone(), stream.clone());
        }

        tracing::info!("Registered stream: {}", key);
        self.ctx.emit(DispatchEvent::StreamRegistered {
            stream: key,
            workers: stream.config().workers,
            timestamp: Utc::now(),
        });
        Ok(stream)
    }

    /// Look up a stream by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<Stream> {
        self.read().get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(&name.to_lowercase())
    }

    /// Registered stream names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn streams(&self) -> Vec<Stream> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
