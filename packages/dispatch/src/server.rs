//! Composition root tying streams, serializers and plugins together.

use std::collections::HashSet;
use std::sync::Arc;

use stream_core::{DispatchEvent, ServerConfig, StreamConfig};
use tokio::sync::broadcast;

use crate::context::DispatchContext;
use crate::engine::PipelineDescriptor;
use crate::error::{DispatchError, DispatchResult};
use crate::plugin::ServerPlugin;
use crate::registry::StreamRegistry;
use crate::serializer::{ResultSerializer, SerializerRegistry};
use crate::stream::Stream;

/// Builder collecting configuration and plugins before the server starts.
pub struct ServerBuilder {
    config: ServerConfig,
    plugins: Vec<Arc<dyn ServerPlugin>>,
}

impl ServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            plugins: Vec::new(),
        }
    }

    /// Add a plugin. Plugins are enabled in the order they are added.
    pub fn with_plugin<P: ServerPlugin>(mut self, plugin: P) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Start the server and enable every plugin.
    ///
    /// If any plugin fails, streams registered so far are stopped and the
    /// error is returned.
    pub async fn start(self) -> DispatchResult<Server> {
        let mut seen = HashSet::new();
        for plugin in &self.plugins {
            let key = plugin.name().to_lowercase();
            if !seen.insert(key.clone()) {
                return Err(DispatchError::DuplicatePlugin(key));
            }
        }

        let ctx = DispatchContext::new(self.config.event_capacity);
        let server = Server {
            streams: StreamRegistry::new(ctx.clone()),
            serializers: SerializerRegistry::new(),
            plugins: self.plugins,
            config: self.config,
            ctx,
        };

        tracing::info!("Starting server with {} plugins", server.plugins.len());
        for plugin in &server.plugins {
            tracing::info!("Enabling plugin: {}", plugin.name());
            if let Err(e) = plugin.on_enable(&server).await {
                tracing::error!("Plugin {} failed to enable: {}", plugin.name(), e);
                server.shutdown_now();
                return Err(DispatchError::Plugin {
                    name: plugin.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(server)
    }
}

/// Running server: the streams, serializers and plugins of one process.
pub struct Server {
    config: ServerConfig,
    ctx: DispatchContext,
    streams: StreamRegistry,
    serializers: SerializerRegistry,
    plugins: Vec<Arc<dyn ServerPlugin>>,
}

impl Server {
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn context(&self) -> &DispatchContext {
        &self.ctx
    }

    /// Subscribe to dispatch events.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.ctx.subscribe()
    }

    /// Register a stream using the configured settings for its name.
    pub async fn register_stream(
        &self,
        name: &str,
        descriptor: PipelineDescriptor,
    ) -> DispatchResult<Stream> {
        let config = self.config.stream_config(name)?;
        self.register_stream_with(name, config, descriptor).await
    }

    /// Register a stream with explicit settings.
    pub async fn register_stream_with(
        &self,
        name: &str,
        config: StreamConfig,
        descriptor: PipelineDescriptor,
    ) -> DispatchResult<Stream> {
        self.streams.register(name, config, descriptor).await
    }

    pub fn get_stream(&self, name: &str) -> Option<Stream> {
        self.streams.get(name)
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    pub fn register_serializer<S: ResultSerializer>(&self, serializer: S) -> DispatchResult<()> {
        self.serializers.register(serializer)
    }

    pub fn get_serializer(&self, name: &str) -> Option<Arc<dyn ResultSerializer>> {
        self.serializers.get(name)
    }

    pub fn serializers(&self) -> &SerializerRegistry {
        &self.serializers
    }

    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn ServerPlugin>> {
        self.plugins
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Gracefully shut down every stream and wait for them to drain.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down server");
        let mut handles = Vec::new();
        for stream in self.streams.streams() {
            match stream.shutdown_async() {
                Ok(handle) => handles.push(handle),
                Err(e) => tracing::debug!("Skipping stream {}: {}", stream.name(), e),
            }
        }
        for result in futures_util::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!("Stream shutdown task failed: {}", e);
            }
        }
        tracing::info!("Server shut down");
    }

    /// Forcefully stop every stream. Returns the number of abandoned queued jobs.
    pub fn shutdown_now(&self) -> usize {
        self.streams
            .streams()
            .iter()
            .map(Stream::shutdown_now)
            .sum()
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("streams", &self.streams.names())
            .field("serializers", &self.serializers.names())
            .field("plugins", &self.plugin_names())
            .finish()
    }
}
