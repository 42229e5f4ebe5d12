#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;

use dispatch::{
    DispatchContext, DispatchError, FnSerializer, PipelineDescriptor, PluginFuture, Server,
    ServerConfig, ServerPlugin, Snapshot, StageError, StageFactory, StreamRegistry,
};
use serde_json::Value;

use common::{AppendStage, echo_descriptor, fast_config};

fn broken_descriptor() -> PipelineDescriptor {
    PipelineDescriptor::new().with_stage(StageFactory::new(
        "broken",
        || -> Result<AppendStage, StageError> { Err(StageError::new("broken", "model missing")) },
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_registry_names_are_case_insensitive() -> Result<(), Box<dyn Error>> {
    let registry = StreamRegistry::new(DispatchContext::default());

    let stream = registry.register("Alpha", fast_config(1), echo_descriptor()).await?;
    assert_eq!(stream.name(), "alpha");

    let duplicate = registry.register("ALPHA", fast_config(1), echo_descriptor()).await;
    assert!(matches!(duplicate, Err(DispatchError::DuplicateStream(ref name)) if name == "alpha"));

    let found = registry.get("aLpHa").expect("stream should be registered");
    assert_eq!(found.name(), "alpha");
    assert!(registry.get("beta").is_none());

    registry.register("beta", fast_config(1), echo_descriptor()).await?;
    assert_eq!(registry.names(), vec!["alpha", "beta"]);
    assert_eq!(registry.len(), 2);

    for stream in registry.streams() {
        stream.shutdown_async()?.await?;
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_construction_is_not_registered() -> Result<(), Box<dyn Error>> {
    let registry = StreamRegistry::new(DispatchContext::default());

    let result = registry.register("broken", fast_config(1), broken_descriptor()).await;
    match result {
        Err(DispatchError::StreamConstruction { name, reason }) => {
            assert_eq!(name, "broken");
            assert!(reason.contains("model missing"), "reason: {}", reason);
        }
        other => panic!("expected construction failure, got {:?}", other),
    }
    assert!(registry.get("broken").is_none());

    let empty = registry
        .register("empty", fast_config(1), PipelineDescriptor::new())
        .await;
    assert!(matches!(empty, Err(DispatchError::StreamConstruction { .. })));

    let invalid = registry
        .register("zero", fast_config(1).with_workers(0), echo_descriptor())
        .await;
    assert!(matches!(invalid, Err(DispatchError::StreamConstruction { .. })));
    assert!(registry.is_empty());
    Ok(())
}

struct ToyPlugin;

impl ServerPlugin for ToyPlugin {
    fn name(&self) -> &str {
        "Toy"
    }

    fn on_enable<'a>(&'a self, server: &'a Server) -> PluginFuture<'a> {
        Box::pin(async move {
            server
                .register_stream_with("toy", fast_config(2), echo_descriptor())
                .await?;
            server.register_serializer(FnSerializer::new("toy", |s: &Snapshot| {
                let metadata = s.metadata.clone().unwrap_or_default();
                Ok(Value::String(format!("{}:{}", s.document, metadata)))
            }))?;
            Ok(())
        })
    }
}

struct BrokenPlugin;

impl ServerPlugin for BrokenPlugin {
    fn name(&self) -> &str {
        "broken"
    }

    fn on_enable<'a>(&'a self, server: &'a Server) -> PluginFuture<'a> {
        Box::pin(async move {
            server
                .register_stream_with("broken", fast_config(1), broken_descriptor())
                .await?;
            Ok(())
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_enables_plugins() -> Result<(), Box<dyn Error>> {
    let server = Server::builder(ServerConfig::default())
        .with_plugin(ToyPlugin)
        .start()
        .await?;

    assert!(server.get_plugin("TOY").is_some());
    let stream = server.get_stream("Toy").expect("plugin registered its stream");
    assert_eq!(stream.config().workers, 2);

    let snapshot = stream.submit("doc", Some("m".into()))?.await?;
    let serializer = server.get_serializer("TOY").expect("plugin registered its serializer");
    assert_eq!(serializer.serialize(&snapshot)?, Value::String("doc:m processed".into()));

    let duplicate =
        server.register_serializer(FnSerializer::new("Toy", |_: &Snapshot| Ok(Value::Null)));
    assert!(matches!(duplicate, Err(DispatchError::DuplicateSerializer(_))));

    server.shutdown().await;
    assert!(stream.is_shut_down());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_plugin_aborts_startup() {
    let result = Server::builder(ServerConfig::default())
        .with_plugin(ToyPlugin)
        .with_plugin(BrokenPlugin)
        .start()
        .await;
    assert!(matches!(result, Err(DispatchError::Plugin { ref name, .. }) if name == "broken"));

    let duplicate = Server::builder(ServerConfig::default())
        .with_plugin(ToyPlugin)
        .with_plugin(ToyPlugin)
        .start()
        .await;
    assert!(matches!(duplicate, Err(DispatchError::DuplicatePlugin(ref name)) if name == "toy"));
}
