//! Bundled example plugin.

use dispatch::{
    FnSerializer, PipelineDescriptor, PluginFuture, SerializeResult, Server, ServerPlugin,
    Snapshot, Stage, StageError, StageFactory, WorkBuffer,
};
use serde_json::Value as JsonValue;

/// Name of the example plugin, its stream and its serializer.
pub const EXAMPLE_NAME: &str = "example";

/// Appends " processed" to the job metadata.
#[derive(Debug, Clone, Default)]
pub struct ExampleStage;

impl Stage for ExampleStage {
    fn name(&self) -> &str {
        "example-processor"
    }

    fn process(&mut self, buffer: &mut WorkBuffer) -> Result<(), StageError> {
        let metadata = format!("{} processed", buffer.metadata().unwrap_or_default());
        buffer.set_metadata(Some(metadata));
        Ok(())
    }
}

/// Serializer rendering job id, document and metadata as one string.
pub fn example_serializer() -> FnSerializer<fn(&Snapshot) -> SerializeResult> {
    FnSerializer::new(EXAMPLE_NAME, render as fn(&Snapshot) -> SerializeResult)
}

fn render(snapshot: &Snapshot) -> SerializeResult {
    Ok(JsonValue::String(format!(
        "{}{} {}",
        snapshot.job_id,
        snapshot.document,
        snapshot.metadata.as_deref().unwrap_or_default()
    )))
}

/// Registers the "example" stream and serializer.
#[derive(Debug, Default)]
pub struct ExamplePlugin;

impl ServerPlugin for ExamplePlugin {
    fn name(&self) -> &str {
        EXAMPLE_NAME
    }

    fn on_enable<'a>(&'a self, server: &'a Server) -> PluginFuture<'a> {
        Box::pin(async move {
            let descriptor = PipelineDescriptor::new()
                .with_metadata_stage(StageFactory::cloned(ExampleStage))
                .with_stage(StageFactory::cloned(ExampleStage));
            server.register_stream(EXAMPLE_NAME, descriptor).await?;
            server.register_serializer(example_serializer())?;
            Ok(())
        })
    }
}
