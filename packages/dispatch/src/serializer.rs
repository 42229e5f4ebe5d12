//! Result serializers and their registry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use stream_core::Snapshot;

use crate::error::{DispatchError, DispatchResult};

/// Result type for serializers. Errors are reported back per serializer.
pub type SerializeResult = Result<Value, String>;

/// Renders a finished job's output into a response value.
pub trait ResultSerializer: Send + Sync + 'static {
    /// Name clients use to request this serializer.
    fn name(&self) -> &str;

    /// Serialize a job's output.
    fn serialize(&self, snapshot: &Snapshot) -> SerializeResult;
}

/// A simple function-based serializer.
pub struct FnSerializer<F>
where
    F: Fn(&Snapshot) -> SerializeResult + Send + Sync + 'static,
{
    name: String,
    serialize: F,
}

impl<F> FnSerializer<F>
where
    F: Fn(&Snapshot) -> SerializeResult + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, serialize: F) -> Self {
        Self {
            name: name.into(),
            serialize,
        }
    }
}

impl<F> ResultSerializer for FnSerializer<F>
where
    F: Fn(&Snapshot) -> SerializeResult + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self, snapshot: &Snapshot) -> SerializeResult {
        (self.serialize)(snapshot)
    }
}

/// Serializers keyed by lowercase name.
#[derive(Default)]
pub struct SerializerRegistry {
    serializers: RwLock<HashMap<String, Arc<dyn ResultSerializer>>>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a serializer. Names are compared ignoring case.
    pub fn register<S: ResultSerializer>(&self, serializer: S) -> DispatchResult<()> {
        let key = serializer.name().to_lowercase();
        let mut serializers = self
            .serializers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if serializers.contains_key(&key) {
            return Err(DispatchError::DuplicateSerializer(key));
        }
        tracing::info!("Registered serializer: {}", key);
        serializers.insert(key, Arc::new(serializer));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ResultSerializer>> {
        self.serializers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.to_lowercase())
            .cloned()
    }

    /// Registered serializer names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .serializers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("names", &self.names())
            .finish()
    }
}
