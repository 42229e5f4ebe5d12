//! Wire types for job requests and responses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A client's request to process one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRequest {
    pub stream_name: String,
    pub document: String,
    /// Required; may be empty.
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub serializers: Vec<String>,
}

impl ServerRequest {
    pub fn new(stream_name: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            document: document.into(),
            metadata: Some(String::new()),
            serializers: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn with_serializer(mut self, name: impl Into<String>) -> Self {
        self.serializers.push(name.into());
        self
    }
}

/// Result of a processed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerResponse {
    /// Milliseconds from request acceptance to response assembly.
    pub job_duration_ms: u64,
    /// Metadata after the pipeline ran.
    pub metadata: Option<String>,
    /// The processed document.
    pub message: String,
    /// Serialized output keyed by lowercase serializer name.
    pub content: BTreeMap<String, JsonValue>,
}
