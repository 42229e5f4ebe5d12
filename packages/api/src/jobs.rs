//! Job submission through the request boundary.

use std::collections::BTreeMap;
use std::time::Instant;

use dispatch::Server;
use serde_json::Value as JsonValue;

use crate::error::ApiError;
use crate::models::{ServerRequest, ServerResponse};

fn validate(request: &ServerRequest) -> Result<String, ApiError> {
    if request.stream_name.trim().is_empty() {
        return Err(ApiError::InvalidRequest("streamName must not be empty".into()));
    }
    if request.document.is_empty() {
        return Err(ApiError::InvalidRequest("document must not be empty".into()));
    }
    if request.serializers.is_empty() {
        return Err(ApiError::InvalidRequest(
            "at least one serializer must be requested".into(),
        ));
    }
    request
        .metadata
        .clone()
        .ok_or_else(|| ApiError::InvalidRequest("metadata must be present".into()))
}

/// Process one document and serialize the result.
///
/// Each requested serializer contributes one entry to the response content;
/// an unknown or failing serializer yields an error string for its entry
/// instead of failing the request.
pub async fn submit_job(
    server: &Server,
    request: ServerRequest,
) -> Result<ServerResponse, ApiError> {
    let started = Instant::now();
    let metadata = validate(&request)?;

    let stream = server
        .get_stream(&request.stream_name)
        .ok_or_else(|| ApiError::StreamNotFound(request.stream_name.clone()))?;

    // Submission blocks while the stream's queue is full.
    let document = request.document;
    let pending = tokio::task::spawn_blocking(move || stream.submit(document, Some(metadata)))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    let job_id = pending.job_id();
    let snapshot = pending.await?;
    tracing::debug!("Job {} finished on stream {}", job_id, request.stream_name);

    let mut content = BTreeMap::new();
    for name in &request.serializers {
        let key = name.to_lowercase();
        let value = match server.get_serializer(&key) {
            Some(serializer) => serializer.serialize(&snapshot).unwrap_or_else(|e| {
                tracing::warn!("Serializer {} failed for job {}: {}", key, job_id, e);
                JsonValue::String(format!("Error: serializer {} failed: {}", key, e))
            }),
            None => JsonValue::String(format!("Illegal Argument: serializer {} not found!", key)),
        };
        content.insert(key, value);
    }

    Ok(ServerResponse {
        job_duration_ms: started.elapsed().as_millis() as u64,
        metadata: snapshot.metadata,
        message: snapshot.document,
        content,
    })
}
