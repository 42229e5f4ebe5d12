#![allow(clippy::disallowed_methods)]

use std::error::Error;

use api::{ApiError, EXAMPLE_NAME, ServerRequest, ServerResponse, init_server, submit_job};
use dispatch::{DispatchError, ServerConfig, StreamConfig};
use serde_json::Value;

fn config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.streams.insert(
        EXAMPLE_NAME.to_string(),
        StreamConfig::default().with_workers(2),
    );
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_example_request_round_trip() -> Result<(), Box<dyn Error>> {
    let server = init_server(config()).await?;

    let request = ServerRequest::new("Example", "hello")
        .with_metadata("m1")
        .with_serializer("EXAMPLE")
        .with_serializer("missing");
    let response = submit_job(&server, request).await?;

    assert_eq!(response.message, "hello");
    assert_eq!(response.metadata.as_deref(), Some("m1 processed processed"));

    let example = response.content["example"].as_str().unwrap_or_default();
    assert!(example.ends_with("hello m1 processed processed"), "got {}", example);
    assert_eq!(
        response.content["missing"],
        Value::String("Illegal Argument: serializer missing not found!".into())
    );
    assert_eq!(response.content.len(), 2);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_requests_are_rejected() -> Result<(), Box<dyn Error>> {
    let server = init_server(config()).await?;

    let empty_document = ServerRequest::new(EXAMPLE_NAME, "").with_serializer(EXAMPLE_NAME);
    assert!(matches!(
        submit_job(&server, empty_document).await,
        Err(ApiError::InvalidRequest(_))
    ));

    let no_serializers = ServerRequest::new(EXAMPLE_NAME, "text");
    assert!(matches!(
        submit_job(&server, no_serializers).await,
        Err(ApiError::InvalidRequest(_))
    ));

    let mut no_metadata = ServerRequest::new(EXAMPLE_NAME, "text").with_serializer(EXAMPLE_NAME);
    no_metadata.metadata = None;
    assert!(matches!(
        submit_job(&server, no_metadata).await,
        Err(ApiError::InvalidRequest(_))
    ));

    let unknown_stream = ServerRequest::new("nowhere", "text").with_serializer(EXAMPLE_NAME);
    assert!(matches!(
        submit_job(&server, unknown_stream).await,
        Err(ApiError::StreamNotFound(ref name)) if name == "nowhere"
    ));

    // Empty metadata is allowed.
    let empty_metadata = ServerRequest::new(EXAMPLE_NAME, "text").with_serializer(EXAMPLE_NAME);
    let response = submit_job(&server, empty_metadata).await?;
    assert_eq!(response.metadata.as_deref(), Some(" processed processed"));

    server.shutdown().await;
    let closed = ServerRequest::new(EXAMPLE_NAME, "text").with_serializer(EXAMPLE_NAME);
    assert!(matches!(
        submit_job(&server, closed).await,
        Err(ApiError::Dispatch(DispatchError::StreamClosed(_)))
    ));
    Ok(())
}

#[test]
fn test_wire_format_uses_camel_case() -> Result<(), Box<dyn Error>> {
    let request: ServerRequest = serde_json::from_str(
        r#"{"streamName": "example", "document": "d", "metadata": "m", "serializers": ["example"]}"#,
    )?;
    assert_eq!(request.stream_name, "example");
    assert_eq!(request.serializers, vec!["example"]);

    let response = ServerResponse {
        job_duration_ms: 5,
        metadata: Some("m".into()),
        message: "d".into(),
        content: Default::default(),
    };
    let json = serde_json::to_value(&response)?;
    assert_eq!(json["jobDurationMs"], 5);
    assert_eq!(json["message"], "d");
    Ok(())
}
