//! Line-oriented document stream server.
//!
//! Reads one JSON request per line on stdin and writes one JSON response
//! per line on stdout. Requests run concurrently, so responses are written
//! in completion order; each carries the request's `requestId`, or the
//! 1-based input line number when none was given. Logs go to stderr. The
//! server shuts down gracefully once stdin is closed and every response
//! has been written.

use std::error::Error;
use std::io;
use std::sync::Arc;

use api::{ServerRequest, submit_job};
use dispatch::Server;
use serde_json::{Value as JsonValue, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

const REQUEST_ID: &str = "requestId";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = api::load_config()?;
    let server = Arc::new(api::init_server(config).await?);

    let mut events = server.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!("{}", event.description()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event log lagged; skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut stdout = tokio::io::stdout();
    serve(server.clone(), BufReader::new(tokio::io::stdin()), &mut stdout).await?;

    tracing::info!("Input closed; shutting down");
    server.shutdown().await;
    Ok(())
}

/// Serve every request line from `input` until it closes.
///
/// Each line runs on its own task; a response is written as soon as its
/// job finishes.
async fn serve<R, W>(server: Arc<Server>, input: R, output: &mut W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut tasks = JoinSet::new();
    let mut line_no: u64 = 0;
    let mut open = true;

    while open || !tasks.is_empty() {
        tokio::select! {
            line = lines.next_line(), if open => match line? {
                Some(line) => {
                    line_no += 1;
                    if !line.trim().is_empty() {
                        let server = server.clone();
                        let number = line_no;
                        tasks.spawn(async move { handle_line(&server, &line, number).await });
                    }
                }
                None => open = false,
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                Ok(response) => {
                    output.write_all(response.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                    output.flush().await?;
                }
                Err(e) => tracing::error!("Request task failed: {}", e),
            },
        }
    }
    Ok(())
}

async fn handle_line(server: &Server, line: &str, line_no: u64) -> String {
    let (request_id, result) = match serde_json::from_str::<JsonValue>(line) {
        Ok(mut value) => {
            let request_id = value
                .as_object_mut()
                .and_then(|fields| fields.remove(REQUEST_ID))
                .unwrap_or_else(|| json!(line_no));
            let result = match serde_json::from_value::<ServerRequest>(value) {
                Ok(request) => submit_job(server, request).await.map_err(|e| e.to_string()),
                Err(e) => Err(format!("Invalid request: {}", e)),
            };
            (request_id, result)
        }
        Err(e) => (json!(line_no), Err(format!("Invalid request: {}", e))),
    };

    let mut value = match result {
        Ok(response) => serde_json::to_value(&response)
            .unwrap_or_else(|e| json!({ "error": e.to_string() })),
        Err(error) => json!({ "error": error }),
    };
    if let Some(fields) = value.as_object_mut() {
        fields.insert(REQUEST_ID.to_string(), request_id);
    }
    value.to_string()
}
