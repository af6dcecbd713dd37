use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::mcp::{JsonRpcResponse, McpServer};
use crate::{Error, Result};

/// Serve newline-delimited JSON-RPC on stdin/stdout until stdin closes.
pub async fn serve_stdio(server: Arc<McpServer>) -> Result<()> {
    info!("stdio transport ready");
    serve_lines(server, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    info!("stdin closed, shutting down");
    Ok(())
}

/// Each line is handled on its own task so a slow tool call does not hold up
/// the next request. A single writer task serializes the responses; the
/// writer is handed back once every in-flight request has answered.
pub async fn serve_lines<R, W>(server: Arc<McpServer>, reader: R, writer: W) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(response) = rx.recv().await {
            let mut line = match serde_json::to_string(&response) {
                Ok(line) => line,
                Err(e) => {
                    error!(error = %e, "Failed to serialize response");
                    continue;
                }
            };
            line.push('\n');
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok::<W, std::io::Error>(writer)
    });

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        debug!(bytes = line.len(), "Received message");

        let server = server.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(response) = server.handle_message(&line).await {
                let _ = tx.send(response);
            }
        });
    }
    drop(tx);

    let writer = writer_task
        .await
        .map_err(|e| Error::Internal(format!("stdio writer task failed: {}", e)))??;
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Deadlines, MockCommandRunner};
    use crate::identity::source::{K8S_SERVER, K8S_TOKEN};
    use crate::identity::IdentityStore;
    use crate::mcp::{METHOD_NOT_FOUND, PARSE_ERROR};
    use crate::sanitizer::Sanitizer;
    use crate::tools::Toolbox;
    use serde_json::Value;
    use std::collections::HashMap;

    fn server() -> Arc<McpServer> {
        let env: HashMap<String, String> = [(K8S_SERVER, "https://cluster.example:6443"), (K8S_TOKEN, "abcd")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let toolbox = Toolbox::new(
            Arc::new(MockCommandRunner::new()),
            Arc::new(IdentityStore::initialize(&env)),
            Sanitizer::default(),
            Deadlines::default(),
        );
        Arc::new(McpServer::new(Arc::new(toolbox)))
    }

    fn responses(output: &[u8]) -> Vec<Value> {
        String::from_utf8_lossy(output)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_one_response_line_per_request() {
        let input = tokio_test::io::Builder::new()
            .read(b"{\"jsonrpc\": \"2.0\", \"id\": 1, \"method\": \"ping\"}\n")
            .read(b"\n")
            .read(b"{\"jsonrpc\": \"2.0\", \"method\": \"notifications/initialized\"}\n")
            .read(b"{\"jsonrpc\": \"2.0\", \"id\": 2, \"method\": \"bogus\"}\n")
            .build();

        let output = serve_lines(server(), BufReader::new(input), Vec::new()).await.unwrap();
        let mut responses = responses(&output);
        responses.sort_by_key(|r| r["id"].as_i64());

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert!(responses[0]["result"].is_object());
        assert_eq!(responses[1]["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_garbage_line_gets_parse_error() {
        let input: &[u8] = b"this is not json\n";

        let output = serve_lines(server(), input, Vec::new()).await.unwrap();
        let responses = responses(&output);

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], PARSE_ERROR);
        assert!(responses[0]["id"].is_null());
    }
}
