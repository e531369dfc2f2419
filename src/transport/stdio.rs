//! Newline-delimited JSON-RPC over stdin/stdout (spec.md §6): one request
//! per line in, one response per line out. Stdio sessions are implicit —
//! there is no `Session-Id` header to thread through, unlike `http`.

use super::handle_raw;
use crate::dispatch::Dispatcher;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{error, warn};

/// Run the stdio transport loop until stdin closes (EOF) or a write fails.
pub async fn run(dispatcher: &Dispatcher) -> io::Result<()> {
    run_with_io(dispatcher, io::stdin(), io::stdout()).await
}

async fn run_with_io<R, W>(dispatcher: &Dispatcher, reader: R, mut writer: W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_raw(dispatcher, &line).await;
        let mut body = match serde_json::to_string(&response) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to serialise json-rpc response");
                continue;
            }
        };
        body.push('\n');

        if let Err(e) = writer.write_all(body.as_bytes()).await {
            warn!(error = %e, "stdout write failed, stopping stdio transport");
            return Err(e);
        }
        writer.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{BranchManager, BranchManagerConfig};
    use crate::registry::ToolRegistry;
    use crate::security::SecretScrubber;
    use crate::storage::fakes::{FakeEmbeddingProvider, InMemoryVectorStore};
    use std::sync::Arc;

    async fn dispatcher() -> Dispatcher {
        let registry = Arc::new(ToolRegistry::new());
        crate::dispatch::catalogue::populate_defaults(&registry).await.unwrap();
        let branches = BranchManager::new(BranchManagerConfig::default(), Arc::new(SecretScrubber::new()));
        Dispatcher::new(
            registry,
            branches,
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(FakeEmbeddingProvider),
            Arc::new(SecretScrubber::new()),
            "contextd",
            "0.1.0",
        )
    }

    #[tokio::test]
    async fn emits_one_response_line_per_request_line() {
        let d = dispatcher().await;
        let input = b"{\"id\":1,\"method\":\"handshake\"}\n{\"id\":2,\"method\":\"tool_search\",\"params\":{\"query\":\"memory\"}}\n" as &[u8];
        let mut output: Vec<u8> = Vec::new();
        run_with_io(&d, input, &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], 1);
        assert!(first["result"]["tools"].is_array());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["id"], 2);
        assert!(second["result"]["count"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let d = dispatcher().await;
        let input = b"\n\n{\"id\":1,\"method\":\"handshake\"}\n" as &[u8];
        let mut output: Vec<u8> = Vec::new();
        run_with_io(&d, input, &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
