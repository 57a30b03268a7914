//! JSON-lines tool dispatcher.
//!
//! The orchestrating agent drives codepod over stdin/stdout: one request
//! object per line in, one `ToolOutput` object per line out. Logs go to
//! stderr so the protocol stream stays clean.

use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use codepod_core::{traits::ToolRegistry, types::ToolOutput};

/// One request line from the agent.
#[derive(Debug, Deserialize)]
struct Request {
    tool: String,
    #[serde(default)]
    args: serde_json::Value,
}

/// Serve requests until stdin closes.
pub async fn serve(registry: Arc<dyn ToolRegistry>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    // Announce the available tools as the first line
    let listing = serde_json::to_string(&registry.list().await?)?;
    stdout.write_all(listing.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(&registry, request).await,
            Err(e) => ToolOutput::error(format!("Malformed request line: {}", e)),
        };

        let rendered = serde_json::to_string(&output)?;
        stdout.write_all(rendered.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}

/// Execute one request, folding registry errors into a failed output so the
/// agent always receives a well-formed result line.
async fn dispatch(registry: &Arc<dyn ToolRegistry>, request: Request) -> ToolOutput {
    match registry.execute(&request.tool, request.args).await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(tool = %request.tool, error = %e, "Tool invocation failed");
            ToolOutput::error(e.to_string())
        }
    }
}
