//! Web tools implementing the `Tool` trait.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use codepod_core::{traits::Tool, types::ToolOutput, Error, Result};

use crate::client::WebFetcher;

/// Tool for querying the configured search endpoint.
#[derive(Clone)]
pub struct SearchTool {
    fetcher: Arc<WebFetcher>,
}

impl SearchTool {
    pub fn new(fetcher: Arc<WebFetcher>) -> Self {
        Self { fetcher }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchArgs {
    pub query: String,
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Returns a list of {title, url, snippet} results."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(SearchArgs)).unwrap_or_default()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput> {
        let args: SearchArgs = serde_json::from_value(args)
            .map_err(|e| Error::invalid_request(format!("Invalid arguments: {}", e)))?;

        let hits = self.fetcher.search(&args.query).await?;
        let count = hits.len();

        Ok(ToolOutput::text(format!("{} results", count))
            .with_data(serde_json::to_value(hits)?))
    }
}

/// Tool for fetching a page's content, served from the bounded cache when hot.
#[derive(Clone)]
pub struct OpenPageTool {
    fetcher: Arc<WebFetcher>,
}

impl OpenPageTool {
    pub fn new(fetcher: Arc<WebFetcher>) -> Self {
        Self { fetcher }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OpenArgs {
    pub url: String,
}

#[async_trait]
impl Tool for OpenPageTool {
    fn name(&self) -> &str {
        "web_open"
    }

    fn description(&self) -> &str {
        "Fetch the content of a URL. Returns an error message for pages \
         that answer with a non-success HTTP status."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(OpenArgs)).unwrap_or_default()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput> {
        let args: OpenArgs = serde_json::from_value(args)
            .map_err(|e| Error::invalid_request(format!("Invalid arguments: {}", e)))?;

        match self.fetcher.open(&args.url).await? {
            Some(content) => Ok(ToolOutput::text(content)),
            None => Ok(ToolOutput::error(format!(
                "Could not open {}: non-success response",
                args.url
            ))),
        }
    }
}

/// Tool for scanning a page for a query string.
#[derive(Clone)]
pub struct FindInPageTool {
    fetcher: Arc<WebFetcher>,
}

impl FindInPageTool {
    pub fn new(fetcher: Arc<WebFetcher>) -> Self {
        Self { fetcher }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FindArgs {
    pub url: String,
    pub query: String,
}

#[async_trait]
impl Tool for FindInPageTool {
    fn name(&self) -> &str {
        "web_find"
    }

    fn description(&self) -> &str {
        "Fetch a URL and scan it for a query string (case-insensitive). \
         Returns matches with line numbers and surrounding context."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(FindArgs)).unwrap_or_default()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput> {
        let args: FindArgs = serde_json::from_value(args)
            .map_err(|e| Error::invalid_request(format!("Invalid arguments: {}", e)))?;

        let matches = self.fetcher.find(&args.url, &args.query).await?;
        let count = matches.len();

        Ok(ToolOutput::text(format!("{} matches", count))
            .with_data(serde_json::to_value(matches)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::WebFetcherConfig;
    use serde_json::json;

    #[tokio::test]
    async fn search_tool_rejects_bad_args() {
        let tool = SearchTool::new(Arc::new(WebFetcher::new(WebFetcherConfig::default())));
        assert!(tool.execute(json!({"q": "typo"})).await.is_err());
    }

    #[tokio::test]
    async fn open_tool_rejects_invalid_url() {
        let tool = OpenPageTool::new(Arc::new(WebFetcher::new(WebFetcherConfig::default())));
        assert!(tool.execute(json!({"url": "not a url"})).await.is_err());
    }

    #[test]
    fn parameter_schemas_are_objects() {
        let fetcher = Arc::new(WebFetcher::new(WebFetcherConfig::default()));
        for params in [
            SearchTool::new(fetcher.clone()).parameters(),
            OpenPageTool::new(fetcher.clone()).parameters(),
            FindInPageTool::new(fetcher).parameters(),
        ] {
            assert!(params.is_object());
        }
    }
}
