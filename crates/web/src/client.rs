//! Web fetcher: search, open, and find over external content.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use codepod_core::{Error, Result};

use crate::cache::PageCache;

/// Configuration for the fetcher.
#[derive(Debug, Clone)]
pub struct WebFetcherConfig {
    /// JSON search endpoint (SearxNG-compatible: `?q=...&format=json`).
    pub search_endpoint: String,
    /// Ceiling on a single downloaded page, in bytes.
    pub max_download_size_bytes: u64,
    /// Number of pages the cache holds.
    pub cache_capacity: usize,
}

impl Default for WebFetcherConfig {
    fn default() -> Self {
        Self {
            search_endpoint: "http://127.0.0.1:8888/search".into(),
            max_download_size_bytes: 10 * 1024 * 1024,
            cache_capacity: 32,
        }
    }
}

/// One search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// One match from a find scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindMatch {
    /// 1-based line number of the match.
    pub line: usize,
    /// The matching line with one line of context on each side.
    pub context: String,
    /// The exact substring that matched.
    pub matched: String,
}

/// Fetches external content with a bounded, instance-owned page cache.
pub struct WebFetcher {
    client: reqwest::Client,
    config: WebFetcherConfig,
    cache: Mutex<PageCache>,
}

impl WebFetcher {
    /// Create a fetcher from the given configuration.
    pub fn new(config: WebFetcherConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache: Mutex::new(PageCache::new(config.cache_capacity)),
            config,
        }
    }

    /// Run a query against the configured search endpoint.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let resp = self
            .client
            .get(&self.config.search_endpoint)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| Error::fetch(format!("Search request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::fetch(format!(
                "Search endpoint returned HTTP {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::fetch(format!("Search response was not JSON: {}", e)))?;

        Ok(parse_search_results(&body))
    }

    /// Fetch a page, serving from the cache when possible.
    ///
    /// Returns `None` for non-success HTTP statuses; network-level failures
    /// and oversized bodies are errors.
    pub async fn open(&self, url: &str) -> Result<Option<String>> {
        url::Url::parse(url).map_err(|e| Error::fetch(format!("Invalid URL '{}': {}", url, e)))?;

        {
            let cache = self.cache.lock().await;
            if let Some(content) = cache.get(url) {
                tracing::debug!(url = %url, "Page cache hit");
                return Ok(Some(content.clone()));
            }
        }

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::fetch(format!("Request failed: {}", e)))?;

        if !resp.status().is_success() {
            tracing::debug!(url = %url, status = %resp.status(), "Page fetch returned non-success");
            return Ok(None);
        }

        // Streamed download with a byte cap
        let mut stream = resp.bytes_stream();
        let mut buffer = Vec::new();
        let mut total_size = 0u64;
        let limit = self.config.max_download_size_bytes;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::fetch(format!("Download failed: {}", e)))?;
            total_size += chunk.len() as u64;
            if total_size > limit {
                return Err(Error::fetch(format!(
                    "Response size exceeded limit ({} bytes)",
                    limit
                )));
            }
            buffer.extend_from_slice(&chunk);
        }

        let content = String::from_utf8_lossy(&buffer).into_owned();
        self.cache.lock().await.insert(url, content.clone());

        Ok(Some(content))
    }

    /// Open a page and scan it for a query, case-insensitively.
    pub async fn find(&self, url: &str, query: &str) -> Result<Vec<FindMatch>> {
        let Some(content) = self.open(url).await? else {
            return Ok(Vec::new());
        };
        Ok(scan_lines(&content, query))
    }
}

/// Parse a SearxNG-style `results` array into search hits.
fn parse_search_results(body: &serde_json::Value) -> Vec<SearchHit> {
    body.get("results")
        .and_then(|r| r.as_array())
        .map(|results| {
            results
                .iter()
                .filter_map(|r| {
                    let url = r.get("url")?.as_str()?.to_string();
                    Some(SearchHit {
                        title: r
                            .get("title")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        url,
                        snippet: r
                            .get("content")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Case-insensitive line scan with one line of context on each side.
fn scan_lines(content: &str, query: &str) -> Vec<FindMatch> {
    if query.is_empty() {
        return Vec::new();
    }
    let needle = query.to_lowercase();
    let lines: Vec<&str> = content.lines().collect();

    lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            let start = line.to_lowercase().find(&needle)?;
            // Lowercasing can shift byte offsets for non-ASCII text; fall
            // back to the query itself when the slice is not clean.
            let matched = line
                .get(start..start + query.len())
                .unwrap_or(query)
                .to_string();
            let from = i.saturating_sub(1);
            let to = (i + 1).min(lines.len() - 1);
            Some(FindMatch {
                line: i + 1,
                context: lines[from..=to].join("\n"),
                matched,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_search_results() {
        let body = json!({
            "results": [
                {"title": "Rust", "url": "https://rust-lang.org", "content": "A language"},
                {"title": "no url entry skipped", "content": "..."},
            ]
        });

        let hits = parse_search_results(&body);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Rust");
        assert_eq!(hits[0].url, "https://rust-lang.org");
        assert_eq!(hits[0].snippet, "A language");
    }

    #[test]
    fn empty_or_malformed_results_yield_nothing() {
        assert!(parse_search_results(&json!({})).is_empty());
        assert!(parse_search_results(&json!({"results": "nope"})).is_empty());
    }

    #[test]
    fn scan_finds_case_insensitive_matches_with_context() {
        let content = "first\nthe Needle is here\nlast\n";
        let matches = scan_lines(content, "needle");

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line, 2);
        assert_eq!(matches[0].matched, "Needle");
        assert_eq!(matches[0].context, "first\nthe Needle is here\nlast");
    }

    #[test]
    fn scan_handles_edges_and_misses() {
        let matches = scan_lines("only line with word", "word");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].context, "only line with word");

        assert!(scan_lines("nothing here", "absent").is_empty());
        assert!(scan_lines("text", "").is_empty());
    }

    #[tokio::test]
    async fn open_serves_cached_pages_without_network() {
        let fetcher = WebFetcher::new(WebFetcherConfig::default());
        fetcher
            .cache
            .lock()
            .await
            .insert("https://example.com/page", "cached body");

        let content = fetcher.open("https://example.com/page").await.unwrap();
        assert_eq!(content.as_deref(), Some("cached body"));
    }

    #[tokio::test]
    async fn find_scans_cached_page() {
        let fetcher = WebFetcher::new(WebFetcherConfig::default());
        fetcher
            .cache
            .lock()
            .await
            .insert("https://example.com/doc", "alpha\nbeta target beta\ngamma");

        let matches = fetcher
            .find("https://example.com/doc", "TARGET")
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line, 2);
    }

    #[tokio::test]
    async fn open_rejects_invalid_urls() {
        let fetcher = WebFetcher::new(WebFetcherConfig::default());
        assert!(fetcher.open("not a url").await.is_err());
    }
}
