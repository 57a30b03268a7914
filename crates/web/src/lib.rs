#![deny(unused)]
//! Web-fetch collaborator for codepod.
//!
//! Search, open, and find over external content, with a bounded page cache.
//! The sandbox execution core does not depend on this crate; both are
//! composed side by side behind the same tool registry.

pub mod cache;
pub mod client;
pub mod tools;

pub use cache::PageCache;
pub use client::{FindMatch, SearchHit, WebFetcher, WebFetcherConfig};
pub use tools::{FindInPageTool, OpenPageTool, SearchTool};
