#![deny(unused)]
//! Core types, traits, and error definitions for codepod.
//!
//! This crate provides the foundational building blocks shared by the
//! sandbox execution core, the web-fetch collaborator, and the binary.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
