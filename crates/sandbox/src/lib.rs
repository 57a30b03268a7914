#![deny(unused)]
//! Sandboxed execution service for codepod.
//!
//! This crate runs untrusted code snippets to completion inside disposable,
//! resource-bounded Docker containers, and carries a small per-session
//! key/value state across invocations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Orchestrating agent (tool-calling loop)    │
//! │    ↓ calls tool                             │
//! ├─────────────────────────────────────────────┤
//! │  Façade (ExecuteCodeTool, state tools)      │
//! │    ↓ render state prefix / merge markers    │
//! ├─────────────────────────────────────────────┤
//! │  Supervisor (build → run → destroy, always) │
//! │    ↓ Docker API via bollard                 │
//! ├─────────────────────────────────────────────┤
//! │  Docker container (one per execution)       │
//! │    /workspace  (tmpfs, writable)            │
//! │    No network, read-only rootfs, no caps    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use codepod_sandbox::{DockerEngine, ResourceLimits, SandboxSession};
//! use codepod_sandbox::tools::ExecuteCodeTool;
//!
//! let engine = Arc::new(DockerEngine::new()?);
//! let session = Arc::new(SandboxSession::new(engine, ResourceLimits::default()));
//! registry.register(Box::new(ExecuteCodeTool::new(session.clone()))).await?;
//! ```

pub mod engine;
pub mod limits;
pub mod state;
pub mod supervisor;
pub mod tools;

pub use engine::{DockerEngine, EnvironmentHandle, MockEngine, RawRun, SandboxEngine};
pub use limits::ResourceLimits;
pub use state::{SessionState, STATE_MARKER};
pub use supervisor::{ExecutionResult, Supervisor, TRUNCATION_MARKER};
pub use tools::{ClearStateTool, ExecuteCodeTool, GetStateTool, SandboxSession, SetStateTool};
