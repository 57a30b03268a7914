//! Sandbox tools implementing the `Tool` trait.
//!
//! These tools are the public contract consumed by the orchestrating agent:
//! `execute`, `get_state`, `set_state`, `clear_state`. They compose the
//! supervisor and the session state store behind one façade.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use codepod_core::{
    traits::Tool,
    types::{ToolOutput, ToolRiskLevel},
    Error, Result,
};

use crate::engine::SandboxEngine;
use crate::limits::ResourceLimits;
use crate::state::SessionState;
use crate::supervisor::{ExecutionResult, Supervisor};

// =============================================================================
// Sandbox Session Façade
// =============================================================================

/// One logical caller context: an execution pipeline plus persistent state.
///
/// State is rendered *before* each build and merged *after* each run, so an
/// execution observes state from all prior executions in this session but
/// never from itself or from other sessions. The session mutex serializes
/// concurrent `execute` calls against the same state.
pub struct SandboxSession {
    id: String,
    supervisor: Supervisor,
    limits: ResourceLimits,
    state: tokio::sync::Mutex<SessionState>,
    last_accessed: AtomicI64,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl SandboxSession {
    /// Create a new session over the given engine and limits.
    pub fn new(engine: Arc<dyn SandboxEngine>, limits: ResourceLimits) -> Self {
        Self {
            id: format!("codepod-session-{}", uuid::Uuid::new_v4()),
            supervisor: Supervisor::new(engine),
            limits,
            state: tokio::sync::Mutex::new(SessionState::new()),
            last_accessed: AtomicI64::new(unix_now()),
        }
    }

    /// Opaque session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The limits every execution in this session runs under.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Unix timestamp of the most recent façade call.
    pub fn last_accessed(&self) -> i64 {
        self.last_accessed.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        self.last_accessed.store(unix_now(), Ordering::Relaxed);
    }

    /// Execute a snippet with the session state prefixed, then merge any
    /// state-update markers from its output.
    ///
    /// The merge is a side effect; the returned result is unchanged.
    pub async fn execute(&self, code: &str) -> Result<ExecutionResult> {
        self.touch();

        // Held across the whole render → run → merge span: concurrent calls
        // against one session queue up instead of interleaving state.
        let mut state = self.state.lock().await;

        let prefix = state.render();
        let submitted = if prefix.is_empty() {
            code.to_string()
        } else {
            format!("{}\n{}", prefix, code)
        };

        let result = self.supervisor.execute(&submitted, &self.limits).await?;

        if result.error.is_none() {
            state.merge(&result.stdout);
        }

        Ok(result)
    }

    /// Snapshot of the session state mapping.
    pub async fn get_state(&self) -> std::collections::BTreeMap<String, Value> {
        self.touch();
        self.state.lock().await.snapshot()
    }

    /// Seed or overwrite one state key out-of-band.
    pub async fn set_state(&self, key: impl Into<String>, value: Value) -> Result<()> {
        self.touch();
        self.state.lock().await.set(key, value)
    }

    /// Drop all session state.
    pub async fn clear_state(&self) {
        self.touch();
        self.state.lock().await.clear();
    }

    /// Check if the execution backend is available.
    pub async fn is_available(&self) -> bool {
        self.supervisor.engine().is_available().await
    }
}

// =============================================================================
// Execute Tool
// =============================================================================

/// Tool for executing a code snippet inside a disposable sandbox.
///
/// Risk level: HIGH — runs arbitrary untrusted code.
pub struct ExecuteCodeTool {
    session: Arc<SandboxSession>,
}

impl ExecuteCodeTool {
    /// Create a new execute tool bound to a session.
    pub fn new(session: Arc<SandboxSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for ExecuteCodeTool {
    fn name(&self) -> &str {
        "execute"
    }

    fn description(&self) -> &str {
        "Execute a Python snippet inside an isolated, disposable sandbox. \
         Session state variables are available to the snippet; print a \
         __CODEPOD_STATE_V1__ line with a flat JSON object to persist values."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The Python code to execute"
                }
            },
            "required": ["code"]
        })
    }

    fn risk_level(&self) -> ToolRiskLevel {
        ToolRiskLevel::High
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let code = args
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::invalid_request("code is required"))?;

        let result = self.session.execute(code).await?;

        if result.timed_out() {
            return Ok(ToolOutput::error(format!(
                "Execution timed out after {}s",
                self.session.limits().timeout_secs
            ))
            .with_data(json!({
                "exit_code": result.exit_code,
                "timed_out": true,
            })));
        }

        let content = if result.stdout.is_empty() {
            format!("Snippet completed with exit code {}", result.exit_code)
        } else {
            result.stdout.clone()
        };

        let data = json!({
            "exit_code": result.exit_code,
            "truncated": result.truncated,
            "timed_out": false,
        });

        if result.success() {
            Ok(ToolOutput::text(content).with_data(data))
        } else {
            Ok(ToolOutput::error(format!(
                "Snippet failed (exit code {}):\n{}",
                result.exit_code, content
            ))
            .with_data(data))
        }
    }
}

// =============================================================================
// State Tools
// =============================================================================

/// Tool for inspecting the session state mapping.
pub struct GetStateTool {
    session: Arc<SandboxSession>,
}

impl GetStateTool {
    /// Create a new get-state tool bound to a session.
    pub fn new(session: Arc<SandboxSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for GetStateTool {
    fn name(&self) -> &str {
        "get_state"
    }

    fn description(&self) -> &str {
        "Return the session's persistent key/value state as a JSON object."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value) -> Result<ToolOutput> {
        let state = self.session.get_state().await;
        let rendered = serde_json::to_string_pretty(&state)?;
        Ok(ToolOutput::text(rendered))
    }
}

/// Tool for seeding a single session state key.
///
/// Risk level: MEDIUM — mutates caller-visible state.
pub struct SetStateTool {
    session: Arc<SandboxSession>,
}

impl SetStateTool {
    /// Create a new set-state tool bound to a session.
    pub fn new(session: Arc<SandboxSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for SetStateTool {
    fn name(&self) -> &str {
        "set_state"
    }

    fn description(&self) -> &str {
        "Set one session state key to a scalar value. The variable becomes \
         available to subsequent execute calls."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "State key; must be a valid Python identifier"
                },
                "value": {
                    "description": "Scalar value (null, boolean, number, or string)"
                }
            },
            "required": ["key", "value"]
        })
    }

    fn risk_level(&self) -> ToolRiskLevel {
        ToolRiskLevel::Medium
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let key = args
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::invalid_request("key is required"))?;
        let value = args
            .get("value")
            .cloned()
            .ok_or_else(|| Error::invalid_request("value is required"))?;

        self.session.set_state(key, value).await?;
        Ok(ToolOutput::text(format!("State key '{}' set", key)))
    }
}

/// Tool for dropping all session state.
///
/// Risk level: MEDIUM — mutates caller-visible state.
pub struct ClearStateTool {
    session: Arc<SandboxSession>,
}

impl ClearStateTool {
    /// Create a new clear-state tool bound to a session.
    pub fn new(session: Arc<SandboxSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for ClearStateTool {
    fn name(&self) -> &str {
        "clear_state"
    }

    fn description(&self) -> &str {
        "Remove every key from the session's persistent state."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    fn risk_level(&self) -> ToolRiskLevel {
        ToolRiskLevel::Medium
    }

    async fn execute(&self, _args: Value) -> Result<ToolOutput> {
        self.session.clear_state().await;
        Ok(ToolOutput::text("Session state cleared"))
    }
}

// =============================================================================
// Tests
// =============================================================================
