//! Run-to-completion protocol for one launched environment.
//!
//! The supervisor owns the full build → run → destroy span of a single
//! execution. Whatever branch the run takes — normal exit, deadline kill,
//! or an internal error while polling — the environment is released before
//! the result is returned.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use codepod_core::Result;

use crate::engine::SandboxEngine;
use crate::limits::ResourceLimits;

/// Marker appended to truncated output.
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Error string reported when the deadline kill fires.
const TIMEOUT_ERROR: &str = "timeout";

/// Caller-visible outcome of one execution.
///
/// A non-zero exit code is data, not a subsystem failure: "the snippet
/// raised an error" is a normal outcome, distinct from the sandbox
/// infrastructure failing to do its job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Combined output, possibly truncated.
    pub stdout: String,
    /// Exit code of the snippet, verbatim; `-1` means timed out.
    pub exit_code: i64,
    /// Structural error ("timeout"), if any.
    pub error: Option<String>,
    /// Whether the output was truncated to the configured ceiling.
    pub truncated: bool,
}

impl ExecutionResult {
    /// Result for an execution killed at the deadline.
    pub fn timeout() -> Self {
        Self {
            stdout: String::new(),
            exit_code: -1,
            error: Some(TIMEOUT_ERROR.to_string()),
            truncated: false,
        }
    }

    /// Whether the snippet ran to completion with exit code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    /// Whether this result reports a deadline kill.
    pub fn timed_out(&self) -> bool {
        self.error.as_deref() == Some(TIMEOUT_ERROR)
    }
}

/// Truncate `output` to at most `max_bytes` bytes, backing off to the
/// nearest char boundary, and append the truncation marker.
fn truncate_output(output: String, max_bytes: usize) -> (String, bool) {
    if output.len() <= max_bytes {
        return (output, false);
    }
    let mut cut = max_bytes;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut truncated = output[..cut].to_string();
    truncated.push_str(TRUNCATION_MARKER);
    (truncated, true)
}

/// Supervises one execution at a time against a [`SandboxEngine`].
pub struct Supervisor {
    engine: Arc<dyn SandboxEngine>,
}

impl Supervisor {
    /// Create a supervisor over the given engine.
    pub fn new(engine: Arc<dyn SandboxEngine>) -> Self {
        Self { engine }
    }

    /// The engine backing this supervisor.
    pub fn engine(&self) -> &Arc<dyn SandboxEngine> {
        &self.engine
    }

    /// Run one snippet to completion under the given limits.
    ///
    /// Build failures surface as `Error::Build`; a deadline kill is returned
    /// as data (`error = "timeout"`, exit code `-1`). The environment is
    /// destroyed on every exit path; a failed teardown is logged and never
    /// masks the already-computed result.
    pub async fn execute(&self, code: &str, limits: &ResourceLimits) -> Result<ExecutionResult> {
        limits.validate()?;

        let env = self.engine.build(code, limits).await?;

        // Release obligation held from here on, whatever `run` does.
        let outcome = self.engine.run(&env, limits).await;
        if let Err(e) = self.engine.destroy(&env).await {
            tracing::warn!(env = %env, error = %e, "Failed to release execution environment");
        }

        let raw = outcome?;
        if raw.timed_out {
            return Ok(ExecutionResult::timeout());
        }

        let (stdout, truncated) = truncate_output(raw.output, limits.max_output_bytes);
        Ok(ExecutionResult {
            stdout,
            exit_code: raw.exit_code,
            error: None,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MockEngine, RawRun};

    fn supervisor(engine: MockEngine) -> (Supervisor, Arc<MockEngine>) {
        let engine = Arc::new(engine);
        (Supervisor::new(engine.clone()), engine)
    }

    #[tokio::test]
    async fn normal_completion_passes_exit_code_through() {
        let (sup, engine) = supervisor(MockEngine::new(vec![RawRun {
            output: "boom\n".into(),
            exit_code: 3,
            timed_out: false,
        }]));

        let result = sup
            .execute("exit(3)", &ResourceLimits::default())
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "boom\n");
        assert!(result.error.is_none());
        assert!(!result.success());
        assert_eq!(engine.destroy_count(), 1);
    }

    #[tokio::test]
    async fn timeout_is_data_not_error() {
        let (sup, engine) = supervisor(MockEngine::new(vec![RawRun {
            output: "partial".into(),
            exit_code: -1,
            timed_out: true,
        }]));

        let result = sup
            .execute("while True: pass", &ResourceLimits::default())
            .await
            .unwrap();

        assert!(result.timed_out());
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stdout, "");
        assert!(!result.truncated);
        assert_eq!(engine.destroy_count(), 1);
    }

    #[tokio::test]
    async fn output_truncated_at_exact_byte_boundary() {
        let limits = ResourceLimits {
            max_output_bytes: 10,
            ..ResourceLimits::default()
        };
        let (sup, _) = supervisor(MockEngine::new(vec![RawRun {
            output: "a".repeat(25),
            exit_code: 0,
            timed_out: false,
        }]));

        let result = sup.execute("print('a' * 25)", &limits).await.unwrap();

        assert!(result.truncated);
        assert_eq!(
            result.stdout.len(),
            limits.max_output_bytes + TRUNCATION_MARKER.len()
        );
        assert!(result.stdout.starts_with(&"a".repeat(10)));
        assert!(result.stdout.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn output_at_cap_is_untouched() {
        let limits = ResourceLimits {
            max_output_bytes: 5,
            ..ResourceLimits::default()
        };
        let (sup, _) = supervisor(MockEngine::new(vec![RawRun {
            output: "12345".into(),
            exit_code: 0,
            timed_out: false,
        }]));

        let result = sup.execute("print(12345)", &limits).await.unwrap();
        assert!(!result.truncated);
        assert_eq!(result.stdout, "12345");
    }

    #[tokio::test]
    async fn truncation_respects_char_boundaries() {
        // 'é' is two bytes; cutting at 3 would split the second one
        let (stdout, truncated) = super::truncate_output("aéé".to_string(), 3);
        assert!(truncated);
        assert_eq!(stdout, format!("aé{}", TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn environment_destroyed_when_run_fails() {
        let (sup, engine) = supervisor(MockEngine::failing_run());

        let err = sup
            .execute("print(1)", &ResourceLimits::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("mock run failure"));
        assert_eq!(engine.destroy_count(), 1, "teardown must run on the error path");
    }

    #[tokio::test]
    async fn build_failure_surfaces_without_destroy() {
        let (sup, engine) = supervisor(MockEngine::failing_build());

        let err = sup
            .execute("print(1)", &ResourceLimits::default())
            .await
            .unwrap_err();

        assert!(matches!(err, codepod_core::Error::Build(_)));
        assert_eq!(engine.destroy_count(), 0, "nothing to release before build succeeds");
    }

    #[tokio::test]
    async fn invalid_limits_rejected_before_build() {
        let (sup, engine) = supervisor(MockEngine::default());
        let limits = ResourceLimits {
            timeout_secs: 0,
            ..ResourceLimits::default()
        };

        assert!(sup.execute("print(1)", &limits).await.is_err());
        assert!(engine.built_snippets().is_empty());
    }
}
