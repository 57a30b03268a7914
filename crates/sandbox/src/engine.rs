//! Execution environment builder and run-to-completion backend.
//!
//! This module provides the `SandboxEngine` trait and a Docker-based
//! implementation using the `bollard` crate. Every execution gets a fresh,
//! disposable container with strict resource limits, no network access, and
//! a read-only root filesystem.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use codepod_core::{Error, Result};

use crate::limits::ResourceLimits;

/// Interval at which the run loop checks for termination.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// Engine Types
// =============================================================================

/// Opaque handle to one launched execution environment.
///
/// Owned exclusively by the supervisor for the duration of one `execute`
/// call; the supervisor guarantees it is destroyed before the call returns.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentHandle(pub String);

impl std::fmt::Display for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw outcome of running one environment to completion.
///
/// Output is untruncated here; the supervisor applies the output cap.
#[derive(Debug, Clone)]
pub struct RawRun {
    /// Combined stdout and stderr, in arrival order.
    pub output: String,
    /// Exit code of the snippet process, verbatim.
    pub exit_code: i64,
    /// Whether the environment was force-killed at the deadline.
    pub timed_out: bool,
}

// =============================================================================
// Sandbox Engine Trait
// =============================================================================

/// Trait for execution environment backends.
///
/// Implementations materialize disposable environments for running untrusted
/// code. The default implementation uses Docker containers via `bollard`.
#[async_trait]
pub trait SandboxEngine: Send + Sync {
    /// Materialize a launchable environment holding the given snippet.
    ///
    /// Allocates a named resource (the container); the release obligation
    /// transfers to the caller once this returns successfully. Build
    /// failures are deterministic for the same inputs and are never retried.
    async fn build(&self, code: &str, limits: &ResourceLimits) -> Result<EnvironmentHandle>;

    /// Run the environment to completion, enforcing the wall-clock deadline.
    async fn run(&self, env: &EnvironmentHandle, limits: &ResourceLimits) -> Result<RawRun>;

    /// Destroy the environment and release its resources.
    async fn destroy(&self, env: &EnvironmentHandle) -> Result<()>;

    /// Check if the backend is available (e.g., Docker daemon running).
    async fn is_available(&self) -> bool;
}

// =============================================================================
// Docker Engine Implementation
// =============================================================================

/// Docker-based engine using the `bollard` crate.
///
/// Creates one container per execution with:
/// - No network access (when `network_disabled`)
/// - Read-only root filesystem plus a writable tmpfs `/workspace`
/// - Memory and CPU limits
/// - Non-root user, all capabilities dropped, no privilege escalation
pub struct DockerEngine {
    docker: bollard::Docker,
}

impl DockerEngine {
    /// Connect to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            Error::internal(format!(
                "Failed to connect to Docker daemon: {}. Is Docker running?",
                e
            ))
        })?;
        Ok(Self { docker })
    }

    /// Create from an existing bollard Docker client (for testing).
    pub fn from_client(docker: bollard::Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl SandboxEngine for DockerEngine {
    async fn build(&self, code: &str, limits: &ResourceLimits) -> Result<EnvironmentHandle> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::{HostConfig, Mount, MountTypeEnum};

        let name = format!("codepod-env-{}", uuid::Uuid::new_v4());
        let memory = limits.memory_bytes()?;

        let host_config = HostConfig {
            memory: Some(memory),
            cpu_quota: Some(limits.cpu_quota()),
            cpu_period: Some(limits.cpu_period()),
            network_mode: Some(if limits.network_disabled {
                "none".to_string()
            } else {
                "bridge".to_string()
            }),
            // Writable scratch space, sized at half the memory ceiling
            mounts: Some(vec![Mount {
                target: Some("/workspace".to_string()),
                typ: Some(MountTypeEnum::TMPFS),
                tmpfs_options: Some(bollard::models::MountTmpfsOptions {
                    size_bytes: Some(memory / 2),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            readonly_rootfs: Some(limits.filesystem_read_only),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            // Prevent fork bombs and file-descriptor exhaustion
            pids_limit: Some(100),
            ulimits: Some(vec![bollard::models::ResourcesUlimits {
                name: Some("nofile".to_string()),
                soft: Some(1024),
                hard: Some(2048),
            }]),
            ..Default::default()
        };

        // The snippet travels as the container command; the container's own
        // filesystem layer is the fresh, isolated holder for it.
        let container_config = Config {
            image: Some(limits.base_image.clone()),
            working_dir: Some("/workspace".to_string()),
            user: Some("nobody".to_string()),
            cmd: Some(vec![
                "python3".to_string(),
                "-c".to_string(),
                code.to_string(),
            ]),
            host_config: Some(host_config),
            labels: Some(std::collections::HashMap::from([(
                "managed-by".to_string(),
                "codepod-sandbox".to_string(),
            )])),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: &name,
            platform: None,
        };

        self.docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| Error::build(format!("Failed to create execution environment: {}", e)))?;

        tracing::debug!(env = %name, image = %limits.base_image, "Execution environment created");

        Ok(EnvironmentHandle(name))
    }

    async fn run(&self, env: &EnvironmentHandle, limits: &ResourceLimits) -> Result<RawRun> {
        use bollard::container::{KillContainerOptions, LogsOptions};

        self.docker
            .start_container::<String>(&env.0, None)
            .await
            .map_err(|e| Error::build(format!("Failed to launch execution environment: {}", e)))?;

        let started = Instant::now();
        let deadline = limits.timeout();

        // Termination poll loop. The snippet is untrusted and cannot be asked
        // to cooperate, so the deadline is enforced with an unconditional kill.
        let exit_code = loop {
            let inspect = self
                .docker
                .inspect_container(&env.0, None)
                .await
                .map_err(|e| Error::internal(format!("Failed to inspect environment: {}", e)))?;

            let state = inspect.state.unwrap_or_default();
            if state.running != Some(true) {
                break state.exit_code.unwrap_or(-1);
            }

            if started.elapsed() > deadline {
                tracing::warn!(env = %env, timeout_secs = limits.timeout_secs, "Execution deadline exceeded, killing environment");
                let _ = self
                    .docker
                    .kill_container(&env.0, Some(KillContainerOptions { signal: "SIGKILL" }))
                    .await;
                return Ok(RawRun {
                    output: String::new(),
                    exit_code: -1,
                    timed_out: true,
                });
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        };

        // Combined output, in arrival order.
        let mut output = String::new();
        let mut logs = self.docker.logs(
            &env.0,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );
        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(bollard::container::LogOutput::StdOut { message })
                | Ok(bollard::container::LogOutput::StdErr { message }) => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {} // ignore stdin echoes
                Err(e) => {
                    tracing::warn!(env = %env, error = %e, "Log stream ended early");
                    break;
                }
            }
        }

        Ok(RawRun {
            output,
            exit_code,
            timed_out: false,
        })
    }

    async fn destroy(&self, env: &EnvironmentHandle) -> Result<()> {
        use bollard::container::{RemoveContainerOptions, StopContainerOptions};

        // Stop with a short grace period; a finished container is a no-op.
        let _ = self
            .docker
            .stop_container(&env.0, Some(StopContainerOptions { t: 2 }))
            .await;

        self.docker
            .remove_container(
                &env.0,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| Error::internal(format!("Failed to remove environment: {}", e)))?;

        tracing::debug!(env = %env, "Execution environment destroyed");
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

// =============================================================================
// Mock Engine (for testing without Docker)
// =============================================================================

/// In-memory mock engine for unit testing.
///
/// Records every snippet it is asked to build and counts destroys, so tests
/// can assert on the rendered state prefix and on the teardown guarantee.
#[derive(Default)]
pub struct MockEngine {
    runs: std::sync::Mutex<Vec<RawRun>>,
    built: std::sync::Mutex<Vec<String>>,
    destroyed: std::sync::atomic::AtomicUsize,
    fail_build: bool,
    fail_run: bool,
}

impl MockEngine {
    /// Create a mock engine with scripted run outcomes, consumed in order.
    pub fn new(runs: Vec<RawRun>) -> Self {
        Self {
            runs: std::sync::Mutex::new(runs),
            ..Default::default()
        }
    }

    /// Mock engine whose `build` always fails.
    pub fn failing_build() -> Self {
        Self {
            fail_build: true,
            ..Default::default()
        }
    }

    /// Mock engine whose `run` always fails after a successful build.
    pub fn failing_run() -> Self {
        Self {
            fail_run: true,
            ..Default::default()
        }
    }

    /// Snippets submitted to `build`, in order.
    pub fn built_snippets(&self) -> Vec<String> {
        self.built.lock().unwrap().clone()
    }

    /// Number of environments destroyed so far.
    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxEngine for MockEngine {
    async fn build(&self, code: &str, _limits: &ResourceLimits) -> Result<EnvironmentHandle> {
        if self.fail_build {
            return Err(Error::build("mock build failure"));
        }
        self.built.lock().unwrap().push(code.to_string());
        Ok(EnvironmentHandle(format!(
            "mock-env-{}",
            uuid::Uuid::new_v4()
        )))
    }

    async fn run(&self, _env: &EnvironmentHandle, _limits: &ResourceLimits) -> Result<RawRun> {
        if self.fail_run {
            return Err(Error::internal("mock run failure"));
        }
        let mut runs = self.runs.lock().unwrap();
        if runs.is_empty() {
            Ok(RawRun {
                output: String::new(),
                exit_code: 0,
                timed_out: false,
            })
        } else {
            Ok(runs.remove(0))
        }
    }

    async fn destroy(&self, _env: &EnvironmentHandle) -> Result<()> {
        self.destroyed
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
