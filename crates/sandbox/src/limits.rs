//! Declarative resource ceiling for one execution.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use codepod_core::{Error, Result};

/// Docker's standard CFS period (100ms), against which `cpu_share` is scaled.
const CPU_PERIOD: i64 = 100_000;

/// Resource limits applied to one snippet execution.
///
/// Immutable once a session is constructed. Enforcement happens inside the
/// container runtime, not in the supervising process, so a runaway snippet
/// cannot starve the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall-clock ceiling in seconds; the environment is force-killed past it.
    pub timeout_secs: u64,
    /// Memory ceiling, e.g. "512m" (supports k/m/g suffixes or plain bytes).
    pub memory_limit: String,
    /// CPU share as a fraction of one core (1.0 = one full core).
    pub cpu_share: f64,
    /// Disable the network namespace entirely.
    pub network_disabled: bool,
    /// Mount the root filesystem read-only (a tmpfs scratch stays writable).
    pub filesystem_read_only: bool,
    /// Docker image the environment is created from.
    pub base_image: String,
    /// Ceiling on captured combined output, in bytes.
    pub max_output_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            memory_limit: "512m".to_string(),
            cpu_share: 1.0,
            network_disabled: true,
            filesystem_read_only: true,
            base_image: "python:3.12-slim".to_string(),
            max_output_bytes: 64 * 1024,
        }
    }
}

impl ResourceLimits {
    /// Validate the invariants declared by the data model.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(Error::invalid_limits("timeout_secs must be greater than zero"));
        }
        if self.max_output_bytes == 0 {
            return Err(Error::invalid_limits(
                "max_output_bytes must be greater than zero",
            ));
        }
        if !(self.cpu_share > 0.0) {
            return Err(Error::invalid_limits("cpu_share must be greater than zero"));
        }
        if self.base_image.trim().is_empty() {
            return Err(Error::invalid_limits("base_image must not be empty"));
        }
        self.memory_bytes()?;
        Ok(())
    }

    /// Parse `memory_limit` into bytes. Accepts plain byte counts or a
    /// trailing `k`/`m`/`g` (case-insensitive).
    pub fn memory_bytes(&self) -> Result<i64> {
        let s = self.memory_limit.trim().to_ascii_lowercase();
        let (digits, multiplier) = match s.as_bytes().last() {
            Some(&b'k') => (&s[..s.len() - 1], 1024i64),
            Some(&b'm') => (&s[..s.len() - 1], 1024i64 * 1024),
            Some(&b'g') => (&s[..s.len() - 1], 1024i64 * 1024 * 1024),
            _ => (s.as_str(), 1i64),
        };
        let value: i64 = digits.parse().map_err(|_| {
            Error::invalid_limits(format!("unparseable memory limit '{}'", self.memory_limit))
        })?;
        if value <= 0 {
            return Err(Error::invalid_limits(format!(
                "memory limit '{}' must be positive",
                self.memory_limit
            )));
        }
        value.checked_mul(multiplier).ok_or_else(|| {
            Error::invalid_limits(format!(
                "memory limit '{}' exceeds the representable range",
                self.memory_limit
            ))
        })
    }

    /// CFS quota derived from `cpu_share` against the standard 100ms period.
    pub fn cpu_quota(&self) -> i64 {
        (self.cpu_share * CPU_PERIOD as f64) as i64
    }

    /// CFS period matching [`cpu_quota`](Self::cpu_quota).
    pub fn cpu_period(&self) -> i64 {
        CPU_PERIOD
    }

    /// Execution timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
