use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub sandbox: SandboxSection,
    pub web: WebSection,
}

/// Resource ceiling for one snippet execution, as declared in config.
/// Mirrors `codepod_sandbox::ResourceLimits`; the binary converts between
/// the two so the sandbox crate does not depend on the config loader.
#[derive(Debug, Deserialize, Clone)]
pub struct SandboxSection {
    pub timeout_secs: u64,
    pub memory_limit: String,
    pub cpu_share: f64,
    pub network_disabled: bool,
    pub filesystem_read_only: bool,
    pub base_image: String,
    pub max_output_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSection {
    pub search_endpoint: String,
    pub max_download_size_bytes: u64,
    pub cache_capacity: usize,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("CODEPOD_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map CODEPOD__SANDBOX__TIMEOUT_SECS=5 to sandbox.timeout_secs
            .add_source(Environment::with_prefix("CODEPOD").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxSection {
                timeout_secs: 30,
                memory_limit: "512m".into(),
                cpu_share: 1.0,
                network_disabled: true,
                filesystem_read_only: true,
                base_image: "python:3.12-slim".into(),
                max_output_bytes: 64 * 1024,
            },
            web: WebSection {
                search_endpoint: "http://127.0.0.1:8888/search".into(),
                max_download_size_bytes: 10 * 1024 * 1024, // 10MB
                cache_capacity: 32,
            },
        }
    }
}
