// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! lurepl configuration.
//!
//! Configuration is loaded from `lurepl.toml` in the working directory.
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! port = 3000
//! host = "127.0.0.1"
//! static_dir = "public"
//!
//! [worker]
//! version = "0.4.0"
//! cache_capacity = 512
//! memory_limit_mb = 64
//! budget_ms = 2000
//! base = "/build/"
//!
//! [tools]
//! origin = "http://127.0.0.1:3000"
//! offline = false
//! ```

use lurepl::bundler::DEFAULT_CACHE_CAPACITY;
use lurepl::{CycleConfig, LuaSandbox, RenderOptions, SandboxLimits, ToolUrls, FRAMEWORK_VERSION};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Name of the configuration file.
pub const CONFIG_FILE: &str = "lurepl.toml";

/// Main configuration structure loaded from `lurepl.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Playground server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Build worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Tool artifact settings.
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Playground server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server port (default: 3000).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Server host (default: "127.0.0.1").
    #[serde(default = "default_host")]
    pub host: String,
    /// Directory served behind the interception layer (default: "public").
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

/// Build worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Framework version requested by `build` and `watch`.
    #[serde(default = "default_version")]
    pub version: String,
    /// Bundler cache capacity in modules.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Memory limit of a server render in MiB.
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: usize,
    /// Wall-clock budget of a server render in milliseconds.
    #[serde(default = "default_budget_ms")]
    pub budget_ms: u64,
    /// Base URL of client chunks in rendered handler attributes.
    #[serde(default = "default_base")]
    pub base: String,
}

/// Tool artifact configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsConfig {
    /// Origin serving `/repl/*` artifacts. Defaults to the local server.
    pub origin: Option<String>,
    /// CDN base. Defaults to `{origin}/cdn`.
    pub cdn: Option<String>,
    /// Use the embedded artifacts without any network access.
    #[serde(default)]
    pub offline: bool,
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_static_dir() -> String {
    "public".to_string()
}

fn default_version() -> String {
    FRAMEWORK_VERSION.to_string()
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_memory_limit_mb() -> usize {
    64
}

fn default_budget_ms() -> u64 {
    2000
}

fn default_base() -> String {
    "/build/".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            cache_capacity: default_cache_capacity(),
            memory_limit_mb: default_memory_limit_mb(),
            budget_ms: default_budget_ms(),
            base: default_base(),
        }
    }
}

impl WorkerConfig {
    /// Sandbox limits and render options of a cycle.
    pub fn cycle_config(&self) -> CycleConfig {
        CycleConfig {
            executor: Arc::new(LuaSandbox::new(SandboxLimits {
                memory_limit: self.memory_limit_mb * 1024 * 1024,
                budget: Duration::from_millis(self.budget_ms),
            })),
            render: RenderOptions {
                base: self.base.clone(),
            },
        }
    }
}

impl ToolsConfig {
    /// Artifact URLs, with `default_origin` used when no origin is set.
    pub fn urls(&self, default_origin: &str) -> ToolUrls {
        let origin = self.origin.as_deref().unwrap_or(default_origin);
        match &self.cdn {
            Some(cdn) => ToolUrls::new(origin, cdn.as_str()),
            None => ToolUrls::local(origin),
        }
    }
}

impl Config {
    /// Loads configuration from `lurepl.toml` in the current directory.
    ///
    /// If no configuration file exists, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be parsed.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Loads configuration from `path`, or defaults when it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
