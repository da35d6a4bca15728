// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level parsed and validated chatgate config.
#[derive(Debug, Clone)]
pub struct Config {
    /// Config version. Always "v1".
    pub version: String,
    /// Environment label (e.g. "internal", "production").
    pub environment: String,
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub engine: EngineConfig,
    pub tools: ToolsConfig,
    /// SHA256 hash of the raw YAML: "sha256:{hex}".
    pub contract_hash: String,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Listener settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Browser origin allowed by CORS. No CORS layer when `None`.
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origin: None,
        }
    }
}

/// Upstream endpoints, one per provider family.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvidersConfig {
    pub openai: ProviderEndpoint,
    pub ollama: ProviderEndpoint,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: ProviderEndpoint::new(DEFAULT_OPENAI_BASE_URL),
            ollama: ProviderEndpoint::new(DEFAULT_OLLAMA_BASE_URL),
        }
    }
}

/// Base URL plus optional bearer credential.
#[derive(Clone, PartialEq)]
pub struct ProviderEndpoint {
    /// Scheme and authority, no trailing slash.
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ProviderEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
        }
    }
}

// Keys never reach logs.
impl fmt::Debug for ProviderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEndpoint")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Upstream timing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    /// Whole-request upstream timeout.
    pub timeout_ms: Option<u64>,
    /// Maximum wait between upstream stream chunks.
    pub stream_idle_timeout_ms: Option<u64>,
}

impl EngineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        self.stream_idle_timeout_ms.map(Duration::from_millis)
    }
}

/// Tool-call release policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolsConfig {
    /// Tool names that may be released to clients. `None` allows every tool.
    pub allowed: Option<Vec<String>>,
}
