// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

use sha2::{Digest, Sha256};

use super::error::ConfigError;
use super::interpolation::{resolve_optional, resolve_variables};
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a chatgate config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Compute SHA256 contract hash
/// 3. Parse YAML into raw deserialization types
/// 4. Validate version
/// 5. Resolve variable interpolation in string fields, apply defaults
/// 6. Validate values and build the typed Config struct
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let contract_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.chatgate != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.chatgate
        )));
    }

    let environment = resolve_optional(raw.environment.as_deref())?.unwrap_or_default();
    let server = build_server_config(raw.server)?;
    let providers = build_providers_config(raw.providers)?;
    let engine = build_engine_config(raw.engine)?;
    let tools = build_tools_config(raw.tools)?;

    Ok(Config {
        version: raw.chatgate,
        environment,
        server,
        providers,
        engine,
        tools,
        contract_hash,
    })
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{:x}", hash)
}

fn build_server_config(raw: Option<raw::RawServerConfig>) -> Result<ServerConfig, ConfigError> {
    let raw = match raw {
        Some(r) => r,
        None => return Ok(ServerConfig::default()),
    };

    let port = raw.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(ConfigError::Validation(
            "server port must be > 0".into(),
        ));
    }

    let host = match raw.host {
        Some(h) => resolve_variables(&h)?,
        None => DEFAULT_HOST.to_string(),
    };

    let cors_origin = resolve_optional(raw.cors_origin.as_deref())?.filter(|o| !o.is_empty());

    Ok(ServerConfig {
        host,
        port,
        cors_origin,
    })
}

fn build_providers_config(
    raw: Option<raw::RawProviders>,
) -> Result<ProvidersConfig, ConfigError> {
    let raw = match raw {
        Some(r) => r,
        None => return Ok(ProvidersConfig::default()),
    };

    Ok(ProvidersConfig {
        openai: build_endpoint("openai", raw.openai, DEFAULT_OPENAI_BASE_URL)?,
        ollama: build_endpoint("ollama", raw.ollama, DEFAULT_OLLAMA_BASE_URL)?,
    })
}

fn build_endpoint(
    name: &str,
    raw: Option<raw::RawProvider>,
    default_base_url: &str,
) -> Result<ProviderEndpoint, ConfigError> {
    let raw = match raw {
        Some(r) => r,
        None => return Ok(ProviderEndpoint::new(default_base_url)),
    };

    let base_url = match raw.base_url {
        Some(url) => resolve_variables(&url)?,
        None => default_base_url.to_string(),
    };
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::Validation(format!(
            "provider {name} base_url \"{base_url}\" must start with http:// or https://"
        )));
    }

    // An empty key (e.g. an env var set to "") means no credential.
    let api_key = resolve_optional(raw.api_key.as_deref())?.filter(|k| !k.is_empty());

    Ok(ProviderEndpoint {
        base_url: base_url.trim_end_matches('/').to_string(),
        api_key,
    })
}

fn build_engine_config(raw: Option<raw::RawEngineConfig>) -> Result<EngineConfig, ConfigError> {
    let raw = match raw {
        Some(r) => r,
        None => return Ok(EngineConfig::default()),
    };

    if raw.timeout_ms == Some(0) {
        return Err(ConfigError::Validation(
            "engine timeout_ms must be > 0".into(),
        ));
    }
    if raw.stream_idle_timeout_ms == Some(0) {
        return Err(ConfigError::Validation(
            "engine stream_idle_timeout_ms must be > 0".into(),
        ));
    }

    Ok(EngineConfig {
        timeout_ms: raw.timeout_ms,
        stream_idle_timeout_ms: raw.stream_idle_timeout_ms,
    })
}

fn build_tools_config(raw: Option<raw::RawToolsConfig>) -> Result<ToolsConfig, ConfigError> {
    let allowed = match raw.and_then(|r| r.allowed) {
        Some(names) => names,
        None => return Ok(ToolsConfig::default()),
    };

    if let Some(blank) = allowed.iter().find(|n| n.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "tools.allowed entries must be non-empty, got \"{blank}\""
        )));
    }

    Ok(ToolsConfig {
        allowed: Some(allowed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::source::{FileSource, StringSource};
    use std::io::Write;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn with_api_key<F: FnOnce()>(value: &str, f: F) {
        let _guard = ENV_MUTEX.lock().unwrap();
        let previous = std::env::var("CHATGATE_TEST_OPENAI_KEY").ok();
        std::env::set_var("CHATGATE_TEST_OPENAI_KEY", value);
        f();
        match previous {
            Some(value) => std::env::set_var("CHATGATE_TEST_OPENAI_KEY", value),
            None => std::env::remove_var("CHATGATE_TEST_OPENAI_KEY"),
        }
    }

    const EXAMPLE_YAML: &str = r#"chatgate: v1
environment: production

server:
  host: 0.0.0.0
  port: 8080
  cors_origin: "https://app.example.com"

providers:
  openai:
    base_url: https://api.openai.com/
    api_key: "${CHATGATE_TEST_OPENAI_KEY}"
  ollama:
    base_url: http://gpu-box:11434

engine:
  timeout_ms: 120000
  stream_idle_timeout_ms: 30000

tools:
  allowed: [get_weather, search]
"#;

    fn make_source(yaml: &str) -> StringSource {
        StringSource {
            content: yaml.to_string(),
        }
    }

    // ---------------------------------------------------------------
    // 1. Valid config parses into typed struct
    // ---------------------------------------------------------------

    #[test]
    fn valid_config_parses_all_key_fields() {
        with_api_key("sk-test", || {
            let config = load_config(&make_source(EXAMPLE_YAML)).unwrap();

            assert_eq!(config.version, "v1");
            assert_eq!(config.environment, "production");
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.server.port, 8080);
            assert_eq!(
                config.server.cors_origin.as_deref(),
                Some("https://app.example.com")
            );
            assert_eq!(config.providers.openai.base_url, "https://api.openai.com");
            assert_eq!(config.providers.openai.api_key.as_deref(), Some("sk-test"));
            assert_eq!(config.providers.ollama.base_url, "http://gpu-box:11434");
            assert_eq!(config.providers.ollama.api_key, None);
            assert_eq!(config.engine.timeout_ms, Some(120000));
            assert_eq!(config.engine.stream_idle_timeout_ms, Some(30000));
            assert_eq!(
                config.tools.allowed,
                Some(vec!["get_weather".to_string(), "search".to_string()])
            );
        });
    }

    // ---------------------------------------------------------------
    // 2. Minimal config takes every default
    // ---------------------------------------------------------------

    #[test]
    fn minimal_config_uses_defaults() {
        let config = load_config(&make_source("chatgate: v1\n")).unwrap();

        assert_eq!(config.environment, "");
        assert_eq!(config.server, ServerConfig::default());
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.providers, ProvidersConfig::default());
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.tools.allowed, None);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let yaml = r#"
chatgate: v1
server:
  port: 9000
providers:
  openai:
    api_key: literal-key
"#;
        let config = load_config(&make_source(yaml)).unwrap();
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.providers.openai.base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.providers.openai.api_key.as_deref(), Some("literal-key"));
        assert_eq!(config.providers.ollama.base_url, DEFAULT_OLLAMA_BASE_URL);
    }

    // ---------------------------------------------------------------
    // 3. Validation errors
    // ---------------------------------------------------------------

    #[test]
    fn unsupported_version_rejected() {
        let err = load_config(&make_source("chatgate: v2\n")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("v2"), "error should name the version: {msg}");
    }

    #[test]
    fn missing_version_is_yaml_error() {
        let err = load_config(&make_source("environment: dev\n")).unwrap_err();
        assert!(matches!(err, ConfigError::YamlError(_)));
    }

    #[test]
    fn zero_port_rejected() {
        let yaml = "chatgate: v1\nserver:\n  port: 0\n";
        let err = load_config(&make_source(yaml)).unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn non_http_base_url_rejected() {
        let yaml = "chatgate: v1\nproviders:\n  ollama:\n    base_url: localhost:11434\n";
        let err = load_config(&make_source(yaml)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ollama"), "error should name the provider: {msg}");
        assert!(msg.contains("http://"), "error should be actionable: {msg}");
    }

    #[test]
    fn zero_timeouts_rejected() {
        let yaml = "chatgate: v1\nengine:\n  timeout_ms: 0\n";
        assert!(load_config(&make_source(yaml)).is_err());
        let yaml = "chatgate: v1\nengine:\n  stream_idle_timeout_ms: 0\n";
        assert!(load_config(&make_source(yaml)).is_err());
    }

    #[test]
    fn blank_allowed_tool_rejected() {
        let yaml = "chatgate: v1\ntools:\n  allowed: [\"\"]\n";
        let err = load_config(&make_source(yaml)).unwrap_err();
        assert!(err.to_string().contains("tools.allowed"));
    }

    #[test]
    fn unknown_field_rejected() {
        let yaml = "chatgate: v1\nserver:\n  prot: 8080\n";
        let err = load_config(&make_source(yaml)).unwrap_err();
        assert!(err.to_string().contains("prot"));
    }

    #[test]
    fn empty_allowlist_is_kept() {
        let yaml = "chatgate: v1\ntools:\n  allowed: []\n";
        let config = load_config(&make_source(yaml)).unwrap();
        assert_eq!(config.tools.allowed, Some(vec![]));
    }

    // ---------------------------------------------------------------
    // 4. Variable interpolation
    // ---------------------------------------------------------------

    #[test]
    fn undefined_variable_fails_with_clear_error() {
        std::env::remove_var("CHATGATE_TEST_UNDEFINED_12345");

        let yaml = r#"
chatgate: v1
providers:
  openai:
    api_key: "${CHATGATE_TEST_UNDEFINED_12345}"
"#;
        let err = load_config(&make_source(yaml)).unwrap_err();
        let msg = err.to_string();
        assert!(
            msg.contains("CHATGATE_TEST_UNDEFINED_12345"),
            "error should name the missing variable: {msg}"
        );
        assert!(msg.contains("undefined variable"));
    }

    #[test]
    fn empty_api_key_means_no_credential() {
        with_api_key("", || {
            let config = load_config(&make_source(EXAMPLE_YAML)).unwrap();
            assert_eq!(config.providers.openai.api_key, None);
        });
    }

    // ---------------------------------------------------------------
    // 5. Contract hash
    // ---------------------------------------------------------------

    #[test]
    fn contract_hash_is_deterministic() {
        let config1 = load_config(&make_source("chatgate: v1\n")).unwrap();
        let config2 = load_config(&make_source("chatgate: v1\n")).unwrap();
        assert_eq!(config1.contract_hash, config2.contract_hash);
        assert!(config1.contract_hash.starts_with("sha256:"));
        assert_eq!(config1.contract_hash.len(), 7 + 64);
    }

    #[test]
    fn different_yaml_produces_different_hash() {
        let a = load_config(&make_source("chatgate: v1\nenvironment: a\n")).unwrap();
        let b = load_config(&make_source("chatgate: v1\nenvironment: b\n")).unwrap();
        assert_ne!(a.contract_hash, b.contract_hash);
    }

    // ---------------------------------------------------------------
    // 6. File source
    // ---------------------------------------------------------------

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"chatgate: v1\nserver:\n  port: 4321\n").unwrap();

        let config = load_config(&FileSource {
            path: file.path().to_path_buf(),
        })
        .unwrap();
        assert_eq!(config.server.port, 4321);
    }
}
