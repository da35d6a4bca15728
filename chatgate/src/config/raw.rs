// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
// Kept apart from the public Config structs: defaults, `${VAR}` interpolation
// and validation all happen between raw and public.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub chatgate: String,
    pub environment: Option<String>,
    pub server: Option<RawServerConfig>,
    pub providers: Option<RawProviders>,
    pub engine: Option<RawEngineConfig>,
    pub tools: Option<RawToolsConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cors_origin: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawProviders {
    pub openai: Option<RawProvider>,
    pub ollama: Option<RawProvider>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawProvider {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEngineConfig {
    pub timeout_ms: Option<u64>,
    pub stream_idle_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawToolsConfig {
    pub allowed: Option<Vec<String>>,
}
