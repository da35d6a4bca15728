// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

use chatgate::config;
use chatgate::engine;
use chatgate::proxy;
use clap::Parser;

use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chatgate", about = "Chat-completion gateway with streamed tool-call normalization")]
struct Cli {
    /// Path to the chatgate.yaml config file
    #[arg(long, default_value = "chatgate.yaml", env = "CHATGATE_CONFIG")]
    config: String,

    /// Port to listen on (overrides server.port)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Browser origin allowed by CORS (overrides server.cors_origin)
    #[arg(long, env = "CORS_ORIGIN")]
    cors_origin: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = config::FileSource {
        path: std::path::PathBuf::from(&cli.config),
    };
    let mut config = match config::load_config(&source) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = %cli.config, "failed to load config: {e}");
            std::process::exit(1);
        }
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(origin) = cli.cors_origin.filter(|o| !o.is_empty()) {
        config.server.cors_origin = Some(origin);
    }

    tracing::info!(
        version = %config.version,
        environment = %config.environment,
        contract_hash = %config.contract_hash,
        tool_allowlist = ?config.tools.allowed,
        "config loaded"
    );

    let addr: SocketAddr = match format!("{}:{}", config.server.host, config.server.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(host = %config.server.host, "invalid listen address: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "chatgate starting");

    let config = Arc::new(config);
    let upstream: Arc<dyn proxy::UpstreamClient> =
        Arc::new(engine::build_engine_client(config.clone()));

    let app = proxy::build_router(upstream, config.server.cors_origin.as_deref());

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, cors_origin = ?config.server.cors_origin, "chatgate listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
