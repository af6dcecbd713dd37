use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kube_mcp_server::{
    config::{Config, Transport},
    identity::source::ProcessEnv,
    mcp::McpServer,
    metrics::register_metrics,
    server::{serve_stdio, Server},
    tools::check_dependencies,
    IdentityStore, ProcessRunner, Toolbox,
};

/// MCP server exposing kubectl and helm as tools
#[derive(Debug, Parser)]
#[command(name = "kube-mcp-server", version, about)]
struct Cli {
    /// Transport to serve on
    #[arg(long, value_enum, ignore_case = true, env = "MCP_TRANSPORT")]
    transport: Option<Transport>,

    /// Listen address for the HTTP transport
    #[arg(long, env = "MCP_HTTP_ADDR")]
    addr: Option<String>,
}

fn init_logging() {
    // stdout carries the protocol in stdio mode
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kube_mcp_server=info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Read .env before clap so its env fallbacks see the same values
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging();

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(transport) = cli.transport {
        config.server.transport = transport;
    }
    if let Some(addr) = cli.addr {
        config.server.addr = addr;
    }
    info!(
        transport = %config.server.transport,
        kubectl = %config.binaries.kubectl.display(),
        helm = %config.binaries.helm.display(),
        mask_secrets = config.mask_secrets,
        strict_output = config.strict_output,
        "Loaded configuration"
    );

    register_metrics();

    let deadlines = config.timeouts.deadlines();
    let runner = Arc::new(ProcessRunner::new(config.binaries.kubectl.clone(), config.binaries.helm.clone()));
    let helm_enabled = check_dependencies(runner.as_ref(), &deadlines)
        .await
        .context("dependency check failed")?;

    let identities = Arc::new(IdentityStore::initialize(&ProcessEnv));
    match identities.snapshot().await {
        Ok(identity) => info!(
            source = %identity.source,
            context = identity.context.as_deref().unwrap_or("<none>"),
            namespace = %identity.namespace,
            server = %identity.server,
            "Active cluster identity"
        ),
        Err(e) => tracing::warn!(error = %e, "Starting without a usable cluster identity"),
    }

    let sanitizer = config.sanitizer();
    if !sanitizer.is_enabled() {
        tracing::warn!("Secret redaction is disabled");
    }
    let toolbox = Toolbox::new(runner, identities, sanitizer, deadlines).with_helm(helm_enabled);
    let mcp = Arc::new(McpServer::new(Arc::new(toolbox)));
    info!(
        version = env!("CARGO_PKG_VERSION"),
        helm_enabled,
        "Starting kube-mcp-server"
    );

    match config.server.transport {
        Transport::Stdio => serve_stdio(mcp).await?,
        Transport::Http => Server::new(mcp).start(&config.server.addr).await?,
    }

    Ok(())
}
