//! The HTTP server.

use std::net::{SocketAddr, TcpListener};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::endpoints;
use crate::service::ProxyService;

/// Starts the proxy service and HTTP server based on loaded config.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to
    // see restarts even if service creation fails.
    metric!(counter("server.starting") += 1);

    let megs = 1024 * 1024;
    let web_pool = tokio::runtime::Builder::new_multi_thread()
        .thread_name("honey-web")
        .enable_all()
        .thread_stack_size(8 * megs)
        .build()?;

    let service = ProxyService::create(&config).context("failed to create service state")?;
    let app = endpoints::create_app(service).into_make_service();

    let socket = TcpListener::bind(config.bind.parse::<SocketAddr>()?)?;
    let local_addr = socket.local_addr()?;
    tracing::info!("Starting HTTP server on {}", local_addr);

    web_pool.block_on(axum_server::from_tcp(socket).serve(app))?;
    tracing::info!("System shutdown complete");

    Ok(())
}
