//! benchwatch_agent binary: parse config, set up logging, serve.
//!
//! Run with: `RUST_LOG=debug benchwatch_agent --port 8000`

use std::net::SocketAddr;

use anyhow::Context;
use benchwatch_agent::config::{AgentConfig, ParsedArgs, USAGE};
use benchwatch_agent::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match AgentConfig::from_env() {
        Ok(ParsedArgs::Run(c)) => c,
        Ok(ParsedArgs::Help) => {
            println!("{USAGE}");
            return Ok(());
        }
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let state = AppState::from_config(&config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        "{} v{} listening on http://{} (cpu strategy: {}, interval: {:?})",
        config.service_name,
        env!("CARGO_PKG_VERSION"),
        listener.local_addr()?,
        config.cpu_strategy,
        config.interval
    );

    benchwatch_agent::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    })
    .await?;
    Ok(())
}
