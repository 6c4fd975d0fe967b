//! sigproxy - localhost proxy that signs HTTP requests
//!
//! The process is responsible for:
//! - Loading key configuration and building the signer registry
//! - Serving the signing proxy on a loopback port
//! - Optionally running the webhook tunnel manager
//! - Graceful shutdown on SIGINT/SIGTERM

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use sigproxy_agent::cli::{Cli, Commands, StartArgs};
use sigproxy_agent::config::{Config, SignerRegistry};
use sigproxy_agent::console::Console;
use sigproxy_agent::proxy;
use sigproxy_agent::tunnel::TunnelManager;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Commands::Start(args) => args.verbose_mode,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { Level::DEBUG } else { Level::INFO };
        EnvFilter::new(format!(
            "sigproxy={level},sigproxy_agent={level},sigproxy_common={level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Start(args) => start(args, cli.config.as_deref()).await,
    }
}

async fn start(args: StartArgs, config_file: Option<&Path>) -> anyhow::Result<()> {
    let mut config = Config::load(&args, config_file)?;
    if config.key_configs.is_empty() {
        anyhow::bail!(
            "no key configuration given; pass --private-key/--key-id/--server-base-url \
             or provide a config file"
        );
    }

    let console = Console::new(config.verbose_mode);

    console.print("Private keys initialised:");
    for (index, key) in config.key_configs.iter().enumerate() {
        console.print(format!("  Key {} for clientID {}:", index + 1, key.client_id));
        console.print(format!(
            "  - Using private key file {} for HTTP Signatures",
            key.private_key.display()
        ));
        console.print(format!("  - Using keyID {} for HTTP Signatures", key.key_id));
        console.print(format!("  - Piping all requests to {}", key.server_base_url));
    }

    // key passwords live inside these configs; the loader consumes them
    let key_configs = std::mem::take(&mut config.key_configs);
    let registry = SignerRegistry::from_configs(key_configs)?;

    let (credentials_tx, credentials_rx) = if config.listen {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let proxy = proxy::start(&config, registry, credentials_tx, console).await?;
    console.print(format!("Starting to listen on port {}", proxy.addr().port()));

    // the manager starts only after the listener is bound: its API client
    // dials the proxy itself
    let manager = credentials_rx.map(|rx| {
        let manager = Arc::new(TunnelManager::new(
            proxy.address(),
            config.events.clone(),
            config.log_headers,
            config.default_timeout,
            config.pull_delay,
            console,
        ));
        let runner = Arc::clone(&manager);
        tokio::spawn(async move { runner.run(rx).await });
        manager
    });

    console.print("Press CTRL-C to exit");
    wait_for_shutdown().await;

    if let Some(manager) = manager {
        manager.stop().await;
    }
    proxy.shutdown().await;
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
