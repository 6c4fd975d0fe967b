//! HTTP front-end for the signing proxy
//!
//! Binds a loopback-only listener and serves the catch-all proxy handler.
//! Shutdown is cooperative via a cancellation token so the process can drain
//! the tunnel manager first and the listener second.

pub mod handler;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{Config, SignerRegistry};
use crate::console::Console;
use crate::tunnel::UserCredentials;

/// Shared, read-only state for every request handler
pub struct ProxyState {
    pub registry: SignerRegistry,
    pub client: reqwest::Client,
    pub default_timeout: Duration,
    pub console: Console,
    /// Present only when the tunnel manager is enabled
    pub credentials_tx: Option<UnboundedSender<UserCredentials>>,
}

/// A running proxy listener
pub struct Proxy {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Bind the listener and start serving.
///
/// The bind address is always loopback; exposing the signer on other
/// interfaces would let anyone on the network sign requests with the
/// configured keys.
pub async fn start(
    config: &Config,
    registry: SignerRegistry,
    credentials_tx: Option<UnboundedSender<UserCredentials>>,
    console: Console,
) -> anyhow::Result<Proxy> {
    let state = Arc::new(ProxyState {
        registry,
        client: reqwest::Client::new(),
        default_timeout: config.default_timeout,
        console,
        credentials_tx,
    });

    let app = Router::new()
        .fallback(handler::proxy_request)
        .with_state(state);

    let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;
    let addr = listener.local_addr()?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone().cancelled_owned();
    let task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
        {
            error!(error = %err, "proxy server terminated");
        }
    });

    info!(%addr, "proxy listening");
    Ok(Proxy {
        addr,
        shutdown,
        task,
    })
}

impl Proxy {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Loopback origin of this proxy, the address its own API clients dial
    pub fn address(&self) -> String {
        format!("http://localhost:{}", self.addr.port())
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }
}
