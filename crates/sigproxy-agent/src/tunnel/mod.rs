//! Webhook tunnel management
//!
//! The manager consumes `UserCredentials` published by the proxy handler and
//! keeps at most one tunnel per client-id alive. It is constructed lazily,
//! only after the proxy listener is accepting connections, because every
//! tunnel call dials the proxy itself.

pub mod client;
#[allow(clippy::module_inception)]
mod tunnel;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::console::{cyan, light_red, Console};

use client::{ApiClient, TunnelError};
use tunnel::Tunnel;

/// OAuth client credentials captured from `/auth/token` request bodies.
///
/// In flight only: they exist until the manager has either started a tunnel
/// for the client or discarded them because one already runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl UserCredentials {
    /// Extract `client_id`/`client_secret` from a form-encoded body
    pub fn from_form(body: &[u8]) -> Self {
        let mut client_id = String::new();
        let mut client_secret = String::new();
        for (key, value) in url::form_urlencoded::parse(body) {
            match key.as_ref() {
                "client_id" => client_id = value.into_owned(),
                "client_secret" => client_secret = value.into_owned(),
                _ => {}
            }
        }
        Self {
            client_id,
            client_secret,
        }
    }

    /// Used by the manager's initial health probe, before any real
    /// credentials have arrived
    pub fn anonymous() -> Self {
        Self {
            client_id: "00000000-0000-0000-0000-000000000000".to_string(),
            client_secret: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.client_id.is_empty() && self.client_secret.is_empty()
    }
}

/// Long-lived owner of all webhook tunnels.
pub struct TunnelManager {
    proxy_address: String,
    events: Vec<String>,
    log_headers: bool,
    default_timeout: Duration,
    pull_delay: Duration,
    console: Console,
    tunnels: Arc<Mutex<HashMap<String, CancellationToken>>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl TunnelManager {
    pub fn new(
        proxy_address: impl Into<String>,
        events: Vec<String>,
        log_headers: bool,
        default_timeout: Duration,
        pull_delay: Duration,
        console: Console,
    ) -> Self {
        Self {
            proxy_address: proxy_address.into(),
            events,
            log_headers,
            default_timeout,
            pull_delay,
            console,
            tunnels: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Probe the events service, then consume credentials until stopped.
    ///
    /// When the upstream has no events service the manager exits cleanly;
    /// the proxy itself keeps running.
    pub async fn run(&self, mut credentials_rx: UnboundedReceiver<UserCredentials>) {
        let probe = ApiClient::new(
            &self.proxy_address,
            UserCredentials::anonymous(),
            self.default_timeout,
        );
        if let Err(err) = probe.tunnel_is_ready().await {
            match err {
                TunnelError::NotAvailable => {
                    self.console
                        .print(cyan("Webhook events listening is not available"));
                }
                other => self.console.verbose(other.to_string()),
            }
            return;
        }

        self.console.print(cyan(
            "###############################################################",
        ));
        self.console.print(cyan(
            "To start event listener, send an auth request: POST /auth/token",
        ));
        self.console.print(cyan(
            "###############################################################",
        ));

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                received = credentials_rx.recv() => {
                    let Some(credentials) = received else { return };
                    if credentials.is_empty() {
                        continue;
                    }
                    self.spawn_tunnel(credentials);
                }
            }
        }
    }

    fn spawn_tunnel(&self, credentials: UserCredentials) {
        let client_id = credentials.client_id.clone();
        let token = self.cancel.child_token();
        {
            let mut tunnels = self.tunnels.lock();
            if tunnels.contains_key(&client_id) {
                debug!(%client_id, "tunnel already exists, credentials discarded");
                return;
            }
            tunnels.insert(client_id.clone(), token.clone());
        }

        let api_client = ApiClient::new(&self.proxy_address, credentials, self.default_timeout);
        let tunnel = Tunnel::new(
            api_client,
            &self.events,
            self.log_headers,
            self.console,
            self.pull_delay,
            token,
        );
        let tunnels = Arc::clone(&self.tunnels);
        let console = self.console;
        self.tracker.spawn(async move {
            if let Err(err) = tunnel.run().await {
                console.print(light_red(&format!("{err:#}")));
            }
            tunnels.lock().remove(&client_id);
        });
    }

    /// Cancel every tunnel and wait until their cleanup has finished.
    pub async fn stop(&self) {
        if !self.tunnels.lock().is_empty() {
            self.console.print("Closing webhooks tunnels");
        }
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
