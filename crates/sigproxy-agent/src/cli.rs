//! CLI argument definitions using clap
//!
//! Flags can also be supplied through `HTTP_PROXY_*` environment variables.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// HTTP proxy that adds HTTP Signatures to your requests
#[derive(Parser, Debug)]
#[command(name = "sigproxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default is $HOME/.sigproxy.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the proxy on localhost for signing HTTP requests
    Start(StartArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct StartArgs {
    /// Filename of the private key file
    #[arg(short = 'f', long = "private-key", env = "HTTP_PROXY_PRIVATE_KEY")]
    pub private_key: Option<PathBuf>,

    /// Password of the private key
    #[arg(
        short = 'P',
        long = "private-key-password",
        env = "HTTP_PROXY_PRIVATE_KEY_PASSWORD"
    )]
    pub private_key_password: Option<String>,

    /// Server base URL to pipe the requests to
    #[arg(short = 's', long = "server-base-url", env = "HTTP_PROXY_SERVER_BASE_URL")]
    pub server_base_url: Option<String>,

    /// Id of the private key
    #[arg(short = 'i', long = "key-id", env = "HTTP_PROXY_KEY_ID")]
    pub key_id: Option<String>,

    /// Client id for the private key
    #[arg(short = 'c', long = "client-id", env = "HTTP_PROXY_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Port to start the server on
    #[arg(short = 'p', long, default_value_t = 3000, env = "HTTP_PROXY_PORT")]
    pub port: u16,

    /// Enable webhook events listening
    #[arg(short = 'l', long)]
    pub listen: bool,

    /// Subscribe for event types
    #[arg(short = 'e', long, value_delimiter = ',')]
    pub events: Vec<String>,

    /// Show webhook request headers
    #[arg(long = "show-webhook-headers")]
    pub show_webhook_headers: bool,

    /// Enable verbose mode
    #[arg(short = 'v', long = "verbose-mode")]
    pub verbose_mode: bool,
}
