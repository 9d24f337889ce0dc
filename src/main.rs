//! Caravel - local web panel for running pipeline actions on project configs.
//!
//! Usage:
//!   caravel --config projects.yaml          # Start the panel on 127.0.0.1:5000
//!   caravel --debug                         # No login token (insecure)

mod actions;
mod config;
mod dispatch;
mod error;
mod expand;
mod form;
mod guard;
mod http_server;
mod manifest;
mod project;
mod publish;
mod state;
mod token;
mod views;
mod workspace;

use clap::Parser;
use config::{PanelConfig, DEFAULT_PORT, DEFAULT_SESSION_TTL_SECS, DEFAULT_TOOL};
use state::AppState;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;
use token::TokenStore;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "caravel", version)]
#[command(about = "Web control panel for pipeline projects")]
struct Args {
    /// YAML file listing project config files (defaults to $CARAVEL)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run without token authentication. The connection is not secure!
    #[arg(long)]
    debug: bool,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Pipeline tool executable
    #[arg(long, default_value = DEFAULT_TOOL)]
    tool: String,

    /// Seconds of inactivity before a browser session is dropped
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL_SECS)]
    session_ttl_secs: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = PanelConfig {
        manifest: args.config,
        tool: args.tool,
        debug: args.debug,
        host: args.host,
        port: args.port,
        session_ttl: Duration::from_secs(args.session_ttl_secs),
    };

    let tokens = TokenStore::new(config.debug);
    match tokens.login_url(&config.base_url()) {
        Some(url) => {
            eprintln!("\n\nCaravel is protected with a token.");
            eprintln!("Copy this link to your browser to authenticate:\n");
            eprintln!("{}\n", url);
        }
        None => warn!("You have entered the debug mode. The server-client connection is not secure!"),
    }

    let state = AppState::new(config, tokens);
    if let Err(e) = http_server::run_server(state).await {
        eprintln!("Error: {}", e);
        exit(1);
    }
}
