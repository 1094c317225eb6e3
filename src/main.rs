//! echo-gateway: a multi-protocol echo gateway
//!
//! This gateway speaks three CGI-family protocols behind one handler:
//! - FastCGI: TCP listener, sequential requests per connection
//! - SCGI: TCP listener, one request per connection
//! - CGI: one request from the inherited standard streams
//!
//! Every response is `200 OK` / `text/plain` with a body identical to
//! the request body, byte for byte.

mod config;
mod protocols;
mod request;
mod response;
mod server;

use config::{Config, TransportType};
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Logs go to stderr; in CGI mode stdout carries the response.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match config.transport {
        TransportType::Cgi => {
            protocols::cgi::run().await?;
            Ok(())
        }
        TransportType::Fcgi | TransportType::Scgi => {
            info!(
                host = %config.host,
                port = config.port,
                transport = ?config.transport,
                "Starting echo gateway"
            );
            Server::new(config).run().await
        }
    }
}
