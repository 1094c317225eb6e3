//! TCP server for the FastCGI and SCGI transports.
//!
//! Accepts connections and hands each one to the transport's handler on
//! its own task. A connection-level protocol failure closes that
//! connection only; the listener keeps accepting.

use crate::config::{Config, TransportType};
use crate::protocols::{fcgi, scgi, ProtocolError};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// Maximum number of concurrent connections
pub(crate) const MAX_CONNECTIONS: usize = 10000;

/// Server instance
pub struct Server {
    config: Config,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Server {
            config,
            connection_limit: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        }
    }

    /// Start the server and accept connections until ctrl-c.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        info!(
            address = %self.config.bind_addr(),
            transport = ?self.config.transport,
            "Gateway listening"
        );

        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!(peer = %addr, "New connection");

                        let transport = self.config.transport;
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, transport).await {
                                debug!(error = %e, "Connection error");
                            }
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                }
            }
        }
    }
}

/// Dispatch an accepted connection to the selected transport.
async fn handle_connection(
    stream: TcpStream,
    transport: TransportType,
) -> Result<(), ProtocolError> {
    match transport {
        TransportType::Fcgi => fcgi::handle_connection(stream).await,
        TransportType::Scgi => scgi::handle_connection(stream).await,
        // CGI never reaches the TCP server; main runs it without a listener.
        TransportType::Cgi => Ok(()),
    }
}
