use super::Server;
use super::connection::handle_connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error};

/// Accept loop for the RESP listener
pub async fn serve(server: Arc<Server>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, remote_addr)) => {
                debug!("Accepted connection from {}", remote_addr);
                tokio::spawn(handle_connection(Arc::clone(&server), stream, remote_addr));
            }
            Err(e) => {
                // Usually fd exhaustion; back off instead of spinning
                error!("Accept failed: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
