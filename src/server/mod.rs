pub mod http;
pub mod routes;

use crate::error::{Result, XrpWatchError};
use crate::state::AppState;
use log::{debug, error, info};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

/// How long a client may take to deliver a complete request.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts API connections until `shutdown` fires. Each connection carries a
/// single request and is handled on its own task.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!("HTTP API listening on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let state = state.clone();
                    tokio::spawn(accept_connection(peer, stream, state));
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            },
            _ = shutdown.changed() => break,
        }
    }

    info!("HTTP API stopped");
    Ok(())
}

async fn accept_connection(peer: SocketAddr, stream: TcpStream, state: AppState) {
    if let Err(e) = handle_connection(peer, stream, &state, READ_TIMEOUT).await {
        debug!("Error processing connection from {}: {}", peer, e);
    }
}

async fn handle_connection(
    peer: SocketAddr,
    mut stream: TcpStream,
    state: &AppState,
    read_timeout: Duration,
) -> Result<()> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    let read = match timeout(read_timeout, http::read_request(&mut reader)).await {
        Ok(read) => read,
        Err(_) => Err(XrpWatchError::RequestTimeout(read_timeout)),
    };

    let response = match read {
        Ok(Some(request)) => {
            let response = routes::handle(state, &request);
            info!(
                "{} {} {} -> {}",
                peer,
                request.method,
                request.target,
                response.status.as_u16()
            );
            response
        }
        Ok(None) => return Ok(()),
        Err(e) => {
            debug!("Bad request from {}: {}", peer, e);
            http::Response::error(&e)
        }
    };

    http::write_response(&mut write_half, &response).await
}
