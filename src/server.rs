use crate::client::StoreClient;
use crate::config::Config;
use crate::http::{self, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

pub async fn run_server(config: Arc<Config>) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.listen_addr()).await?;
    serve(listener, config).await
}

/// Serve HTTP on an already bound listener until ctrl-c.
pub async fn serve(listener: TcpListener, config: Arc<Config>) -> std::io::Result<()> {
    let client = StoreClient::new(&config);
    info!(
        "kvgate listening on {}, forwarding to {}",
        listener.local_addr()?,
        config.store_addr()
    );

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = result?;
                debug!("New connection from {peer_addr}");

                let client = client.clone();
                let read_timeout = config.store_timeout();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, client, read_timeout).await {
                        debug!("Connection error from {peer_addr}: {e}");
                    }
                    debug!("Connection closed: {peer_addr}");
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    client: StoreClient,
    read_timeout: Duration,
) -> std::io::Result<()> {
    let request = match tokio::time::timeout(read_timeout, http::read_request(&mut stream)).await {
        Ok(result) => result,
        Err(_) => {
            debug!("No complete request within {}ms", read_timeout.as_millis());
            return Ok(());
        }
    };

    let response = match request {
        Ok(Some(request)) => {
            debug!("{} {}", request.method, request.path);
            // Dropping the handler future closes its store connection.
            let response = tokio::select! {
                response = http::handle(&request, &client) => response,
                _ = peer_closed(&mut stream) => {
                    debug!("{} {} abandoned by client", request.method, request.path);
                    return Ok(());
                }
            };
            debug!("{} {} -> {}", request.method, request.path, response.status);
            response
        }
        Ok(None) => return Ok(()),
        Err(http::HttpError::Io(e)) => return Err(e),
        Err(e) => Response::from(e),
    };

    stream.write_all(&response.to_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}

/// Resolves once the client side of `stream` is closed or fails.
async fn peer_closed(stream: &mut TcpStream) {
    let mut scratch = [0u8; 512];
    loop {
        match stream.read(&mut scratch).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}
