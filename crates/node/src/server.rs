//! Inbound side of the node service: the accept loop.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::net::TcpStream;

use crate::error::Result;
use crate::node::Node;
use crate::rpc;

/// Accept connections until the node shuts down, answering one request per
/// connection. Each connection runs in its own task so a handler that
/// re-enters the network never blocks the loop.
pub(crate) async fn serve(node: Arc<Node>, listener: TcpListener) {
    let shutdown = node.shutdown_token();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    let node = node.clone();
                    tokio::spawn(async move {
                        if let Err(e) = answer(node, stream).await {
                            tracing::debug!(%remote, error = %e, "connection dropped");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            },
        }
    }
}

async fn answer(node: Arc<Node>, mut stream: TcpStream) -> Result<()> {
    let request = rpc::read_frame(&mut stream).await?;
    let reply = node.handle(request).await;
    rpc::write_frame(&mut stream, &reply).await
}
