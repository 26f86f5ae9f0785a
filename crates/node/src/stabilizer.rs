//! The background task that keeps the ring converging.

use std::sync::Arc;

use tokio::time::sleep;

use crate::node::Node;
use crate::rpc;

/// Run stabilization rounds until the node's shutdown token fires.
pub(crate) async fn run(node: Arc<Node>) {
    let shutdown = node.shutdown_token();
    loop {
        stabilize(&node).await;
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(node.stabilize_interval()) => {}
        }
    }
}

/// One stabilization round.
///
/// First assert ourselves to the successor; if it reports a predecessor
/// closer to us than the successor itself, that node slotted in between, so
/// adopt it and rebuild the finger table through it. Then push any mailbox
/// that now belongs to the predecessor over to it.
async fn stabilize(node: &Node) {
    let info = node.info().clone();

    match node.successor() {
        // A lone node has nothing to exchange with itself.
        Ok(successor) if successor == info => {}
        Ok(successor) => match rpc::stabilize(&successor.conn_string(), &info).await {
            Ok(Some(peer)) if peer.id > info.id => {
                if let Err(e) = node.adopt_successor(peer).await {
                    tracing::debug!(node = %info.id, error = %e, "finger rebuild failed");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(node = %info.id, successor = %successor, error = %e, "stabilize failed")
            }
        },
        Err(e) => tracing::debug!(node = %info.id, error = %e, "stabilize skipped"),
    }

    match node.predecessor() {
        Ok(Some(predecessor)) if info.id > predecessor.id => {
            // Keys at or below the predecessor's id belong to it now.
            node.transfer_boxes(&predecessor).await;
        }
        _ => {}
    }
}
