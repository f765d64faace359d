/*!
The message router (§2 component 4, §4.1).

Pumps frames off the [`Transport`] and dispatches them, enforcing directional authenticity at the
tree level before a frame ever reaches the phase engine. One task per inbound message, so a slow
phase handler never stalls the receive loop (§4.1, §5 "one task per inbound message").
*/

use std::sync::Arc;

use crate::error::RemoteError;
use crate::message::Payload;
use crate::node::Node;
use crate::phases;
use crate::suite::Suite;
use crate::transport::Transport;
use crate::view::TreeView;

/// Runs the receive loop for `node` until the transport reaches end-of-stream or is told to stop.
/// Transient transport errors are logged and skipped (§4.1, §7 "Transport").
pub async fn run<S: Suite, T: Transport<S>, V: TreeView<S>>(node: Arc<Node<S, T, V>>) {
    loop {
        match node.transport.recv().await {
            Ok(frame) => {
                let node = Arc::clone(&node);
                tokio::spawn(async move {
                    dispatch(node, frame).await;
                });
            }
            Err(err) if err.is_transient() => {
                tracing::warn!(node = %node.name, error = %err, "transient transport error, continuing");
            }
            Err(err) => {
                tracing::info!(node = %node.name, error = %err, "router terminating");
                break;
            }
        }
    }
}

async fn dispatch<S: Suite, T: Transport<S>, V: TreeView<S>>(node: Arc<Node<S, T, V>>, frame: crate::message::Frame<S>) {
    let view = frame.view;
    tracing::debug!(node = %node.name, from = %frame.from, view, kind = frame.payload.kind(), "dispatching frame");

    match &frame.payload {
        Payload::Announcement(_) | Payload::Challenge(_) => {
            if !node.view.is_parent(view, &frame.from) {
                let error = direction_error(&frame.from, view, true);
                tracing::error!(node = %node.name, error = %error, "dropping frame from unexpected direction");
                return;
            }
        }
        Payload::Commitment(_) | Payload::Response(_) => {
            if !node.view.is_child(view, &frame.from) {
                let error = direction_error(&frame.from, view, false);
                tracing::error!(node = %node.name, error = %error, "dropping frame from unexpected direction");
                return;
            }
        }
        Payload::ViewChange(_) | Payload::Error(_) | Payload::Default(_) => {}
    }

    match frame.payload {
        Payload::Announcement(_) => {
            let round = frame.round;
            if let Err(err) = phases::on_announce(&node, view, round).await {
                tracing::warn!(node = %node.name, round, error = %err, "announce failed");
            }
        }
        Payload::Commitment(_) => {
            node.forward_commitment(frame.round, frame).await;
        }
        Payload::Response(_) => {
            node.forward_response(frame.round, frame).await;
        }
        Payload::Challenge(ref challenge) => {
            let challenge = challenge.clone();
            let round = frame.round;
            if let Err(err) = phases::on_challenge(&node, view, round, challenge).await {
                tracing::warn!(node = %node.name, round, error = %err, "challenge handling failed");
            }
        }
        Payload::ViewChange(ref view_change) => {
            phases::on_view_change(&node, &frame.from, view_change.new_view).await;
        }
        Payload::Error(ref error) => {
            tracing::warn!(node = %node.name, from = %frame.from, round = frame.round, message = %error.message, "child reported an error");
        }
        Payload::Default(_) => {
            // Synthetic default frames are only ever produced locally to fill gaps during
            // aggregation (§4.6 step 4); one should never arrive over the wire.
            tracing::debug!(node = %node.name, from = %frame.from, "ignoring unexpected default frame from the wire");
        }
    }
}

/// Builds the [`RemoteError`] for a directional-authenticity violation (§7 "unexpected-direction"),
/// used both by [`dispatch`] itself when logging a rejected frame and by callers that want the
/// typed error directly (e.g. tests asserting scenario F, §8).
pub fn direction_error(from: impl Into<String>, view: u64, expected_parent: bool) -> RemoteError {
    if expected_parent {
        RemoteError::NotParent { from: from.into(), view }
    } else {
        RemoteError::NotChild { from: from.into(), view }
    }
}
