/*!
The phase engine (§2 component 5, §4.2–§4.8).

Each phase is an async function taking a shared [`Node`] handle. The root drives Announce through
Respond as one continuous call chain for itself (§4.5: "by internal call at the root"); a
non-root node's Commit hands off, and is resumed later by Challenge arriving from its parent as a
separate dispatch — the one place a round's state and its response receiver must outlive a single
task, so they are stashed in [`Node`] in between (§3 "Ownership").
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Instant};

use crate::aggregate;
use crate::config::SigningMode;
use crate::error::PhaseError;
use crate::failure::Phase as FailurePhase;
use crate::identity::NodeName;
use crate::merkle;
use crate::message::{
    Announcement, Challenge as ChallengePayload, Commitment as CommitmentPayload, Frame, Payload,
    Response as ResponsePayload,
};
use crate::node::Node;
use crate::outcome::SigningOutcome;
use crate::round::{RoundNumber, RoundState};
use crate::suite::Suite;
use crate::transport::Transport;
use crate::view::{TreeView, ViewNumber};

/// Starts a brand-new round as its root (§4.2, called locally rather than by an inbound
/// Announcement). `message` is the value signed in [`SigningMode::PubKey`] mode; it is ignored in
/// [`SigningMode::MerkleTree`] mode, where the combined Merkle root is signed instead.
pub async fn start_round<S: Suite, T: Transport<S>, V: TreeView<S>>(
    node: &Arc<Node<S, T, V>>,
    view: ViewNumber,
    round: RoundNumber,
    message: Vec<u8>,
) -> Result<SigningOutcome<S>, PhaseError> {
    let (done_tx, done_rx) = oneshot::channel();
    announce(node, view, round, true, Some(done_tx), Some(message)).await?;
    done_rx
        .await
        .map_err(|_| PhaseError::from(node.local_error("round outcome sender dropped before signaling")))?
}

/// Handles an inbound Announcement from the parent (§4.2, non-root path).
pub async fn on_announce<S: Suite, T: Transport<S>, V: TreeView<S>>(
    node: &Arc<Node<S, T, V>>,
    view: ViewNumber,
    round: RoundNumber,
) -> Result<(), PhaseError> {
    announce(node, view, round, false, None, None).await
}

async fn announce<S: Suite, T: Transport<S>, V: TreeView<S>>(
    node: &Arc<Node<S, T, V>>,
    view: ViewNumber,
    round: RoundNumber,
    is_root: bool,
    done_tx: Option<oneshot::Sender<Result<SigningOutcome<S>, PhaseError>>>,
    root_message: Option<Vec<u8>>,
) -> Result<(), PhaseError> {
    node.mark_seen(round);
    let n_children = node.view.n_children(view);
    let (commit_rx, response_rx) = node.allocate_round(round, n_children, done_tx).await;

    if !is_root && node.fail.should_fail(FailurePhase::Commit) {
        tracing::debug!(node = %node.name, round, "withholding commit per failure-injection policy");
        return Ok(());
    }

    let children = node.view.children(view);
    if !children.is_empty() {
        let mut frames = BTreeMap::new();
        for name in children.keys() {
            frames.insert(
                name.clone(),
                Frame::new(node.name.clone(), view, round, Payload::Announcement(Announcement)),
            );
        }
        node.transport
            .put_down(view, frames)
            .await
            .map_err(|err| PhaseError::Transport(err.to_string()))?;
    }

    commit(node, view, round, is_root, root_message, commit_rx, response_rx).await
}

async fn commit<S: Suite, T: Transport<S>, V: TreeView<S>>(
    node: &Arc<Node<S, T, V>>,
    view: ViewNumber,
    round: RoundNumber,
    is_root: bool,
    root_message: Option<Vec<u8>>,
    commit_rx: mpsc::Receiver<Frame<S>>,
    response_rx: mpsc::Receiver<Frame<S>>,
) -> Result<(), PhaseError> {
    node.mark_seen(round);

    let log = aggregate::init_commit_crypto::<S>(&node.name, round);
    let mut state = RoundState::<S>::new(round, node.config.keypair.public);
    aggregate::seal_commit_aggregation(&mut state, log.v_point);
    state.log = Some(log.clone());

    let n_children = node.view.n_children(view);
    let children = node.view.children(view);
    let commitments = collect_commits(node, round, n_children, commit_rx).await;
    node.close_commit_channel(round).await;

    for (name, peer) in &children {
        match commitments.get(name) {
            Some(commitment) => aggregate::fold_child_commitment(&mut state, name, commitment),
            None => aggregate::record_missing_commit(&mut state, peer.public_key),
        }
    }

    if node.config.mode == SigningMode::MerkleTree {
        state.local_leaf = node.take_leaf(round).await;
        let (mt_root, mut proofs) = merkle::build_root(&state.leaves, state.local_leaf);
        state.mt_root = Some(mt_root);
        // `proofs` is children first (same order as `state.leaves`/`leaves_from`), then the
        // local leaf last if present — pop it off before the rest become `state.proofs`.
        state.local_leaf_proof = if state.local_leaf.is_some() { proofs.pop() } else { None };
        state.proofs = proofs;
    }

    if is_root {
        finalize_commits(node, view, round, state, response_rx, root_message.unwrap_or_default()).await
    } else {
        let commitment = CommitmentPayload {
            v: log.v_point,
            v_hat: state.v_hat.expect("sealed above"),
            x_hat: state.x_hat,
            mt_root: state.mt_root,
            exception_list: state.exception_list.clone(),
        };
        let frame = Frame::new(node.name.clone(), view, round, Payload::Commitment(commitment));
        node.stash_state(state, response_rx).await;
        node.transport
            .put_up(view, frame)
            .await
            .map_err(|err| PhaseError::Transport(err.to_string()))
    }
}

/// Root-only: computes the round's challenge and starts Challenge (§4.4).
async fn finalize_commits<S: Suite, T: Transport<S>, V: TreeView<S>>(
    node: &Arc<Node<S, T, V>>,
    view: ViewNumber,
    round: RoundNumber,
    mut state: RoundState<S>,
    response_rx: mpsc::Receiver<Frame<S>>,
    message: Vec<u8>,
) -> Result<(), PhaseError> {
    let v_hat = state.v_hat.expect("sealed in commit");
    let signed_message = match node.config.mode {
        SigningMode::PubKey => message,
        SigningMode::MerkleTree => state.mt_root.map(|r| r.to_vec()).unwrap_or_default(),
    };
    let challenge = aggregate::compute_challenge::<S>(&v_hat, &signed_message, state.mt_root);
    state.c = Some(challenge.c);

    if node.config.mode == SigningMode::MerkleTree {
        if let Some(local_proof) = state.local_leaf_proof.clone() {
            // The root has no parent proof to compose with; its own combined root is the
            // overall root already.
            node.notify_leaf_proof(round, local_proof).await;
        }
    }

    let children = node.view.children(view);
    if !children.is_empty() {
        let composed = composed_child_proofs(&state, None);
        let mut frames = BTreeMap::new();
        for name in children.keys() {
            let mut child_challenge = challenge.clone();
            child_challenge.proof = composed.get(name).cloned();
            frames.insert(
                name.clone(),
                Frame::new(node.name.clone(), view, round, Payload::Challenge(child_challenge)),
            );
        }
        node.transport
            .put_down(view, frames)
            .await
            .map_err(|err| PhaseError::Transport(err.to_string()))?;
    }

    respond(node, view, round, true, state, response_rx, signed_message).await
}

/// Composes each child's subtree-specific proof (recorded at Commit, §4.3 step 6) with the proof
/// this node itself received from its own parent, per §4.5 step 4 ("send each child its
/// subtree-specific Merkle proof composed with the parent proof"). `incoming` is `None` at the
/// root, which has no parent proof to compose with.
fn composed_child_proofs<S: Suite>(
    state: &RoundState<S>,
    incoming: Option<&merkle::Proof>,
) -> BTreeMap<NodeName, merkle::Proof> {
    state
        .leaves_from
        .iter()
        .zip(state.proofs.iter())
        .map(|(child, proof)| {
            let composed = match incoming {
                Some(parent_proof) => proof.composed_with(&parent_proof.steps),
                None => proof.clone(),
            };
            (child.clone(), composed)
        })
        .collect()
}

/// Handles an inbound Challenge from the parent (§4.5).
pub async fn on_challenge<S: Suite, T: Transport<S>, V: TreeView<S>>(
    node: &Arc<Node<S, T, V>>,
    view: ViewNumber,
    round: RoundNumber,
    challenge: ChallengePayload<S>,
) -> Result<(), PhaseError> {
    let Some(stashed) = node.take_state(round).await else {
        tracing::debug!(node = %node.name, round, "challenge for a round with no local state, ignoring");
        return Ok(());
    };
    let mut state = stashed.state;
    state.c = Some(challenge.c);

    if node.config.mode == SigningMode::MerkleTree {
        if let Some(local_proof) = &state.local_leaf_proof {
            let composed = match &challenge.proof {
                Some(parent_proof) => local_proof.composed_with(&parent_proof.steps),
                None => local_proof.clone(),
            };
            node.notify_leaf_proof(round, composed).await;
        }
    }

    let children = node.view.children(view);
    if !children.is_empty() {
        let composed = composed_child_proofs(&state, challenge.proof.as_ref());
        let mut frames = BTreeMap::new();
        for name in children.keys() {
            let mut child_challenge = challenge.clone();
            child_challenge.proof = composed.get(name).cloned();
            frames.insert(
                name.clone(),
                Frame::new(node.name.clone(), view, round, Payload::Challenge(child_challenge)),
            );
        }
        node.transport
            .put_down(view, frames)
            .await
            .map_err(|err| PhaseError::Transport(err.to_string()))?;
    }

    let signed_message = match node.config.mode {
        SigningMode::PubKey => Vec::new(),
        SigningMode::MerkleTree => challenge.mt_root.map(|r| r.to_vec()).unwrap_or_default(),
    };
    respond(node, view, round, false, state, stashed.response_rx, signed_message).await
}

async fn respond<S: Suite, T: Transport<S>, V: TreeView<S>>(
    node: &Arc<Node<S, T, V>>,
    view: ViewNumber,
    round: RoundNumber,
    is_root: bool,
    mut state: RoundState<S>,
    response_rx: mpsc::Receiver<Frame<S>>,
    signed_message: Vec<u8>,
) -> Result<(), PhaseError> {
    node.mark_seen(round);

    let Some(log) = state.log.clone() else {
        tracing::debug!(node = %node.name, round, "commit was skipped, responding without a contribution");
        node.finish_round(round).await;
        return Ok(());
    };
    if !is_root && node.fail.should_fail(FailurePhase::Respond) {
        tracing::debug!(node = %node.name, round, "withholding response per failure-injection policy");
        node.finish_round(round).await;
        return Ok(());
    }

    let c = state.c.expect("set by challenge");
    let r = aggregate::init_response_crypto::<S>(&log.v, &node.config.keypair.secret, &c);
    state.r = Some(r);
    state.r_hat = Some(r);

    let n_children = node.view.n_children(view);
    let children = node.view.children(view);
    let responses = collect_responses(node, round, n_children, response_rx).await;

    for (name, peer) in &children {
        match responses.get(name) {
            Some(ChildOutcome::Response(response)) => {
                aggregate::fold_child_response(&mut state, name, response);
            }
            Some(ChildOutcome::Error(message)) => {
                let error = PhaseError::Remote(crate::error::RemoteError::ChildError(name.clone(), message.clone()));
                let _ = node.transport.put_up_error(view, round, message.clone()).await;
                node.finish_round(round).await;
                return Err(error);
            }
            None => {
                aggregate::fold_missing_response(&mut state, name, peer.public_key);
            }
        }
    }

    aggregate::apply_exceptions_to_x_hat(&mut state);
    let verified = aggregate::verify_equation(&state).and_then(|t| {
        if is_root {
            aggregate::verify_root_challenge(&state, &signed_message, &t)
        } else {
            Ok(())
        }
    });

    if let Err(verification_error) = verified {
        if is_root {
            if node.config.panic_on_verification_failure {
                panic!("verification equation failed for round {round}: {verification_error}");
            }
            if let Some(done_tx) = node.finish_round(round).await {
                let _ = done_tx.send(Err(PhaseError::from(verification_error.clone())));
            }
            return Err(PhaseError::from(verification_error));
        }
        let _ = node
            .transport
            .put_up_error(view, round, verification_error.to_string())
            .await;
        node.finish_round(round).await;
        return Err(PhaseError::from(verification_error));
    }

    if is_root {
        let signing_outcome = SigningOutcome {
            v_hat: state.v_hat.expect("sealed in commit"),
            r_hat: state.r_hat.expect("set above"),
            c,
            exception_list: state.exception_list.clone(),
            mt_root: state.mt_root,
        };
        if let Some(done_tx) = node.finish_round(round).await {
            let _ = done_tx.send(Ok(signing_outcome));
        }
        Ok(())
    } else {
        let response = ResponsePayload {
            r_hat: state.r_hat.expect("set above"),
            exception_list: state.exception_list.clone(),
            exception_v_hat: state.exception_v_hat,
            exception_x_hat: state.exception_x_hat,
        };
        node.finish_round(round).await;
        let frame = Frame::new(node.name.clone(), view, round, Payload::Response(response));
        node.transport
            .put_up(view, frame)
            .await
            .map_err(|err| PhaseError::Transport(err.to_string()))
    }
}

enum ChildOutcome<S: Suite> {
    Response(ResponsePayload<S>),
    Error(String),
}

/// Waits on the commit-channel until either every expected child has committed or the node's
/// timeout estimate elapses (§4.3 steps 2–3: "Timeout is not an error: the partial set
/// proceeds").
async fn collect_commits<S: Suite, T: Transport<S>, V: TreeView<S>>(
    node: &Arc<Node<S, T, V>>,
    round: RoundNumber,
    expected: usize,
    mut rx: mpsc::Receiver<Frame<S>>,
) -> BTreeMap<NodeName, CommitmentPayload<S>> {
    let mut results = BTreeMap::new();
    if expected == 0 {
        return results;
    }
    let deadline = node.config.timeout.current();
    let started = Instant::now();
    let wait = timeout(deadline, async {
        while results.len() < expected {
            match rx.recv().await {
                Some(frame) => {
                    if let Payload::Commitment(commitment) = frame.payload {
                        results.insert(frame.from, commitment);
                    }
                }
                None => break,
            }
        }
    })
    .await;
    if wait.is_ok() {
        node.config.timeout.update(started.elapsed());
    } else {
        tracing::debug!(node = %node.name, round, received = results.len(), expected, "timed out waiting for child commitments");
    }
    results
}

/// Waits on the response-channel with the same timeout policy as [`collect_commits`] (§4.6
/// step 3).
async fn collect_responses<S: Suite, T: Transport<S>, V: TreeView<S>>(
    node: &Arc<Node<S, T, V>>,
    round: RoundNumber,
    expected: usize,
    mut rx: mpsc::Receiver<Frame<S>>,
) -> BTreeMap<NodeName, ChildOutcome<S>> {
    let mut results = BTreeMap::new();
    if expected == 0 {
        return results;
    }
    let deadline = node.config.timeout.current();
    let started = Instant::now();
    let wait = timeout(deadline, async {
        while results.len() < expected {
            match rx.recv().await {
                Some(frame) => {
                    let outcome = match frame.payload {
                        Payload::Response(response) => ChildOutcome::Response(response),
                        Payload::Error(error) => ChildOutcome::Error(error.message),
                        _ => continue,
                    };
                    results.insert(frame.from, outcome);
                }
                None => break,
            }
        }
    })
    .await;
    if wait.is_ok() {
        node.config.timeout.update(started.elapsed());
    } else {
        tracing::debug!(node = %node.name, round, received = results.len(), expected, "timed out waiting for child responses");
    }
    results
}

/// Handles an inbound ViewChange (§4.8): recomputes this node's children as every peer except the
/// new parent, installs the new view, and forwards ViewChange to the new children.
pub async fn on_view_change<S: Suite, T: Transport<S>, V: TreeView<S>>(
    node: &Arc<Node<S, T, V>>,
    new_parent: &str,
    new_view: ViewNumber,
) {
    let peers = node.view.peers();
    let Some(parent_info) = peers.get(new_parent).cloned() else {
        tracing::error!(node = %node.name, new_parent, new_view, "view change names an unknown peer as parent");
        return;
    };
    let mut children = peers;
    children.remove(new_parent);
    children.remove(&node.name);

    node.view.new_view(new_view, Some(parent_info), children.clone());

    if !children.is_empty() {
        let mut frames = BTreeMap::new();
        for name in children.keys() {
            frames.insert(
                name.clone(),
                Frame::new(
                    node.name.clone(),
                    new_view,
                    0,
                    Payload::ViewChange(crate::message::ViewChange { new_view }),
                ),
            );
        }
        if let Err(err) = node.transport.put_down(new_view, frames).await {
            tracing::warn!(node = %node.name, new_view, error = %err, "failed to forward view change");
        }
    }
}
