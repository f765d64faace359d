/*!
Node state shared across a node's tasks (§5 "Shared resources").

Holds exactly what the concurrency model says must be shared: the per-round channel map behind
one coarse lock (`roundLock` in the source), and the handful of fields that never change after
construction. Everything else — a round's `V_hat`, `X_hat`, exception list, and so on — lives in a
[`crate::round::RoundState`] owned solely by the task running that round's phases (§3
"Ownership", §5).
*/

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::config::Config;
use crate::error::{LocalError, PhaseError};
use crate::failure::{NeverFail, ShouldIFail};
use crate::identity::NodeName;
use crate::merkle::{self, Leaf};
use crate::message::Frame;
use crate::outcome::SigningOutcome;
use crate::round::{RoundNumber, RoundState};
use crate::suite::Suite;
use crate::transport::Transport;
use crate::view::TreeView;

/// The two channels a round's phase handler drains (§4.1, §4.3 step 3, §4.6 step 3), plus — at
/// the root only — the sender half of the signal that carries the round's final outcome out to
/// whoever called [`Node::start_round`].
pub(crate) struct RoundChannels<S: Suite> {
    pub commit_tx: mpsc::Sender<Frame<S>>,
    pub response_tx: mpsc::Sender<Frame<S>>,
    pub done_tx: Option<oneshot::Sender<Result<SigningOutcome<S>, PhaseError>>>,
}

/// A single participant in the tree. `T` and `V` are the consumed transport and tree-view
/// interfaces (§6); `S` is the consumed cryptographic suite (§6).
pub struct Node<S: Suite, T: Transport<S>, V: TreeView<S>> {
    pub name: NodeName,
    pub config: Config<S>,
    pub transport: Arc<T>,
    pub view: Arc<V>,
    pub fail: Arc<dyn ShouldIFail>,
    rounds: Mutex<BTreeMap<RoundNumber, RoundChannels<S>>>,
    last_seen_round: AtomicU64,
    /// Client leaves staged ahead of Commit, in Merkle mode (§2 component 8, §4.3 step 6).
    leaves: Mutex<BTreeMap<RoundNumber, Leaf>>,
    /// One-shot sender per round for handing a local leaf's finalized proof back to whoever
    /// called [`Node::submit_leaf`], once Challenge composes it (§4.5 step 4).
    leaf_proof_txs: Mutex<BTreeMap<RoundNumber, oneshot::Sender<merkle::Proof>>>,
    /// Holds a non-root round's state — and the response-channel receiver Respond will need —
    /// between Commit sending a Commitment up and Challenge arriving from the parent. The one
    /// point where per-round state genuinely has to outlive a single task (§3 "Ownership").
    states: Mutex<BTreeMap<RoundNumber, StashedRound<S>>>,
}

pub(crate) struct StashedRound<S: Suite> {
    pub state: RoundState<S>,
    pub response_rx: mpsc::Receiver<Frame<S>>,
}

impl<S: Suite, T: Transport<S>, V: TreeView<S>> Node<S, T, V> {
    pub fn new(name: impl Into<NodeName>, config: Config<S>, transport: Arc<T>, view: Arc<V>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            config,
            transport,
            view,
            fail: Arc::new(NeverFail),
            rounds: Mutex::new(BTreeMap::new()),
            last_seen_round: AtomicU64::new(0),
            leaves: Mutex::new(BTreeMap::new()),
            leaf_proof_txs: Mutex::new(BTreeMap::new()),
            states: Mutex::new(BTreeMap::new()),
        })
    }

    pub(crate) async fn stash_state(&self, state: RoundState<S>, response_rx: mpsc::Receiver<Frame<S>>) {
        let round = state.round;
        self.states.lock().await.insert(round, StashedRound { state, response_rx });
    }

    /// Takes a stashed round's state and response receiver, if this node has one for it. Returns
    /// `None` for a round that was view-changed away or never announced here (§4.5 step 1: "if
    /// missing, drop").
    pub(crate) async fn take_state(&self, round: RoundNumber) -> Option<StashedRound<S>> {
        self.states.lock().await.remove(&round)
    }

    /// Stages a client leaf to be folded into `round`'s Merkle aggregation when Commit runs
    /// (§4.3 step 6). Has no effect outside [`crate::config::SigningMode::MerkleTree`]. The
    /// returned receiver resolves once Challenge composes this leaf's proof against the overall
    /// root (§4.5 step 4); it is dropped silently if the round never reaches Challenge.
    pub async fn submit_leaf(&self, round: RoundNumber, leaf: Leaf) -> oneshot::Receiver<merkle::Proof> {
        let (tx, rx) = oneshot::channel();
        self.leaves.lock().await.insert(round, leaf);
        self.leaf_proof_txs.lock().await.insert(round, tx);
        rx
    }

    pub(crate) async fn take_leaf(&self, round: RoundNumber) -> Option<Leaf> {
        self.leaves.lock().await.remove(&round)
    }

    /// Delivers `round`'s composed local-leaf proof to whoever called [`Node::submit_leaf`], if
    /// anyone did (§4.5 step 4: "build and emit local Merkle proofs toward the local client
    /// channels"). A no-op if the client dropped its receiver or never submitted a leaf.
    pub(crate) async fn notify_leaf_proof(&self, round: RoundNumber, proof: merkle::Proof) {
        if let Some(tx) = self.leaf_proof_txs.lock().await.remove(&round) {
            let _ = tx.send(proof);
        }
    }

    /// Replaces the default never-fail policy, e.g. with [`crate::failure::AlwaysFail`] in tests.
    pub fn with_failure_policy(mut self: Arc<Self>, policy: Arc<dyn ShouldIFail>) -> Arc<Self> {
        Arc::get_mut(&mut self)
            .expect("failure policy must be set before the node is shared")
            .fail = policy;
        self
    }

    /// Highest round this node has acted upon (Announce, Commit, or Respond entry), tracked with
    /// a saturating max (§9 open question, resolved in favor of "acted upon" over "announced").
    pub fn last_seen_round(&self) -> RoundNumber {
        self.last_seen_round.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_seen(&self, round: RoundNumber) {
        self.last_seen_round.fetch_max(round, Ordering::Relaxed);
    }

    /// Allocates the commit/response channels for a new round under the round-map lock (§4.2
    /// step 1). `done_tx` is `Some` only for a root-initiated round.
    pub(crate) async fn allocate_round(
        &self,
        round: RoundNumber,
        capacity: usize,
        done_tx: Option<oneshot::Sender<Result<SigningOutcome<S>, PhaseError>>>,
    ) -> (mpsc::Receiver<Frame<S>>, mpsc::Receiver<Frame<S>>) {
        let capacity = capacity.max(1);
        let (commit_tx, commit_rx) = mpsc::channel(capacity);
        let (response_tx, response_rx) = mpsc::channel(capacity);
        let mut rounds = self.rounds.lock().await;
        rounds.insert(
            round,
            RoundChannels {
                commit_tx,
                response_tx,
                done_tx,
            },
        );
        (commit_rx, response_rx)
    }

    /// Forwards an inbound Commitment frame to its round's commit-channel (§4.1). Drops the
    /// frame if the round has not been announced here.
    pub(crate) async fn forward_commitment(&self, round: RoundNumber, frame: Frame<S>) {
        let sender = self.rounds.lock().await.get(&round).map(|rc| rc.commit_tx.clone());
        if let Some(sender) = sender {
            let _ = sender.send(frame).await;
        } else {
            tracing::debug!(node = %self.name, round, "dropping commitment for unannounced round");
        }
    }

    /// Forwards an inbound Response frame to its round's response-channel (§4.1). Drops the
    /// frame if the round has not been announced here.
    pub(crate) async fn forward_response(&self, round: RoundNumber, frame: Frame<S>) {
        let sender = self.rounds.lock().await.get(&round).map(|rc| rc.response_tx.clone());
        if let Some(sender) = sender {
            let _ = sender.send(frame).await;
        } else {
            tracing::debug!(node = %self.name, round, "dropping response for unannounced round");
        }
    }

    /// Removes the commit-channel entry so no further commit messages are accepted (§4.3 step 4).
    /// The response-channel and `done_tx` are left in place for Respond to use later.
    pub(crate) async fn close_commit_channel(&self, round: RoundNumber) {
        if let Some(rc) = self.rounds.lock().await.get_mut(&round) {
            let (tx, _rx) = mpsc::channel(1);
            rc.commit_tx = tx;
        }
    }

    /// Takes the root's done-signal sender, if any, and removes the round entirely (§3 "destroyed
    /// when response is sent up or root reports done").
    pub(crate) async fn finish_round(
        &self,
        round: RoundNumber,
    ) -> Option<oneshot::Sender<Result<SigningOutcome<S>, PhaseError>>> {
        self.rounds.lock().await.remove(&round).and_then(|rc| rc.done_tx)
    }

    pub(crate) fn local_error(&self, message: impl Into<String>) -> LocalError {
        LocalError::new(message)
    }
}
