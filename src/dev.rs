/*!
Test tooling (§13): an in-memory [`ChannelTransport`], and a [`Tree`] harness for wiring named
nodes into a topology and driving rounds through it, in the spirit of the teacher crate's own
`dev` module of test-only helpers consumed by scenario tests.
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::identity::{KeyPair, NodeName, PeerInfo};
use crate::message::{Error as ErrorPayload, Frame, Payload};
use crate::round::RoundNumber;
use crate::suite::Suite;
use crate::transport::{Transport, TransportError};
use crate::view::ViewNumber;

/// An in-memory transport backed by one mpsc channel per node. `put_up` sends to whatever this
/// node currently believes its parent is (set by [`ChannelTransport::set_parent`], since routing
/// connections to a parent/children is explicitly out of scope for the core, §1); `put_down` sends
/// directly to each named recipient.
pub struct ChannelTransport<S: Suite> {
    me: NodeName,
    senders: BTreeMap<NodeName, mpsc::Sender<Frame<S>>>,
    inbox: Mutex<mpsc::Receiver<Frame<S>>>,
    parent: Mutex<Option<NodeName>>,
}

impl<S: Suite> ChannelTransport<S> {
    /// Updates who this node's `put_up` targets; a real transport would derive this from the tree
    /// view automatically, which is exactly the out-of-scope wiring this harness stands in for.
    pub async fn set_parent(&self, parent: Option<NodeName>) {
        *self.parent.lock().await = parent;
    }

    async fn send_to(&self, to: &str, frame: Frame<S>) -> Result<(), TransportError> {
        let sender = self
            .senders
            .get(to)
            .cloned()
            .ok_or_else(|| TransportError::NotEstablished(to.to_string()))?;
        sender
            .send(frame)
            .await
            .map_err(|_| TransportError::ConnectionClosed(to.to_string()))
    }
}

#[async_trait::async_trait]
impl<S: Suite> Transport<S> for ChannelTransport<S> {
    async fn recv(&self) -> Result<Frame<S>, TransportError> {
        self.inbox.lock().await.recv().await.ok_or(TransportError::EndOfStream)
    }

    async fn put_up(&self, _view: ViewNumber, msg: Frame<S>) -> Result<(), TransportError> {
        let parent = self.parent.lock().await.clone();
        let to = parent.ok_or_else(|| TransportError::NotEstablished("no parent set".into()))?;
        self.send_to(&to, msg).await
    }

    async fn put_down(&self, _view: ViewNumber, msgs: BTreeMap<NodeName, Frame<S>>) -> Result<(), TransportError> {
        for (to, frame) in msgs {
            self.send_to(&to, frame).await?;
        }
        Ok(())
    }

    async fn put_up_error(&self, view: ViewNumber, round: RoundNumber, message: String) -> Result<(), TransportError> {
        let frame = Frame::new(self.me.clone(), view, round, Payload::Error(ErrorPayload { message }));
        self.put_up(view, frame).await
    }
}

/// A fully-wired in-memory tree of nodes for driving scenario tests (§8). Construction is manual
/// and explicit — this is the reference topology builder named in §1's "tree-topology
/// construction... out of scope", not a general-purpose membership service.
pub struct Tree<S: Suite> {
    pub transports: BTreeMap<NodeName, Arc<ChannelTransport<S>>>,
}

impl<S: Suite> Tree<S> {
    /// Builds a transport for every name in `names`, each able to reach every other by name;
    /// callers set each node's parent with [`ChannelTransport::set_parent`] to lay out the actual
    /// tree structure (e.g. A→B→C), matching that node's [`crate::view::StaticTree`].
    pub fn new(names: &[&str]) -> Self {
        let mut raw_senders: BTreeMap<NodeName, mpsc::Sender<Frame<S>>> = BTreeMap::new();
        let mut raw_receivers: BTreeMap<NodeName, mpsc::Receiver<Frame<S>>> = BTreeMap::new();
        for name in names {
            let (tx, rx) = mpsc::channel(64);
            raw_senders.insert((*name).to_string(), tx);
            raw_receivers.insert((*name).to_string(), rx);
        }

        let mut transports = BTreeMap::new();
        for name in names {
            let rx = raw_receivers.remove(*name).expect("allocated above");
            transports.insert(
                (*name).to_string(),
                Arc::new(ChannelTransport {
                    me: (*name).to_string(),
                    senders: raw_senders.clone(),
                    inbox: Mutex::new(rx),
                    parent: Mutex::new(None),
                }),
            );
        }
        Self { transports }
    }

    pub fn transport(&self, name: &str) -> Arc<ChannelTransport<S>> {
        self.transports.get(name).cloned().expect("unknown node name")
    }
}

/// Generates a long-term keypair deterministically from `name`, so scenario tests don't need a
/// real RNG (§13, in the same spirit as [`crate::round::seed_for`]).
pub fn deterministic_keypair<S: Suite>(name: &str) -> KeyPair<S> {
    let secret = S::scalar_from_seed(format!("keypair::{name}").as_bytes());
    KeyPair::from_secret(secret)
}

pub fn peer_info<S: Suite>(name: &str, keypair: &KeyPair<S>) -> PeerInfo<S> {
    PeerInfo::new(name, keypair.public)
}
