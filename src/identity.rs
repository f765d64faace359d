//! Node identity: a stable name plus a long-term keypair over the [`Suite`] group (§3 "Node identity").

use serde::{Deserialize, Serialize};

use crate::suite::Suite;

/// A node's stable, human-readable name. Used as the map key for peers, exception-list lookups,
/// and the per-node-name seed for a round's fresh commitment scalar.
pub type NodeName = String;

/// A node's long-term keypair: a private scalar `x` and the corresponding public point `X = g·x`.
#[derive_where::derive_where(Debug, Clone)]
pub struct KeyPair<S: Suite> {
    pub secret: S::Scalar,
    pub public: S::Point,
}

impl<S: Suite> KeyPair<S> {
    /// Derives the keypair's public point from a given secret scalar.
    pub fn from_secret(secret: S::Scalar) -> Self {
        let public = S::mul_base(&secret);
        Self { secret, public }
    }
}

/// A peer descriptor as seen through the tree/view interface: a name and its long-term public key.
///
/// Mirrors the Go source's `peer{PubKey()}` — the only thing the protocol core ever needs to know
/// about a peer beyond its name.
#[derive_where::derive_where(Debug, Clone)]
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PeerInfo<S: Suite> {
    pub name: NodeName,
    pub public_key: S::Point,
}

impl<S: Suite> PeerInfo<S> {
    pub fn new(name: impl Into<NodeName>, public_key: S::Point) -> Self {
        Self {
            name: name.into(),
            public_key,
        }
    }
}
