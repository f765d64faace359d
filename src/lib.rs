/*!
A tree-based collective Schnorr-style (ElGamal) signing protocol.

A set of peers organized as a rooted spanning tree run a four-phase round —
Announce, Commit, Challenge, Respond — to produce a single aggregate signature over a message.
Any subset of honest, reachable nodes contributes; unreachable or faulty nodes are recorded in an
exception list rather than aborting the round. In [`config::SigningMode::MerkleTree`] mode, each
signer can additionally contribute a leaf so the collective signature certifies the root of a
combined Merkle tree instead of a fixed message.

The transport, tree-topology construction and view-membership, the Merkle-proof library, and the
elliptic-curve/hash suite are all consumed through the narrow interfaces in [`transport`],
[`view`], [`merkle`], and [`suite`] respectively — this crate owns the phase engine
([`phases`]), the aggregation math that keeps the verification equation honest under partial
failure ([`aggregate`]), and the concurrency discipline that drives both ([`node`], [`router`]).
*/

pub mod aggregate;
pub mod config;
pub mod error;
pub mod failure;
pub mod identity;
pub mod merkle;
pub mod message;
pub mod node;
pub mod outcome;
pub mod phases;
pub mod round;
pub mod router;
pub mod suite;
pub mod transport;
pub mod view;

#[cfg(any(test, feature = "dev"))]
pub mod dev;

pub use config::{Config, SigningMode};
pub use error::{LocalError, PhaseError, RemoteError, VerificationError};
pub use identity::{KeyPair, NodeName, PeerInfo};
pub use node::Node;
pub use outcome::SigningOutcome;
pub use round::RoundNumber;
pub use suite::{RistrettoSuite, Suite};
pub use view::{StaticTree, TreeView, ViewNumber};
