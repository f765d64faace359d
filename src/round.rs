/*!
Per-round state (§3 "Round" / "Per-round state").

A round is identified by a positive integer; a node may have several rounds in flight
concurrently, each owned exclusively by the task running its phase handler (§3 "Ownership", §5).
*/

use std::collections::BTreeMap;

use crate::identity::NodeName;
use crate::merkle::{self, Leaf, MerkleRoot};
use crate::suite::Suite;

/// Identifies one execution of the four-phase protocol.
pub type RoundNumber = u64;

/// The long-term public keys of nodes that failed to contribute in a given round; see the
/// glossary entry "Exception list".
pub type ExceptionList<S> = Vec<<S as Suite>::Point>;

/// The cryptographic half of a round's log: this node's fresh commitment scalar and point, set
/// once Commit initializes it (§4.3 step 1) and read again only to compute the response (§4.6
/// step 2). Mirrors the source's `SNLog`.
#[derive_where::derive_where(Debug, Clone)]
pub struct CommitLog<S: Suite> {
    /// `v`: this round's fresh random scalar.
    pub v: S::Scalar,
    /// `V = g·v`: this node's own commitment point.
    pub v_point: S::Point,
}

/// State created on Announce and torn down once this node's Response has gone up (or, at the
/// root, once the round's `done` signal has fired) — see §3 and testable property 3 (§8).
#[derive_where::derive_where(Debug)]
pub struct RoundState<S: Suite> {
    pub round: RoundNumber,

    /// `None` until Commit has run; also `None` for the lifetime of the round if this node
    /// deliberately skipped committing (§4.2 step 3, §4.6 step 1) — Respond treats a missing log
    /// exactly like the source's `round.Log.v == nil`.
    pub log: Option<CommitLog<S>>,

    /// `V_hat`: aggregate commitment point over this node's subtree, set once Commit aggregation
    /// completes (§4.3 step 5); `None` before then.
    pub v_hat: Option<S::Point>,

    /// `X_hat`: aggregate public key over this node's subtree. Seeded with this node's own long
    /// term public key at round creation (§3: "initialized to `X`") and grown as children commit.
    pub x_hat: S::Point,

    /// Per-child subtree aggregates as received at commit time, retained so a child that later
    /// fails to respond can be folded into `exception_v_hat`/`exception_x_hat` instead (§3
    /// invariant, §4.6 step 6). Written exactly once per child per round.
    pub child_v_hat: BTreeMap<NodeName, S::Point>,
    pub child_x_hat: BTreeMap<NodeName, S::Point>,

    /// The scalar challenge for this round, set by Challenge (§4.5 step 2).
    pub c: Option<S::Scalar>,

    /// This node's own response `r = v - x*c`, and the aggregate `r_hat` over the subtree
    /// (§4.6 steps 2 and 6).
    pub r: Option<S::Scalar>,
    pub r_hat: Option<S::Scalar>,

    /// This subtree's exception list: long-term public keys of nodes that failed to commit or
    /// respond, accumulated across Commit and Respond.
    pub exception_list: ExceptionList<S>,

    /// Sum of `V_hat` of children that committed but then failed to respond. Kept separate from
    /// `V_hat` and folded into the verification equation's left-hand side instead of being
    /// subtracted from it (§9 "Exception bookkeeping").
    pub exception_v_hat: S::Point,
    /// Sum of `X_hat` of children that committed but then failed to respond; subtracted from
    /// `X_hat` directly (§4.6 step 7).
    pub exception_x_hat: S::Point,

    /// Merkle-mode bookkeeping (§4.3 step 6, §4.5 step 4); unused in `PubKey` mode.
    pub leaves: Vec<MerkleRoot>,
    pub leaves_from: Vec<NodeName>,
    pub local_leaf: Option<Leaf>,
    pub mt_root: Option<MerkleRoot>,

    /// Per-child proof from `child`'s subtree root to this node's own combined root, parallel to
    /// `leaves`/`leaves_from` (same order, same length); built alongside `mt_root` at Commit and
    /// composed with the parent's own proof once Challenge arrives (§4.5 step 4).
    pub proofs: Vec<merkle::Proof>,
    /// Proof from this node's own local leaf (if it contributed one) to its combined root,
    /// composed the same way before being handed back to whoever called
    /// [`crate::node::Node::submit_leaf`].
    pub local_leaf_proof: Option<merkle::Proof>,
}

impl<S: Suite> RoundState<S> {
    /// Creates empty state for a freshly-announced round: `X_hat` starts at this node's own
    /// public key (§3: "`X_hat`... initialized to `X`").
    pub fn new(round: RoundNumber, own_public_key: S::Point) -> Self {
        Self {
            round,
            log: None,
            v_hat: None,
            x_hat: own_public_key,
            child_v_hat: BTreeMap::new(),
            child_x_hat: BTreeMap::new(),
            c: None,
            r: None,
            r_hat: None,
            exception_list: Vec::new(),
            exception_v_hat: S::identity(),
            exception_x_hat: S::identity(),
            leaves: Vec::new(),
            leaves_from: Vec::new(),
            local_leaf: None,
            mt_root: None,
            proofs: Vec::new(),
            local_leaf_proof: None,
        }
    }

    /// Whether this node actually committed in this round (§4.6 step 1: "the commit phase was
    /// skipped").
    pub fn committed(&self) -> bool {
        self.log.is_some()
    }
}

/// Derives the seed for [`crate::suite::Suite::scalar_from_seed`] from this node's name and the
/// round number, per §4.3 step 1 ("a fresh scalar `v` from a per-node-name-seeded stream").
///
/// The source seeds a stream cipher with the node's name alone and relies on the cipher's own
/// position advancing between calls (`sn.suite.Cipher([]byte(sn.Name()))`). A direct port would
/// need that same mutable, shared stream state; folding the round number into the seed instead
/// gives each round an independent, reproducible scalar without a cursor shared across the
/// concurrently-owned per-round tasks of §5.
pub fn seed_for(name: &str, round: RoundNumber) -> Vec<u8> {
    let mut seed = Vec::with_capacity(name.len() + 8);
    seed.extend_from_slice(name.as_bytes());
    seed.extend_from_slice(&round.to_be_bytes());
    seed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::RistrettoSuite;

    #[test]
    fn fresh_state_has_no_log_and_self_seeded_x_hat() {
        let own_key = RistrettoSuite::mul_base(&RistrettoSuite::scalar_from_seed(b"node-a"));
        let state = RoundState::<RistrettoSuite>::new(1, own_key);
        assert!(!state.committed());
        assert_eq!(state.x_hat, own_key);
        assert!(state.exception_list.is_empty());
    }

    #[test]
    fn seeds_differ_by_round() {
        assert_ne!(seed_for("a", 1), seed_for("a", 2));
        assert_ne!(seed_for("a", 1), seed_for("b", 1));
    }
}
