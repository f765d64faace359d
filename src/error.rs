//! Error types shared across the crate.
//!
//! The split mirrors the error kinds described by the protocol: a [`LocalError`] means this
//! node's own state or setup is broken (a bug, never attributable to a peer); a [`RemoteError`]
//! means a peer did something the protocol disallows, and is the kind of error that gets wrapped
//! into an upward `Error` frame; [`VerificationError`] is the specific, structured form of a
//! failed Schnorr verification equation (see [`crate::aggregate::verify_equation`]).

use crate::identity::NodeName;
use crate::round::RoundNumber;

/// This node's own state or configuration is broken.
///
/// Never originates across the wire; always a bug in this process or its setup.
#[derive(displaydoc::Display, Debug, Clone)]
pub enum LocalError {
    /// round {0} has no state, but one was expected
    MissingRoundState(RoundNumber),
    /// the round map lock was poisoned
    LockPoisoned,
    /// a channel belonging to round {0} was dropped unexpectedly
    ChannelClosed(RoundNumber),
    /// invalid configuration: {0}
    InvalidConfig(String),
    /// {0}
    Other(String),
}

impl LocalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl std::error::Error for LocalError {}

/// A peer violated the protocol.
///
/// Attributable to a specific peer name; this is the error kind that gets wrapped into an
/// upward `Error` frame and propagated toward the root per the propagation policy.
#[derive(displaydoc::Display, Debug, Clone)]
pub enum RemoteError {
    /// message from {from} was expected from the parent in view {view}
    NotParent { from: NodeName, view: u64 },
    /// message from {from} was expected from a child in view {view}
    NotChild { from: NodeName, view: u64 },
    /// child {0} reported an error: {1}
    ChildError(NodeName, String),
    /// message from {0} could not be deserialized: {1}
    Malformed(NodeName, String),
}

impl std::error::Error for RemoteError {}

/// The Schnorr verification equation failed to hold for a round.
///
/// At the root this is the terminal, fatal outcome of [`crate::aggregate::verify_equation`]: the
/// round's collective signature cannot be trusted. At intermediate nodes it is propagated upward
/// instead, wrapped in an Error frame (§7 propagation policy) — the corruption is still detected
/// early, but only the root is authoritative about whether the *overall* signature is valid.
#[derive(displaydoc::Display, Debug, Clone)]
pub enum VerificationError {
    /// round {round}: recomputed T does not equal V_hat
    EquationMismatch { round: RoundNumber },
    /// round {round}: challenge recomputed from V_hat does not match the one that was issued
    ChallengeMismatch { round: RoundNumber },
}

impl std::error::Error for VerificationError {}

/// Errors a phase handler can return; never crosses the wire directly.
#[derive(displaydoc::Display, Debug, Clone)]
pub enum PhaseError {
    /// {0}
    Local(LocalError),
    /// {0}
    Remote(RemoteError),
    /// {0}
    Verification(VerificationError),
    /// transport error: {0}
    Transport(String),
}

impl std::error::Error for PhaseError {}

impl From<LocalError> for PhaseError {
    fn from(error: LocalError) -> Self {
        Self::Local(error)
    }
}

impl From<RemoteError> for PhaseError {
    fn from(error: RemoteError) -> Self {
        Self::Remote(error)
    }
}

impl From<VerificationError> for PhaseError {
    fn from(error: VerificationError) -> Self {
        Self::Verification(error)
    }
}
