//! The root's user-visible result of a round (§7 "User-visible behavior").

use crate::merkle::MerkleRoot;
use crate::round::ExceptionList;
use crate::suite::Suite;

/// The collective signature and its bookkeeping, emitted by the root once verification succeeds.
/// A round that fails verification is abandoned instead (no [`SigningOutcome`] is produced; see
/// [`crate::error::PhaseError`]).
#[derive_where::derive_where(Debug, Clone)]
pub struct SigningOutcome<S: Suite> {
    pub v_hat: S::Point,
    pub r_hat: S::Scalar,
    pub c: S::Scalar,
    pub exception_list: ExceptionList<S>,
    pub mt_root: Option<MerkleRoot>,
}
