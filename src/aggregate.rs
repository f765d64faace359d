/*!
Aggregation and verification (§2 component 6, §4.3 steps 1/5, §4.6, §4.7).

Pure functions over [`RoundState`] and the [`Suite`] algebra; kept separate from the phase engine
(`router`/`node`) so the verification equation and its exception bookkeeping can be tested in
isolation from transport and timing concerns, mirroring the source's `VerifyResponses` standing on
its own next to `Commit`/`Respond`.
*/

use crate::error::VerificationError;
use crate::merkle::MerkleRoot;
use crate::message::{Challenge as ChallengePayload, Commitment as CommitmentPayload, Response as ResponsePayload};
use crate::round::{CommitLog, RoundNumber, RoundState};
use crate::suite::Suite;

/// Initializes this node's commit crypto for a freshly-announced round (§4.3 step 1): a fresh
/// scalar `v` from the per-node-name-and-round seed, `V = g·v`, and `V_hat`/`X_hat` seeded from
/// this node alone (the latter already done by [`RoundState::new`]).
pub fn init_commit_crypto<S: Suite>(name: &str, round: RoundNumber) -> CommitLog<S> {
    let seed = crate::round::seed_for(name, round);
    let v = S::scalar_from_seed(&seed);
    let v_point = S::mul_base(&v);
    CommitLog { v, v_point }
}

/// Folds one child's [`CommitmentPayload`] into this round's aggregates (§4.3 step 5, child sent
/// a Commitment): adds `child.v_hat`/`child.x_hat` into this node's running totals, and records
/// the per-child values for later use if the child fails to respond.
pub fn fold_child_commitment<S: Suite>(state: &mut RoundState<S>, child: &str, commitment: &CommitmentPayload<S>) {
    let v_hat = state.v_hat.unwrap_or_else(S::identity);
    state.v_hat = Some(S::add_points(&v_hat, &commitment.v_hat));
    state.x_hat = S::add_points(&state.x_hat, &commitment.x_hat);
    state.child_v_hat.insert(child.to_string(), commitment.v_hat);
    state.child_x_hat.insert(child.to_string(), commitment.x_hat);
    state.exception_list.extend(commitment.exception_list.iter().cloned());
    if let Some(root) = commitment.mt_root {
        state.leaves.push(root);
        state.leaves_from.push(child.to_string());
    }
}

/// Records a child that failed to commit (no message, or a default/failure marker): §4.3 step 5,
/// "otherwise" branch. `V_hat`/`X_hat` are left untouched, since the child never contributed to
/// them in the first place.
pub fn record_missing_commit<S: Suite>(state: &mut RoundState<S>, child_long_term_key: S::Point) {
    state.exception_list.push(child_long_term_key);
}

/// Finalizes commit-phase aggregation once the wait for children completes, seeding `V_hat` with
/// this node's own `V` if no child has contributed yet (§4.3 step 1: `V_hat := V`).
pub fn seal_commit_aggregation<S: Suite>(state: &mut RoundState<S>, own_v: S::Point) {
    state.v_hat = Some(state.v_hat.map_or(own_v, |v_hat| S::add_points(&v_hat, &own_v)));
}

/// Initializes response crypto once the challenge has arrived (§4.6 step 2): `r := v - x*c`.
pub fn init_response_crypto<S: Suite>(v: &S::Scalar, secret: &S::Scalar, c: &S::Scalar) -> S::Scalar {
    S::sub_scalars(v, &S::mul_scalars(secret, c))
}

/// Folds one child's [`ResponsePayload`] into this round's aggregates (§4.6 step 6, child
/// responded): ignored entirely if the child never committed (`child_v_hat` has no entry for it).
pub fn fold_child_response<S: Suite>(state: &mut RoundState<S>, child: &str, response: &ResponsePayload<S>) {
    if !state.child_v_hat.contains_key(child) {
        return;
    }
    state.r_hat = Some(match state.r_hat {
        Some(r_hat) => S::add_scalars(&r_hat, &response.r_hat),
        None => response.r_hat,
    });
    state.exception_v_hat = S::add_points(&state.exception_v_hat, &response.exception_v_hat);
    state.exception_x_hat = S::add_points(&state.exception_x_hat, &response.exception_x_hat);
    state.exception_list.extend(response.exception_list.iter().cloned());
}

/// Folds a child that committed but then failed to respond into the exception aggregates
/// (§4.6 step 6, "Default/missing" branch): the child's already-folded `V_hat`/`X_hat`
/// contributions move from the live aggregates into the exception side.
pub fn fold_missing_response<S: Suite>(state: &mut RoundState<S>, child: &str, child_long_term_key: S::Point) {
    state.exception_list.push(child_long_term_key);
    if let Some(v_hat) = state.child_v_hat.get(child) {
        state.exception_v_hat = S::add_points(&state.exception_v_hat, v_hat);
    }
    if let Some(x_hat) = state.child_x_hat.get(child) {
        state.exception_x_hat = S::add_points(&state.exception_x_hat, x_hat);
    }
}

/// Subtracts the accumulated `exception_x_hat` from `X_hat` (§4.6 step 7). `V_hat` is
/// deliberately left untouched — `exception_v_hat` is added back on the left-hand side of the
/// verification equation instead (§3 invariant, §9 "Exception bookkeeping").
pub fn apply_exceptions_to_x_hat<S: Suite>(state: &mut RoundState<S>) {
    state.x_hat = S::sub_points(&state.x_hat, &state.exception_x_hat);
}

/// Checks the verification equation `g·r_hat + X_hat·c + exceptionV_hat == V_hat` (§4.7, §3
/// invariant). Returns the recomputed left-hand side `T` on success so the root can additionally
/// recompute and compare the challenge.
pub fn verify_equation<S: Suite>(state: &RoundState<S>) -> Result<S::Point, VerificationError> {
    let r_hat = state.r_hat.expect("r_hat must be set before verification");
    let c = state.c.expect("challenge must be set before verification");
    let v_hat = state.v_hat.expect("v_hat must be set before verification");

    let t = S::add_points(
        &S::add_points(&S::mul_base(&r_hat), &S::mul_point(&state.x_hat, &c)),
        &state.exception_v_hat,
    );

    if t == v_hat {
        Ok(t)
    } else {
        Err(VerificationError::EquationMismatch { round: state.round })
    }
}

/// At the root only (§4.7): recomputes the challenge from `V_hat` and from the freshly verified
/// `T`, and requires they match — the same message value used in [`crate::phases::finalize_commits`]
/// must be supplied again here.
pub fn verify_root_challenge<S: Suite>(
    state: &RoundState<S>,
    message: &[u8],
    t: &S::Point,
) -> Result<(), VerificationError> {
    let c = state.c.expect("challenge must be set before verification");
    let v_hat = state.v_hat.expect("v_hat must be set before verification");
    let recomputed_c = S::hash_to_scalar(message, &v_hat);
    let recomputed_c2 = S::hash_to_scalar(message, t);
    if recomputed_c != c || recomputed_c2 != c {
        return Err(VerificationError::ChallengeMismatch { round: state.round });
    }
    Ok(())
}

/// Builds the ChallengeMessage payload the root sends to start §4.5, computing `c = H(message,
/// V_hat)` first (§4.4). `mt_root` is the root's own combined Merkle root in
/// [`crate::config::SigningMode::MerkleTree`] mode, `None` otherwise; `proof` is always `None`
/// here since the root has no parent proof to compose with — the phase engine fills in each
/// child's composed proof individually before sending (§4.5 step 4).
pub fn compute_challenge<S: Suite>(v_hat: &S::Point, message: &[u8], mt_root: Option<MerkleRoot>) -> ChallengePayload<S> {
    ChallengePayload {
        c: S::hash_to_scalar(message, v_hat),
        mt_root,
        proof: None,
    }
}
