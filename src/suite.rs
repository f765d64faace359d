/*!
The cryptographic group + hash + stream-cipher package consumed from outside the core.

The protocol core only ever needs a prime-order group with scalar and point types, scalar/point
arithmetic, a way to turn a message and a point into a challenge scalar, and a keyed stream of
scalars for a node's per-round randomness. [`Suite`] captures exactly that, so the phase engine and
aggregation code (§4, §4.7 of the spec) never reach for a concrete curve directly.

[`RistrettoSuite`] is the default, concrete adapter, built on `curve25519-dalek`'s Ristretto group
and SHA-512, in the same spirit as the teacher crate's `Digest`/`Signer`/`Verifier` associated
types: a small trait standing in for "whatever curve the deployment picked".
*/

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar as DalekScalar;
use curve25519_dalek::traits::Identity;
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha512};

/// A prime-order group plus the hash and stream-cipher primitives the protocol needs.
///
/// Implementations are expected to be cheap to clone and `Send + Sync`, since points and scalars
/// are held in per-round state that is only ever touched by a single task at a time (§5).
pub trait Suite: 'static + Send + Sync {
    /// A scalar value mod the group order.
    type Scalar: Copy + Clone + std::fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned;
    /// A group element.
    type Point: Copy + Clone + std::fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned;

    /// The group's neutral element.
    fn identity() -> Self::Point;

    /// `g·scalar`, i.e. the base point multiplied by `scalar`.
    fn mul_base(scalar: &Self::Scalar) -> Self::Point;

    /// `point + other`.
    fn add_points(point: &Self::Point, other: &Self::Point) -> Self::Point;

    /// `point - other`.
    fn sub_points(point: &Self::Point, other: &Self::Point) -> Self::Point;

    /// `point·scalar`.
    fn mul_point(point: &Self::Point, scalar: &Self::Scalar) -> Self::Point;

    /// `a - b` in the scalar field.
    fn sub_scalars(a: &Self::Scalar, b: &Self::Scalar) -> Self::Scalar;

    /// `a * b` in the scalar field.
    fn mul_scalars(a: &Self::Scalar, b: &Self::Scalar) -> Self::Scalar;

    /// `a + b` in the scalar field.
    fn add_scalars(a: &Self::Scalar, b: &Self::Scalar) -> Self::Scalar;

    /// Serializes a point to its canonical wire form.
    fn point_to_bytes(point: &Self::Point) -> Vec<u8>;

    /// Hashes `message` together with `point` into a scalar: this is the protocol's
    /// `hashElGamal(suite, message, point)`, used both to derive the round challenge and to
    /// re-derive it during verification.
    fn hash_to_scalar(message: &[u8], point: &Self::Point) -> Self::Scalar;

    /// Derives this round's fresh secret scalar from a per-node-name seed, per §4.3 step 1
    /// ("pick a fresh scalar `v` from a per-node-name-seeded stream").
    ///
    /// The seed is expected to already incorporate the node's name and something round-specific
    /// (see [`crate::round::seed_for`]), so repeated calls with different seeds never collide.
    fn scalar_from_seed(seed: &[u8]) -> Self::Scalar;
}

/// The default [`Suite`] adapter: Ristretto255 points, scalars mod the Ristretto group order, and
/// SHA-512 as both the challenge hash and the seed expansion for [`Suite::scalar_from_seed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RistrettoSuite;

impl Suite for RistrettoSuite {
    type Scalar = DalekScalar;
    type Point = RistrettoPoint;

    fn identity() -> Self::Point {
        RistrettoPoint::identity()
    }

    fn mul_base(scalar: &Self::Scalar) -> Self::Point {
        RISTRETTO_BASEPOINT_POINT * scalar
    }

    fn add_points(point: &Self::Point, other: &Self::Point) -> Self::Point {
        point + other
    }

    fn sub_points(point: &Self::Point, other: &Self::Point) -> Self::Point {
        point - other
    }

    fn mul_point(point: &Self::Point, scalar: &Self::Scalar) -> Self::Point {
        point * scalar
    }

    fn sub_scalars(a: &Self::Scalar, b: &Self::Scalar) -> Self::Scalar {
        a - b
    }

    fn mul_scalars(a: &Self::Scalar, b: &Self::Scalar) -> Self::Scalar {
        a * b
    }

    fn add_scalars(a: &Self::Scalar, b: &Self::Scalar) -> Self::Scalar {
        a + b
    }

    fn point_to_bytes(point: &Self::Point) -> Vec<u8> {
        point.compress().as_bytes().to_vec()
    }

    fn hash_to_scalar(message: &[u8], point: &Self::Point) -> Self::Scalar {
        let mut hasher = Sha512::new();
        hasher.update(point.compress().as_bytes());
        hasher.update(message);
        let mut wide = [0u8; 64];
        wide.copy_from_slice(&hasher.finalize());
        DalekScalar::from_bytes_mod_order_wide(&wide)
    }

    fn scalar_from_seed(seed: &[u8]) -> Self::Scalar {
        let mut hasher = Sha512::new();
        hasher.update(b"treecosi-commit-scalar");
        hasher.update(seed);
        let digest = hasher.finalize();
        let mut rng_seed = [0u8; 32];
        rng_seed.copy_from_slice(&digest[..32]);
        let mut rng = ChaCha20Rng::from_seed(rng_seed);
        let mut wide = [0u8; 64];
        rng.fill_bytes(&mut wide);
        DalekScalar::from_bytes_mod_order_wide(&wide)
    }
}

/// Decodes a compressed Ristretto point previously produced by [`Suite::point_to_bytes`].
///
/// Used when rehydrating `MTRoot`-adjacent or wire-carried points; kept separate from the trait
/// since decoding is fallible and the trait's own methods are not.
pub fn decode_point(bytes: &[u8]) -> Option<RistrettoPoint> {
    if bytes.len() != 32 {
        return None;
    }
    let mut buf = [0u8; 32];
    buf.copy_from_slice(bytes);
    CompressedRistretto(buf).decompress()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_bytes_round_trip() {
        let v = RistrettoSuite::scalar_from_seed(b"round-trip");
        let point = RistrettoSuite::mul_base(&v);
        let bytes = RistrettoSuite::point_to_bytes(&point);
        assert_eq!(decode_point(&bytes), Some(point));
    }

    #[test]
    fn decode_point_rejects_wrong_length() {
        assert_eq!(decode_point(&[0u8; 31]), None);
    }
}
