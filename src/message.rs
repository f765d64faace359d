/*!
Wire messages (§6 "Wire messages", §9 "Tagged-union messages").

The source represents a frame as one record with many optional fields, populated according to a
separate type tag. Here each kind carries only the fields it needs, so a [`Commitment`] can never
be constructed without a `v_hat`, and matching on [`Payload`] is exhaustive instead of requiring
callers to check the tag before trusting the fields (§9 REDESIGN FLAGS).
*/

use serde::{Deserialize, Serialize};

use crate::identity::NodeName;
use crate::merkle::{MerkleRoot, Proof as MerkleProof};
use crate::round::{ExceptionList, RoundNumber};
use crate::suite::Suite;
use crate::view::ViewNumber;

/// An Announcement carries no payload of its own: the message-to-sign lives in the root's log,
/// not on the wire (§6 "Announcement payload is opaque").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement;

/// Sent up from a child to its parent once Commit aggregation finishes (§4.3 step 7).
#[derive_where::derive_where(Debug, Clone)]
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Commitment<S: Suite> {
    pub v: S::Point,
    pub v_hat: S::Point,
    pub x_hat: S::Point,
    pub mt_root: Option<MerkleRoot>,
    pub exception_list: ExceptionList<S>,
}

/// Sent down from a parent to a child to start Challenge/Respond (§4.4, §4.5).
#[derive_where::derive_where(Debug, Clone)]
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Challenge<S: Suite> {
    pub c: S::Scalar,
    pub mt_root: Option<MerkleRoot>,
    pub proof: Option<MerkleProof>,
}

/// Sent up from a child to its parent once Respond aggregation finishes (§4.6 step 8).
#[derive_where::derive_where(Debug, Clone)]
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Response<S: Suite> {
    pub r_hat: S::Scalar,
    pub exception_list: ExceptionList<S>,
    pub exception_v_hat: S::Point,
    pub exception_x_hat: S::Point,
}

/// A synthetic stand-in for a child that did not respond in time, used so exception accounting
/// is uniform whether a child was silent or explicitly declined (§4.6 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Default;

/// Carries a child's propagated failure upward; logged at the receiver but does not itself abort
/// the phase (§4.1, §7 propagation policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub message: String,
}

/// Names the sender as the new parent and carries the view it is taking effect in (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewChange {
    pub new_view: ViewNumber,
}

/// The type-specific payload of a frame; the tag and the payload can never disagree, unlike the
/// source's record-with-optional-fields shape.
#[derive_where::derive_where(Debug, Clone)]
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub enum Payload<S: Suite> {
    Announcement(Announcement),
    Commitment(Commitment<S>),
    Challenge(Challenge<S>),
    Response(Response<S>),
    Default(Default),
    Error(Error),
    ViewChange(ViewChange),
}

impl<S: Suite> Payload<S> {
    /// A short, stable name for logging (§10): never includes scalar/point contents.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Announcement(_) => "announcement",
            Payload::Commitment(_) => "commitment",
            Payload::Challenge(_) => "challenge",
            Payload::Response(_) => "response",
            Payload::Default(_) => "default",
            Payload::Error(_) => "error",
            Payload::ViewChange(_) => "view_change",
        }
    }
}

/// A framed message as delivered by the transport: sender, the view it was sent under, the round
/// it belongs to, and the payload (§4.1).
///
/// `round` is meaningless for [`Payload::ViewChange`] (view changes are not round-scoped) but is
/// still present so the envelope shape stays uniform; routers should ignore it for that variant.
#[derive_where::derive_where(Debug, Clone)]
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Frame<S: Suite> {
    pub from: NodeName,
    pub view: ViewNumber,
    pub round: RoundNumber,
    pub payload: Payload<S>,
}

impl<S: Suite> Frame<S> {
    pub fn new(from: impl Into<NodeName>, view: ViewNumber, round: RoundNumber, payload: Payload<S>) -> Self {
        Self {
            from: from.into(),
            view,
            round,
            payload,
        }
    }
}
