/*!
The transport interface (§6 "Transport (consumed)").

Opening connections, framing, and routing bytes to a parent or child are explicitly out of scope
for the core (§1); this module only defines the narrow async interface the router and phase
engine consume, in the same request/response-free, stream-oriented shape as the source's
`(message, sender, err)` tuple stream.
*/

use std::collections::BTreeMap;

use crate::identity::NodeName;
use crate::message::Frame;
use crate::suite::Suite;
use crate::view::ViewNumber;

/// Errors the router must distinguish when pumping the transport (§6, §7 "Transport").
#[derive(displaydoc::Display, Debug, Clone)]
pub enum TransportError {
    /// the connection to {0} is not yet established
    NotEstablished(NodeName),
    /// the connection to {0} was closed
    ConnectionClosed(NodeName),
    /// the transport reached end-of-stream
    EndOfStream,
}

impl TransportError {
    /// Transient errors are skipped by the router rather than terminating it (§4.1, §7).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotEstablished(_) | Self::ConnectionClosed(_))
    }
}

impl std::error::Error for TransportError {}

/// The transport endpoint a node's router and phase engine consume: a duplex stream of framed
/// messages plus send primitives toward specific peers (§6).
#[async_trait::async_trait]
pub trait Transport<S: Suite>: Send + Sync {
    /// Blocks until the next inbound frame, or a transport error.
    async fn recv(&self) -> Result<Frame<S>, TransportError>;

    /// Sends `msg` up to the current parent under `view`.
    async fn put_up(&self, view: ViewNumber, msg: Frame<S>) -> Result<(), TransportError>;

    /// Sends one message per child under `view`; `msgs` maps child name to the message meant for
    /// that child (callers needing an identical broadcast to every child pass the same payload
    /// cloned into each entry).
    async fn put_down(&self, view: ViewNumber, msgs: BTreeMap<NodeName, Frame<S>>) -> Result<(), TransportError>;

    /// Sends an Error frame up to the current parent (§6 `PutUpError`).
    async fn put_up_error(&self, view: ViewNumber, round: crate::round::RoundNumber, message: String) -> Result<(), TransportError>;
}
