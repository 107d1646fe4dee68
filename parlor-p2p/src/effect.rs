//! Side effects requested by the state machines.
//!
//! The lobby machines never touch the transport. They queue effects; the
//! session facade drains the queue, stamps envelopes and performs the sends,
//! closes and teardowns. Tests read the queue directly.

use crate::events::{CloseReason, SessionEvent};
use crate::peer::PeerId;
use parlor_core::message::MessageKind;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Effect {
    Send { to: PeerId, kind: MessageKind },
    Close { peer: PeerId },
    Event(SessionEvent),
    Teardown(CloseReason),
}
