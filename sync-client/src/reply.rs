//! Single-slot registration for the one outstanding reply.
//!
//! The slot is armed before a request goes out, filled when the matching
//! reply arrives, and emptied when the resulting action is taken or the
//! connection goes away. Anything arriving while the slot is not waiting is
//! a stray and is never applied.

use cmdsync_core::{reply_action, AckPolicy, Action, AwaitedReply, ReplyRejection};
use cmdsync_types::InboundMessage;
use thiserror::Error;

/// Why a reply was not accepted into the slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    /// Nothing is waiting for a reply.
    #[error("no request outstanding")]
    Stray,

    /// A reply is already held and not yet applied.
    #[error("a reply is already pending")]
    AlreadyFilled,

    /// The reply does not answer the outstanding request.
    #[error(transparent)]
    Rejected(#[from] ReplyRejection),
}

#[derive(Debug, Clone, Default, PartialEq)]
enum SlotState {
    #[default]
    Idle,
    Waiting(AwaitedReply),
    Ready(Action),
}

/// The one-shot reply continuation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplySlot {
    state: SlotState,
}

impl ReplySlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for `expected`. Replaces anything previously registered.
    pub fn arm(&mut self, expected: AwaitedReply) {
        self.state = SlotState::Waiting(expected);
    }

    /// Offer a reply.
    ///
    /// On success the slot holds the resulting action until [`take`] is
    /// called. A rejected reply leaves the slot waiting.
    ///
    /// [`take`]: ReplySlot::take
    pub fn fire(&mut self, reply: InboundMessage, policy: AckPolicy) -> Result<(), SlotError> {
        match &self.state {
            SlotState::Idle => Err(SlotError::Stray),
            SlotState::Ready(_) => Err(SlotError::AlreadyFilled),
            SlotState::Waiting(expected) => {
                let action = reply_action(expected, reply, policy)?;
                self.state = SlotState::Ready(action);
                Ok(())
            }
        }
    }

    /// Take the ready action, emptying the slot.
    pub fn take(&mut self) -> Option<Action> {
        match std::mem::take(&mut self.state) {
            SlotState::Ready(action) => Some(action),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Discard whatever is registered without firing it.
    pub fn cancel(&mut self) {
        self.state = SlotState::Idle;
    }

    /// True when nothing is registered.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, SlotState::Idle)
    }

    /// True while a reply is outstanding.
    pub fn is_waiting(&self) -> bool {
        matches!(self.state, SlotState::Waiting(_))
    }

    /// True when a reply arrived and its action has not been taken.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, SlotState::Ready(_))
    }
}
