//! Epoch fence for inbound service events.
//!
//! Every session attempt runs under its own epoch. Commands carry the epoch
//! they were issued under and the service echoes it back on the results it
//! produces. Once the controller moves to a newer epoch, anything still in
//! flight for the old one is dropped without touching session state.

use shared::domain::Epoch;

/// True iff an event produced under `event_epoch` may be applied while the
/// controller is at `current`.
pub fn accept(event_epoch: Epoch, current: Epoch) -> bool {
    event_epoch == current
}

#[derive(Debug, Default)]
pub struct EpochGuard {
    current: Epoch,
}

impl EpochGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Epoch {
        self.current
    }

    /// Epoch the next session start would run under. Does not advance.
    pub fn peek_next(&self) -> Epoch {
        self.current.next()
    }

    /// Moves to the next epoch and returns it. Must be called in the same turn
    /// as the command that supersedes the old session.
    pub fn advance(&mut self) -> Epoch {
        self.current = self.current.next();
        self.current
    }

    pub fn accepts(&self, event_epoch: Epoch) -> bool {
        accept(event_epoch, self.current)
    }
}
