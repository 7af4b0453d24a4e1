use crate::constants::MAX_COUNTER;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Rolling message number shared by every exchange of a session.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    number: Mutex<u8>,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current message number
    pub fn get_number(&self) -> u8 {
        *self.number.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `to` modulo [`MAX_COUNTER`]
    pub fn advance(&self, to: u8) {
        let mut number = self.number.lock().unwrap_or_else(PoisonError::into_inner);
        let old = *number;
        *number = to % MAX_COUNTER;
        debug!("old_msg_number={} new_msg_number={}", old, *number);
    }

    pub fn reset(&self) {
        self.advance(0);
    }
}
