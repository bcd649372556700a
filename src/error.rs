// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error types.
//!
//! Only cursor movement and the integrity pass report errors as values.
//! An [`UnrepresentableCollision`][Error::UnrepresentableCollision] is
//! raised as a panic from `put` and `get`, since no caller can repair it.

use thiserror::Error;

/// Everything that can go wrong inside a versioned map.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A cursor was moved after the map it reads from was changed.
    #[error("the map was modified after the cursor was created")]
    ConcurrentModification,

    /// The integrity pass found a trie that breaks its own invariants.
    #[error("structural integrity violation: {reason}")]
    StructuralIntegrityViolation {
        /// What the check found wrong.
        reason: String,
    },

    /// Two keys kept colliding through every available hash round.
    #[error("keys still collide after {rounds} hash rounds")]
    UnrepresentableCollision {
        /// The number of rounds tried.
        rounds: u32,
    },

    /// A cursor was driven in a way its protocol doesn't allow.
    #[error("illegal cursor state: {reason}")]
    IllegalCursorState {
        /// The move that was refused.
        reason: &'static str,
    },
}

impl Error {
    pub(crate) fn integrity(reason: impl Into<String>) -> Self {
        Error::StructuralIntegrityViolation {
            reason: reason.into(),
        }
    }
}

/// Result type with [`Error`] as the error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            "keys still collide after 500 hash rounds",
            Error::UnrepresentableCollision { rounds: 500 }.to_string()
        );
        assert_eq!(
            "structural integrity violation: orphan",
            Error::integrity("orphan").to_string()
        );
        assert_eq!(
            "illegal cursor state: moved a terminated cursor",
            Error::IllegalCursorState {
                reason: "moved a terminated cursor"
            }
            .to_string()
        );
    }
}
