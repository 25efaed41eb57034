use serde::{Deserialize, Serialize};

/// Active locomotion mode of a [`CharacterMovement`](super::CharacterMovement).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementMode {
    /// Not simulated until the provider expresses intent.
    #[default]
    None,
    Walking,
    /// Reserved for navmesh-driven walking; simulated like `None` but counts as grounded.
    NavWalking,
    Falling,
}

impl MovementMode {
    #[inline]
    pub fn is_moving_on_ground(self) -> bool {
        matches!(self, MovementMode::Walking | MovementMode::NavWalking)
    }

    #[inline]
    pub fn is_falling(self) -> bool {
        self == MovementMode::Falling
    }
}
