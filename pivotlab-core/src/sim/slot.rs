//! Position-slot state machine.
//!
//! The simulator holds one logical slot: flat, long, short, or mid-flip.
//! Every mapped signal runs through [`transition`], a pure function from
//! (stance, opposite-run length, incoming direction) to the next stance and
//! the action the simulator must carry out. Keeping the decision table here
//! makes the reversal rules testable without a price feed.

use serde::{Deserialize, Serialize};

use crate::domain::Direction;

/// What the slot currently holds. `Flipping` is the transient stance while
/// an opposite reversal closes the old position before opening the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotState {
    Flat,
    Long,
    Short,
    Flipping,
}

impl SlotState {
    pub fn of(direction: Direction) -> SlotState {
        match direction {
            Direction::Long => SlotState::Long,
            Direction::Short => SlotState::Short,
        }
    }

    fn holds_opposite_of(self, incoming: Direction) -> bool {
        match incoming {
            Direction::Long => self == SlotState::Short,
            Direction::Short => self == SlotState::Long,
        }
    }
}

/// What happens when the opposite-signal run reaches the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OppositePolicy {
    /// Close the held position and open one in the new direction.
    Flip,
    /// Close the held position and go flat.
    CloseOnly,
}

/// Reversal tuning: how many consecutive opposite signals it takes to act,
/// and what the action is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub opposite_threshold: u32,
    pub policy: OppositePolicy,
}

/// Slot stance plus the running count of consecutive opposite signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub state: SlotState,
    pub opposite_count: u32,
}

impl Slot {
    pub fn flat() -> Slot {
        Slot {
            state: SlotState::Flat,
            opposite_count: 0,
        }
    }
}

/// Side effects the simulator must apply after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAction {
    /// Open a position in the incoming direction, capacity permitting.
    Open,
    /// Below-threshold opposite signal: no side effects.
    Ignore,
    /// Threshold reached with [`OppositePolicy::Flip`]: close what is held,
    /// then open the incoming direction.
    CloseAndReverse,
    /// Threshold reached with [`OppositePolicy::CloseOnly`]: close and stay
    /// flat.
    CloseAll,
}

/// One step of the slot machine.
///
/// Same-direction signals reset the opposite run even when the caller ends
/// up dropping them for capacity. A slot caught mid-flip ignores input; the
/// simulator settles it with [`settle_flip`] in the same call.
pub fn transition(slot: Slot, incoming: Direction, config: &SlotConfig) -> (Slot, SlotAction) {
    let threshold = config.opposite_threshold.max(1);
    match slot.state {
        SlotState::Flat => (
            Slot {
                state: SlotState::of(incoming),
                opposite_count: 0,
            },
            SlotAction::Open,
        ),
        SlotState::Flipping => (slot, SlotAction::Ignore),
        held if held.holds_opposite_of(incoming) => {
            let run = slot.opposite_count + 1;
            if run < threshold {
                (
                    Slot {
                        state: held,
                        opposite_count: run,
                    },
                    SlotAction::Ignore,
                )
            } else {
                match config.policy {
                    OppositePolicy::Flip => (
                        Slot {
                            state: SlotState::Flipping,
                            opposite_count: 0,
                        },
                        SlotAction::CloseAndReverse,
                    ),
                    OppositePolicy::CloseOnly => (Slot::flat(), SlotAction::CloseAll),
                }
            }
        }
        held => (
            Slot {
                state: held,
                opposite_count: 0,
            },
            SlotAction::Open,
        ),
    }
}

/// Resolves a flip once the close half is done: the slot lands on the new
/// direction if the entry went through, otherwise flat.
pub fn settle_flip(opened: bool, direction: Direction) -> SlotState {
    if opened {
        SlotState::of(direction)
    } else {
        SlotState::Flat
    }
}
