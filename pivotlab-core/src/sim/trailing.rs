//! Trailing exit levels.
//!
//! A trail arms once the open profit reaches `trigger_pct`, then follows the
//! price at `distance_pct`. Levels only ratchet in the trade's favor, so a
//! pullback through the level is what fires the exit.

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, TrailingState};

/// Arming threshold and trail distance, both in percent of price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingConfig {
    pub trigger_pct: f64,
    pub distance_pct: f64,
}

/// Level a trail at `price` implies: below price for longs, above for shorts.
fn trail_level(direction: Direction, price: f64, distance_pct: f64) -> f64 {
    match direction {
        Direction::Long => price * (1.0 - distance_pct / 100.0),
        Direction::Short => price * (1.0 + distance_pct / 100.0),
    }
}

/// Advance a trail with the latest close. `profit_pct` is the unleveraged
/// favorable move since entry.
pub fn update(
    state: &mut TrailingState,
    config: &TrailingConfig,
    direction: Direction,
    profit_pct: f64,
    price: f64,
) {
    if !state.armed {
        if profit_pct >= config.trigger_pct {
            state.armed = true;
            state.level = Some(trail_level(direction, price, config.distance_pct));
        }
        return;
    }
    let candidate = trail_level(direction, price, config.distance_pct);
    state.level = Some(match state.level {
        Some(level) => match direction {
            Direction::Long => level.max(candidate),
            Direction::Short => level.min(candidate),
        },
        None => candidate,
    });
}

/// True when an armed trail has been pulled back through.
pub fn triggered(state: &TrailingState, direction: Direction, price: f64) -> bool {
    if !state.armed {
        return false;
    }
    match (state.level, direction) {
        (Some(level), Direction::Long) => price <= level,
        (Some(level), Direction::Short) => price >= level,
        (None, _) => false,
    }
}
