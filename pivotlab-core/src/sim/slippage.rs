//! Slippage simulation. Fills always move against the trader.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::Direction;

/// How entry slippage is drawn. Exits reuse half of the entry magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlippageModel {
    /// Frictionless fills (ideal case).
    None,

    /// Constant percentage of the reference price.
    Fixed { pct: f64 },

    /// Uniform random draw in [0, max_pct), from the simulator's seeded RNG
    /// so runs stay reproducible.
    Variable { max_pct: f64 },

    /// Linear size impact: base_pct + impact_coefficient * size/reference_size.
    MarketImpact {
        base_pct: f64,
        impact_coefficient: f64,
        reference_size: f64,
    },
}

impl SlippageModel {
    /// Entry slippage magnitude in percent for a position of `size`.
    pub fn entry_pct(&self, size: f64, rng: &mut StdRng) -> f64 {
        let pct = match *self {
            SlippageModel::None => 0.0,
            SlippageModel::Fixed { pct } => pct,
            SlippageModel::Variable { max_pct } => {
                if max_pct > 0.0 {
                    rng.gen_range(0.0..max_pct)
                } else {
                    0.0
                }
            }
            SlippageModel::MarketImpact {
                base_pct,
                impact_coefficient,
                reference_size,
            } => {
                if reference_size > 0.0 {
                    base_pct + impact_coefficient * (size / reference_size)
                } else {
                    base_pct
                }
            }
        };
        pct.max(0.0)
    }
}

/// Entry fill: a long pays up, a short sells down.
pub fn entry_fill(direction: Direction, reference: f64, pct: f64) -> f64 {
    match direction {
        Direction::Long => reference * (1.0 + pct / 100.0),
        Direction::Short => reference * (1.0 - pct / 100.0),
    }
}

/// Exit fill: a long sells down, a short buys up.
pub fn exit_fill(direction: Direction, reference: f64, pct: f64) -> f64 {
    match direction {
        Direction::Long => reference * (1.0 - pct / 100.0),
        Direction::Short => reference * (1.0 + pct / 100.0),
    }
}
