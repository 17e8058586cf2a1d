//! Pivot — a confirmed local price extremum carrying a contrarian signal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which extreme a pivot marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PivotKind {
    High,
    Low,
}

impl PivotKind {
    /// The directional signal a pivot of this kind carries. Contrarian
    /// mapping: a confirmed high signals short, a confirmed low signals
    /// long.
    pub fn signal(self) -> Signal {
        match self {
            PivotKind::High => Signal::Short,
            PivotKind::Low => Signal::Long,
        }
    }
}

/// Directional trading signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Long,
    Short,
}

impl Signal {
    pub fn invert(self) -> Signal {
        match self {
            Signal::Long => Signal::Short,
            Signal::Short => Signal::Long,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Long => write!(f, "long"),
            Signal::Short => write!(f, "short"),
        }
    }
}

/// A swing pivot emitted by the detector at the candle index where it closed.
///
/// Immutable once created. `sequence_index` is the index within the
/// aggregated-candle sequence of the pivot's own timeframe; `swing_pct` is
/// the measured percentage excursion that passed the swing filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub kind: PivotKind,
    pub price: f64,
    pub time: i64,
    pub sequence_index: usize,
    pub signal: Signal,
    pub swing_pct: f64,
}

impl Pivot {
    pub fn new(kind: PivotKind, price: f64, time: i64, sequence_index: usize, swing_pct: f64) -> Self {
        Self {
            kind,
            price,
            time,
            sequence_index,
            signal: kind.signal(),
            swing_pct,
        }
    }
}
