//! Domain types shared across the engine.

pub mod candle;
pub mod ids;
pub mod pivot;
pub mod timeframe;
pub mod trade;

pub use candle::{Candle, MINUTE_MS};
pub use ids::{TradeId, WindowId};
pub use pivot::{Pivot, PivotKind, Signal};
pub use timeframe::{PriceMode, TimeframeConfig, TimeframeRole};
pub use trade::{Direction, ExitReason, Trade, TradeStatus, TrailingState};
