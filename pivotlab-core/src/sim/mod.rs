//! Trade simulation: signals in, closed trades and final capital out.

pub mod config;
pub mod funding;
pub mod sizing;
pub mod slippage;
pub mod slot;
pub mod trailing;

mod simulator;

pub use config::{DirectionPolicy, SimulatorConfig, SimulatorError};
pub use funding::{FundingConfig, FundingTracker};
pub use simulator::TradeSimulator;
pub use sizing::SizingMode;
pub use slippage::SlippageModel;
pub use slot::{OppositePolicy, Slot, SlotAction, SlotConfig, SlotState};
pub use trailing::TrailingConfig;
