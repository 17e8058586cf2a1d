//! Multi-timeframe cascade confirmation.

mod manager;
mod window;

pub use manager::{
    CascadeConfig, CascadeError, CascadeManager, ConfirmationHorizon, PROXIMITY_MS,
};
pub use window::{CascadeExecution, CascadeWindow, Confirmation, WindowStatus};
