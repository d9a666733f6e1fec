//! Fair price fusion and quoting

mod engine;
mod inventory;
pub mod kalman;
mod quote;
pub mod volatility;

pub use engine::{half_spread, FairPriceEngine};
pub use inventory::{FillSide, InventoryLedger};
pub use kalman::{Estimate, Measurement, NoiseModel, RecursiveEstimator};
pub use quote::FairQuote;
pub use volatility::{Ewma, VolatilityTracker};
