//! Order book snapshots and the market-order walker.

pub mod snapshot;
pub mod walker;

pub use snapshot::{BookSnapshot, Ladder, LadderLevel, Price, Side, Size, LADDER_DEPTH};
pub use walker::{estimate_slippage, slippage_profile, SlippageObservation, WalkError, FILL_EPSILON};
