//! Book Walker
//!
//! Estimates the slippage of a hypothetical market order by sweeping one
//! side of a book snapshot from the best ranked level outward.
//!
//! # Execution Model
//!
//! For a buy order:
//! - Sweep the ask ladder in rank order (ascending price)
//! - At each level: fill_size = min(remaining, level_size)
//! - Stop as soon as the order is filled
//!
//! For a sell order the bid ladder is swept the same way (descending price).
//!
//! Levels whose price or size is missing are skipped, not treated as zero
//! liquidity. If the ladder runs out before the order is filled the result
//! is [`WalkError::InsufficientLiquidity`]: there is no partial-fill slippage.
//!
//! The walker is a pure function over borrowed data and holds no state, so it
//! can be called concurrently.

use super::snapshot::{BookSnapshot, Price, Side, Size};
use serde::{Deserialize, Serialize};

/// Remaining size below this is treated as filled.
pub const FILL_EPSILON: Size = 1e-9;

/// Why a (snapshot, size) pair has no slippage value.
#[derive(Debug, Clone, PartialEq)]
pub enum WalkError {
    /// Best bid or best ask is absent or non-numeric.
    MissingQuote,
    /// Displayed depth cannot cover the requested size.
    InsufficientLiquidity { requested: Size, filled: Size },
    /// Target size is not a positive finite quantity.
    InvalidSize(Size),
}

impl std::fmt::Display for WalkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingQuote => write!(f, "missing best bid/ask"),
            Self::InsufficientLiquidity { requested, filled } => write!(
                f,
                "insufficient liquidity: requested {}, book supplies {}",
                requested, filled
            ),
            Self::InvalidSize(size) => write!(f, "invalid target size: {}", size),
        }
    }
}

impl std::error::Error for WalkError {}

/// Result of walking the book for one target size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlippageObservation {
    pub side: Side,
    /// Average of best bid and best ask.
    pub mid_price: Price,
    pub requested_size: Size,
    pub filled_size: Size,
    /// Volume-weighted average fill price.
    pub avg_fill_price: Price,
    /// Total notional paid (buy) or received (sell).
    pub notional: f64,
    /// avg - mid for buys, mid - avg for sells. Positive = unfavorable.
    pub slippage: f64,
    /// Number of levels that contributed a fill.
    pub levels_swept: usize,
}

/// Walk `snapshot` for a `side` market order of `target_size` units.
pub fn estimate_slippage(
    snapshot: &BookSnapshot,
    side: Side,
    target_size: Size,
) -> Result<SlippageObservation, WalkError> {
    if !(target_size.is_finite() && target_size > 0.0) {
        return Err(WalkError::InvalidSize(target_size));
    }
    let mid_price = snapshot.mid_price().ok_or(WalkError::MissingQuote)?;

    let mut remaining = target_size;
    let mut notional = 0.0;
    // Fill-fraction weighted price: a single fully-consumed level yields its
    // price exactly rather than (size * price) / size.
    let mut avg_fill_price = 0.0;
    let mut levels_swept = 0;

    for level in snapshot.ladder_for(side).levels() {
        if remaining <= FILL_EPSILON {
            break;
        }
        let Some((price, available)) = level.usable() else {
            continue;
        };
        if available <= 0.0 {
            continue;
        }

        let filled = remaining.min(available);
        notional += filled * price;
        avg_fill_price += price * (filled / target_size);
        remaining -= filled;
        levels_swept += 1;
    }

    if remaining > FILL_EPSILON {
        return Err(WalkError::InsufficientLiquidity {
            requested: target_size,
            filled: target_size - remaining,
        });
    }

    let slippage = match side {
        Side::Buy => avg_fill_price - mid_price,
        Side::Sell => mid_price - avg_fill_price,
    };

    Ok(SlippageObservation {
        side,
        mid_price,
        requested_size: target_size,
        filled_size: target_size,
        avg_fill_price,
        notional,
        slippage,
        levels_swept,
    })
}

/// Walk the same snapshot for every size, in order. `None` marks an
/// undefined observation.
pub fn slippage_profile(snapshot: &BookSnapshot, side: Side, sizes: &[Size]) -> Vec<Option<f64>> {
    // A missing quote undefines every size; skip the per-size walks.
    if snapshot.mid_price().is_none() {
        return vec![None; sizes.len()];
    }
    sizes
        .iter()
        .map(|&size| estimate_slippage(snapshot, side, size).ok().map(|o| o.slippage))
        .collect()
}
