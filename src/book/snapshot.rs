//! Book Snapshot Model
//!
//! Validated, immutable representation of one point-in-time limit order book
//! read from a historical snapshot table. Every numeric field is optional:
//! a missing or unparseable cell is `None`, never a coerced zero.
//!
//! Ladders are stored exactly as the data source ranks them (ask ascending,
//! bid descending). Nothing in this crate re-sorts a ladder.

use serde::{Deserialize, Serialize};

/// Maximum number of ranked levels per ladder in this domain.
pub const LADDER_DEPTH: usize = 10;

pub type Price = f64;
pub type Size = f64;

/// Order side of a simulated market order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "b" => Ok(Side::Buy),
            "sell" | "s" => Ok(Side::Sell),
            other => Err(format!("Invalid side '{}'. Use 'buy' or 'sell'.", other)),
        }
    }
}

/// One ranked ladder entry as read from the source.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LadderLevel {
    pub price: Option<Price>,
    pub size: Option<Size>,
}

impl LadderLevel {
    pub fn new(price: Price, size: Size) -> Self {
        Self {
            price: Some(price),
            size: Some(size),
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }

    /// Price and size when both are present and finite.
    #[inline]
    pub fn usable(&self) -> Option<(Price, Size)> {
        match (self.price, self.size) {
            (Some(p), Some(s)) if p.is_finite() && s.is_finite() => Some((p, s)),
            _ => None,
        }
    }
}

/// Ranked sequence of levels on one side of the book, best first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ladder {
    levels: Vec<LadderLevel>,
}

impl Ladder {
    /// Build a ladder from levels in rank order. Levels beyond
    /// [`LADDER_DEPTH`] are dropped.
    pub fn from_levels(mut levels: Vec<LadderLevel>) -> Self {
        levels.truncate(LADDER_DEPTH);
        Self { levels }
    }

    /// Convenience constructor from `(price, size)` pairs in rank order.
    pub fn from_pairs(pairs: &[(Price, Size)]) -> Self {
        Self::from_levels(pairs.iter().map(|&(p, s)| LadderLevel::new(p, s)).collect())
    }

    pub fn levels(&self) -> &[LadderLevel] {
        &self.levels
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Total displayed size across usable levels.
    pub fn total_size(&self) -> Size {
        self.levels
            .iter()
            .filter_map(LadderLevel::usable)
            .map(|(_, s)| s.max(0.0))
            .sum()
    }
}

/// Point-in-time book state for one instrument.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    /// Ascending by price.
    pub asks: Ladder,
    /// Descending by price.
    pub bids: Ladder,
}

impl BookSnapshot {
    pub fn new(best_bid: Option<Price>, best_ask: Option<Price>, asks: Ladder, bids: Ladder) -> Self {
        Self {
            best_bid,
            best_ask,
            asks,
            bids,
        }
    }

    /// Snapshot whose best quotes are the top level of each ladder.
    pub fn from_ladders(asks: Ladder, bids: Ladder) -> Self {
        let best_ask = asks.levels().first().and_then(|l| l.price);
        let best_bid = bids.levels().first().and_then(|l| l.price);
        Self::new(best_bid, best_ask, asks, bids)
    }

    /// Mid-price when both best quotes are present and finite.
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid, self.best_ask) {
            (Some(b), Some(a)) if b.is_finite() && a.is_finite() => Some((b + a) / 2.0),
            _ => None,
        }
    }

    /// Ladder a market order on `side` consumes: buys lift asks, sells hit bids.
    #[inline]
    pub fn ladder_for(&self, side: Side) -> &Ladder {
        match side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        }
    }

    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid, self.best_ask), (Some(b), Some(a)) if b > a)
    }
}
