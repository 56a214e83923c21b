//! Position reconciliation: target weights versus current holdings.
//!
//! Used unchanged by both the backtest engine and the live runner.

use std::collections::{BTreeMap, BTreeSet};

use super::error::DeskError;
use super::order::{Order, Side};
use super::portfolio::TargetWeights;
use super::position::Position;

/// Round half up on a non-negative share count: 2.5 -> 3, 2.4999 -> 2.
/// Negative input clamps to 0 (long-only).
pub fn round_half_up(raw: f64) -> i64 {
    if !raw.is_finite() || raw <= 0.0 {
        return 0;
    }
    let floor = raw.floor();
    let shares = if raw - floor >= 0.5 { floor + 1.0 } else { floor };
    shares as i64
}

/// Whole shares worth `portfolio_value * weight` at `price`.
pub fn target_shares(portfolio_value: f64, weight: f64, price: f64) -> i64 {
    round_half_up(portfolio_value * weight / price)
}

fn valid_price(price: Option<f64>) -> Option<f64> {
    price.filter(|p| p.is_finite() && *p > 0.0)
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    /// One order per symbol with a nonzero delta, sorted by symbol.
    pub orders: Vec<Order>,
    pub target_shares: BTreeMap<String, i64>,
    /// Symbols that needed an order but had no usable reference price.
    pub rejected: Vec<DeskError>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Current share counts keyed by symbol.
pub fn holdings_from(positions: &[Position]) -> BTreeMap<String, i64> {
    let mut holdings = BTreeMap::new();
    for p in positions {
        *holdings.entry(p.symbol.clone()).or_insert(0) += p.quantity;
    }
    holdings
}

/// Diff `targets` against `holdings` over the union of both symbol sets.
///
/// Symbols held but absent from `targets` are liquidated. A symbol with an
/// unchanged share count never produces an order and never needs a price.
pub fn reconcile(
    targets: &TargetWeights,
    prices: &BTreeMap<String, f64>,
    portfolio_value: f64,
    holdings: &BTreeMap<String, i64>,
) -> Reconciliation {
    let symbols: BTreeSet<&str> = targets
        .weights
        .keys()
        .map(String::as_str)
        .chain(
            holdings
                .iter()
                .filter(|(_, q)| **q != 0)
                .map(|(s, _)| s.as_str()),
        )
        .collect();

    let mut out = Reconciliation::default();

    for symbol in symbols {
        let weight = targets.weight(symbol);
        let current = holdings.get(symbol).copied().unwrap_or(0);
        let price = valid_price(prices.get(symbol).copied());

        let target = match price {
            Some(p) => target_shares(portfolio_value, weight, p),
            // Without a price a zero target is still exact; anything else is unknown.
            None if weight == 0.0 => 0,
            None => {
                out.rejected.push(DeskError::InvalidPrice {
                    symbol: symbol.to_string(),
                    price: prices.get(symbol).copied(),
                });
                continue;
            }
        };
        out.target_shares.insert(symbol.to_string(), target);

        let delta = target - current;
        if delta == 0 {
            continue;
        }
        if price.is_none() {
            out.target_shares.remove(symbol);
            out.rejected.push(DeskError::InvalidPrice {
                symbol: symbol.to_string(),
                price: prices.get(symbol).copied(),
            });
            continue;
        }

        let side = if delta > 0 { Side::Buy } else { Side::Sell };
        out.orders
            .push(Order::market(symbol, side, delta.unsigned_abs()));
    }

    out
}
