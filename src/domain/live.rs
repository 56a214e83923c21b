//! Live decision runner.
//!
//! One invocation runs the pipeline once against the broker's current
//! positions and the latest daily bars. Per-symbol problems (no data, short
//! history, bad price, rejected order) are logged and isolated; a broker or
//! data outage, a risk violation or a sink failure ends the run.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::NaiveDateTime;

use super::cost::{self, CostModel};
use super::error::DeskError;
use super::ohlcv::HistoryRequest;
use super::order::{Order, OrderType, Trade, TradeStatus};
use super::portfolio::{TargetWeights, construct_targets};
use super::position::Position;
use super::reconcile::{holdings_from, reconcile};
use super::risk::RiskConfig;
use super::signal::{SignalGenerator, SignalValue, latest_signal};
use super::snapshot::{PortfolioSnapshot, PositionRow, SnapshotHistory, position_rows};
use crate::ports::broker_port::BrokerPort;
use crate::ports::data_port::DataPort;
use crate::ports::record_port::RecordPort;

#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub risk: RiskConfig,
    pub cost: CostModel,
    pub order_type: OrderType,
    pub fill_timeout: Duration,
    pub dry_run: bool,
    pub history: HistoryRequest,
}

/// Everything a single live run decided and did.
#[derive(Debug)]
pub struct LiveOutcome {
    pub timestamp: NaiveDateTime,
    pub signals: BTreeMap<String, SignalValue>,
    pub targets: TargetWeights,
    pub target_shares: BTreeMap<String, i64>,
    pub orders: Vec<Order>,
    pub trades: Vec<Trade>,
    pub positions: Vec<Position>,
    pub snapshot: PortfolioSnapshot,
    /// Notional of the orders computed this run, at reference prices.
    pub turnover: f64,
    pub estimated_cost: f64,
    /// Symbols left out of the decision (no data, short history).
    pub skipped: Vec<DeskError>,
    /// Orders that could not be priced or were rejected by the broker.
    pub failures: Vec<DeskError>,
}

impl LiveOutcome {
    pub fn fills(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.status == TradeStatus::Filled)
    }
}

struct MarketView {
    closes: BTreeMap<String, f64>,
    signals: BTreeMap<String, SignalValue>,
    skipped: Vec<DeskError>,
}

fn gather_market(
    data: &dyn DataPort,
    generator: &dyn SignalGenerator,
    universe: &[String],
    held: &BTreeSet<String>,
    request: &HistoryRequest,
) -> Result<MarketView, DeskError> {
    let in_universe: BTreeSet<&str> = universe.iter().map(String::as_str).collect();
    let priced: BTreeSet<&str> = in_universe
        .iter()
        .copied()
        .chain(held.iter().map(String::as_str))
        .collect();

    let mut view = MarketView {
        closes: BTreeMap::new(),
        signals: BTreeMap::new(),
        skipped: Vec::new(),
    };

    for symbol in priced {
        tracing::info!(symbol, duration = %request.duration, "fetching bars");
        let bars = match data.fetch_bars(symbol, request) {
            Ok(bars) => bars,
            Err(e) if e.is_symbol_local() => {
                tracing::warn!(symbol, error = %e, "skipping symbol");
                view.skipped.push(e);
                continue;
            }
            Err(e) => return Err(e),
        };

        let Some(last) = bars.last() else {
            tracing::warn!(symbol, "no data, skipping");
            view.skipped.push(DeskError::NoData {
                symbol: symbol.to_string(),
            });
            continue;
        };
        view.closes.insert(symbol.to_string(), last.close);

        if !in_universe.contains(symbol) {
            continue;
        }
        match latest_signal(generator, symbol, &bars) {
            Ok(signal) => {
                view.signals.insert(symbol.to_string(), signal);
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "no signal, skipping");
                view.skipped.push(e);
            }
        }
    }

    Ok(view)
}

/// Run one live decision cycle.
///
/// `prior` is the snapshot history from earlier runs; the new snapshot's
/// P&L is computed against it and appended to `records`.
#[allow(clippy::too_many_arguments)]
pub fn run_live(
    data: &dyn DataPort,
    broker: &dyn BrokerPort,
    records: &dyn RecordPort,
    generator: &dyn SignalGenerator,
    universe: &[String],
    config: &LiveConfig,
    prior: &SnapshotHistory,
    now: NaiveDateTime,
) -> Result<LiveOutcome, DeskError> {
    let positions = broker.fetch_positions()?;
    let holdings = holdings_from(&positions);
    let held: BTreeSet<String> = holdings
        .iter()
        .filter(|(_, q)| **q != 0)
        .map(|(s, _)| s.clone())
        .collect();

    let market = gather_market(data, generator, universe, &held, &config.history)?;

    let longs: Vec<&str> = market
        .signals
        .iter()
        .filter(|(_, s)| s.is_long())
        .map(|(sym, _)| sym.as_str())
        .collect();
    let targets = construct_targets(&longs, &config.risk).inspect_err(|e| {
        tracing::error!(error = %e, "risk validation failed");
    })?;

    let portfolio_value = broker.portfolio_value()?;
    let rec = reconcile(&targets, &market.closes, portfolio_value, &holdings);
    let mut failures = rec.rejected;
    for e in &failures {
        tracing::warn!(error = %e, "order skipped");
    }

    let turnover = cost::turnover(&rec.orders, &market.closes);
    let estimated_cost = config.cost.cost(turnover);
    tracing::info!(
        portfolio_value,
        longs = longs.len(),
        per_name = targets.per_name,
        orders = rec.orders.len(),
        estimated_cost,
        dry_run = config.dry_run,
        "live decision"
    );

    let mut orders = Vec::with_capacity(rec.orders.len());
    let mut trades = Vec::with_capacity(rec.orders.len());
    for order in rec.orders {
        let reference_price = market.closes.get(&order.symbol).copied().unwrap_or(0.0);
        let order = order.with_type(config.order_type, reference_price);
        let signal_value = market
            .signals
            .get(&order.symbol)
            .copied()
            .unwrap_or(SignalValue::Flat);
        let record = |fill_price: f64, status: TradeStatus| Trade {
            timestamp: now,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            fill_price,
            reference_price,
            signal_value,
            status,
        };

        if config.dry_run {
            tracing::info!(symbol = %order.symbol, side = %order.side, quantity = order.quantity, "dry run order");
            trades.push(record(0.0, TradeStatus::DryRun));
            orders.push(order);
            continue;
        }

        match broker.submit_order(&order, config.fill_timeout) {
            Ok(fill) if fill.filled => {
                tracing::info!(
                    symbol = %order.symbol,
                    side = %order.side,
                    quantity = fill.filled_quantity,
                    price = fill.avg_price,
                    "filled"
                );
                trades.push(Trade {
                    quantity: fill.filled_quantity,
                    ..record(fill.avg_price, TradeStatus::Filled)
                });
            }
            Ok(fill) => {
                tracing::warn!(
                    symbol = %order.symbol,
                    side = %order.side,
                    quantity = order.quantity,
                    timeout_secs = config.fill_timeout.as_secs(),
                    "order not filled within timeout"
                );
                trades.push(record(fill.avg_price, TradeStatus::Unfilled));
            }
            Err(e) => {
                tracing::error!(
                    symbol = %order.symbol,
                    side = %order.side,
                    quantity = order.quantity,
                    error = %e,
                    "order failed"
                );
                trades.push(record(0.0, TradeStatus::Failed));
                failures.push(e);
            }
        }
        orders.push(order);
    }

    if config.dry_run {
        tracing::info!(orders = orders.len(), "dry run: no orders placed");
    }
    records.append_trades(&trades)?;

    let positions = if config.dry_run {
        positions
    } else {
        broker.fetch_positions()?
    };
    let rows: Vec<PositionRow> = position_rows(now, &positions, &market.closes);
    records.append_positions(&rows)?;

    let value_after = broker.portfolio_value()?;
    let snapshot = prior.next(now, value_after);
    records.append_snapshot(&snapshot)?;

    Ok(LiveOutcome {
        timestamp: now,
        signals: market.signals,
        targets,
        target_shares: rec.target_shares,
        orders,
        trades,
        positions,
        snapshot,
        turnover,
        estimated_cost,
        skipped: market.skipped,
        failures,
    })
}
