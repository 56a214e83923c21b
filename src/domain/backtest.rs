//! Backtest engine.
//!
//! The run is a fold over the bar calendar: each date takes the previous
//! [`BookState`] and produces the next one plus exactly one [`EquityPoint`].
//! Per date the engine walks the same stages as the live desk
//! (signals, targets, reconcile) and then simulates fills at the close.
//! Any failure on a date aborts the whole run as [`DeskError::BacktestAborted`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveTime};

use super::bar_store::BarStore;
use super::cost::{self, CostModel};
use super::error::DeskError;
use super::metrics::{EquityPoint, PerformanceMetrics};
use super::order::{Trade, TradeStatus};
use super::portfolio::construct_targets;
use super::reconcile::reconcile;
use super::risk::RiskConfig;
use super::signal::{SignalGenerator, generate_signals};

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub risk: RiskConfig,
    pub cost: CostModel,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            risk: RiskConfig::default(),
            cost: CostModel::new(5.0),
        }
    }
}

/// Pipeline stage a date was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ConstructTargets,
    Reconcile,
    SimulateFills,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::ConstructTargets => "construct_targets",
            Stage::Reconcile => "reconcile",
            Stage::SimulateFills => "simulate_fills",
        };
        f.write_str(s)
    }
}

/// Simulated account carried from one date to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct BookState {
    pub cash: f64,
    pub holdings: BTreeMap<String, i64>,
    pub last_good_date: Option<NaiveDate>,
}

impl BookState {
    pub fn new(initial_capital: f64) -> Self {
        BookState {
            cash: initial_capital,
            holdings: BTreeMap::new(),
            last_good_date: None,
        }
    }

    /// Cash plus holdings marked at the last close on or before `date`.
    pub fn value(&self, store: &BarStore, date: NaiveDate) -> f64 {
        self.cash
            + self
                .holdings
                .iter()
                .map(|(symbol, qty)| {
                    *qty as f64 * store.mark_price(symbol, date).unwrap_or(0.0)
                })
                .sum::<f64>()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub final_state: BookState,
}

impl BacktestResult {
    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics::compute(&self.equity_curve, &self.trades)
    }
}

struct DayOutcome {
    state: BookState,
    point: EquityPoint,
    trades: Vec<Trade>,
}

/// Replay `generator` over every date in `store`.
///
/// Pure in `(store, symbols, config)`: no I/O and no shared state, so two runs
/// over the same input yield identical curves and trade logs.
pub fn run_backtest(
    store: &BarStore,
    symbols: &[String],
    generator: &dyn SignalGenerator,
    config: &BacktestConfig,
) -> Result<BacktestResult, DeskError> {
    let timeline = store.timeline();
    if timeline.is_empty() {
        return Err(DeskError::NoData {
            symbol: "all".to_string(),
        });
    }

    tracing::info!(
        symbols = symbols.len(),
        days = timeline.len(),
        first = %timeline[0],
        last = %timeline[timeline.len() - 1],
        strategy = generator.name(),
        "starting backtest"
    );

    let (state, equity_curve, trades) = timeline.iter().try_fold(
        (BookState::new(config.initial_capital), Vec::new(), Vec::new()),
        |(state, mut curve, mut trades), &date| {
            let last_good_date = state.last_good_date;
            let day = step(store, symbols, generator, config, state, date).map_err(
                |(stage, source)| {
                    tracing::error!(%date, %stage, error = %source, "backtest aborted");
                    DeskError::BacktestAborted {
                        date,
                        last_good_date,
                        source: Box::new(source),
                    }
                },
            )?;
            curve.push(day.point);
            trades.extend(day.trades);
            Ok::<_, DeskError>((day.state, curve, trades))
        },
    )?;

    tracing::info!(
        trades = trades.len(),
        final_value = equity_curve.last().map(|p| p.portfolio_value),
        "backtest complete"
    );

    Ok(BacktestResult {
        equity_curve,
        trades,
        final_state: state,
    })
}

fn step(
    store: &BarStore,
    symbols: &[String],
    generator: &dyn SignalGenerator,
    config: &BacktestConfig,
    mut state: BookState,
    date: NaiveDate,
) -> Result<DayOutcome, (Stage, DeskError)> {
    let value = state.value(store, date);

    let signals = generate_signals(generator, store, symbols.iter().map(String::as_str), date);

    let targets = construct_targets(&signals.longs(), &config.risk)
        .map_err(|e| (Stage::ConstructTargets, e))?;

    let priced: BTreeSet<&str> = symbols
        .iter()
        .map(String::as_str)
        .chain(state.holdings.keys().map(String::as_str))
        .collect();
    let prices: BTreeMap<String, f64> = priced
        .into_iter()
        .filter_map(|s| store.close_on(s, date).map(|p| (s.to_string(), p)))
        .collect();

    let mut rec = reconcile(&targets, &prices, value, &state.holdings);
    if !rec.rejected.is_empty() {
        return Err((Stage::Reconcile, rec.rejected.remove(0)));
    }

    let turnover = cost::turnover(&rec.orders, &prices);
    let day_cost = config.cost.cost(turnover);
    let timestamp = date.and_time(NaiveTime::MIN);

    let mut trades = Vec::with_capacity(rec.orders.len());
    for order in &rec.orders {
        let price = prices.get(&order.symbol).copied().ok_or_else(|| {
            (
                Stage::SimulateFills,
                DeskError::InvalidPrice {
                    symbol: order.symbol.clone(),
                    price: None,
                },
            )
        })?;
        let signed = order.signed_quantity();
        state.cash -= signed as f64 * price;
        let held = state.holdings.entry(order.symbol.clone()).or_insert(0);
        *held += signed;
        if *held == 0 {
            state.holdings.remove(&order.symbol);
        }
        trades.push(Trade {
            timestamp,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            fill_price: price,
            reference_price: price,
            signal_value: signals.get(&order.symbol),
            status: TradeStatus::Simulated,
        });
    }
    state.cash -= day_cost;
    state.last_good_date = Some(date);

    let point = EquityPoint {
        date,
        portfolio_value: state.value(store, date),
        turnover,
        cost: day_cost,
    };
    tracing::debug!(
        %date,
        value = point.portfolio_value,
        orders = trades.len(),
        longs = targets.len(),
        "backtest day"
    );

    Ok(DayOutcome {
        state,
        point,
        trades,
    })
}
