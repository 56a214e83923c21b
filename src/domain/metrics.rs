//! Performance statistics over a backtest equity curve.

use chrono::NaiveDate;

use super::order::Trade;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// One simulated day of the backtest.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub portfolio_value: f64,
    pub turnover: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    /// Annualized Sharpe; `None` with fewer than two daily returns or zero
    /// volatility.
    pub sharpe_ratio: Option<f64>,
    pub annualized_volatility: Option<f64>,
    /// Largest peak-to-trough decline as a positive fraction.
    pub max_drawdown: f64,
    pub max_drawdown_duration: i64,
    pub total_turnover: f64,
    pub total_cost: f64,
    pub trade_count: usize,
}

impl PerformanceMetrics {
    pub fn compute(equity_curve: &[EquityPoint], trades: &[Trade]) -> Self {
        let total_return = total_return(equity_curve);
        let returns = daily_returns(equity_curve);

        let years = returns.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let stdev = sample_stdev(&returns);

        PerformanceMetrics {
            total_return,
            annualized_return,
            sharpe_ratio: annualized_sharpe(&returns),
            annualized_volatility: stdev.map(|s| s * TRADING_DAYS_PER_YEAR.sqrt()),
            max_drawdown,
            max_drawdown_duration,
            total_turnover: equity_curve.iter().map(|p| p.turnover).sum(),
            total_cost: equity_curve.iter().map(|p| p.cost).sum(),
            trade_count: trades.len(),
        }
    }
}

/// `value[last] / value[first] - 1`.
pub fn total_return(equity_curve: &[EquityPoint]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(first), Some(last)) if first.portfolio_value > 0.0 => {
            last.portfolio_value / first.portfolio_value - 1.0
        }
        _ => 0.0,
    }
}

pub fn daily_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].portfolio_value;
            if prev > 0.0 {
                w[1].portfolio_value / prev - 1.0
            } else {
                0.0
            }
        })
        .collect()
}

fn sample_stdev(returns: &[f64]) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

/// `sqrt(252) * mean / stdev` of daily returns (sample stdev).
pub fn annualized_sharpe(returns: &[f64]) -> Option<f64> {
    let stdev = sample_stdev(returns)?;
    if stdev == 0.0 || !stdev.is_finite() {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    Some(TRADING_DAYS_PER_YEAR.sqrt() * mean / stdev)
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.portfolio_value;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        if point.portfolio_value >= peak {
            peak = point.portfolio_value;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.portfolio_value) / peak;
            max_dd = max_dd.max(dd);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

pub fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    compute_drawdown(equity_curve).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                portfolio_value: v,
                turnover: 0.0,
                cost: 0.0,
            })
            .collect()
    }

    #[test]
    fn flat_curve_has_zero_return() {
        let curve = make_equity_curve(&[100_000.0; 10]);
        let m = PerformanceMetrics::compute(&curve, &[]);
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.sharpe_ratio, None);
    }

    #[test]
    fn increasing_curve_has_no_drawdown() {
        let values: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let curve = make_equity_curve(&values);
        assert_eq!(max_drawdown(&curve), 0.0);
    }

    #[test]
    fn total_return_positive_and_negative() {
        assert_relative_eq!(total_return(&make_equity_curve(&[100.0, 110.0])), 0.10, epsilon = 1e-12);
        assert_relative_eq!(total_return(&make_equity_curve(&[100.0, 90.0])), -0.10, epsilon = 1e-12);
        assert_eq!(total_return(&[]), 0.0);
    }

    #[test]
    fn max_drawdown_peak_to_trough() {
        let curve = make_equity_curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        assert_relative_eq!(max_drawdown(&curve), (110.0 - 80.0) / 110.0, epsilon = 1e-12);
    }

    #[test]
    fn max_drawdown_duration_counts_days_under_peak() {
        let curve = make_equity_curve(&[100.0, 110.0, 100.0, 90.0, 85.0, 95.0]);
        assert_eq!(compute_drawdown(&curve).1, 4);
    }

    #[test]
    fn sharpe_needs_two_returns() {
        assert_eq!(annualized_sharpe(&[]), None);
        assert_eq!(annualized_sharpe(&[0.01]), None);
        assert!(annualized_sharpe(&[0.01, 0.02]).is_some());
    }

    #[test]
    fn sharpe_matches_formula() {
        let returns = [0.01, -0.005, 0.02, 0.0];
        let mean: f64 = 0.025 / 4.0;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 3.0;
        let expected = 252f64.sqrt() * mean / var.sqrt();
        assert_relative_eq!(annualized_sharpe(&returns).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn sharpe_undefined_for_zero_volatility() {
        assert_eq!(annualized_sharpe(&[0.25, 0.25, 0.25]), None);
    }

    #[test]
    fn compute_sums_turnover_and_cost() {
        let mut curve = make_equity_curve(&[100.0, 101.0]);
        curve[0].turnover = 50.0;
        curve[0].cost = 0.025;
        curve[1].turnover = 20.0;
        curve[1].cost = 0.01;
        let m = PerformanceMetrics::compute(&curve, &[]);
        assert_relative_eq!(m.total_turnover, 70.0, epsilon = 1e-12);
        assert_relative_eq!(m.total_cost, 0.035, epsilon = 1e-12);
    }

    #[test]
    fn compute_does_not_mutate_curve() {
        let curve = make_equity_curve(&[100.0, 105.0, 103.0]);
        let before = curve.clone();
        let _ = PerformanceMetrics::compute(&curve, &[]);
        assert_eq!(curve, before);
    }
}
