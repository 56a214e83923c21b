//! Target portfolio construction.
//!
//! Long signals are spread equally under the gross exposure cap, each capped
//! at the per-name limit. The result is re-checked by the risk validator
//! before it is returned.

use std::collections::BTreeMap;

use super::error::DeskError;
use super::risk::{RiskConfig, validate_targets};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetWeights {
    pub weights: BTreeMap<String, f64>,
    pub per_name: f64,
}

impl TargetWeights {
    pub fn weight(&self, symbol: &str) -> f64 {
        self.weights.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn gross_exposure(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn is_flat(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// `min(max_gross_exposure / n, max_position_pct)`, or 0 when nothing is long.
pub fn per_name_weight(n_longs: usize, risk: &RiskConfig) -> f64 {
    if n_longs == 0 {
        return 0.0;
    }
    (risk.max_gross_exposure / n_longs as f64).min(risk.max_position_pct)
}

pub fn construct_targets<S: AsRef<str>>(
    longs: &[S],
    risk: &RiskConfig,
) -> Result<TargetWeights, DeskError> {
    let per_name = per_name_weight(longs.len(), risk);
    let weights: BTreeMap<String, f64> = longs
        .iter()
        .map(|s| (s.as_ref().to_string(), per_name))
        .collect();

    validate_targets(&weights, None, risk)?;

    Ok(TargetWeights { weights, per_name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn risk(max_position_pct: f64, max_gross_exposure: f64) -> RiskConfig {
        RiskConfig {
            max_position_pct,
            max_gross_exposure,
        }
    }

    #[test]
    fn no_longs_is_flat() {
        let t = construct_targets::<&str>(&[], &risk(0.2, 1.0)).unwrap();
        assert!(t.is_flat());
        assert_eq!(t.per_name, 0.0);
    }

    #[test]
    fn two_longs_capped_per_name() {
        let t = construct_targets(&["SPY", "QQQ"], &risk(0.2, 1.0)).unwrap();
        assert_eq!(t.weight("SPY"), 0.2);
        assert_eq!(t.weight("QQQ"), 0.2);
        assert!((t.gross_exposure() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn many_longs_share_gross_cap() {
        let longs: Vec<String> = (0..8).map(|i| format!("S{i}")).collect();
        let t = construct_targets(&longs, &risk(0.2, 1.0)).unwrap();
        assert!((t.per_name - 0.125).abs() < 1e-12);
        assert!((t.gross_exposure() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn flat_symbols_have_zero_weight() {
        let t = construct_targets(&["SPY"], &risk(0.2, 1.0)).unwrap();
        assert_eq!(t.weight("QQQ"), 0.0);
        assert_eq!(t.len(), 1);
    }

    proptest! {
        #[test]
        fn allocation_never_exceeds_limits(
            n in 1usize..200,
            max_position_pct in 0.001f64..1.0,
            max_gross_exposure in 0.001f64..1.0,
        ) {
            let longs: Vec<String> = (0..n).map(|i| format!("S{i:03}")).collect();
            let risk = risk(max_position_pct, max_gross_exposure);
            let t = construct_targets(&longs, &risk).unwrap();
            prop_assert!(t.gross_exposure() <= max_gross_exposure + 1e-9);
            for w in t.weights.values() {
                prop_assert!(*w >= 0.0);
                prop_assert!(*w <= max_position_pct);
            }
        }
    }
}
