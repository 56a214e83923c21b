//! Risk limits and target validation.

use crate::domain::error::DeskError;
use std::collections::{BTreeMap, BTreeSet};

/// Tolerance applied to the gross exposure check to absorb float summation
/// error when `n * per_name` equals the cap.
pub const GROSS_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskConfig {
    pub max_position_pct: f64,
    pub max_gross_exposure: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            max_position_pct: 0.2,
            max_gross_exposure: 1.0,
        }
    }
}

/// Every rule a target set breaks, in a stable order.
///
/// When `universe` is given, symbols outside it are reported as unknown.
pub fn target_violations(
    targets: &BTreeMap<String, f64>,
    universe: Option<&BTreeSet<String>>,
    risk: &RiskConfig,
) -> Vec<String> {
    let mut violations = Vec::new();

    if let Some(universe) = universe {
        let unknown: Vec<&str> = targets
            .keys()
            .filter(|sym| !universe.contains(*sym))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            violations.push(format!("unknown symbol(s) in targets: {}", unknown.join(", ")));
        }
    }

    for (sym, &w) in targets {
        if w < 0.0 || !w.is_finite() {
            violations.push(format!("shorting not allowed: {sym} has weight {w}"));
        }
    }

    for (sym, &w) in targets {
        if w > risk.max_position_pct {
            violations.push(format!(
                "position too large: {sym} weight {w} exceeds max {}",
                risk.max_position_pct
            ));
        }
    }

    let gross: f64 = targets.values().sum();
    if gross > risk.max_gross_exposure + GROSS_TOLERANCE {
        violations.push(format!(
            "gross exposure {gross:.4} exceeds max {}",
            risk.max_gross_exposure
        ));
    }

    violations
}

pub fn validate_targets(
    targets: &BTreeMap<String, f64>,
    universe: Option<&BTreeSet<String>>,
    risk: &RiskConfig,
) -> Result<(), DeskError> {
    let violations = target_violations(targets, universe, risk);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(DeskError::RiskLimitViolation { violations })
    }
}
