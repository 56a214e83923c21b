//! Core domain types and logic. Nothing in here performs I/O.

pub mod backtest;
pub mod bar_store;
pub mod config_validation;
pub mod cost;
pub mod error;
pub mod live;
pub mod metrics;
pub mod ohlcv;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod reconcile;
pub mod risk;
pub mod signal;
pub mod snapshot;
pub mod universe;
