//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_record_adapter;
pub mod file_config_adapter;
pub mod paper_broker;
