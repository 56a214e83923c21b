//! Port traits: the seams between the domain pipeline and the outside world.

pub mod broker_port;
pub mod config_port;
pub mod data_port;
pub mod record_port;
