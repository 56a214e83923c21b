//! revdesk: single-strategy reversal trading desk.
//!
//! Hexagonal architecture: the signal-to-order pipeline lives in [`domain`],
//! broker/data/persistence seams are traits in [`ports`], and concrete
//! implementations live in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
