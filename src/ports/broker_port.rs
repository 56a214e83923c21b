//! Broker port: account state and order transmission.

use std::time::Duration;

use crate::domain::error::DeskError;
use crate::domain::order::{Fill, Order};
use crate::domain::position::Position;

pub trait BrokerPort {
    fn fetch_positions(&self) -> Result<Vec<Position>, DeskError>;

    /// Net liquidation value of the account.
    fn portfolio_value(&self) -> Result<f64, DeskError>;

    /// Submit `order` and wait up to `timeout` for a fill.
    ///
    /// A timeout is not an error: it returns a [`Fill`] with `filled = false`.
    /// Rejections are [`DeskError::OrderSubmission`].
    fn submit_order(&self, order: &Order, timeout: Duration) -> Result<Fill, DeskError>;
}
