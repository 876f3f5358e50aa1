mod alerts;
mod portfolio;
mod prices;

#[cfg(test)]
pub(crate) mod testing;

pub use alerts::AlertService;
pub use portfolio::PortfolioService;
pub use prices::CoinService;

use engine::Broadcaster;
use std::sync::Arc;

/// Everything the handlers need, cloned into each request
#[derive(Clone)]
pub struct AppState {
    pub coins: Arc<CoinService>,
    pub portfolio: Arc<PortfolioService>,
    pub alerts: Arc<AlertService>,
    pub broadcaster: Arc<Broadcaster>,
}
