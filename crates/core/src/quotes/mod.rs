pub mod aggregator;
pub mod error;
pub mod retry;
pub mod yahoo;

use crate::domain::quote::Symbol;
use crate::quotes::error::QuoteError;

#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Single attempt at the latest value for `symbol`.
    async fn fetch_latest(&self, symbol: &Symbol) -> Result<f64, QuoteError>;
}
