use crate::domain::quote::{Quote, Snapshot, Symbol};
use crate::quotes::retry::RetryPolicy;
use crate::quotes::QuoteSource;
use std::collections::BTreeMap;

pub struct QuoteAggregator<'a> {
    source: &'a dyn QuoteSource,
    retry: RetryPolicy,
}

impl<'a> QuoteAggregator<'a> {
    pub fn new(source: &'a dyn QuoteSource, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    /// Resolves one quote per symbol, in order. A symbol whose retries are exhausted falls
    /// back to `cache`; one symbol's failure never prevents fetching the others.
    pub async fn refresh(&self, symbols: &[Symbol], cache: &BTreeMap<Symbol, f64>) -> Snapshot {
        let mut quotes = Vec::with_capacity(symbols.len());
        let mut fallbacks: usize = 0;

        for symbol in symbols {
            let res = self
                .retry
                .run(symbol.as_str(), || self.source.fetch_latest(symbol))
                .await;

            match res {
                Ok(value) => {
                    tracing::debug!(%symbol, value, "live quote");
                    quotes.push(Quote::live(symbol.clone(), value, chrono::Utc::now()));
                }
                Err(exhausted) => {
                    fallbacks += 1;
                    let cached = cache.get(symbol).copied();
                    match cached {
                        Some(value) => tracing::warn!(
                            %symbol,
                            value,
                            attempts = exhausted.attempts,
                            error = %exhausted.last,
                            "quote fetch exhausted retries; using cached value"
                        ),
                        None => tracing::warn!(
                            %symbol,
                            attempts = exhausted.attempts,
                            error = %exhausted.last,
                            "quote fetch exhausted retries; no cached value"
                        ),
                    }
                    quotes.push(Quote::fallback(symbol.clone(), cached));
                }
            }
        }

        tracing::info!(
            provider = self.source.provider_name(),
            symbols = symbols.len(),
            fallbacks,
            "snapshot assembled"
        );
        Snapshot::from_quotes(quotes)
    }
}
