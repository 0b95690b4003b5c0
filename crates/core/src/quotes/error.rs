use crate::domain::quote::Symbol;
use std::fmt;

/// A single failed fetch attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteError {
    /// The provider answered but had no value for the symbol.
    NoData { symbol: Symbol },
    /// Transport, HTTP status or parse failure.
    Provider { symbol: Symbol, detail: String },
}

impl QuoteError {
    pub fn provider(symbol: &Symbol, err: impl fmt::Display) -> Self {
        Self::Provider {
            symbol: symbol.clone(),
            detail: err.to_string(),
        }
    }
}

impl fmt::Display for QuoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData { symbol } => write!(f, "no data for {symbol}"),
            Self::Provider { symbol, detail } => write!(f, "provider error for {symbol}: {detail}"),
        }
    }
}

impl std::error::Error for QuoteError {}

/// Every attempt failed; carries the error of the final attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last: E,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempt(s): {}", self.attempts, self.last)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryExhausted<E> {}
