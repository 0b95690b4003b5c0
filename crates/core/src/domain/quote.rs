use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a tradable instrument, e.g. `VTI` or `BTC-USD`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        anyhow::ensure!(!s.is_empty(), "symbol must be non-empty");
        anyhow::ensure!(
            !s.chars().any(char::is_whitespace),
            "symbol must not contain whitespace: {s:?}"
        );
        Ok(Self(s.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses a comma-separated symbol list, keeping the first occurrence of duplicates.
pub fn parse_symbol_list(s: &str) -> anyhow::Result<Vec<Symbol>> {
    let mut out: Vec<Symbol> = Vec::new();
    for part in s.split(',') {
        if part.trim().is_empty() {
            continue;
        }
        let symbol = Symbol::new(part)?;
        if !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    anyhow::ensure!(!out.is_empty(), "symbol list must be non-empty");
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub value: Option<f64>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub is_fallback: bool,
}

impl Quote {
    pub fn live(symbol: Symbol, value: f64, fetched_at: DateTime<Utc>) -> Self {
        Self {
            symbol,
            value: Some(value),
            fetched_at: Some(fetched_at),
            is_fallback: false,
        }
    }

    /// A quote resolved from the stale cache; `value` is `None` when nothing was cached.
    pub fn fallback(symbol: Symbol, cached: Option<f64>) -> Self {
        Self {
            symbol,
            value: cached,
            fetched_at: None,
            is_fallback: true,
        }
    }
}

/// One refresh cycle's quotes, one per configured symbol, in configured order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    quotes: Vec<Quote>,
    used_fallback: bool,
}

impl Snapshot {
    pub fn from_quotes(quotes: Vec<Quote>) -> Self {
        let used_fallback = quotes.iter().any(|q| q.is_fallback);
        Self {
            quotes,
            used_fallback,
        }
    }

    pub fn quotes(&self) -> &[Quote] {
        &self.quotes
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&Quote> {
        self.quotes.iter().find(|q| &q.symbol == symbol)
    }

    pub fn value_of(&self, symbol: &Symbol) -> Option<f64> {
        self.get(symbol).and_then(|q| q.value)
    }

    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Values fetched live this cycle.
    pub fn live_values(&self) -> impl Iterator<Item = (&Symbol, f64)> {
        self.quotes
            .iter()
            .filter(|q| !q.is_fallback)
            .filter_map(|q| q.value.map(|v| (&q.symbol, v)))
    }
}
