use crate::domain::quote::{Snapshot, Symbol};
use crate::domain::ratio::Ratio;

const TITLE: &str = "Minion";
const COLUMN_WIDTH: usize = 20;
const NOT_AVAILABLE: &str = "N/A";

/// Text layout of one panel frame: header, two columns of prices, ratios row, footer.
#[derive(Debug, Clone)]
pub struct PanelLayout {
    pub headline: Symbol,
    pub body: Vec<Symbol>,
}

impl PanelLayout {
    pub fn new(headline: Symbol, symbols: &[Symbol]) -> Self {
        let body = symbols
            .iter()
            .filter(|s| **s != headline)
            .cloned()
            .collect();
        Self { headline, body }
    }

    pub fn lines(&self, snapshot: &Snapshot, ratios: &[Ratio], footer: &str) -> Vec<String> {
        let mut out = Vec::new();

        let headline = snapshot
            .value_of(&self.headline)
            .map(|v| format!("{v:.0}"))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        out.push(format!("{TITLE} | ${headline}"));

        let cells: Vec<String> = self
            .body
            .iter()
            .map(|s| format!("{s}: ${}", price(snapshot.value_of(s))))
            .collect();
        let split = cells.len().div_ceil(2);
        let (left, right) = cells.split_at(split);
        for (i, l) in left.iter().enumerate() {
            match right.get(i) {
                Some(r) => out.push(format!("{l:<COLUMN_WIDTH$}{r}")),
                None => out.push(l.clone()),
            }
        }

        if !ratios.is_empty() {
            out.push(
                ratios
                    .iter()
                    .map(|r| {
                        format!(
                            "{}/{}: {}",
                            r.numerator,
                            r.denominator,
                            price(r.value)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("  "),
            );
        }

        out.push(footer.to_string());
        out
    }
}

fn price(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}
