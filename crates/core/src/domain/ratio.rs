use crate::domain::quote::{Snapshot, Symbol};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioPair {
    pub numerator: Symbol,
    pub denominator: Symbol,
}

impl RatioPair {
    /// Parses `NUM/DEN`.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let (num, den) = s
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("ratio pair must look like NUM/DEN (got {s:?})"))?;
        Ok(Self {
            numerator: Symbol::new(num)?,
            denominator: Symbol::new(den)?,
        })
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.numerator, self.denominator)
    }
}

pub fn parse_ratio_pairs(s: &str) -> anyhow::Result<Vec<RatioPair>> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(RatioPair::parse)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: Symbol,
    pub denominator: Symbol,
    pub value: Option<f64>,
}

/// Computes one ratio per pair, in pair order. Missing operands or a zero denominator yield
/// `None`.
pub fn compute_ratios(snapshot: &Snapshot, pairs: &[RatioPair]) -> Vec<Ratio> {
    pairs
        .iter()
        .map(|pair| {
            let value = match (
                snapshot.value_of(&pair.numerator),
                snapshot.value_of(&pair.denominator),
            ) {
                (Some(num), Some(den)) if den != 0.0 => Some(round2(num / den)),
                _ => None,
            };
            Ratio {
                numerator: pair.numerator.clone(),
                denominator: pair.denominator.clone(),
                value,
            }
        })
        .collect()
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
