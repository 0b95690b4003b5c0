use crate::config::Settings;
use crate::domain::quote::Symbol;
use crate::quotes::error::QuoteError;
use crate::quotes::QuoteSource;
use anyhow::Context;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = concat!("tickerboard/", env!("CARGO_PKG_VERSION"));

/// Latest 1-minute close from the Yahoo Finance chart endpoint.
#[derive(Debug, Clone)]
pub struct YahooChartSource {
    http: reqwest::Client,
    base_url: String,
}

impl YahooChartSource {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.quote_provider_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build quote provider http client")?;

        Ok(Self {
            http,
            base_url: settings.quote_provider_base_url.clone(),
        })
    }

    fn url(&self, symbol: &Symbol) -> String {
        format!(
            "{}/v8/finance/chart/{}",
            self.base_url.trim_end_matches('/'),
            symbol
        )
    }
}

#[async_trait::async_trait]
impl QuoteSource for YahooChartSource {
    fn provider_name(&self) -> &'static str {
        "yahoo_chart"
    }

    async fn fetch_latest(&self, symbol: &Symbol) -> Result<f64, QuoteError> {
        let res = self
            .http
            .get(self.url(symbol))
            .query(&[("range", "1d"), ("interval", "1m")])
            .send()
            .await
            .map_err(|e| QuoteError::provider(symbol, format!("request failed: {e}")))?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(QuoteError::NoData {
                symbol: symbol.clone(),
            });
        }

        let text = res
            .text()
            .await
            .map_err(|e| QuoteError::provider(symbol, format!("failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(QuoteError::provider(symbol, format!("HTTP {status}: {text}")));
        }

        parse_latest_close(symbol, &text)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Deserialize)]
struct QuoteSeries {
    // Minutes without trades are null.
    #[serde(default)]
    close: Vec<Option<f64>>,
}

fn parse_latest_close(symbol: &Symbol, body: &str) -> Result<f64, QuoteError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|e| QuoteError::provider(symbol, format!("unexpected chart response: {e}")))?;

    envelope
        .chart
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|r| r.indicators)
        .and_then(|i| i.quote.into_iter().next())
        .and_then(|q| q.close.into_iter().rev().flatten().find(|v| v.is_finite()))
        .ok_or_else(|| QuoteError::NoData {
            symbol: symbol.clone(),
        })
}
