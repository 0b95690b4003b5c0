pub mod controller;
pub mod device;
pub mod domain;
pub mod quotes;
pub mod storage;
pub mod time;

pub mod config {
    use crate::domain::quote::{parse_symbol_list, Symbol};
    use crate::domain::ratio::{parse_ratio_pairs, RatioPair};
    use crate::quotes::retry::RetryPolicy;
    use crate::time::wake::WakeTargets;
    use anyhow::Context;
    use std::path::PathBuf;
    use std::time::Duration;

    const DEFAULT_SYMBOLS: &str = "VTI,GLD,PSTG,ORCL";
    const DEFAULT_HEADLINE_SYMBOL: &str = "BTC-USD";
    const DEFAULT_RATIO_PAIRS: &str = "VTI/GLD,PSTG/VTI,ORCL/VTI";
    const DEFAULT_WAKE_HOURS: &str = "7,19";
    const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
    const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 60;
    const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
    const DEFAULT_QUOTE_PROVIDER_BASE_URL: &str = "https://query1.finance.yahoo.com";
    const DEFAULT_QUOTE_PROVIDER_TIMEOUT_SECS: u64 = 15;
    const DEFAULT_POWER_MANAGER_ADDR: &str = "127.0.0.1:8423";
    const DEFAULT_POWER_MANAGER_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_POWEROFF_COMMAND: &str = "sudo /sbin/shutdown -h now";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub symbols: Vec<Symbol>,
        pub headline_symbol: Symbol,
        pub ratio_pairs: Vec<RatioPair>,
        pub wake_targets: WakeTargets,
        pub retry: RetryPolicy,
        pub cache_path: PathBuf,
        pub panel_path: PathBuf,
        /// Optional plain-text log file, written alongside stdout.
        pub log_path: Option<PathBuf>,
        pub shutdown_grace: Duration,
        pub refresh_interval: Duration,
        pub quote_provider_base_url: String,
        pub quote_provider_timeout_secs: u64,
        pub power_manager_addr: String,
        pub power_manager_timeout: Duration,
        pub poweroff_command: Vec<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_lookup(|name| std::env::var(name).ok())
        }

        /// Builds settings from an arbitrary variable source (the process environment in
        /// production).
        pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
            let var = |name: &str| {
                lookup(name)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            };
            let num = |name: &str, default: u64| {
                var(name)
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(default)
            };

            let symbols = parse_symbol_list(
                &var("TICKERBOARD_SYMBOLS").unwrap_or_else(|| DEFAULT_SYMBOLS.to_string()),
            )
            .context("invalid TICKERBOARD_SYMBOLS")?;
            let headline_symbol = Symbol::new(
                &var("TICKERBOARD_HEADLINE_SYMBOL")
                    .unwrap_or_else(|| DEFAULT_HEADLINE_SYMBOL.to_string()),
            )
            .context("invalid TICKERBOARD_HEADLINE_SYMBOL")?;
            let ratio_pairs = parse_ratio_pairs(
                &var("TICKERBOARD_RATIO_PAIRS").unwrap_or_else(|| DEFAULT_RATIO_PAIRS.to_string()),
            )
            .context("invalid TICKERBOARD_RATIO_PAIRS")?;
            let wake_targets = WakeTargets::parse(
                &var("TICKERBOARD_WAKE_HOURS").unwrap_or_else(|| DEFAULT_WAKE_HOURS.to_string()),
            )
            .context("invalid TICKERBOARD_WAKE_HOURS")?;

            let retry = RetryPolicy::new(
                num(
                    "TICKERBOARD_RETRY_MAX_ATTEMPTS",
                    u64::from(crate::quotes::retry::DEFAULT_MAX_ATTEMPTS),
                ) as u32,
                Duration::from_millis(num(
                    "TICKERBOARD_RETRY_BASE_DELAY_MS",
                    DEFAULT_RETRY_BASE_DELAY_MS,
                )),
            );

            let poweroff_command: Vec<String> = var("TICKERBOARD_POWEROFF_COMMAND")
                .unwrap_or_else(|| DEFAULT_POWEROFF_COMMAND.to_string())
                .split_whitespace()
                .map(str::to_string)
                .collect();

            Ok(Self {
                symbols,
                headline_symbol,
                ratio_pairs,
                wake_targets,
                retry,
                cache_path: var("TICKERBOARD_CACHE_PATH")
                    .unwrap_or_else(|| "./tickerboard_cache.json".to_string())
                    .into(),
                panel_path: var("TICKERBOARD_PANEL_PATH")
                    .unwrap_or_else(|| "./tickerboard_panel.txt".to_string())
                    .into(),
                log_path: var("TICKERBOARD_LOG_PATH").map(PathBuf::from),
                shutdown_grace: Duration::from_secs(num(
                    "TICKERBOARD_SHUTDOWN_GRACE_SECS",
                    DEFAULT_SHUTDOWN_GRACE_SECS,
                )),
                refresh_interval: Duration::from_secs(
                    num(
                        "TICKERBOARD_REFRESH_INTERVAL_SECS",
                        DEFAULT_REFRESH_INTERVAL_SECS,
                    )
                    .max(1),
                ),
                quote_provider_base_url: var("QUOTE_PROVIDER_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_QUOTE_PROVIDER_BASE_URL.to_string()),
                quote_provider_timeout_secs: num(
                    "QUOTE_PROVIDER_TIMEOUT_SECS",
                    DEFAULT_QUOTE_PROVIDER_TIMEOUT_SECS,
                ),
                power_manager_addr: var("POWER_MANAGER_ADDR")
                    .unwrap_or_else(|| DEFAULT_POWER_MANAGER_ADDR.to_string()),
                power_manager_timeout: Duration::from_secs(num(
                    "POWER_MANAGER_TIMEOUT_SECS",
                    DEFAULT_POWER_MANAGER_TIMEOUT_SECS,
                )),
                poweroff_command,
                sentry_dsn: var("SENTRY_DSN"),
            })
        }

        /// Symbols fetched each cycle: the configured ones, then the headline symbol if it is
        /// not already among them.
        pub fn fetch_symbols(&self) -> Vec<Symbol> {
            let mut out = self.symbols.clone();
            if !out.contains(&self.headline_symbol) {
                out.push(self.headline_symbol.clone());
            }
            out
        }

        pub fn require_poweroff_command(&self) -> anyhow::Result<(&str, &[String])> {
            self.poweroff_command
                .split_first()
                .map(|(program, args)| (program.as_str(), args))
                .context("TICKERBOARD_POWEROFF_COMMAND is required")
        }
    }

}
