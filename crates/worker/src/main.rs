use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tickerboard_core::config::Settings;
use tickerboard_core::controller::{Devices, RunConfig, RunController};
use tickerboard_core::device::layout::PanelLayout;
use tickerboard_core::device::panel::FramePanel;
use tickerboard_core::device::power::SystemPower;
use tickerboard_core::device::power_manager::PowerManagerClient;
use tickerboard_core::device::SystemClock;
use tickerboard_core::quotes::yahoo::YahooChartSource;
use tickerboard_core::storage::stale_cache::StaleValueCache;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Refresh once, set the next wake alarm and power off if this was a scheduled boot.
    OneShot,
    /// Refresh on an interval until interrupted.
    Continuous,
}

#[derive(Debug, Parser)]
#[command(name = "tickerboard")]
struct Args {
    #[arg(long, value_enum, default_value_t = Mode::OneShot)]
    mode: Mode,

    /// Do everything except powering the host off.
    #[arg(long)]
    dry_run: bool,

    /// Continuous-mode refresh interval. Defaults to TICKERBOARD_REFRESH_INTERVAL_SECS.
    #[arg(long)]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    let log_file = settings.log_path.as_deref().map(open_log_file).transpose()?;
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(log_file.map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
        }))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let stop = match args.mode {
        Mode::Continuous => Some(shutdown_signal()?),
        Mode::OneShot => None,
    };

    let mut config = RunConfig::from_settings(&settings);
    config.dry_run = args.dry_run;
    if let Some(secs) = args.interval_secs {
        config.refresh_interval = Duration::from_secs(secs.max(1));
    }

    tracing::info!(
        mode = ?args.mode,
        dry_run = args.dry_run,
        symbols = config.symbols.len(),
        wake_hours = ?settings.wake_targets.hours(),
        "tickerboard starting"
    );

    let devices = build_devices(&settings)?;
    let mut controller = RunController::new(config, devices, SystemClock);

    let res = match stop {
        None => controller.run_once().await.map(|report| {
            tracing::info!(
                outcome = ?report.outcome,
                rendered = report.rendered,
                wake_at = ?report.wake_at,
                "one-shot run finished"
            );
        }),
        Some(stop) => controller.run_continuous(stop).await.map(|report| {
            tracing::info!(cycles = report.cycles, "continuous run finished");
        }),
    };

    if let Err(err) = res {
        let err = anyhow::Error::new(err);
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "tickerboard run failed");
        return Err(err);
    }
    Ok(())
}

fn build_devices(settings: &Settings) -> anyhow::Result<Devices> {
    let power_manager = PowerManagerClient::from_settings(settings);
    let layout = PanelLayout::new(settings.headline_symbol.clone(), &settings.fetch_symbols());

    Ok(Devices {
        source: Box::new(YahooChartSource::from_settings(settings)?),
        cache: StaleValueCache::new(settings.cache_path.clone()),
        panel: Box::new(FramePanel::new(settings.panel_path.clone(), layout)),
        battery: Box::new(power_manager.clone()),
        alarm: Box::new(power_manager),
        power: Box::new(SystemPower::from_settings(settings)?),
    })
}

fn open_log_file(path: &Path) -> anyhow::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

/// Installs the signal listeners immediately so a signal that arrives mid-cycle is not
/// lost; the returned future resolves on the first SIGINT or SIGTERM.
#[cfg(unix)]
fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt =
        signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        tracing::info!("shutdown signal received");
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
