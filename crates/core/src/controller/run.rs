use crate::config::Settings;
use crate::controller::{footer, ControllerError, Phase, PowerOutcome};
use crate::device::{BatteryGauge, Clock, DisplayPanel, PowerControl, WakeAlarm};
use crate::domain::quote::{Snapshot, Symbol};
use crate::domain::ratio::{compute_ratios, Ratio, RatioPair};
use crate::quotes::aggregator::QuoteAggregator;
use crate::quotes::retry::RetryPolicy;
use crate::quotes::QuoteSource;
use crate::storage::stale_cache::{next_record, CacheRecord, StaleValueCache};
use crate::time::wake::{next_wake, should_shutdown, WakeTargets};
use chrono::{DateTime, FixedOffset, Offset};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub symbols: Vec<Symbol>,
    pub ratio_pairs: Vec<RatioPair>,
    pub wake_targets: WakeTargets,
    pub retry: RetryPolicy,
    pub shutdown_grace: Duration,
    pub refresh_interval: Duration,
    pub dry_run: bool,
}

impl RunConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            symbols: settings.fetch_symbols(),
            ratio_pairs: settings.ratio_pairs.clone(),
            wake_targets: settings.wake_targets.clone(),
            retry: settings.retry,
            shutdown_grace: settings.shutdown_grace,
            refresh_interval: settings.refresh_interval,
            dry_run: false,
        }
    }
}

/// External collaborators, constructed once at process start.
pub struct Devices {
    pub source: Box<dyn QuoteSource>,
    pub cache: StaleValueCache,
    pub panel: Box<dyn DisplayPanel>,
    pub battery: Box<dyn BatteryGauge>,
    pub alarm: Box<dyn WakeAlarm>,
    pub power: Box<dyn PowerControl>,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub phases: Vec<Phase>,
    pub snapshot: Option<Snapshot>,
    pub ratios: Vec<Ratio>,
    pub footer: Option<String>,
    pub rendered: bool,
    pub wake_at: Option<DateTime<FixedOffset>>,
    pub outcome: PowerOutcome,
}

#[derive(Debug, Clone)]
pub struct ContinuousReport {
    pub cycles: u64,
    pub phases: Vec<Phase>,
}

pub struct RunController<C: Clock> {
    config: RunConfig,
    devices: Devices,
    clock: C,
}

impl<C: Clock> RunController<C> {
    pub fn new(config: RunConfig, devices: Devices, clock: C) -> Self {
        Self {
            config,
            devices,
            clock,
        }
    }

    /// One full pass: acquire, render, sleep the display, set the wake alarm, then decide
    /// whether to power off. Only a display that cannot be put to sleep is an error.
    pub async fn run_once(&mut self) -> Result<CycleReport, ControllerError> {
        let mut phases = Vec::new();
        enter(&mut phases, Phase::Init);
        let cache = self.devices.cache.load().await;
        let panel_ready = self.init_panel().await;

        let mut snapshot = None;
        let mut ratios = Vec::new();
        let mut footer_text = None;
        let mut rendered = false;

        if panel_ready {
            let cycle = self.refresh_and_render(&mut phases, &cache).await;
            snapshot = Some(cycle.snapshot);
            ratios = cycle.ratios;
            footer_text = Some(cycle.footer);
            rendered = cycle.rendered;
        } else {
            tracing::warn!("skipping acquisition and rendering; display unavailable");
        }

        self.sleep_panel(&mut phases).await?;

        enter(&mut phases, Phase::Scheduling);
        let now = self.clock.now();
        let wake = next_wake(&now, &self.config.wake_targets);
        let wake_at = wake.with_timezone(&wake.offset().fix());
        tracing::info!(wake_at = %wake_at.to_rfc3339(), "setting rtc wake alarm");
        let alarm_set = match self.devices.alarm.set_wake_alarm(wake_at).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "failed to set rtc wake alarm; will not power off");
                false
            }
        };

        let outcome = if !alarm_set {
            enter(&mut phases, Phase::Idle);
            PowerOutcome::BlockedBySchedulingError
        } else if should_shutdown(&now, &self.config.wake_targets) {
            enter(&mut phases, Phase::ShuttingDown);
            self.shut_down().await
        } else {
            enter(&mut phases, Phase::Idle);
            tracing::info!("possible manual boot; not shutting down");
            PowerOutcome::SkippedManualBoot
        };

        enter(&mut phases, Phase::Terminal);
        Ok(CycleReport {
            phases,
            snapshot,
            ratios,
            footer: footer_text,
            rendered,
            wake_at: Some(wake_at),
            outcome,
        })
    }

    /// Refreshes every `refresh_interval` until `stop` resolves. `stop` is raced against
    /// every cycle, so a stop during acquisition abandons the refresh; the display is always
    /// put to sleep on the way out. Never schedules a wake or powers off.
    pub async fn run_continuous<F>(&mut self, stop: F) -> Result<ContinuousReport, ControllerError>
    where
        F: Future<Output = ()>,
    {
        let mut phases = Vec::new();
        enter(&mut phases, Phase::Init);
        let mut cache = self.devices.cache.load().await;
        let mut cycles: u64 = 0;
        tokio::pin!(stop);

        if self.init_panel().await {
            loop {
                let cycle = tokio::select! {
                    biased;
                    _ = &mut stop => {
                        tracing::info!(cycles, "stop requested mid-cycle; abandoning refresh");
                        break;
                    }
                    cycle = self.refresh_and_render(&mut phases, &cache) => cycle,
                };
                cache = cycle.cache;
                cycles += 1;

                tokio::select! {
                    _ = tokio::time::sleep(self.config.refresh_interval) => {}
                    _ = &mut stop => {
                        tracing::info!(cycles, "stop requested; draining");
                        break;
                    }
                }
            }
        } else {
            tracing::warn!("display unavailable; not entering refresh loop");
        }

        self.sleep_panel(&mut phases).await?;
        enter(&mut phases, Phase::Terminal);
        Ok(ContinuousReport { cycles, phases })
    }

    async fn init_panel(&mut self) -> bool {
        match self.devices.panel.init().await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "display init failed");
                false
            }
        }
    }

    async fn refresh_and_render(&mut self, phases: &mut Vec<Phase>, cache: &CacheRecord) -> Cycle {
        enter(phases, Phase::Acquiring);
        let snapshot = QuoteAggregator::new(self.devices.source.as_ref(), self.config.retry)
            .refresh(&self.config.symbols, cache)
            .await;
        let ratios = compute_ratios(&snapshot, &self.config.ratio_pairs);

        let record = next_record(cache, &snapshot);
        if let Err(err) = self.devices.cache.save(&record).await {
            tracing::warn!(error = %err, "failed to persist quote cache; continuing");
        }

        enter(phases, Phase::Rendering);
        let battery = match self.devices.battery.battery_percent().await {
            Ok(pct) => Some(pct),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "battery level unavailable");
                None
            }
        };
        let footer = footer(&self.clock.now(), battery, snapshot.used_fallback());

        let rendered = match self.devices.panel.render(&snapshot, &ratios, &footer).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "render failed");
                false
            }
        };

        Cycle {
            snapshot,
            ratios,
            footer,
            rendered,
            cache: record,
        }
    }

    async fn sleep_panel(&mut self, phases: &mut Vec<Phase>) -> Result<(), ControllerError> {
        enter(phases, Phase::Sleeping);
        self.devices
            .panel
            .sleep()
            .await
            .map_err(ControllerError::DisplayStuckActive)
    }

    async fn shut_down(&self) -> PowerOutcome {
        if self.config.dry_run {
            tracing::info!("scheduled boot; dry run, not powering off");
            return PowerOutcome::DryRun;
        }

        tracing::info!(grace = ?self.config.shutdown_grace, "scheduled boot; powering off after grace interval");
        tokio::time::sleep(self.config.shutdown_grace).await;
        if let Err(err) = self.devices.power.power_off().await {
            tracing::error!(error = %format!("{err:#}"), "power-off failed");
        }
        PowerOutcome::PoweredOff
    }
}

struct Cycle {
    snapshot: Snapshot,
    ratios: Vec<Ratio>,
    footer: String,
    rendered: bool,
    cache: CacheRecord,
}

fn enter(phases: &mut Vec<Phase>, phase: Phase) {
    tracing::info!(?phase, "controller phase");
    phases.push(phase);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::aggregator::tests::ScriptedSource;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct PanelLog {
        fail_init: bool,
        fail_render: bool,
        fail_sleep: bool,
        inits: usize,
        footers: Vec<String>,
        ratios: Vec<Vec<Ratio>>,
        sleeps: usize,
    }

    struct FakePanel(Arc<Mutex<PanelLog>>);

    #[async_trait::async_trait]
    impl DisplayPanel for FakePanel {
        async fn init(&mut self) -> anyhow::Result<()> {
            let mut log = self.0.lock().unwrap();
            log.inits += 1;
            anyhow::ensure!(!log.fail_init, "spi bus unavailable");
            Ok(())
        }

        async fn render(
            &mut self,
            _snapshot: &Snapshot,
            ratios: &[Ratio],
            footer: &str,
        ) -> anyhow::Result<()> {
            let mut log = self.0.lock().unwrap();
            log.footers.push(footer.to_string());
            log.ratios.push(ratios.to_vec());
            anyhow::ensure!(!log.fail_render, "font missing");
            Ok(())
        }

        async fn sleep(&mut self) -> anyhow::Result<()> {
            let mut log = self.0.lock().unwrap();
            log.sleeps += 1;
            anyhow::ensure!(!log.fail_sleep, "busy pin stuck");
            Ok(())
        }
    }

    struct FakeBattery(Option<u8>);

    #[async_trait::async_trait]
    impl BatteryGauge for FakeBattery {
        async fn battery_percent(&self) -> anyhow::Result<u8> {
            self.0.ok_or_else(|| anyhow::anyhow!("no battery"))
        }
    }

    #[derive(Clone, Default)]
    struct FakeAlarm {
        fail: bool,
        set: Arc<Mutex<Vec<DateTime<FixedOffset>>>>,
    }

    #[async_trait::async_trait]
    impl WakeAlarm for FakeAlarm {
        async fn set_wake_alarm(&self, at: DateTime<FixedOffset>) -> anyhow::Result<()> {
            anyhow::ensure!(!self.fail, "connection refused");
            self.set.lock().unwrap().push(at);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakePower(Arc<Mutex<usize>>);

    #[async_trait::async_trait]
    impl PowerControl for FakePower {
        async fn power_off(&self) -> anyhow::Result<()> {
            *self.0.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct FixedClock(DateTime<FixedOffset>);

    impl Clock for FixedClock {
        type Tz = FixedOffset;

        fn now(&self) -> DateTime<FixedOffset> {
            self.0
        }
    }

    fn at(d: u32, h: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(-5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, d, h, 0, 0)
            .unwrap()
    }

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    struct Harness {
        _dir: tempfile::TempDir,
        cache: StaleValueCache,
        panel: Arc<Mutex<PanelLog>>,
        alarm: FakeAlarm,
        power: FakePower,
        controller: RunController<FixedClock>,
    }

    fn harness(
        values: &[(&str, Option<f64>)],
        now: DateTime<FixedOffset>,
        panel: PanelLog,
        alarm_fails: bool,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let cache = StaleValueCache::new(dir.path().join("cache.json"));
        let panel = Arc::new(Mutex::new(panel));
        let alarm = FakeAlarm {
            fail: alarm_fails,
            ..Default::default()
        };
        let power = FakePower::default();

        let config = RunConfig {
            symbols: vec![sym("VTI"), sym("GLD")],
            ratio_pairs: vec![RatioPair::parse("VTI/GLD").unwrap()],
            wake_targets: WakeTargets::parse("7,19").unwrap(),
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
            shutdown_grace: Duration::from_secs(60),
            refresh_interval: Duration::from_secs(10),
            dry_run: false,
        };
        let devices = Devices {
            source: Box::new(ScriptedSource::with(values)),
            cache: cache.clone(),
            panel: Box::new(FakePanel(panel.clone())),
            battery: Box::new(FakeBattery(Some(80))),
            alarm: Box::new(alarm.clone()),
            power: Box::new(power.clone()),
        };

        Harness {
            _dir: dir,
            cache,
            panel,
            alarm,
            power,
            controller: RunController::new(config, devices, FixedClock(now)),
        }
    }

    fn live() -> [(&'static str, Option<f64>); 2] {
        [("VTI", Some(100.0)), ("GLD", Some(50.0))]
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_boot_renders_schedules_and_powers_off() {
        let mut h = harness(&live(), at(10, 7), PanelLog::default(), false);
        let started = tokio::time::Instant::now();

        let report = h.controller.run_once().await.unwrap();

        assert_eq!(
            report.phases,
            vec![
                Phase::Init,
                Phase::Acquiring,
                Phase::Rendering,
                Phase::Sleeping,
                Phase::Scheduling,
                Phase::ShuttingDown,
                Phase::Terminal
            ]
        );
        assert_eq!(report.ratios[0].value, Some(2.0));
        assert!(report.rendered);
        assert_eq!(report.footer.as_deref(), Some("Mar 10 07:00 AM | 80%"));
        assert_eq!(report.outcome, PowerOutcome::PoweredOff);
        assert_eq!(report.wake_at, Some(at(10, 19)));

        assert_eq!(*h.alarm.set.lock().unwrap(), vec![at(10, 19)]);
        assert_eq!(*h.power.0.lock().unwrap(), 1);
        assert!(tokio::time::Instant::now() - started >= Duration::from_secs(60));
        assert_eq!(h.panel.lock().unwrap().sleeps, 1);

        let cached = h.cache.load().await;
        assert_eq!(cached, CacheRecord::from([(sym("VTI"), 100.0), (sym("GLD"), 50.0)]));
    }

    #[tokio::test(start_paused = true)]
    async fn off_schedule_boot_stays_on() {
        let mut h = harness(&live(), at(10, 14), PanelLog::default(), false);
        let report = h.controller.run_once().await.unwrap();

        assert_eq!(report.outcome, PowerOutcome::SkippedManualBoot);
        assert!(report.phases.contains(&Phase::Idle));
        assert_eq!(report.wake_at, Some(at(10, 19)));
        assert_eq!(*h.power.0.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_alarm_blocks_power_off() {
        let mut h = harness(&live(), at(10, 19), PanelLog::default(), true);
        let report = h.controller.run_once().await.unwrap();

        assert_eq!(report.outcome, PowerOutcome::BlockedBySchedulingError);
        assert_eq!(*h.power.0.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn render_failure_still_sleeps_and_schedules() {
        let panel = PanelLog {
            fail_render: true,
            ..Default::default()
        };
        let mut h = harness(&live(), at(10, 7), panel, false);
        let report = h.controller.run_once().await.unwrap();

        assert!(!report.rendered);
        assert_eq!(h.panel.lock().unwrap().sleeps, 1);
        assert_eq!(h.alarm.set.lock().unwrap().len(), 1);
        assert_eq!(report.outcome, PowerOutcome::PoweredOff);
    }

    #[tokio::test(start_paused = true)]
    async fn display_init_failure_skips_straight_to_sleeping() {
        let panel = PanelLog {
            fail_init: true,
            ..Default::default()
        };
        let mut h = harness(&live(), at(10, 7), panel, false);
        let report = h.controller.run_once().await.unwrap();

        assert!(!report.phases.contains(&Phase::Acquiring));
        assert!(!report.phases.contains(&Phase::Rendering));
        assert!(report.snapshot.is_none());
        assert_eq!(h.panel.lock().unwrap().sleeps, 1);
        assert_eq!(h.alarm.set.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn display_that_cannot_sleep_is_fatal() {
        let panel = PanelLog {
            fail_sleep: true,
            ..Default::default()
        };
        let mut h = harness(&live(), at(10, 7), panel, false);
        let res = h.controller.run_once().await;

        assert!(matches!(res, Err(ControllerError::DisplayStuckActive(_))));
        assert_eq!(*h.power.0.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_values_are_shown_marked_and_kept() {
        let mut h = harness(
            &[("VTI", None), ("GLD", Some(50.0))],
            at(10, 14),
            PanelLog::default(),
            false,
        );
        h.cache
            .save(&CacheRecord::from([(sym("VTI"), 90.0), (sym("GLD"), 40.0)]))
            .await
            .unwrap();

        let report = h.controller.run_once().await.unwrap();
        let snapshot = report.snapshot.unwrap();
        assert!(snapshot.used_fallback());
        assert_eq!(snapshot.value_of(&sym("VTI")), Some(90.0));
        assert_eq!(report.ratios[0].value, Some(1.8));
        assert!(report.footer.unwrap().ends_with("| stale"));

        let cached = h.cache.load().await;
        assert_eq!(cached, CacheRecord::from([(sym("VTI"), 90.0), (sym("GLD"), 50.0)]));
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_never_powers_off() {
        let mut h = harness(&live(), at(10, 7), PanelLog::default(), false);
        h.controller.config.dry_run = true;
        let report = h.controller.run_once().await.unwrap();

        assert_eq!(report.outcome, PowerOutcome::DryRun);
        assert_eq!(*h.power.0.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_mode_refreshes_until_stopped_then_sleeps() {
        let mut h = harness(&live(), at(10, 7), PanelLog::default(), false);
        let stop = tokio::time::sleep(Duration::from_secs(25));

        let report = h.controller.run_continuous(stop).await.unwrap();

        // Cycles at t=0, 10 and 20; stop fires at 25.
        assert_eq!(report.cycles, 3);
        assert_eq!(report.phases.last(), Some(&Phase::Terminal));
        assert!(!report.phases.contains(&Phase::Scheduling));

        let panel = h.panel.lock().unwrap();
        assert_eq!(panel.inits, 1);
        assert_eq!(panel.footers.len(), 3);
        assert_eq!(panel.sleeps, 1);
        assert!(h.alarm.set.lock().unwrap().is_empty());
        assert_eq!(*h.power.0.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_acquisition_abandons_cycle_and_sleeps_display() {
        // VTI fails every attempt: the cycle would need 1s + 2s of backoff to settle.
        let mut h = harness(
            &[("VTI", None), ("GLD", Some(50.0))],
            at(10, 7),
            PanelLog::default(),
            false,
        );
        let started = tokio::time::Instant::now();
        let stop = tokio::time::sleep(Duration::from_secs(2));

        let report = h.controller.run_continuous(stop).await.unwrap();

        assert_eq!(tokio::time::Instant::now() - started, Duration::from_secs(2));
        assert_eq!(report.cycles, 0);
        assert_eq!(
            report.phases,
            vec![
                Phase::Init,
                Phase::Acquiring,
                Phase::Sleeping,
                Phase::Terminal
            ]
        );

        let panel = h.panel.lock().unwrap();
        assert!(panel.footers.is_empty());
        assert_eq!(panel.sleeps, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_stop_wins_over_starting_a_cycle() {
        let mut h = harness(&live(), at(10, 7), PanelLog::default(), false);

        let report = h.controller.run_continuous(std::future::ready(())).await.unwrap();

        assert_eq!(report.cycles, 0);
        assert_eq!(h.panel.lock().unwrap().sleeps, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_save_failure_does_not_stop_the_run() {
        let mut h = harness(&live(), at(10, 7), PanelLog::default(), false);
        let blocker = h._dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"file").unwrap();
        h.controller.devices.cache = StaleValueCache::new(blocker.join("cache.json"));

        let report = h.controller.run_once().await.unwrap();

        assert!(report.rendered);
        assert_eq!(report.ratios[0].value, Some(2.0));
        assert_eq!(report.wake_at, Some(at(10, 19)));
        assert_eq!(report.outcome, PowerOutcome::PoweredOff);
        assert_eq!(h.alarm.set.lock().unwrap().len(), 1);
        assert_eq!(*h.power.0.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn battery_failure_shows_not_available() {
        let mut h = harness(&live(), at(10, 7), PanelLog::default(), false);
        h.controller.devices.battery = Box::new(FakeBattery(None));

        let report = h.controller.run_once().await.unwrap();

        assert_eq!(report.footer.as_deref(), Some("Mar 10 07:00 AM | N/A%"));
        assert!(report.rendered);
        assert_eq!(report.outcome, PowerOutcome::PoweredOff);
        assert_eq!(
            h.panel.lock().unwrap().footers,
            vec!["Mar 10 07:00 AM | N/A%".to_string()]
        );
    }
}
