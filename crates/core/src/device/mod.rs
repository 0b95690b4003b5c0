pub mod layout;
pub mod panel;
pub mod power;
pub mod power_manager;

use crate::domain::quote::Snapshot;
use crate::domain::ratio::Ratio;
use chrono::{DateTime, FixedOffset, TimeZone};

#[async_trait::async_trait]
pub trait DisplayPanel: Send {
    async fn init(&mut self) -> anyhow::Result<()>;

    async fn render(
        &mut self,
        snapshot: &Snapshot,
        ratios: &[Ratio],
        footer: &str,
    ) -> anyhow::Result<()>;

    /// Puts the panel into its low-power state.
    async fn sleep(&mut self) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait BatteryGauge: Send + Sync {
    async fn battery_percent(&self) -> anyhow::Result<u8>;
}

#[async_trait::async_trait]
pub trait WakeAlarm: Send + Sync {
    async fn set_wake_alarm(&self, at: DateTime<FixedOffset>) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait PowerControl: Send + Sync {
    async fn power_off(&self) -> anyhow::Result<()>;
}

pub trait Clock: Send + Sync {
    type Tz: TimeZone;

    fn now(&self) -> DateTime<Self::Tz>;
}

/// Host wall clock in the host's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Tz = chrono::Local;

    fn now(&self) -> DateTime<chrono::Local> {
        chrono::Local::now()
    }
}
