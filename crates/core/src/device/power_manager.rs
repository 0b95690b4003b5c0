use crate::config::Settings;
use crate::device::{BatteryGauge, WakeAlarm};
use anyhow::Context;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

// Weekday bitmask for the RTC alarm: every day.
const ALARM_REPEAT_EVERY_DAY: u8 = 127;

/// Client for the board's power-manager daemon: one text command per connection, one
/// reply line back.
#[derive(Debug, Clone)]
pub struct PowerManagerClient {
    addr: String,
    timeout: Duration,
}

impl PowerManagerClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.power_manager_addr.clone(),
            settings.power_manager_timeout,
        )
    }

    async fn request(&self, command: &str) -> anyhow::Result<String> {
        tokio::time::timeout(self.timeout, self.request_inner(command))
            .await
            .with_context(|| format!("power manager timed out after {:?}", self.timeout))?
    }

    async fn request_inner(&self, command: &str) -> anyhow::Result<String> {
        let mut stream = TcpStream::connect(self.addr.as_str())
            .await
            .with_context(|| format!("connect power manager at {} failed", self.addr))?;
        stream
            .write_all(format!("{command}\n").as_bytes())
            .await
            .context("write to power manager failed")?;
        stream.flush().await.context("flush to power manager failed")?;

        let mut reply = String::new();
        BufReader::new(stream)
            .read_line(&mut reply)
            .await
            .context("read from power manager failed")?;
        let reply = reply.trim().to_string();
        tracing::debug!(%command, %reply, "power manager reply");
        Ok(reply)
    }
}

#[async_trait::async_trait]
impl BatteryGauge for PowerManagerClient {
    async fn battery_percent(&self) -> anyhow::Result<u8> {
        let reply = self.request("get battery").await?;
        parse_battery(&reply)
    }
}

#[async_trait::async_trait]
impl WakeAlarm for PowerManagerClient {
    async fn set_wake_alarm(&self, at: DateTime<FixedOffset>) -> anyhow::Result<()> {
        let command = format!(
            "rtc_alarm_set {} {ALARM_REPEAT_EVERY_DAY}",
            at.to_rfc3339_opts(SecondsFormat::Secs, false)
        );
        let reply = self.request(&command).await?;
        anyhow::ensure!(
            reply.contains("done"),
            "power manager rejected rtc alarm: {reply:?}"
        );
        Ok(())
    }
}

/// `battery: 87.6` -> 87.
fn parse_battery(reply: &str) -> anyhow::Result<u8> {
    let (key, value) = reply
        .split_once(':')
        .with_context(|| format!("unexpected battery reply: {reply:?}"))?;
    anyhow::ensure!(
        key.trim() == "battery",
        "unexpected battery reply: {reply:?}"
    );
    let pct = value
        .trim()
        .parse::<f64>()
        .with_context(|| format!("unexpected battery value: {reply:?}"))?;
    anyhow::ensure!(pct.is_finite(), "unexpected battery value: {reply:?}");
    Ok(pct.clamp(0.0, 100.0) as u8)
}
