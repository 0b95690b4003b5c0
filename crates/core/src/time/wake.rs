use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike};

/// Daily hours (0..=23) at which the RTC should wake the device. Sorted, unique, non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeTargets(Vec<u32>);

impl WakeTargets {
    pub fn new(hours: impl IntoIterator<Item = u32>) -> anyhow::Result<Self> {
        let mut hours: Vec<u32> = hours.into_iter().collect();
        for h in &hours {
            anyhow::ensure!(*h <= 23, "wake hour must be 0..=23 (got {h})");
        }
        hours.sort_unstable();
        hours.dedup();
        anyhow::ensure!(!hours.is_empty(), "at least one wake hour is required");
        Ok(Self(hours))
    }

    /// Parses `"7,19"`.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let mut hours = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let h = part
                .parse::<u32>()
                .map_err(|e| anyhow::anyhow!("invalid wake hour {part:?}: {e}"))?;
            hours.push(h);
        }
        Self::new(hours)
    }

    pub fn hours(&self) -> &[u32] {
        &self.0
    }

    pub fn contains(&self, hour: u32) -> bool {
        self.0.binary_search(&hour).is_ok()
    }
}

/// First target instant strictly after `now`, computed in `now`'s own time zone. Targets
/// repeat daily, so after the last target of a day comes the first target of the next.
pub fn next_wake<Tz: TimeZone>(now: &DateTime<Tz>, targets: &WakeTargets) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();

    // A local hour can be skipped by a DST transition; look one extra day ahead for that case.
    for day in 0..=2 {
        let Some(date) = today.checked_add_signed(Duration::days(day)) else {
            break;
        };
        for &hour in targets.hours() {
            let Some(candidate) = local_instant(&tz, date, hour) else {
                continue;
            };
            if candidate > *now {
                return candidate;
            }
        }
    }

    now.clone() + Duration::days(1)
}

fn local_instant<Tz: TimeZone>(tz: &Tz, date: NaiveDate, hour: u32) -> Option<DateTime<Tz>> {
    let naive = date.and_hms_opt(hour, 0, 0)?;
    tz.from_local_datetime(&naive).earliest()
}

/// Whether this run looks like an RTC-scheduled boot: the current local hour is a wake
/// target. A manual power-on inside a target hour is indistinguishable from a scheduled one.
pub fn should_shutdown<Tz: TimeZone>(now: &DateTime<Tz>, targets: &WakeTargets) -> bool {
    targets.contains(now.hour())
}
