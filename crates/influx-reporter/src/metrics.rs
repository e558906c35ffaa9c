//! Point-in-time readings of the host's metrics, one [`MetricSet`] per reporting cycle.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::measurement::FieldValue;

/// Distribution statistics of a histogram or timer reservoir.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Number of values in the reservoir.
    pub size: i64,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub p75: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
}

/// Event count and moving-average rates, in events per second.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meter {
    pub count: i64,
    pub one_minute_rate: f64,
    pub five_minute_rate: f64,
    pub fifteen_minute_rate: f64,
    pub mean_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    /// Number of values ever recorded.
    pub count: i64,
    pub snapshot: Snapshot,
}

/// A timer: rates of timed events plus the distribution of their durations in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timer {
    pub meter: Meter,
    pub snapshot: Snapshot,
}

/// Every metric of the registry for one cycle, keyed by metric name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    pub gauges: BTreeMap<String, FieldValue>,
    pub counters: BTreeMap<String, i64>,
    pub histograms: BTreeMap<String, Histogram>,
    pub meters: BTreeMap<String, Meter>,
    pub timers: BTreeMap<String, Timer>,
}

impl MetricSet {
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty()
            && self.counters.is_empty()
            && self.histograms.is_empty()
            && self.meters.is_empty()
            && self.timers.is_empty()
    }
}

/// Supplies the current readings of the host metrics registry.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self) -> MetricSet;
}

impl SnapshotSource for MetricSet {
    fn snapshot(&self) -> MetricSet {
        self.clone()
    }
}

impl<F> SnapshotSource for F
where
    F: Fn() -> MetricSet + Send + Sync,
{
    fn snapshot(&self) -> MetricSet {
        self()
    }
}

/// Unit used when reporting rates and durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn duration(self) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(1),
            TimeUnit::Microseconds => Duration::from_micros(1),
            TimeUnit::Milliseconds => Duration::from_millis(1),
            TimeUnit::Seconds => Duration::from_secs(1),
            TimeUnit::Minutes => Duration::from_secs(60),
            TimeUnit::Hours => Duration::from_secs(60 * 60),
            TimeUnit::Days => Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Nanoseconds in one unit; durations are divided by this.
    pub fn nanos_per_unit(self) -> f64 {
        self.duration().as_nanos() as f64
    }

    /// Seconds in one unit; per-second rates are multiplied by this.
    pub fn seconds_per_unit(self) -> f64 {
        self.duration().as_secs_f64()
    }
}
