//! Converts a cycle's [`MetricSet`] into tagged and grouped [`Measurement`]s.
//!
//! Supports global tags, tag templates, counter and gauge grouping, and
//! per-metric tags through structured metric keys.

use core::error::Error;
use std::collections::BTreeMap;

use derive_more::Display;
use error_stack::Report;
use error_stack::ResultExt;
use indexmap::IndexMap;

use crate::measurement::FieldValue;
use crate::measurement::Measurement;
use crate::measurement::MeasurementBuilder;
use crate::metrics::Histogram;
use crate::metrics::Meter;
use crate::metrics::MetricSet;
use crate::metrics::TimeUnit;
use crate::metrics::Timer;

pub mod metric_name;
pub mod parser;
pub mod pattern;

use metric_name::GroupKey;
use metric_name::MetricName;
use parser::MeasurementParser;

const COUNT_POSTFIX: &str = ".count";
const COUNTER_FIELD: &str = "count";
const GAUGE_FIELD: &str = "value";

#[derive(Debug, Display)]
pub enum TransformError {
    #[display("metric '{key}' matches no template and is not a measurement line")]
    UnparsableMetric { key: String },
    #[display("metric '{key}' does not form a valid measurement")]
    InvalidMeasurement { key: String },
}

impl Error for TransformError {}

/// Turns metric readings into measurements.
#[derive(Debug)]
pub struct Transformer {
    base_tags: IndexMap<String, String>,
    parser: MeasurementParser,
    group_counters: bool,
    group_gauges: bool,
    rate_factor: f64,
    duration_factor: f64,
}

impl Transformer {
    /// `base_tags` are added to every measurement, below the metric's own tags.
    pub fn new(
        base_tags: IndexMap<String, String>,
        parser: MeasurementParser,
        group_counters: bool,
        group_gauges: bool,
        rate_unit: TimeUnit,
        duration_unit: TimeUnit,
    ) -> Self {
        Self {
            base_tags,
            parser,
            group_counters,
            group_gauges,
            rate_factor: rate_unit.seconds_per_unit(),
            duration_factor: duration_unit.nanos_per_unit(),
        }
    }

    pub fn parser(&self) -> &MeasurementParser {
        &self.parser
    }

    fn convert_duration(&self, nanos: f64) -> f64 {
        nanos / self.duration_factor
    }

    fn convert_rate(&self, per_second: f64) -> f64 {
        per_second * self.rate_factor
    }

    /// Transforms every metric type, gauges first and timers last.
    ///
    /// A metric that fails to transform is logged and skipped; its siblings
    /// are still returned.
    pub fn transform(&self, metrics: &MetricSet, timestamp: i64) -> Vec<Measurement> {
        let mut measurements = self.from_gauges(&metrics.gauges, timestamp);
        measurements.extend(self.from_counters(&metrics.counters, timestamp));
        measurements.extend(self.from_histograms(&metrics.histograms, timestamp));
        measurements.extend(self.from_meters(&metrics.meters, timestamp));
        measurements.extend(self.from_timers(&metrics.timers, timestamp));
        measurements
    }

    // timers

    pub fn from_timers(&self, timers: &BTreeMap<String, Timer>, timestamp: i64) -> Vec<Measurement> {
        timers
            .iter()
            .filter_map(|(key, timer)| skip_failed(self.from_timer(key, timer, timestamp)))
            .collect()
    }

    pub fn from_timer(
        &self,
        key: &str,
        timer: &Timer,
        timestamp: i64,
    ) -> Result<Measurement, Report<TransformError>> {
        let snapshot = &timer.snapshot;
        let meter = &timer.meter;

        self.builder(key, timestamp)?
            .field("count", snapshot.size)
            .field("min", self.convert_duration(snapshot.min as f64))
            .field("max", self.convert_duration(snapshot.max as f64))
            .field("mean", self.convert_duration(snapshot.mean))
            .field("std-dev", self.convert_duration(snapshot.std_dev))
            .field("50-percentile", self.convert_duration(snapshot.median))
            .field("75-percentile", self.convert_duration(snapshot.p75))
            .field("95-percentile", self.convert_duration(snapshot.p95))
            .field("99-percentile", self.convert_duration(snapshot.p99))
            .field("999-percentile", self.convert_duration(snapshot.p999))
            .field("one-minute", self.convert_rate(meter.one_minute_rate))
            .field("five-minute", self.convert_rate(meter.five_minute_rate))
            .field("fifteen-minute", self.convert_rate(meter.fifteen_minute_rate))
            .field("mean-minute", self.convert_rate(meter.mean_rate))
            .field("run-count", meter.count)
            .build()
            .change_context_lazy(|| TransformError::InvalidMeasurement {
                key: key.to_string(),
            })
    }

    // meters

    pub fn from_meters(&self, meters: &BTreeMap<String, Meter>, timestamp: i64) -> Vec<Measurement> {
        meters
            .iter()
            .filter_map(|(key, meter)| skip_failed(self.from_meter(key, meter, timestamp)))
            .collect()
    }

    pub fn from_meter(
        &self,
        key: &str,
        meter: &Meter,
        timestamp: i64,
    ) -> Result<Measurement, Report<TransformError>> {
        self.builder(key, timestamp)?
            .field("count", meter.count)
            .field("one-minute", self.convert_rate(meter.one_minute_rate))
            .field("five-minute", self.convert_rate(meter.five_minute_rate))
            .field("fifteen-minute", self.convert_rate(meter.fifteen_minute_rate))
            .field("mean-minute", self.convert_rate(meter.mean_rate))
            .build()
            .change_context_lazy(|| TransformError::InvalidMeasurement {
                key: key.to_string(),
            })
    }

    // histograms

    pub fn from_histograms(&self, histograms: &BTreeMap<String, Histogram>, timestamp: i64) -> Vec<Measurement> {
        histograms
            .iter()
            .filter_map(|(key, histogram)| skip_failed(self.from_histogram(key, histogram, timestamp)))
            .collect()
    }

    pub fn from_histogram(
        &self,
        key: &str,
        histogram: &Histogram,
        timestamp: i64,
    ) -> Result<Measurement, Report<TransformError>> {
        let snapshot = &histogram.snapshot;

        self.builder(key, timestamp)?
            .field("count", snapshot.size)
            .field("min", snapshot.min)
            .field("max", snapshot.max)
            .field("mean", snapshot.mean)
            .field("std-dev", snapshot.std_dev)
            .field("50-percentile", snapshot.median)
            .field("75-percentile", snapshot.p75)
            .field("95-percentile", snapshot.p95)
            .field("99-percentile", snapshot.p99)
            .field("999-percentile", snapshot.p999)
            .field("run-count", histogram.count)
            .build()
            .change_context_lazy(|| TransformError::InvalidMeasurement {
                key: key.to_string(),
            })
    }

    // groupable measurements: counters and gauges

    pub fn from_counters(&self, counters: &BTreeMap<String, i64>, timestamp: i64) -> Vec<Measurement> {
        let items = counters
            .iter()
            .map(|(key, count)| (key.as_str(), FieldValue::from(*count)));
        self.from_counters_or_gauges(items, COUNTER_FIELD, timestamp, self.group_counters)
    }

    pub fn from_gauges(&self, gauges: &BTreeMap<String, FieldValue>, timestamp: i64) -> Vec<Measurement> {
        let items = gauges.iter().map(|(key, value)| (key.as_str(), value.clone()));
        self.from_counters_or_gauges(items, GAUGE_FIELD, timestamp, self.group_gauges)
    }

    fn from_counters_or_gauges<'a>(
        &self,
        items: impl IntoIterator<Item = (&'a str, FieldValue)>,
        default_field: &str,
        timestamp: i64,
        group: bool,
    ) -> Vec<Measurement> {
        if group {
            return self
                .group_values(items, default_field)
                .into_iter()
                .filter_map(|(key, fields)| self.from_value_group(&key, fields, timestamp))
                .collect();
        }

        let mut measurements = Vec::new();
        for (key, value) in items {
            let Some(name) = skip_failed(self.resolve(key)) else {
                continue;
            };
            let fields = IndexMap::from([(default_field.to_string(), value)]);
            measurements.extend(self.from_value_group(&name.group_key(), fields, timestamp));
        }
        measurements
    }

    /// Groups values by resolved measurement name and tags.
    ///
    /// Structured keys (containing a space or comma) are parsed whole and use
    /// their own field name, or `default_field`. Dotted keys use the last part
    /// as the field name and the rest as the measurement key; a `.count`
    /// postfix stays in the field name together with the part before it.
    ///
    /// | key | group | field |
    /// |---|---|---|
    /// | `Measurement,action=restore someField` | `Measurement,action=restore` | `someField` |
    /// | `Measurement,action=restore` | `Measurement,action=restore` | `default_field` |
    /// | `jvm` | `jvm` | `default_field` |
    /// | `jvm.threads.deadlock` | `jvm.threads` | `deadlock` |
    /// | `jvm.threads.deadlock.count` | `jvm.threads` | `deadlock.count` |
    ///
    /// Groups come back in the order they were first seen. Keys that do not
    /// resolve, or that end in a dot and so name no field, are logged and
    /// skipped.
    pub fn group_values<'a>(
        &self,
        items: impl IntoIterator<Item = (&'a str, FieldValue)>,
        default_field: &str,
    ) -> IndexMap<GroupKey, IndexMap<String, FieldValue>> {
        let mut groups: IndexMap<GroupKey, IndexMap<String, FieldValue>> = IndexMap::new();

        for (key, value) in items {
            let (measurement_key, field) = if key.contains(' ') || key.contains(',') {
                let Some(name) = skip_failed(self.resolve(key)) else {
                    continue;
                };
                (key, name.field().unwrap_or(default_field).to_string())
            } else {
                let has_count_postfix = key.ends_with(COUNT_POSTFIX);
                let main_key = if has_count_postfix {
                    &key[..key.len() - COUNT_POSTFIX.len()]
                } else {
                    key
                };

                match main_key.rfind('.') {
                    Some(last_dot) => (&main_key[..last_dot], key[last_dot + 1..].to_string()),
                    None if has_count_postfix => (main_key, COUNTER_FIELD.to_string()),
                    None => (main_key, default_field.to_string()),
                }
            };

            if field.is_empty() {
                tracing::warn!(key, "Skipping metric without a field name");
                continue;
            }
            let Some(name) = skip_failed(self.resolve(measurement_key)) else {
                continue;
            };
            groups
                .entry(name.group_key())
                .or_default()
                .insert(field, value);
        }

        groups
    }

    /// Builds one measurement from a group, dropping fields that cannot be encoded.
    ///
    /// Returns `None` when no field of the group is valid.
    pub fn from_value_group(
        &self,
        key: &GroupKey,
        fields: IndexMap<String, FieldValue>,
        timestamp: i64,
    ) -> Option<Measurement> {
        let (result, dropped) = MeasurementBuilder::new(key.measurement(), timestamp)
            .tags(&self.base_tags)
            .tags(key.tags())
            .fields(fields)
            .build_lenient();

        for error in dropped {
            tracing::warn!(measurement = key.measurement(), %error, "Dropping invalid field");
        }

        match result {
            Ok(measurement) => Some(measurement),
            Err(report) => {
                tracing::warn!(
                    measurement = key.measurement(),
                    error = %report,
                    "Measurement has no valid fields"
                );
                None
            }
        }
    }

    fn resolve(&self, key: &str) -> Result<MetricName, Report<TransformError>> {
        self.parser
            .parse(key)
            .change_context_lazy(|| TransformError::UnparsableMetric {
                key: key.to_string(),
            })
    }

    fn builder(&self, key: &str, timestamp: i64) -> Result<MeasurementBuilder, Report<TransformError>> {
        let name = self.resolve(key)?;
        Ok(MeasurementBuilder::new(name.name(), timestamp)
            .tags(&self.base_tags)
            .tags(name.tags()))
    }
}

fn skip_failed<T>(result: Result<T, Report<TransformError>>) -> Option<T> {
    result
        .inspect_err(|report| tracing::error!(error = ?report, "Skipping metric"))
        .ok()
}
