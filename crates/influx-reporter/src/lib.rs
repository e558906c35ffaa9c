//! Reports metric snapshots to InfluxDB as line protocol.
//!
//! A [`Reporter`] takes a [`MetricSet`] from a [`SnapshotSource`] every cycle,
//! turns it into [`Measurement`]s with a [`Transformer`] and hands them to a
//! [`Sender`], which keeps undelivered measurements for the next cycle.
//!
//! Metric keys become measurement names and tags through named regex
//! templates, or directly when a key is written as `measurement,tag=value field`
//! (see [`metric_name`]).

pub mod config;
pub mod io;
pub mod logging;
pub mod measurement;
pub mod metrics;
pub mod reporter;
pub mod transformer;

pub use config::ConfigError;
pub use config::ReporterConfig;
pub use io::InfluxDbWriter;
pub use io::Sender;
pub use io::Writer;
pub use io::WriterError;
pub use measurement::FieldValue;
pub use measurement::Measurement;
pub use measurement::MeasurementBuilder;
pub use metrics::MetricSet;
pub use metrics::SnapshotSource;
pub use metrics::TimeUnit;
pub use reporter::Reporter;
pub use transformer::metric_name::metric_name;
pub use transformer::metric_name::metric_name_with_field;
pub use transformer::Transformer;
