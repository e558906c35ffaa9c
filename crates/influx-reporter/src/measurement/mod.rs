//! Influx measurements and their line protocol encoding.
//!
//! A [`Measurement`] holds already-rendered field values; [`MeasurementBuilder`]
//! accumulates typed values, renders them through [`FieldValue::encode`] and
//! reports invalid fields only when the measurement is finished.

use core::error::Error;
use std::fmt;

use derive_more::Display;
use error_stack::Report;
use indexmap::IndexMap;

pub mod value;

pub use value::FieldError;
pub use value::FieldValue;

const NANOS_PER_MILLI: i128 = 1_000_000;

/// Errors raised while constructing a [`Measurement`].
#[derive(Debug, Display)]
pub enum MeasurementError {
    #[display("measurement must contain a non-empty name")]
    EmptyName,
    #[display("measurement '{name}' must contain at least one field")]
    NoFields { name: String },
    #[display("measurement '{name}' has {count} invalid field(s)")]
    InvalidFields { name: String, count: usize },
}

impl Error for MeasurementError {}

/// A single line protocol record.
///
/// Tags and fields keep insertion order, which is the order they are written in.
/// Values are expected to be escaped already; the backend drops lines it cannot parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    name: String,
    tags: IndexMap<String, String>,
    fields: IndexMap<String, String>,
    timestamp: i64,
}

impl Measurement {
    /// Creates a measurement from rendered field values.
    ///
    /// `timestamp` is in milliseconds since the epoch.
    ///
    /// # Errors
    ///
    /// - [`MeasurementError::EmptyName`] if `name` is empty
    /// - [`MeasurementError::NoFields`] if `fields` is empty
    pub fn new(
        name: impl Into<String>,
        tags: IndexMap<String, String>,
        fields: IndexMap<String, String>,
        timestamp: i64,
    ) -> Result<Self, Report<MeasurementError>> {
        let name = name.into();
        if name.is_empty() {
            return Err(Report::new(MeasurementError::EmptyName));
        }
        if fields.is_empty() {
            return Err(Report::new(MeasurementError::NoFields { name }));
        }

        Ok(Self {
            name,
            tags,
            fields,
            timestamp,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &IndexMap<String, String> {
        &self.tags
    }

    pub fn fields(&self) -> &IndexMap<String, String> {
        &self.fields
    }

    /// Milliseconds since the epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Returns the measurement as a line protocol line without the trailing newline.
    ///
    /// The timestamp is written in nanoseconds, at millisecond precision.
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (key, value) in &self.tags {
            write!(f, ",{key}={value}")?;
        }

        write!(f, " ")?;
        write_pairs(f, &self.fields)?;

        write!(f, " {}", i128::from(self.timestamp) * NANOS_PER_MILLI)
    }
}

fn write_pairs(f: &mut fmt::Formatter<'_>, pairs: &IndexMap<String, String>) -> fmt::Result {
    let mut first = true;
    for (key, value) in pairs {
        if !first {
            write!(f, ",")?;
        }
        write!(f, "{key}={value}")?;
        first = false;
    }
    Ok(())
}

/// Accumulates tags and typed fields for a [`Measurement`].
#[derive(Debug)]
pub struct MeasurementBuilder {
    name: String,
    timestamp: i64,
    tags: IndexMap<String, String>,
    fields: IndexMap<String, String>,
    errors: Vec<FieldError>,
}

impl MeasurementBuilder {
    pub fn new(name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            timestamp,
            tags: IndexMap::new(),
            fields: IndexMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds every pair to the tags, later keys overwriting earlier ones.
    pub fn tags<K, V>(mut self, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Renders and adds a field.
    ///
    /// Omitted values (null, NaN, infinities) leave the field out; unsupported
    /// values are recorded and surface when the measurement is built.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let key = key.into();
        match value.into().encode(&key) {
            Ok(Some(rendered)) => {
                self.fields.insert(key, rendered);
            }
            Ok(None) => {}
            Err(e) => self.errors.push(e),
        }
        self
    }

    pub fn fields<K, V>(self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        fields
            .into_iter()
            .fold(self, |builder, (key, value)| builder.field(key, value))
    }

    /// Whether [`Self::build_lenient`] would produce a measurement.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.fields.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Builds the measurement, failing if any field was rejected.
    ///
    /// # Errors
    ///
    /// - [`MeasurementError::InvalidFields`] if any added field was unsupported;
    ///   each field error is attached to the report
    /// - [`MeasurementError::EmptyName`] / [`MeasurementError::NoFields`] as in
    ///   [`Measurement::new`]
    pub fn build(self) -> Result<Measurement, Report<MeasurementError>> {
        if !self.errors.is_empty() {
            let count = self.errors.len();
            let report = Report::new(MeasurementError::InvalidFields {
                name: self.name,
                count,
            });
            return Err(self
                .errors
                .into_iter()
                .fold(report, |report, e| report.attach_printable(e.to_string())));
        }

        Measurement::new(self.name, self.tags, self.fields, self.timestamp)
    }

    /// Builds the measurement from the valid fields only.
    ///
    /// The rejected fields are returned alongside the outcome so callers can
    /// log them; construction still fails when no valid field is left.
    pub fn build_lenient(self) -> (Result<Measurement, Report<MeasurementError>>, Vec<FieldError>) {
        let result = Measurement::new(self.name, self.tags, self.fields, self.timestamp);
        (result, self.errors)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn pairs(items: &[(&str, &str)]) -> IndexMap<String, String> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn encode_without_tags() {
        let measurement =
            Measurement::new("Measurement", IndexMap::new(), pairs(&[("val", "5i")]), 1304695)
                .unwrap();

        assert_eq!(measurement.to_line(), "Measurement val=5i 1304695000000");
    }

    #[test]
    fn encode_keeps_insertion_order() {
        let measurement = Measurement::new(
            "Measurement",
            pairs(&[("action", "restore"), ("model", "cf-2-005")]),
            pairs(&[("val", "5i"), ("other-val", "true")]),
            1304695,
        )
        .unwrap();

        assert_eq!(
            measurement.to_line(),
            "Measurement,action=restore,model=cf-2-005 val=5i,other-val=true 1304695000000"
        );
        assert_eq!(measurement.to_string(), measurement.to_line());
    }

    #[test]
    fn encoded_line_is_valid_line_protocol() {
        let measurement = Measurement::new(
            "jvm",
            pairs(&[("host", "web-1")]),
            pairs(&[("heap", "1024i"), ("ratio", "0.5"), ("healthy", "true")]),
            1500,
        )
        .unwrap();
        let line = measurement.to_line();

        let parsed = influxdb_line_protocol::parse_lines(&line)
            .next()
            .expect("one line")
            .expect("valid line protocol");

        assert_eq!(parsed.series.measurement.to_string(), "jvm");
        assert_eq!(parsed.timestamp, Some(1_500_000_000));
        assert_eq!(parsed.field_set.len(), 3);
        assert!(matches!(
            parsed.field_set[0].1,
            influxdb_line_protocol::FieldValue::I64(1024)
        ));
        assert!(matches!(
            parsed.field_set[2].1,
            influxdb_line_protocol::FieldValue::Boolean(true)
        ));
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = Measurement::new("", IndexMap::new(), pairs(&[("val", "1i")]), 0).unwrap_err();
        assert!(matches!(err.current_context(), MeasurementError::EmptyName));
    }

    #[test]
    fn empty_fields_are_rejected() {
        let err = Measurement::new("m", IndexMap::new(), IndexMap::new(), 0).unwrap_err();
        assert!(matches!(
            err.current_context(),
            MeasurementError::NoFields { name } if name == "m"
        ));
    }

    #[test]
    fn builder_renders_typed_fields() {
        let measurement = MeasurementBuilder::new("Measurement", 90210)
            .tag("env", "test")
            .field("some", true)
            .field("fields", 5i64)
            .field("ratio", 0.25f64)
            .build()
            .unwrap();

        assert_eq!(measurement.fields(), &pairs(&[("some", "true"), ("fields", "5i"), ("ratio", "0.25")]));
        assert_eq!(measurement.tags(), &pairs(&[("env", "test")]));
        assert_eq!(measurement.timestamp(), 90210);
    }

    #[test]
    fn builder_skips_omitted_values() {
        let builder = MeasurementBuilder::new("m", 0)
            .field("nan", f64::NAN)
            .field("missing", FieldValue::Null);

        assert!(!builder.is_valid());
        assert!(builder.errors().is_empty());
    }

    #[test]
    fn builder_later_tags_overwrite_earlier() {
        let measurement = MeasurementBuilder::new("m", 0)
            .tags([("env", "global"), ("host", "a")])
            .tags([("env", "local")])
            .field("value", 1i64)
            .build()
            .unwrap();

        assert_eq!(measurement.tags(), &pairs(&[("env", "local"), ("host", "a")]));
    }

    #[test]
    fn strict_build_fails_on_invalid_field() {
        let err = MeasurementBuilder::new("m", 0)
            .field("ok", 1i64)
            .field("bad", vec![1i64, 2])
            .build()
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            MeasurementError::InvalidFields { count: 1, .. }
        ));
        assert!(format!("{err:?}").contains("bad"));
    }

    #[test]
    fn lenient_build_drops_invalid_fields() {
        let (result, dropped) = MeasurementBuilder::new("m", 0)
            .field("ok", 1i64)
            .field("bad", vec![1i64, 2])
            .build_lenient();

        let measurement = result.unwrap();
        assert_eq!(measurement.fields(), &pairs(&[("ok", "1i")]));
        assert_eq!(dropped.len(), 1);
    }

    #[test]
    fn lenient_build_fails_without_valid_fields() {
        let (result, dropped) = MeasurementBuilder::new("m", 0)
            .field("bad", vec![true])
            .build_lenient();

        assert!(result.is_err());
        assert_eq!(dropped.len(), 1);
    }
}
