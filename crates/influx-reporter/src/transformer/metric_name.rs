//! Resolved metric names: measurement name, tags and an optional field.
//!
//! Metric keys can carry Influx structure directly, in the form
//! `measurement[,tag1=val1,tag2=val2][ field]`.

use core::error::Error;
use std::collections::BTreeMap;
use std::fmt;

use derive_more::Display;
use error_stack::Report;

const FIELD_SEPARATOR: char = ' ';
const TAG_SEPARATOR: char = ',';
const VALUE_SEPARATOR: char = '=';
const ESCAPE_CHARS: [char; 3] = [' ', ',', '='];
const SANITIZER: &str = "-";

#[derive(Debug, Display)]
pub enum ParseError {
    #[display("too many spaces in measurement line '{line}'")]
    TooManyFields { line: String },
    #[display("tag '{segment}' in measurement line '{line}' must contain exactly one '='")]
    MalformedTag { line: String, segment: String },
    #[display("tag '{key}' appears more than once in measurement line '{line}'")]
    DuplicateTag { line: String, key: String },
}

impl Error for ParseError {}

/// Replaces the characters reserved by the line protocol with `-`.
pub fn sanitize(s: &str) -> String {
    s.replace(ESCAPE_CHARS, SANITIZER)
}

/// A measurement name, its tags and an optional field name, all sanitized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricName {
    name: String,
    tags: BTreeMap<String, String>,
    field: Option<String>,
}

impl MetricName {
    pub fn new<I, K, V>(name: &str, tags: I, field: Option<&str>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            name: sanitize(name),
            tags: tags
                .into_iter()
                .map(|(k, v)| (sanitize(k.as_ref()), sanitize(v.as_ref())))
                .collect(),
            field: field.map(sanitize),
        }
    }

    /// Parses a structured metric key, `measurement[,k=v...][ field]`.
    ///
    /// # Errors
    ///
    /// - [`ParseError::TooManyFields`] if the key contains more than one field separator
    /// - [`ParseError::MalformedTag`] if a tag segment does not split into one
    ///   non-empty key and one non-empty value
    /// - [`ParseError::DuplicateTag`] if a tag key repeats
    pub fn parse_line(line: &str) -> Result<Self, Report<ParseError>> {
        let parts = split_trimmed(line, FIELD_SEPARATOR);
        if parts.len() > 2 {
            return Err(Report::new(ParseError::TooManyFields {
                line: line.to_string(),
            }));
        }
        let field = parts.get(1).copied();

        let segments = split_trimmed(parts[0], TAG_SEPARATOR);
        let mut tags = BTreeMap::new();
        for segment in &segments[1..] {
            let (key, value) = segment
                .split_once(VALUE_SEPARATOR)
                .filter(|(k, v)| !k.is_empty() && !v.is_empty() && !v.contains(VALUE_SEPARATOR))
                .ok_or_else(|| {
                    Report::new(ParseError::MalformedTag {
                        line: line.to_string(),
                        segment: segment.to_string(),
                    })
                })?;

            if tags.insert(key, value).is_some() {
                return Err(Report::new(ParseError::DuplicateTag {
                    line: line.to_string(),
                    key: key.to_string(),
                }));
            }
        }

        Ok(Self::new(segments[0], tags, field))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// The identity used to merge grouped values into one measurement.
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            measurement: self.name.clone(),
            tags: self.tags.clone(),
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (key, value) in &self.tags {
            write!(f, "{TAG_SEPARATOR}{key}{VALUE_SEPARATOR}{value}")?;
        }
        if let Some(field) = &self.field {
            write!(f, "{FIELD_SEPARATOR}{field}")?;
        }
        Ok(())
    }
}

/// Measurement name and tag set shared by grouped metrics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    measurement: String,
    tags: BTreeMap<String, String>,
}

impl GroupKey {
    pub fn new(measurement: impl Into<String>, tags: BTreeMap<String, String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags,
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }
}

/// Splits like `str::split`, dropping trailing empty pieces but always keeping the first.
fn split_trimmed(s: &str, separator: char) -> Vec<&str> {
    let mut parts: Vec<&str> = s.split(separator).collect();
    while parts.len() > 1 && parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts
}

/// Builds the metric key that registers a metric directly under an Influx
/// measurement with `tags`.
///
/// ```
/// # use std::collections::BTreeMap;
/// let key = influx_reporter::metric_name("Measurement", &BTreeMap::from([("action", "restore")]));
/// assert_eq!(key, "Measurement,action=restore");
/// ```
pub fn metric_name<K, V>(measurement: &str, tags: &BTreeMap<K, V>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    MetricName::new(measurement, tags.iter(), None).to_string()
}

/// Like [`metric_name`], also naming the field the metric's value is written to,
/// so several gauges or counters can share one measurement.
pub fn metric_name_with_field<K, V>(measurement: &str, field: &str, tags: &BTreeMap<K, V>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    MetricName::new(measurement, tags.iter(), Some(field)).to_string()
}
