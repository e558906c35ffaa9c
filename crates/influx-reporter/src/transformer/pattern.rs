//! Regex templates that extract tags from hierarchical metric names.

use core::error::Error;
use std::collections::BTreeMap;

use derive_more::Display;
use error_stack::Report;
use error_stack::ResultExt;
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Display)]
pub enum PatternError {
    #[display("invalid template pattern: {pattern}")]
    InvalidRegex { pattern: String },
    #[display("template pattern '{pattern}' has no capture group named '{group}'")]
    UnknownGroup { pattern: String, group: String },
}

impl Error for PatternError {}

/// A regex paired with the named capture groups that become tags.
///
/// The pattern has to match the whole metric name.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawTaggedPattern")]
pub struct TaggedPattern {
    pattern: String,
    tag_keys: Vec<String>,
    regex: Regex,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTaggedPattern {
    pattern: String,
    #[serde(default)]
    tag_keys: Vec<String>,
}

impl TryFrom<RawTaggedPattern> for TaggedPattern {
    type Error = Report<PatternError>;

    fn try_from(raw: RawTaggedPattern) -> Result<Self, Self::Error> {
        TaggedPattern::new(raw.pattern, raw.tag_keys)
    }
}

impl TaggedPattern {
    /// Compiles `pattern`, anchored at both ends.
    ///
    /// # Errors
    ///
    /// - [`PatternError::InvalidRegex`] if the pattern does not compile
    /// - [`PatternError::UnknownGroup`] if a tag key is not a named group of the pattern
    pub fn new<I, S>(pattern: impl Into<String>, tag_keys: I) -> Result<Self, Report<PatternError>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pattern = pattern.into();
        let tag_keys: Vec<String> = tag_keys.into_iter().map(Into::into).collect();

        let regex = Regex::new(&format!("^(?:{pattern})$")).change_context_lazy(|| {
            PatternError::InvalidRegex {
                pattern: pattern.clone(),
            }
        })?;

        if let Some(missing) = tag_keys
            .iter()
            .find(|key| !regex.capture_names().flatten().any(|name| name == key.as_str()))
        {
            return Err(Report::new(PatternError::UnknownGroup {
                pattern,
                group: missing.clone(),
            }));
        }

        Ok(Self {
            pattern,
            tag_keys,
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn tag_keys(&self) -> &[String] {
        &self.tag_keys
    }

    /// Matches `input` and returns the extracted tags.
    ///
    /// Returns `None` unless the entire input matches. Groups that did not
    /// participate or captured nothing are left out of the tags.
    pub fn tags(&self, input: &str) -> Option<BTreeMap<String, String>> {
        let captures = self.regex.captures(input)?;

        Some(
            self.tag_keys
                .iter()
                .filter_map(|key| {
                    captures
                        .name(key)
                        .filter(|m| !m.as_str().is_empty())
                        .map(|m| (key.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}
