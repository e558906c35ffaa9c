//! Reporter configuration, loaded from YAML.

use core::error::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use derive_more::Display;
use error_stack::Report;
use error_stack::ResultExt;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::io::sender::DEFAULT_QUEUE_SIZE;
use crate::io::HttpWriter;
use crate::io::Sender;
use crate::io::TcpWriter;
use crate::io::Writer;
use crate::metrics::SnapshotSource;
use crate::metrics::TimeUnit;
use crate::reporter::Reporter;
use crate::transformer::parser::MeasurementParser;
use crate::transformer::pattern::TaggedPattern;
use crate::transformer::Transformer;

const MAX_PORT: u16 = 49151;

#[derive(Debug, Display)]
pub enum ConfigError {
    #[display("failed to read config file {path}")]
    Read { path: String },
    #[display("failed to parse config")]
    Parse,
    #[display("invalid config: {message}")]
    Invalid { message: String },
    #[display("failed to build reporter from config")]
    Build,
}

impl Error for ConfigError {}

/// Everything needed to build a [`Reporter`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReporterConfig {
    /// Tags added to every measurement.
    pub global_tags: IndexMap<String, String>,
    /// Named tag templates, tried in declaration order before the built-in ones.
    pub metric_templates: IndexMap<String, TaggedPattern>,
    pub group_gauges: bool,
    pub group_counters: bool,
    pub rate_unit: TimeUnit,
    pub duration_unit: TimeUnit,
    /// Measurements kept for retry while InfluxDB is unreachable.
    pub queue_size: usize,
    pub frequency_seconds: u64,
    pub sender: SenderConfig,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            global_tags: IndexMap::new(),
            metric_templates: IndexMap::new(),
            group_gauges: true,
            group_counters: true,
            rate_unit: TimeUnit::Seconds,
            duration_unit: TimeUnit::Milliseconds,
            queue_size: DEFAULT_QUEUE_SIZE,
            frequency_seconds: 60,
            sender: SenderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SenderConfig {
    Http(HttpSenderConfig),
    Tcp(TcpSenderConfig),
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig::Http(HttpSenderConfig::default())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpSenderConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub connect_timeout_millis: u64,
    pub timeout_millis: u64,
}

impl Default for HttpSenderConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8086,
            database: String::new(),
            connect_timeout_millis: 500,
            timeout_millis: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TcpSenderConfig {
    pub host: String,
    pub port: u16,
    pub timeout_millis: u64,
}

impl Default for TcpSenderConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8086,
            timeout_millis: 500,
        }
    }
}

impl ReporterConfig {
    /// # Errors
    ///
    /// - [`ConfigError::Parse`] if the YAML is malformed, has wrongly typed
    ///   values or contains a template that does not compile
    pub fn from_yaml_str(yaml: &str) -> Result<Self, Report<ConfigError>> {
        serde_yaml::from_str(yaml).change_context(ConfigError::Parse)
    }

    /// # Errors
    ///
    /// - [`ConfigError::Read`] if the file cannot be read
    /// - [`ConfigError::Parse`] as in [`Self::from_yaml_str`]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Report<ConfigError>> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).change_context_lazy(|| ConfigError::Read {
            path: path.display().to_string(),
        })?;
        Self::from_yaml_str(&yaml).attach_printable_lazy(|| format!("file: {}", path.display()))
    }

    /// Checks the values serde cannot.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Invalid`] naming the first offending setting
    pub fn validate(&self) -> Result<(), Report<ConfigError>> {
        let (host, port) = match &self.sender {
            SenderConfig::Http(http) => {
                if http.database.trim().is_empty() {
                    return invalid("sender.database must not be blank");
                }
                (&http.host, http.port)
            }
            SenderConfig::Tcp(tcp) => (&tcp.host, tcp.port),
        };

        if host.trim().is_empty() {
            return invalid("sender.host must not be blank");
        }
        if port > MAX_PORT {
            return invalid(format!("sender.port must be at most {MAX_PORT}, got {port}"));
        }
        if self.frequency_seconds == 0 {
            return invalid("frequencySeconds must be greater than zero");
        }
        Ok(())
    }

    pub fn frequency(&self) -> Duration {
        Duration::from_secs(self.frequency_seconds)
    }

    /// The parser for the configured templates followed by the built-in ones.
    pub fn parser(&self) -> Result<MeasurementParser, Report<ConfigError>> {
        let templates = self
            .metric_templates
            .iter()
            .map(|(name, pattern)| (name.clone(), pattern.clone()));
        MeasurementParser::with_templates(templates).change_context(ConfigError::Build)
    }

    pub fn transformer(&self) -> Result<Transformer, Report<ConfigError>> {
        Ok(Transformer::new(
            self.global_tags.clone(),
            self.parser()?,
            self.group_counters,
            self.group_gauges,
            self.rate_unit,
            self.duration_unit,
        ))
    }

    pub fn writer(&self) -> Result<Writer, Report<ConfigError>> {
        match &self.sender {
            SenderConfig::Http(http) => HttpWriter::new(
                &http.host,
                http.port,
                &http.database,
                Duration::from_millis(http.connect_timeout_millis),
                Duration::from_millis(http.timeout_millis),
            )
            .map(Writer::from)
            .change_context(ConfigError::Build),
            SenderConfig::Tcp(tcp) => Ok(Writer::from(TcpWriter::new(
                tcp.host.clone(),
                tcp.port,
                Duration::from_millis(tcp.timeout_millis),
            ))),
        }
    }

    /// Validates the configuration and assembles a reporter reading from `source`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Invalid`] if [`Self::validate`] fails
    /// - [`ConfigError::Build`] if the writer cannot be set up
    pub fn build_reporter<S: SnapshotSource>(
        &self,
        source: S,
    ) -> Result<Reporter<S, Writer>, Report<ConfigError>> {
        self.validate()?;
        let sender = Sender::new(self.writer()?, self.queue_size);
        Ok(Reporter::new(source, self.transformer()?, sender))
    }
}

fn invalid<T>(message: impl Into<String>) -> Result<T, Report<ConfigError>> {
    Err(Report::new(ConfigError::Invalid {
        message: message.into(),
    }))
}
