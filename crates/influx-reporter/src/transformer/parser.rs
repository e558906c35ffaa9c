//! Resolves raw metric keys into [`MetricName`]s through tag templates.

use dashmap::DashMap;
use error_stack::Report;

use super::metric_name::MetricName;
use super::metric_name::ParseError;
use super::pattern::PatternError;
use super::pattern::TaggedPattern;

/// Templates for the metrics common application frameworks register,
/// tried in this order after any user templates.
const BUILTIN_TEMPLATES: &[(&str, &str, &[&str])] = &[
    ("health", r".*\.health\.(?<check>.*)", &[]),
    (
        "resources",
        r".*\.resources?\.(?<resource>[A-Za-z]+)\.(?<method>[A-Za-z]+)",
        &["resource", "method"],
    ),
    ("jvm", r"^jvm$", &[]),
    ("jvm_attribute", r"jvm\.attribute.*?", &[]),
    ("jvm_buffers", r"jvm\.buffers\.?(?<type>.*)", &["type"]),
    ("jvm_classloader", r"jvm\.classloader.*", &[]),
    ("jvm_gc", r"jvm\.gc\.?(?<metric>.*)", &["metric"]),
    ("jvm_memory", r"jvm\.memory\.?(?<metric>.*)", &["metric"]),
    ("jvm_threads", r"jvm\.threads\.?(?<metric>.*)", &["metric"]),
    (
        "logging",
        r"ch\.qos\.logback\.core\.Appender\.(?<level>.*)",
        &["level"],
    ),
    ("raw_sql", r"org\.skife\.jdbi\.v2\.DBI\.raw-sql", &[]),
    (
        "clients",
        r"org\.apache\.http\.client\.HttpClient\.(?<client>.*)\.(?<metric>.*)$",
        &["client", "metric"],
    ),
    (
        "client_connections",
        r"org\.apache\.http\.conn\.HttpClientConnectionManager\.(?<client>.*)",
        &["client"],
    ),
    (
        "connections",
        r"org\.eclipse\.jetty\.server\.HttpConnectionFactory\.(?<port>[0-9]+).*",
        &["port"],
    ),
    (
        "thread_pools",
        r"org\.eclipse\.jetty\.util\.thread\.QueuedThreadPool\.(?<pool>.*)",
        &["pool"],
    ),
    (
        "http_server",
        r"io\.dropwizard\.jetty\.MutableServletContextHandler\.?(?<metric>.*)",
        &["metric"],
    ),
    (
        "data_sources",
        r"io\.dropwizard\.db\.ManagedPooledDataSource\.(?<metric>.*)",
        &["metric"],
    ),
];

/// Compiles the built-in templates in their fixed order.
pub fn builtin_templates() -> Result<Vec<(String, TaggedPattern)>, Report<PatternError>> {
    BUILTIN_TEMPLATES
        .iter()
        .map(|(name, pattern, tag_keys)| {
            TaggedPattern::new(*pattern, tag_keys.iter().copied()).map(|p| (name.to_string(), p))
        })
        .collect()
}

/// How resolved names are remembered between lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Keep every resolved name for the parser's lifetime. Registered metric
    /// names form a fixed set, so the cache stays bounded by the registry.
    #[default]
    Unbounded,
    /// Resolve on every lookup.
    Disabled,
}

/// Maps metric keys to measurement names and tags.
///
/// Keys are matched against the templates first; the first matching template
/// names the measurement. Keys no template matches are parsed as structured
/// lines (see [`MetricName::parse_line`]).
#[derive(Debug)]
pub struct MeasurementParser {
    templates: Vec<(String, TaggedPattern)>,
    policy: CachePolicy,
    cache: DashMap<String, MetricName>,
}

impl MeasurementParser {
    /// Creates a parser that uses exactly `templates`, in order.
    pub fn new(templates: Vec<(String, TaggedPattern)>) -> Self {
        Self {
            templates,
            policy: CachePolicy::default(),
            cache: DashMap::new(),
        }
    }

    /// Creates a parser trying the user `templates` in order, then the built-in ones.
    ///
    /// A user template with the same name as a built-in replaces it.
    pub fn with_templates(
        templates: impl IntoIterator<Item = (String, TaggedPattern)>,
    ) -> Result<Self, Report<PatternError>> {
        let mut merged: Vec<(String, TaggedPattern)> = templates.into_iter().collect();
        for (name, pattern) in builtin_templates()? {
            if !merged.iter().any(|(user, _)| *user == name) {
                merged.push((name, pattern));
            }
        }
        Ok(Self::new(merged))
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self.cache.clear();
        self
    }

    pub fn templates(&self) -> impl Iterator<Item = (&str, &TaggedPattern)> {
        self.templates.iter().map(|(name, p)| (name.as_str(), p))
    }

    /// Number of resolved names held in the cache.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Resolves `metric_name` from a matching template, or parses it as a structured line.
    ///
    /// # Errors
    ///
    /// - [`ParseError`] if no template matches and the key is not a valid structured line.
    ///   Failures are not cached.
    pub fn parse(&self, metric_name: &str) -> Result<MetricName, Report<ParseError>> {
        if let Some(hit) = self.cache.get(metric_name) {
            return Ok(hit.clone());
        }

        let parsed = match self.templated(metric_name) {
            Some(name) => name,
            None => MetricName::parse_line(metric_name)?,
        };

        if self.policy == CachePolicy::Unbounded {
            self.cache.insert(metric_name.to_string(), parsed.clone());
        }
        Ok(parsed)
    }

    fn templated(&self, metric_name: &str) -> Option<MetricName> {
        self.templates.iter().find_map(|(name, pattern)| {
            pattern
                .tags(metric_name)
                .map(|tags| MetricName::new(name, tags, None))
        })
    }
}
