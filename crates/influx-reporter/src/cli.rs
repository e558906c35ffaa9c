use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(about, long_about, version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a reporter configuration file
    Validate(ConfigArgs),
    /// Show the measurement, tags and field metric keys resolve to
    Resolve(ResolveArgs),
    /// Print the metric key that registers a metric under a measurement
    Name(NameArgs),
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Path to the YAML configuration
    #[arg(short, long, env = "INFLUX_REPORTER_CONFIG")]
    pub config: PathBuf,
}

#[derive(Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Metric keys to resolve
    #[arg(required = true)]
    pub keys: Vec<String>,
}

#[derive(Args)]
pub struct NameArgs {
    /// Measurement name
    pub measurement: String,

    /// Field the metric value is written to
    #[arg(short, long)]
    pub field: Option<String>,

    /// Tag as key=value, may be repeated
    #[arg(short, long = "tag", value_parser = parse_tag)]
    pub tags: Vec<(String, String)>,
}

fn parse_tag(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() && !value.is_empty() => {
            Ok((key.to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_name_with_tags() {
        let cli = Cli::parse_from([
            "influx-reporter",
            "name",
            "Measurement",
            "--field",
            "results",
            "--tag",
            "action=restore",
            "-t",
            "model=cf",
        ]);

        let Commands::Name(args) = cli.command else {
            panic!("expected name command");
        };
        assert_eq!(args.measurement, "Measurement");
        assert_eq!(args.field.as_deref(), Some("results"));
        assert_eq!(
            args.tags,
            vec![
                ("action".to_string(), "restore".to_string()),
                ("model".to_string(), "cf".to_string())
            ]
        );
    }

    #[test]
    fn rejects_malformed_tag() {
        assert!(Cli::try_parse_from(["influx-reporter", "name", "m", "--tag", "action"]).is_err());
    }

    #[test]
    fn resolve_requires_keys() {
        assert!(Cli::try_parse_from(["influx-reporter", "resolve", "--config", "c.yaml"]).is_err());
    }
}
