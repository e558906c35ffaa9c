mod cli;

use std::collections::BTreeMap;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use influx_reporter::config::SenderConfig;
use influx_reporter::logging;
use influx_reporter::ReporterConfig;

use crate::cli::Cli;
use crate::cli::Commands;
use crate::cli::ConfigArgs;
use crate::cli::NameArgs;
use crate::cli::ResolveArgs;

fn main() -> Result<ExitCode> {
    logging::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate(args) => validate(args),
        Commands::Resolve(args) => resolve(args),
        Commands::Name(args) => name(args),
    }
}

fn load(args: &ConfigArgs) -> Result<ReporterConfig> {
    let config = ReporterConfig::from_path(&args.config)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {e:?}"))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;
    Ok(config)
}

fn validate(args: ConfigArgs) -> Result<ExitCode> {
    let config = load(&args)?;
    config.writer().map_err(|e| anyhow::anyhow!("{e:?}"))?;
    let parser = config.parser().map_err(|e| anyhow::anyhow!("{e:?}"))?;

    let sender = match &config.sender {
        SenderConfig::Http(http) => format!("http://{}:{} (database {})", http.host, http.port, http.database),
        SenderConfig::Tcp(tcp) => format!("tcp://{}:{}", tcp.host, tcp.port),
    };
    println!("{} is valid", args.config.display());
    println!("  sender:     {sender}");
    println!("  templates:  {} ({} configured)", parser.templates().count(), config.metric_templates.len());
    println!("  frequency:  {:?}", config.frequency());
    println!("  queue size: {}", config.queue_size);

    Ok(ExitCode::SUCCESS)
}

fn resolve(args: ResolveArgs) -> Result<ExitCode> {
    let config = load(&args.config)?;
    let parser = config.parser().map_err(|e| anyhow::anyhow!("{e:?}"))?;

    let mut failed = false;
    for key in &args.keys {
        match parser.parse(key) {
            Ok(resolved) => println!("{key} => {resolved}"),
            Err(report) => {
                tracing::error!(key = %key, error = ?report, "Failed to resolve metric key");
                failed = true;
            }
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn name(args: NameArgs) -> Result<ExitCode> {
    let tags: BTreeMap<String, String> = args.tags.into_iter().collect();

    let key = match &args.field {
        Some(field) => influx_reporter::metric_name_with_field(&args.measurement, field, &tags),
        None => influx_reporter::metric_name(&args.measurement, &tags),
    };
    println!("{key}");

    Ok(ExitCode::SUCCESS)
}
