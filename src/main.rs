use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use cloudlist::config::{default_provider_config_path, load_provider_config};
use cloudlist::output::{JsonShape, OutputMode, Renderer, Tee};
use cloudlist::provider::ProviderRegistry;
use cloudlist::runner::{Filters, RunOptions, Runner};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// List hosts and IP addresses from every configured provider
#[derive(Parser, Debug)]
#[command(name = "cloudlist", version = cloudlist::VERSION, about, long_about = None)]
struct Args {
    /// Provider configuration file
    #[arg(long, value_name = "FILE")]
    provider_config: Option<PathBuf>,

    /// Only use these providers (comma-separated)
    #[arg(short = 'p', long = "provider", value_delimiter = ',')]
    providers: Vec<String>,

    /// Only use configuration blocks with these ids (comma-separated)
    #[arg(short = 'i', long = "id", value_delimiter = ',')]
    ids: Vec<String>,

    /// Only fetch these service categories (comma-separated)
    #[arg(short = 's', long = "service", value_delimiter = ',')]
    services: Vec<String>,

    /// Only print host names
    #[arg(long = "host", conflicts_with = "ips_only")]
    hosts_only: bool,

    /// Only print IP addresses
    #[arg(long = "ip")]
    ips_only: bool,

    /// Leave private addresses out of the output
    #[arg(long)]
    exclude_private: bool,

    /// Print one JSON object per line
    #[arg(long, conflicts_with_all = ["hosts_only", "ips_only"])]
    json: bool,

    /// In JSON mode, print the single-field records instead of provider records
    #[arg(long, requires = "json")]
    json_decomposed: bool,

    /// Also write results to this file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Don't print per-provider summaries
    #[arg(long)]
    silent: bool,

    /// Seconds to wait for one provider before giving up on it (0 = no limit)
    #[arg(long, default_value_t = 0)]
    timeout: u64,

    /// List the supported providers and exit
    #[arg(long)]
    list_providers: bool,

    /// Log level for diagnostics
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Write diagnostics to this file instead of standard error
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

impl Args {
    fn output_mode(&self) -> OutputMode {
        if self.json {
            let shape = if self.json_decomposed {
                JsonShape::Decomposed
            } else {
                JsonShape::Original
            };
            OutputMode::Json(shape)
        } else if self.hosts_only {
            OutputMode::HostsOnly
        } else if self.ips_only {
            OutputMode::IpsOnly
        } else {
            OutputMode::Default
        }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            filters: Filters {
                providers: self.providers.clone(),
                ids: self.ids.clone(),
                services: self.services.clone(),
            },
            renderer: Renderer::new(self.output_mode(), self.exclude_private),
            timeout: (self.timeout > 0).then(|| Duration::from_secs(self.timeout)),
            silent: self.silent,
        }
    }
}

/// `RUST_LOG` wins over `--log-level`; `None` means logging stays off
fn log_filter(level: LogLevel, rust_log: Option<&str>) -> Option<EnvFilter> {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return Some(filter),
            Err(e) => eprintln!("Ignoring invalid RUST_LOG ({e})"),
        }
    }
    level
        .to_tracing_level()
        .map(|l| EnvFilter::new(l.as_str().to_ascii_lowercase()))
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(filter) = log_filter(level, std::env::var("RUST_LOG").ok().as_deref()) else {
        return Ok(None);
    };

    let Some(log_path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return Ok(None);
    };

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloudlist {} started, logging to {:?}", cloudlist::VERSION, log_path);

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_file.as_deref())?;

    let registry = ProviderRegistry::builtin();

    if args.list_providers {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let config_path = args
        .provider_config
        .clone()
        .unwrap_or_else(default_provider_config_path);
    let blocks = load_provider_config(&config_path)?;
    tracing::info!("Loaded {} provider block(s) from {:?}", blocks.len(), config_path);

    let mut out = match args.output.as_deref() {
        Some(path) => Tee::with_file(path)
            .with_context(|| format!("could not create output file {}", path.display()))?,
        None => Tee::stdout(),
    };

    let runner = Runner::new(registry, args.run_options());
    let summary = runner.run(blocks, &mut out).await?;

    if summary.failed() > 0 {
        tracing::warn!(
            "{} of {} provider(s) failed to enumerate",
            summary.failed(),
            summary.reports.len()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_overrides_off() {
        let filter = log_filter(LogLevel::Off, Some("cloudlist=debug")).unwrap();
        assert!(filter.to_string().contains("cloudlist=debug"));
    }

    #[test]
    fn test_level_used_without_rust_log() {
        assert!(log_filter(LogLevel::Off, None).is_none());
        assert!(log_filter(LogLevel::Off, Some("  ")).is_none());
        assert!(log_filter(LogLevel::Info, None).is_some());
    }

    #[test]
    fn test_output_mode_from_flags() {
        let args = Args::parse_from(["cloudlist", "--json", "--json-decomposed"]);
        assert_eq!(args.output_mode(), OutputMode::Json(JsonShape::Decomposed));

        let args = Args::parse_from(["cloudlist", "--ip", "--timeout", "30"]);
        assert_eq!(args.output_mode(), OutputMode::IpsOnly);
        assert_eq!(args.run_options().timeout, Some(Duration::from_secs(30)));
        assert!(Args::try_parse_from(["cloudlist", "--host", "--ip"]).is_err());
    }
}
