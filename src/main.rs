use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{error, info, warn, LevelFilter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zerotrace::bus::{EventBus, InMemoryBus};
use zerotrace::collectors::{JsonLinesSource, PollingCollector};
use zerotrace::config::{ServiceLocator, Settings};
use zerotrace::error::ConfigError;
use zerotrace::events::Event;
use zerotrace::health::health_status;
use zerotrace::lifecycle::{install_signal_handler, ServiceRunner};
use zerotrace::topology::{Exchange, Topic, Topology};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command-line arguments for the ZeroTrace foundation tools
#[derive(Parser)]
#[command(
    name = "zerotrace",
    version,
    about = "ZeroTrace XDR foundation tools - topology, service location and event validation",
    long_about = "Operator tooling for the ZeroTrace event bus: inspect the exchange and routing-key \
                  catalog, resolve the configured infrastructure services, validate event documents \
                  and replay recorded events through a collector."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable debug logging regardless of LOG_LEVEL")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every exchange with its routing keys
    Topology,

    /// Print the resolved service endpoints
    Services {
        /// Also print connection URLs (these include credentials)
        #[arg(long)]
        urls: bool,
    },

    /// Print a health report for the configured services as JSON
    Health,

    /// Check a file of newline-delimited event documents
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Publish events from a newline-delimited file until interrupted
    Replay {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Milliseconds between polls of the file
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults in load_config
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        if let Command::Replay { interval_ms: 0, .. } = self.command {
            return Err("Replay interval must be greater than zero".to_string());
        }

        Ok(())
    }
}

/// Load settings: defaults, then the TOML file if given, then the environment
///
/// An unreadable or invalid file is reported and replaced by defaults. Invalid
/// environment values are errors.
fn load_config(config_path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut settings = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            match Settings::from_file(path) {
                Ok(settings) => settings,
                Err(ConfigError::ReadError(_)) => {
                    warn!(
                        "Configuration file '{}' not found or unreadable, using defaults",
                        path.display()
                    );
                    Settings::default()
                }
                Err(e) => {
                    error!("Configuration error in '{}': {}", path.display(), e);
                    warn!("Using default configuration due to invalid config file");
                    Settings::default()
                }
            }
        }
        None => Settings::default(),
    };

    settings.apply_env(|key| std::env::var(key).ok())?;
    Ok(settings)
}

fn print_topology(topology: &Topology) {
    for exchange in Exchange::ALL {
        println!("{}", topology.exchange_name(exchange));
        for topic in exchange.topics() {
            println!("  {}", topic.routing_key());
        }
    }
}

fn print_services(locator: &ServiceLocator, urls: bool) -> anyhow::Result<()> {
    for (name, endpoint) in locator.list_services() {
        println!("{:<10} {}", name.as_str(), endpoint.url());
    }

    if urls {
        println!();
        println!("database   {}", locator.database_url()?);
        println!("broker     {}", locator.broker_url()?);
        println!("cache      {}", locator.cache_url()?);
    }
    Ok(())
}

/// Returns the number of invalid documents
fn validate_events(path: &Path, topology: &Topology) -> anyhow::Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut valid = 0;
    let mut invalid = 0;
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match Event::from_json(line) {
            Ok(event) => {
                valid += 1;
                let route = topology.route(Topic::for_family(event.family()));
                let note = if event.family_matches_type() {
                    ""
                } else {
                    " (event type does not match payload family)"
                };
                println!(
                    "{:>5}: ok {} {} -> {}/{}{}",
                    index + 1,
                    event.event_id(),
                    event.event_type(),
                    route.exchange,
                    route.routing_key,
                    note
                );
            }
            Err(e) => {
                invalid += 1;
                println!("{:>5}: invalid: {}", index + 1, e);
            }
        }
    }

    println!("{} valid, {} invalid", valid, invalid);
    Ok(invalid)
}

async fn replay(path: &Path, interval: Duration, topology: Topology) -> anyhow::Result<()> {
    let token = CancellationToken::new();
    install_signal_handler(token.clone())?;

    let bus = Arc::new(InMemoryBus::new());
    let events_exchange = topology.exchange_name(Exchange::Events);
    let mut deliveries = bus.subscribe(&events_exchange, "#").await?;
    let printer = tokio::spawn(async move {
        while let Some(envelope) = deliveries.next().await {
            match Event::from_slice(&envelope.body) {
                Ok(event) => println!(
                    "{}/{} {} {}",
                    envelope.exchange,
                    envelope.routing_key,
                    event.event_id(),
                    event.event_type()
                ),
                Err(e) => warn!("Undecodable delivery on {}: {}", envelope.routing_key, e),
            }
        }
    });

    let mut collector = PollingCollector::new(
        "replay-collector",
        VERSION,
        JsonLinesSource::new(path),
        Arc::clone(&bus),
        topology,
    )
    .with_interval(interval);

    info!("Replaying {}. Press Ctrl+C to stop.", path.display());
    let mut runner = ServiceRunner::new();
    let outcome = runner.run(&mut collector, token).await?;

    bus.close();
    if let Err(e) = printer.await {
        warn!("Delivery printer failed: {}", e);
    }

    if !outcome.is_clean() {
        bail!("Replay ended abnormally: {:?}", outcome);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Everything passes the logger; the level is capped by log::set_max_level below
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
    log::set_max_level(if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });

    if let Err(e) = cli.validate() {
        bail!("Invalid arguments: {}", e);
    }

    let settings = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if !cli.verbose {
        log::set_max_level(settings.log_level_filter());
    }
    if settings.dev_mode {
        info!("Development mode enabled");
    }

    let locator = ServiceLocator::from_settings(settings);
    let topology = locator.topology();

    match cli.command {
        Command::Topology => print_topology(&topology),
        Command::Services { urls } => print_services(&locator, urls)?,
        Command::Health => {
            let status = health_status("zerotrace", &locator.check_all());
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !status.is_healthy() {
                bail!("Unhealthy: {}", status.failing_checks().join(", "));
            }
        }
        Command::Validate { file } => {
            let invalid = validate_events(&file, &topology)?;
            if invalid > 0 {
                bail!("{} invalid event documents in {}", invalid, file.display());
            }
        }
        Command::Replay { file, interval_ms } => {
            replay(&file, Duration::from_millis(interval_ms), topology).await?
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn cli(config: Option<PathBuf>) -> Cli {
        Cli {
            config,
            verbose: false,
            command: Command::Topology,
        }
    }

    #[test]
    fn test_cli_validation_with_existing_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "bus_namespace = \"lab\"").unwrap();

        assert!(cli(Some(file.path().to_path_buf())).validate().is_ok());
    }

    #[test]
    fn test_cli_validation_with_missing_file() {
        // Missing files are handled by falling back to defaults
        assert!(cli(Some(PathBuf::from("/nonexistent/config.toml")))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_cli_validation_with_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cli(Some(dir.path().to_path_buf())).validate().is_err());
    }

    #[test]
    fn test_cli_validation_no_config() {
        assert!(cli(None).validate().is_ok());
    }

    #[test]
    fn test_cli_rejects_zero_replay_interval() {
        let cli = Cli {
            config: None,
            verbose: false,
            command: Command::Replay {
                file: PathBuf::from("events.jsonl"),
                interval_ms: 0,
            },
        };
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["zerotrace", "-c", "zt.toml", "validate", "events.jsonl"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("zt.toml")));
        assert!(matches!(cli.command, Command::Validate { ref file } if file == Path::new("events.jsonl")));

        let cli = Cli::try_parse_from(["zerotrace", "services", "--urls"]).unwrap();
        assert!(matches!(cli.command, Command::Services { urls: true }));
    }

    #[test]
    fn test_load_config_falls_back_on_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml = = =").unwrap();

        let settings = load_config(Some(file.path())).unwrap();
        assert_eq!(settings.database.port, Settings::default().database.port);
    }

    #[test]
    fn test_validate_events_counts_invalid_lines() {
        let event = zerotrace::events::process_event(
            zerotrace::events::SourceInfo::new("process-collector", "1.0.0", "sensor-1"),
            "ws-1",
            zerotrace::events::EventType::ProcessCreated,
            10,
            1,
            "sh",
            "sh -c id",
        )
        .unwrap();

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", event.to_json().unwrap()).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{{\"event_id\": \"x\"}}").unwrap();

        let invalid = validate_events(file.path(), &Topology::default()).unwrap();
        assert_eq!(invalid, 1);
    }
}
