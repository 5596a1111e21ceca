//! tracemap - application maps from trace link records
//!
//! Replays a JSONL dump of link records through the topology engine.

use anyhow::{anyhow, Context};
use chrono::{DateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracemap_core::{
    Application, ConfigLoader, NodeGrouping, Range, ServiceType, ServiceTypeRegistry,
    TopologyGraph, TracemapConfig, VERSION,
};
use tracemap_store::MemoryLinkStore;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "tracemap")]
#[command(version)]
#[command(about = "Application maps and response-time histograms from trace link records", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format (json, text)
    #[arg(short, long, global = true, default_value = "json")]
    format: String,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the application map of one source from a dump
    Map {
        /// Input file (JSONL link records)
        #[arg(short, long)]
        input: PathBuf,

        /// Source application name
        #[arg(short, long)]
        source: String,

        /// Source service type, by name or code
        #[arg(short = 't', long, default_value = "TOMCAT")]
        service_type: String,

        /// Range start (epoch millis or RFC 3339)
        #[arg(long)]
        from: String,

        /// Range end (epoch millis or RFC 3339)
        #[arg(long)]
        to: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Ignore grouping rules from the config
        #[arg(long)]
        no_grouping: bool,
    },

    /// Show the bucket layout for a range
    Window {
        /// Range start (epoch millis or RFC 3339)
        #[arg(long)]
        from: String,

        /// Range end (epoch millis or RFC 3339)
        #[arg(long)]
        to: String,
    },

    /// Write the effective configuration to a file
    InitConfig {
        /// Destination (defaults to the user config path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show version, configuration and known service types
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.clone())?;

    // CLI verbose flag takes precedence, then config
    let log_level = if cli.verbose > 0 {
        match cli.verbose {
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    } else {
        match config.logging.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let text = match cli.format.to_lowercase().as_str() {
        "json" => false,
        "text" => true,
        other => return Err(anyhow!("Unknown output format: {}", other)),
    };

    match cli.command {
        Commands::Map {
            input,
            source,
            service_type,
            from,
            to,
            pretty,
            no_grouping,
        } => {
            let range = parse_range(&from, &to)?;
            map_command(
                &config,
                MapArgs {
                    input,
                    source,
                    service_type,
                    range,
                    pretty,
                    no_grouping,
                    text,
                },
            )
            .await
        }
        Commands::Window { from, to } => window_command(&config, parse_range(&from, &to)?, text),
        Commands::InitConfig { output } => init_config_command(&config, output),
        Commands::Status => status_command(&config, cli.config.as_deref()),
    }
}

fn load_config(cli_path: Option<PathBuf>) -> anyhow::Result<TracemapConfig> {
    ConfigLoader::new()
        .with_cli_path(cli_path)
        .load()
        .context("Failed to load configuration")
}

/// Epoch milliseconds, or an RFC 3339 timestamp
fn parse_time(value: &str) -> anyhow::Result<i64> {
    if let Ok(millis) = value.parse::<i64>() {
        return Ok(millis);
    }
    let parsed = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid time '{}': expected epoch millis or RFC 3339", value))?;
    Ok(parsed.timestamp_millis())
}

fn parse_range(from: &str, to: &str) -> anyhow::Result<Range> {
    Ok(Range::new(parse_time(from)?, parse_time(to)?)?)
}

fn parse_service_type(registry: &ServiceTypeRegistry, value: &str) -> anyhow::Result<ServiceType> {
    if let Ok(code) = value.parse::<u16>() {
        return Ok(ServiceType(code));
    }
    registry
        .find_by_name(value)
        .ok_or_else(|| anyhow!("Unknown service type: {}", value))
}

fn format_time(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(t) => t.to_rfc3339(),
        None => millis.to_string(),
    }
}

struct MapArgs {
    input: PathBuf,
    source: String,
    service_type: String,
    range: Range,
    pretty: bool,
    no_grouping: bool,
    text: bool,
}

async fn map_command(config: &TracemapConfig, args: MapArgs) -> anyhow::Result<()> {
    let store = MemoryLinkStore::from_dump(&args.input)
        .await
        .with_context(|| format!("Failed to load dump {}", args.input.display()))?;
    let stats = store.stats();
    info!(
        "Loaded {} caller, {} callee records and {} accept keys",
        stats.caller_records, stats.callee_records, stats.accept_keys
    );

    let builder = config.topology_builder(Arc::new(store))?;
    let service_type = parse_service_type(builder.registry(), &args.service_type)?;
    let source = Application::new(args.source, service_type);

    let grouping = config.grouping.build()?;
    let grouping: Option<&dyn NodeGrouping> = if args.no_grouping || grouping.is_empty() {
        None
    } else {
        Some(&grouping)
    };

    let graph = builder.build_topology(&source, args.range, grouping).await?;

    if args.text {
        print_graph(&graph);
    } else if args.pretty {
        println!("{}", serde_json::to_string_pretty(&graph)?);
    } else {
        println!("{}", serde_json::to_string(&graph)?);
    }
    Ok(())
}

fn print_graph(graph: &TopologyGraph) {
    println!();
    println!(
        "Topology of {} from {} to {} ({}ms buckets)",
        graph.source,
        format_time(graph.range.from()),
        format_time(graph.range.to()),
        graph.slot_size
    );
    println!();
    println!("Nodes:");
    for node in &graph.nodes {
        let s = &node.summary;
        println!(
            "  {:<40} total {:>8}  fast {:>6}  normal {:>6}  slow {:>6}  very slow {:>6}  error {:>6}",
            node.application.to_string(),
            s.total(),
            s.fast,
            s.normal,
            s.slow,
            s.very_slow,
            s.error
        );
    }
    println!();
    println!("Links:");
    if graph.links.is_empty() {
        println!("  (none)");
    }
    for link in &graph.links {
        let s = &link.summary;
        println!(
            "  {} -> {}: {} calls, {} errors",
            link.from,
            link.to,
            s.total(),
            s.error
        );
    }
    println!();
}

#[derive(Serialize)]
struct WindowLayout {
    range: Range,
    slot_size: i64,
    window_range: Range,
    buckets: Vec<i64>,
}

fn window_command(config: &TracemapConfig, range: Range, text: bool) -> anyhow::Result<()> {
    let window = tracemap_core::TimeWindow::new(range, &config.query.sampler())?;

    if text {
        println!(
            "{} buckets of {}ms, {} .. {}",
            window.bucket_count(),
            window.slot_size(),
            format_time(window.window_range().from()),
            format_time(window.window_range().to())
        );
        return Ok(());
    }

    let layout = WindowLayout {
        range: window.range(),
        slot_size: window.slot_size(),
        window_range: window.window_range(),
        buckets: window.iter().collect(),
    };
    println!("{}", serde_json::to_string_pretty(&layout)?);
    Ok(())
}

fn init_config_command(config: &TracemapConfig, output: Option<PathBuf>) -> anyhow::Result<()> {
    let path = output
        .or_else(ConfigLoader::default_config_path)
        .ok_or_else(|| anyhow!("No config directory found; pass --output"))?;
    if path.exists() {
        return Err(anyhow!("Refusing to overwrite {}", path.display()));
    }
    ConfigLoader::new().save(config, &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn status_command(config: &TracemapConfig, cli_path: Option<&Path>) -> anyhow::Result<()> {
    println!();
    println!("tracemap v{}", VERSION);
    println!();

    println!("Configuration:");
    match cli_path {
        Some(path) => println!("  File: {}", path.display()),
        None => match ConfigLoader::default_config_path() {
            Some(path) if path.exists() => println!("  File: {}", path.display()),
            _ => println!("  File: (defaults)"),
        },
    }
    println!("  Log level: {}", config.logging.level);
    println!("  Query timeout: {}ms", config.query.timeout_ms);
    println!("  Max buckets: {}", config.query.max_buckets);
    println!(
        "  Histogram: fast <= {}ms, normal <= {}ms, slow <= {}ms",
        config.histogram.fast_ms, config.histogram.normal_ms, config.histogram.slow_ms
    );
    println!("  Grouping rules: {}", config.grouping.rules.len());

    println!();
    println!("Service types:");
    let registry = ServiceTypeRegistry::new();
    for info in registry.iter() {
        println!("  {:>5}  {:<24} {:?}", info.service_type.code(), info.name, info.kind);
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(parse_time("1200").unwrap(), 1200);
        assert_eq!(parse_time("1970-01-01T00:00:01Z").unwrap(), 1000);
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_parse_range_rejects_inverted() {
        assert!(parse_range("5000", "1000").is_err());
        assert_eq!(parse_range("1000", "5000").unwrap().duration(), 4000);
    }

    #[test]
    fn test_parse_service_type() {
        let registry = ServiceTypeRegistry::new();
        assert_eq!(parse_service_type(&registry, "1010").unwrap(), ServiceType::TOMCAT);
        assert_eq!(parse_service_type(&registry, "mysql").unwrap(), ServiceType::MYSQL);
        assert!(parse_service_type(&registry, "COBOL").is_err());
    }

    #[test]
    fn test_cli_parses_map() {
        let cli = Cli::try_parse_from([
            "tracemap", "-vv", "map", "-i", "links.jsonl", "-s", "ORDER", "--from", "0", "--to",
            "60000", "--pretty",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Map {
                source,
                service_type,
                pretty,
                ..
            } => {
                assert_eq!(source, "ORDER");
                assert_eq!(service_type, "TOMCAT");
                assert!(pretty);
            }
            _ => panic!("expected map command"),
        }
    }
}
