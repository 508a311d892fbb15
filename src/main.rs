use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use rg_probe::config::AppConfig;
use rg_probe::core::{MetricService, MetricsProvider, Publisher, TestProvider};
use rg_probe::poller::PollDriver;
use rg_probe::publish::{JsonLinesPublisher, JsonLinesWriter, LogPublisher};
use rg_probe::sources::{self, SysinfoProvider};
use std::path::PathBuf;
use std::sync::Arc;

/// Output format for published values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// `path = value` log lines
    Log,
    /// One JSON object per line on stdout
    Json,
}

/// rg-probe - resolves configured topics to host measurements and publishes them
#[derive(Parser, Debug, Clone)]
#[command(name = "rg-probe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of the default location
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug verbosity level (0=quiet, 1=info, 2=debug, 3=trace)
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", default_value = "0")]
    debug: u8,

    /// Publish the startup snapshot and exit
    #[arg(long = "once")]
    once: bool,

    /// List enumerated devices with their indices and exit
    #[arg(short = 'l', long = "list")]
    list_devices: bool,

    /// How published values are written
    #[arg(long = "format", value_enum, default_value = "log")]
    format: OutputFormat,

    /// Use the in-memory test provider instead of reading the host
    #[arg(long = "test-provider")]
    test_provider: bool,

    /// Write the built-in configuration to the config path and exit
    #[arg(long = "write-default-config")]
    write_default_config: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Level 0 (default): warn only, plus the published values of the log publisher
    // Level 1: info
    // Level 2: debug
    // Level 3+: trace
    let log_level = match cli.debug {
        0 => "warn,rg_probe::publish=info",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // Allow RUST_LOG to override CLI setting
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    warn!("Starting rg-probe v{}", env!("CARGO_PKG_VERSION"));

    if cli.write_default_config {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => AppConfig::config_path()?,
        };
        AppConfig::default().save_to_path(&path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let provider: Arc<dyn MetricsProvider> = if cli.test_provider {
        info!("Using in-memory test provider");
        Arc::new(TestProvider::sample())
    } else {
        // Initialize shared sensor caches before the first read
        sources::initialize_sensors();
        Arc::new(SysinfoProvider::new())
    };

    if cli.list_devices {
        return list_devices(provider.as_ref());
    }

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };

    let (publisher, writer): (Arc<dyn Publisher>, Option<JsonLinesWriter>) = match cli.format {
        OutputFormat::Log => (Arc::new(LogPublisher), None),
        OutputFormat::Json => {
            let (publisher, writer) = JsonLinesPublisher::spawn(std::io::stdout())?;
            (Arc::new(publisher), Some(writer))
        }
    };

    let service = Arc::new(MetricService::new(config.topics.clone(), provider, publisher));
    service.on_init_with_ttl(config.poll.initial_refresh_ms());

    if !cli.once {
        run_driver(service.clone(), &config)?;
    }

    // Dropping the last service handle closes the JSON channel
    drop(service);
    if let Some(writer) = writer {
        writer.wait();
    }
    Ok(())
}

fn run_driver(service: Arc<MetricService>, config: &AppConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async {
        let driver = PollDriver::new(service, &config.poll);
        if driver.is_empty() {
            warn!("No topics resolved, nothing to poll");
            return;
        }
        info!(
            "Polling {} topics every {:?}",
            driver.len(),
            config.poll.base_interval()
        );

        tokio::select! {
            _ = driver.run() => {}
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for ctrl-c: {}", e);
                }
                info!("Shutting down");
            }
        }
    });
    Ok(())
}

/// Print every enumerated device with the index a topic would use for it
fn list_devices(provider: &dyn MetricsProvider) -> Result<()> {
    let os = provider.os_info()?;
    println!("{} {} ({})", os.family, os.version, os.manufacturer);
    println!("probe process id: {}", provider.process_id());

    let cpu = provider.cpu_identity()?;
    println!();
    println!(
        "CPU: {} ({} physical / {} logical cores)",
        cpu.name, cpu.physical_cores, cpu.logical_cores
    );

    println!();
    println!("STORAGE:");
    for (index, store) in provider.file_stores()?.iter().enumerate() {
        println!(
            "  [{}] {} on {} ({}, {})",
            index, store.name, store.mount_point, store.fs_type, store.description
        );
    }

    println!();
    println!("DRIVE:");
    for (index, disk) in provider.disk_stores()?.iter().enumerate() {
        println!("  [{}] {} {} {}", index, disk.name, disk.model, disk.serial);
    }

    println!();
    println!("NETWORK:");
    for (index, interface) in provider.network_interfaces()?.iter().enumerate() {
        let addresses = interface
            .ipv4_addresses
            .iter()
            .chain(&interface.ipv6_addresses)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  [{}] {} {} {}",
            index, interface.name, interface.mac_address, addresses
        );
    }

    println!();
    println!("DISPLAY:");
    for (index, display) in provider.displays()?.iter().enumerate() {
        println!("  [{}] {} ({} byte EDID)", index, display.name, display.edid.len());
    }

    println!();
    println!("BATTERY:");
    for (index, battery) in provider.power_sources()?.iter().enumerate() {
        println!(
            "  [{}] {} {:.0}%",
            index,
            battery.name,
            battery.remaining_capacity * 100.0
        );
    }

    println!();
    println!("SENSORS (fan index):");
    for (index, rpm) in provider.fan_speeds()?.iter().enumerate() {
        println!("  [{}] {} RPM", index, rpm);
    }

    Ok(())
}
