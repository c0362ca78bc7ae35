use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use colmi_core::events::EventReceiver;
use colmi_core::{BtleTransport, ConnectionState, DriverConfig, DriverEvent, RingDriver};
use colmi_types::ActivitySample;

#[derive(Parser)]
#[command(name = "colmi")]
#[command(author, version, about = "CLI for Colmi R02-family smart rings", long_about = None)]
struct Cli {
    /// Advertised name of the target ring
    #[arg(short, long, global = true, env = "COLMI_RING_NAME", default_value = "R02_5C07")]
    name: String,

    /// Scan timeout in seconds
    #[arg(long, global = true, default_value = "15")]
    scan_timeout: u64,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for nearby peripherals without connecting
    Scan,

    /// Read the ring's battery level
    Battery,

    /// Read today's step count, calories, and distance
    Today,

    /// Read activity for a single day (0 = today, up to 6)
    Day {
        /// Day offset back from today
        offset: u8,
    },

    /// Read the last seven days of activity
    Week,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Scan => scan(&cli).await,
        Commands::Battery => battery(&cli).await,
        Commands::Today => day(&cli, 0).await,
        Commands::Day { offset } => {
            if offset > 6 {
                bail!("day offset must be 0..=6, got {offset}");
            }
            day(&cli, offset).await
        }
        Commands::Week => week(&cli).await,
    }
}

async fn new_driver(cli: &Cli) -> Result<(RingDriver, EventReceiver)> {
    let (transport, transport_events) = BtleTransport::new().await?;
    let config = DriverConfig::new(&cli.name).scan_timeout(Duration::from_secs(cli.scan_timeout));
    let driver = RingDriver::new(transport, transport_events, config)?;
    let events = driver.subscribe();
    Ok((driver, events))
}

/// Search and wait until the UART link is ready.
async fn connect(cli: &Cli) -> Result<(RingDriver, EventReceiver)> {
    let (driver, mut events) = new_driver(cli).await?;
    driver.search().await?;

    let deadline = Duration::from_secs(cli.scan_timeout + 30);
    let wait = tokio::time::timeout(deadline, async {
        loop {
            match events.recv().await {
                Ok(DriverEvent::StateChanged {
                    state: ConnectionState::Ready,
                }) => return Ok(()),
                Ok(DriverEvent::StateChanged {
                    state: ConnectionState::Failed(reason),
                }) => return Err(anyhow::anyhow!(reason)),
                Ok(_) => {}
                Err(_) => return Err(anyhow::anyhow!("driver stopped unexpectedly")),
            }
        }
    })
    .await;

    match wait {
        Ok(Ok(())) => Ok((driver, events)),
        Ok(Err(err)) => bail!("could not connect to {}: {err}", cli.name),
        Err(_) => bail!("timed out connecting to {}", cli.name),
    }
}

async fn scan(cli: &Cli) -> Result<()> {
    let (driver, mut events) = new_driver(cli).await?;
    driver.search().await?;

    let deadline = Duration::from_secs(cli.scan_timeout + 2);
    let _ = tokio::time::timeout(deadline, async {
        loop {
            match events.recv().await {
                Ok(DriverEvent::PeripheralDiscovered { handle }) => {
                    if !cli.json {
                        println!("{handle}");
                    }
                }
                Ok(DriverEvent::StateChanged { state }) if !state.is_scanning() => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
    })
    .await;

    let discovered = driver.discovered_peripherals().await;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&discovered)?);
    } else if discovered.is_empty() {
        println!("No peripherals found.");
    } else {
        println!("{} peripheral(s) found.", discovered.len());
    }
    driver.shutdown().await;
    Ok(())
}

async fn battery(cli: &Cli) -> Result<()> {
    let (driver, mut events) = connect(cli).await?;

    // The driver reads the battery as soon as the link is ready.
    let percent = wait_for_battery(&mut events).await?;
    if cli.json {
        println!("{}", serde_json::json!({ "battery": percent }));
    } else {
        println!("Battery Level: {percent}%");
    }

    driver.disconnect().await?;
    driver.shutdown().await;
    Ok(())
}

async fn day(cli: &Cli, offset: u8) -> Result<()> {
    let (driver, mut events) = connect(cli).await?;

    if offset != 0 {
        // Today is fetched eagerly; other days need an explicit request.
        driver.fetch_day(offset).await?;
    }
    let sample = wait_for_day(&mut events, offset).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&sample)?);
    } else {
        print_sample(&sample);
    }

    driver.disconnect().await?;
    driver.shutdown().await;
    Ok(())
}

async fn week(cli: &Cli) -> Result<()> {
    let (driver, mut events) = connect(cli).await?;
    driver.fetch_last_7_days().await?;

    // Account for all seven days, resolved or timed out.
    let mut remaining = 7u8;
    let wait = tokio::time::timeout(Duration::from_secs(60), async {
        while remaining > 0 {
            match events.recv().await {
                Ok(DriverEvent::DayResolved { .. }) => remaining -= 1,
                Ok(DriverEvent::RequestTimedOut {
                    day_offset: Some(offset),
                    ..
                }) => {
                    tracing::warn!(offset, "no response for day");
                    remaining -= 1;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    })
    .await;
    if wait.is_err() {
        tracing::warn!("week fetch incomplete, showing what arrived");
    }

    let snapshot = driver.snapshot().await;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot.history)?);
    } else {
        for sample in &snapshot.history {
            print_sample(sample);
        }
    }

    driver.disconnect().await?;
    driver.shutdown().await;
    Ok(())
}

async fn wait_for_battery(events: &mut EventReceiver) -> Result<u8> {
    let wait = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(DriverEvent::BatteryUpdated { percent }) => return Ok(percent),
                Ok(_) => {}
                Err(_) => return Err(anyhow::anyhow!("driver stopped unexpectedly")),
            }
        }
    })
    .await;
    match wait {
        Ok(result) => result,
        Err(_) => bail!("timed out waiting for a battery response"),
    }
}

async fn wait_for_day(events: &mut EventReceiver, offset: u8) -> Result<ActivitySample> {
    let wait = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(DriverEvent::DayResolved { sample }) if sample.day_offset == offset => {
                    return Ok(sample);
                }
                Ok(DriverEvent::RequestTimedOut {
                    day_offset: Some(o),
                    ..
                }) if o == offset => {
                    return Err(anyhow::anyhow!("no response for day {offset}"));
                }
                Ok(_) => {}
                Err(_) => return Err(anyhow::anyhow!("driver stopped unexpectedly")),
            }
        }
    })
    .await;
    match wait {
        Ok(result) => result,
        Err(_) => bail!("timed out waiting for day {offset}"),
    }
}

fn print_sample(sample: &ActivitySample) {
    let label = match sample.day_offset {
        0 => "today".to_string(),
        1 => "yesterday".to_string(),
        n => format!("{n} days ago"),
    };
    println!(
        "{label}: {} steps, {} kcal, {} m",
        sample.steps, sample.calories, sample.distance_meters
    );
}
