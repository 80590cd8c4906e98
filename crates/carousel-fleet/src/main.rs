//! Carousel - dispenser fleet bring-up and maintenance CLI

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use carousel_fleet::{config, Config, Fleet};

#[derive(Parser, Debug)]
#[command(name = "carousel")]
#[command(about = "RS-485 dispenser fleet control")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "carousel.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the bus for dispensers
    Scan {
        /// Use the fast single-probe scan
        #[arg(long)]
        fast: bool,
    },
    /// Pad the registry with mock dispensers up to COUNT positions
    Fill { count: usize },
    /// Dispense from one or more positions inside a single session
    Dispense {
        #[arg(required = true)]
        positions: Vec<u32>,
    },
    /// Return a dispenser to its home state
    Reset { position: u32 },
    /// Switch a dispenser's feed motor
    Motor {
        position: u32,
        #[arg(value_enum)]
        state: MotorState,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MotorState {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Carousel v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)?;
    let fleet = Fleet::initialize(&config.channels.net, &config.channels.adam)?;

    match args.command {
        Command::Scan { fast } => {
            let positions = if fast {
                fleet.scan_fast().await
            } else {
                fleet.scan().await
            };
            println!("Found {} dispensers:", positions.len());
            for position in positions {
                println!("  - position {}", position);
            }
        }
        Command::Fill { count } => {
            fleet.create_mock_dispensers(count).await;
            let kinds = fleet.kinds().await;
            println!("Registry holds {} dispensers:", kinds.len());
            for (position, kind) in kinds {
                println!("  - position {} ({})", position, kind);
            }
        }
        Command::Dispense { positions } => {
            populate(&fleet, &config).await;
            fleet.start_session().await;
            for position in positions {
                let code = fleet.dispense(position).await?;
                println!("Dispensed item {:#018x} from position {}", code, position);
            }
            fleet.end_session().await?;
        }
        Command::Reset { position } => {
            populate(&fleet, &config).await;
            fleet.reset(position).await?;
            println!("Reset position {}", position);
        }
        Command::Motor { position, state } => {
            populate(&fleet, &config).await;
            match state {
                MotorState::On => fleet.motor_on(position).await?,
                MotorState::Off => fleet.motor_off(position).await?,
            }
            println!("Motor at position {} switched {:?}", position, state);
        }
    }

    Ok(())
}

/// Populate the registry before a position-taking command: a mock pad
/// when configured (which scans first on its own), a plain scan
/// otherwise.
async fn populate(fleet: &Fleet, config: &Config) {
    match config.fleet.mock_count {
        Some(count) => {
            fleet.create_mock_dispensers(count).await;
        }
        None => {
            fleet.scan().await;
        }
    }
}
