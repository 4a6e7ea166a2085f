//! Colorprobe CLI - Command-line interface
//!
//! Finds the color sensor, reads it once or on an interval, and sends
//! calibration commands. Exit codes follow [`ExitCodes`].

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use colorprobe_core::cli::{format_candidates, format_reading, print_exit_codes};
use colorprobe_core::core::codec::{self, ColorReading};
use colorprobe_core::core::logger::LogLevel;
use colorprobe_core::core::simulator::SimulatedSensor;
use colorprobe_core::{
    AppConfig, CliResult, ExitCodes, OutputFormat, SensorError, SensorEvent, Session,
    SessionConfig,
};

/// Calibration point
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CalibrationPoint {
    /// Current reading becomes black
    Black,
    /// Current reading becomes white
    White,
}

/// Colorprobe CLI
#[derive(Parser, Debug)]
#[command(
    name = "colorprobe",
    version,
    about = "Read and calibrate a USB serial RGB color sensor",
    long_about = None
)]
struct Cli {
    /// Output format (defaults to the configured one)
    #[arg(short, long, value_enum, global = true)]
    format: Option<OutputFormat>,

    /// Verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path
    #[arg(long, global = true, env = "COLORPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Talk to a simulated sensor instead of real hardware
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports; sensor matches are marked
    Scan,

    /// Take a single reading
    Read {
        /// Give up after this many milliseconds
        #[arg(short, long, default_value = "2000")]
        timeout_ms: u64,
    },

    /// Poll the sensor until Ctrl+C
    Watch {
        /// Poll interval (defaults to the configured one)
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Stop after this many readings
        #[arg(short = 'n', long, value_parser = clap::value_parser!(u64).range(1..))]
        count: Option<u64>,
    },

    /// Store the current reading as a calibration point
    Calibrate {
        /// Which point to store
        #[arg(value_enum)]
        point: CalibrationPoint,
    },

    /// Check one line against the reading grammar
    Decode {
        /// Line as sent by the sensor, without the terminator
        line: String,
    },

    /// Configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the exit code table
    ExitCodes,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(&cli).await {
        Ok(result) => {
            match (&result, result.message()) {
                (CliResult::Error(..), Some(msg)) => eprintln!("Error: {msg}"),
                (_, Some(msg)) if !cli.quiet => eprintln!("{msg}"),
                _ => {}
            }
            result.to_exit_code()
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(ExitCodes::ERROR)
        }
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else if cli.quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<CliResult> {
    let config = match load_config(cli) {
        Ok(config) => config,
        Err(result) => return Ok(result),
    };
    let format = cli.format.unwrap_or(config.output.format);

    match &cli.command {
        Commands::Scan => scan(cli, &config, format).await,
        Commands::Read { timeout_ms } => read_once(cli, &config, format, *timeout_ms).await,
        Commands::Watch { interval_ms, count } => {
            let interval = interval_ms.map_or_else(|| config.poll_interval(), Duration::from_millis);
            watch(cli, &config, format, interval, *count).await
        }
        Commands::Calibrate { point } => calibrate(cli, &config, *point).await,
        Commands::Decode { line } => Ok(decode_line(line, format)),
        Commands::Config { action } => handle_config(cli, &config, action),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(CliResult::success())
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig, CliResult> {
    let loaded = match cli.config {
        Some(ref path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    loaded.map_err(CliResult::from)
}

fn open_session(cli: &Cli, config: &AppConfig) -> Session {
    let session_config = SessionConfig::from(config);
    if cli.simulate {
        Session::simulated(session_config, &SimulatedSensor::new())
    } else {
        Session::start(session_config)
    }
}

/// Ctrl+C notifications
fn interrupts() -> anyhow::Result<mpsc::UnboundedReceiver<()>> {
    let (tx, rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    Ok(rx)
}

/// Wait for the next reading, surfacing activity log entries as diagnostics
async fn next_reading(rx: &mut broadcast::Receiver<SensorEvent>) -> Option<ColorReading> {
    loop {
        match rx.recv().await {
            Ok(SensorEvent::Reading(reading)) => return Some(reading),
            Ok(SensorEvent::Log(entry)) => match entry.level {
                LogLevel::Warn => tracing::warn!("{}", entry.message),
                LogLevel::Info => tracing::info!("{}", entry.message),
                LogLevel::Data | LogLevel::Command => tracing::debug!("{}", entry.message),
            },
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Dropped {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

async fn scan(cli: &Cli, config: &AppConfig, format: OutputFormat) -> anyhow::Result<CliResult> {
    let session = open_session(cli, config);
    let result = session.scan().await;
    session.shutdown().await;

    let candidates = match result {
        Ok(candidates) => candidates,
        Err(e) => return Ok(CliResult::from(e)),
    };

    if candidates.is_empty() {
        if !cli.quiet {
            eprintln!("No serial ports found.");
        }
        return Ok(CliResult::success());
    }

    println!("{}", format_candidates(&candidates, format));
    Ok(CliResult::success())
}

async fn read_once(
    cli: &Cli,
    config: &AppConfig,
    format: OutputFormat,
    timeout_ms: u64,
) -> anyhow::Result<CliResult> {
    let mut interrupted = interrupts()?;
    let session = open_session(cli, config);
    let mut rx = session.subscribe();

    if let Err(e) = session.connect().await {
        session.shutdown().await;
        return Ok(CliResult::from(e));
    }
    if let Err(e) = session.request_reading().await {
        session.shutdown().await;
        return Ok(CliResult::from(e));
    }

    let deadline = tokio::time::sleep(Duration::from_millis(timeout_ms));
    let result = tokio::select! {
        reading = next_reading(&mut rx) => match reading {
            Some(reading) => {
                println!("{}", format_reading(&reading, format));
                CliResult::success()
            }
            None => CliResult::error(ExitCodes::INTERNAL_ERROR, "Session closed"),
        },
        () = deadline => CliResult::timeout(format!("No reading within {timeout_ms} ms")),
        _ = interrupted.recv() => CliResult::cancelled(),
    };

    session.shutdown().await;
    Ok(result)
}

async fn watch(
    cli: &Cli,
    config: &AppConfig,
    format: OutputFormat,
    interval: Duration,
    count: Option<u64>,
) -> anyhow::Result<CliResult> {
    let mut interrupted = interrupts()?;
    let session = open_session(cli, config);
    let mut rx = session.subscribe();

    if let Err(e) = session.connect().await {
        session.shutdown().await;
        return Ok(CliResult::from(e));
    }
    if let Err(e) = session.start_polling(interval).await {
        session.shutdown().await;
        return Ok(CliResult::from(e));
    }

    if !cli.quiet {
        eprintln!(
            "Polling every {} ms. Press Ctrl+C to stop.",
            interval.as_millis()
        );
    }
    if format == OutputFormat::Csv {
        println!("r,g,b");
    }

    let mut seen = 0u64;
    loop {
        tokio::select! {
            reading = next_reading(&mut rx) => {
                let Some(reading) = reading else { break };
                println!("{}", format_reading(&reading, format));
                seen += 1;
                if count.is_some_and(|n| seen >= n) {
                    break;
                }
            }
            _ = interrupted.recv() => break,
        }
    }

    let _ = session.stop_polling().await;
    let _ = session.disconnect().await;
    session.shutdown().await;

    if !cli.quiet {
        eprintln!("{seen} readings.");
    }
    Ok(CliResult::success())
}

async fn calibrate(
    cli: &Cli,
    config: &AppConfig,
    point: CalibrationPoint,
) -> anyhow::Result<CliResult> {
    let session = open_session(cli, config);

    let result = match session.connect().await {
        Ok(()) => match point {
            CalibrationPoint::Black => session.calibrate_black().await,
            CalibrationPoint::White => session.calibrate_white().await,
        },
        Err(e) => Err(e),
    };
    session.shutdown().await;

    Ok(match result {
        Ok(()) => {
            let name = match point {
                CalibrationPoint::Black => "black",
                CalibrationPoint::White => "white",
            };
            CliResult::success_with_message(format!("Calibrated {name}"))
        }
        Err(e) => CliResult::from(e),
    })
}

/// Decode one line the same way readings from the device are decoded
fn decode_reading(line: &str) -> Result<ColorReading, SensorError> {
    codec::try_decode(line.trim_end_matches(['\r', '\n']))
}

fn decode_line(line: &str, format: OutputFormat) -> CliResult {
    match decode_reading(line) {
        Ok(reading) => {
            println!("{}", format_reading(&reading, format));
            CliResult::success()
        }
        Err(SensorError::MalformedLine(line)) => CliResult::error(
            ExitCodes::VALIDATION_FAILED,
            format!("Not a reading: {line:?}"),
        ),
        Err(e) => CliResult::from(e),
    }
}

fn handle_config(
    cli: &Cli,
    config: &AppConfig,
    action: &ConfigAction,
) -> anyhow::Result<CliResult> {
    match action {
        ConfigAction::Show => {
            match cli.format {
                Some(OutputFormat::Json) => println!("{}", serde_json::to_string_pretty(config)?),
                _ => match config.to_toml() {
                    Ok(text) => print!("{text}"),
                    Err(e) => return Ok(CliResult::from(e)),
                },
            }
            Ok(CliResult::success())
        }
        ConfigAction::Init { force } => {
            let path = match cli.config.clone().or_else(colorprobe_core::config::config_path) {
                Some(path) => path,
                None => {
                    return Ok(CliResult::error(
                        ExitCodes::CONFIG_ERROR,
                        "Could not determine config directory",
                    ))
                }
            };
            if path.exists() && !force {
                return Ok(CliResult::error(
                    ExitCodes::CONFIG_ERROR,
                    format!("{} exists (use --force to overwrite)", path.display()),
                ));
            }
            match AppConfig::default().save_to(&path) {
                Ok(()) => Ok(CliResult::success_with_message(format!(
                    "Wrote {}",
                    path.display()
                ))),
                Err(e) => Ok(CliResult::from(e)),
            }
        }
    }
}
