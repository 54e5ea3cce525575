//! Modem Link
//!
//! Operator tool for a pair of serial modems (acoustic and light).
//!
//! # Usage
//!
//! ```bash
//! # Interactive session (default)
//! modem-link
//!
//! # List available serial ports
//! modem-link ports
//!
//! # Show or change stored settings
//! modem-link config show --format toml
//! modem-link config set light --port /dev/ttyUSB2 --baud 57600
//!
//! # One-shot send
//! modem-link send acoustic "41 54 0d"
//! modem-link send light "hello" --text
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use modem_link::config::{ConfigManager, IniFileStore, LoadReport, Parity, StopBits};
use modem_link::console::Console;
use modem_link::serial::ports::print_ports;
use modem_link::serial::{ConsoleSink, SystemDriver};
use modem_link::shutdown::install_ctrlc_handler;
use modem_link::{ChannelName, ModemSession, Payload, ShutdownSignal};

/// Modem Link
///
/// Manage acoustic and light serial modems
#[derive(Parser)]
#[command(name = "modem-link")]
#[command(version)]
#[command(about = "Manage a pair of serial modems with persisted port settings")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Settings file (default: SETTINGS.INI beside the executable)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open both modems and start the interactive menu
    Run,

    /// List available serial ports
    Ports,

    /// Stored settings operations
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Open one modem, send a message and close it again
    Send {
        /// Channel name (acoustic or light)
        channel: ChannelName,

        /// Hex pairs such as "41 54 0d", or text with --text
        payload: String,

        /// Send the payload as plain text
        #[arg(long)]
        text: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the stored settings
    Show {
        #[arg(short, long, value_enum, default_value_t = ShowFormat::Ini)]
        format: ShowFormat,
    },

    /// Change stored settings without touching the hardware
    Set {
        /// Channel name (acoustic or light)
        channel: ChannelName,

        /// Serial port (e.g., COM4, /dev/ttyUSB0)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Data bits
        #[arg(long)]
        data_bits: Option<u32>,

        /// Stop bits (1 or 2)
        #[arg(long)]
        stop_bits: Option<i64>,

        /// Parity (0=None, 1=Odd, 2=Even)
        #[arg(long)]
        parity: Option<i64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ShowFormat {
    Ini,
    Toml,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let store = match cli.settings {
        Some(path) => IniFileStore::new(path),
        None => IniFileStore::beside_executable()
            .context("Failed to locate the settings file beside the executable")?,
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_session(store),
        Commands::Ports => {
            print_ports();
            Ok(())
        }
        Commands::Config(cmd) => handle_config(cmd, store),
        Commands::Send {
            channel,
            payload,
            text,
        } => {
            let payload = if text {
                Payload::Text(payload)
            } else {
                Payload::Hex(payload)
            };
            send_once(store, channel, &payload)
        }
    }
}

fn new_session(store: IniFileStore, shutdown: ShutdownSignal) -> ModemSession {
    ModemSession::new(
        ConfigManager::new(store),
        Arc::new(SystemDriver),
        Arc::new(ConsoleSink::new()),
        shutdown,
    )
}

fn print_load_report(report: &LoadReport, store: &IniFileStore) {
    if report.store_error.is_some() {
        println!(
            "{} Settings unreadable, using defaults",
            "[WARN]".yellow().bold()
        );
    } else if report.persisted {
        println!(
            "{} Settings written to {} ({} defaulted, {} repaired)",
            "[OK]".green().bold(),
            store.path().display().to_string().white(),
            report.defaulted.len(),
            report.repaired.len()
        );
    }
}

fn run_session(store: IniFileStore) -> Result<()> {
    let shutdown = ShutdownSignal::new();
    install_ctrlc_handler(&shutdown).context("Failed to install Ctrl+C handler")?;

    let mut session = new_session(store.clone(), shutdown);
    let report = session.load_all();
    print_load_report(&report, &store);

    for (name, result) in session.open_all() {
        match result {
            Ok(()) => println!("{} {} modem connected", "[OK]".green().bold(), name),
            Err(e) => println!("{} {}", "[ERROR]".red().bold(), e),
        }
    }

    Console::new(&mut session)
        .context("Failed to start console input")?
        .run();

    println!("\n{}", "Shutting down...".yellow());
    session.shutdown();
    Ok(())
}

fn handle_config(cmd: ConfigCommands, store: IniFileStore) -> Result<()> {
    let mut manager = ConfigManager::new(store.clone());
    let report = manager.load_all();
    print_load_report(&report, &store);

    match cmd {
        ConfigCommands::Show { format } => match format {
            ShowFormat::Ini => print!("{}", manager.settings().to_document().render()),
            ShowFormat::Toml => {
                let rendered = toml::to_string_pretty(manager.settings())
                    .context("Failed to render settings as TOML")?;
                print!("{}", rendered);
            }
        },
        ConfigCommands::Set {
            channel,
            port,
            baud,
            data_bits,
            stop_bits,
            parity,
        } => {
            let mut cfg = manager.get(channel).clone();
            if let Some(port) = port {
                cfg.port = port;
            }
            if let Some(baud) = baud {
                cfg.baud_rate = baud;
            }
            if let Some(bits) = data_bits {
                cfg.data_bits = bits;
            }
            if let Some(code) = stop_bits {
                cfg.stop_bits = match StopBits::from_code(code) {
                    Some(stop_bits) => stop_bits,
                    None => bail!("Stop bits must be 1 or 2, got {}", code),
                };
            }
            if let Some(code) = parity {
                cfg.parity = match Parity::from_code(code) {
                    Some(parity) => parity,
                    None => bail!("Parity must be 0, 1 or 2, got {}", code),
                };
            }

            let saved = manager
                .update(channel, cfg.clone())
                .with_context(|| format!("Failed to save {} settings", channel))?;
            if saved != cfg {
                println!(
                    "{} Some values were out of range and were reset to defaults",
                    "[WARN]".yellow().bold()
                );
            }
            println!(
                "{} {} modem: {} @ {} baud, {} data bits, stop bits {:?}, parity {:?}",
                "[OK]".green().bold(),
                channel,
                saved.port.white(),
                saved.baud_rate,
                saved.data_bits,
                saved.stop_bits,
                saved.parity
            );
        }
    }
    Ok(())
}

fn send_once(store: IniFileStore, channel: ChannelName, payload: &Payload) -> Result<()> {
    let mut session = new_session(store, ShutdownSignal::new());
    session.load_all();
    session
        .reopen(channel)
        .with_context(|| format!("Failed to open {} modem", channel))?;

    let port = session.channel(channel).config().port;
    let sent = session
        .send(channel, payload)
        .with_context(|| format!("Failed to send to {} modem", channel))?;
    println!(
        "{} Sent {} bytes to {} modem on {}",
        "[TX]".cyan().bold(),
        sent,
        channel,
        port.white()
    );

    session.shutdown();
    Ok(())
}
