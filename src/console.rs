//! Interactive operator menu
//!
//! Reads operator input on a helper thread so the menu loop can keep
//! checking the shutdown signal while waiting for a line.

use crate::codec::{Payload, MAX_PAYLOAD_LEN};
use crate::config::{ChannelConfig, ChannelName, Parity, StopBits, ALLOWED_BAUD_RATES};
use crate::serial::ports::print_ports;
use crate::session::ModemSession;
use crate::shutdown::ShutdownSignal;
use colored::Colorize;
use log::debug;
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// How often a blocked prompt re-checks the shutdown signal
const INPUT_POLL: Duration = Duration::from_millis(100);

/// Menu entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Settings(ChannelName),
    Send(ChannelName),
    Toggle(ChannelName),
    Help,
    Exit,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(MenuChoice::Settings(ChannelName::Acoustic)),
            "2" => Some(MenuChoice::Settings(ChannelName::Light)),
            "3" => Some(MenuChoice::Send(ChannelName::Acoustic)),
            "4" => Some(MenuChoice::Send(ChannelName::Light)),
            "5" => Some(MenuChoice::Help),
            "6" => Some(MenuChoice::Exit),
            "7" => Some(MenuChoice::Toggle(ChannelName::Acoustic)),
            "8" => Some(MenuChoice::Toggle(ChannelName::Light)),
            _ => None,
        }
    }
}

/// Parse an edited field; an empty answer keeps the current value
fn parse_field<T: FromStr>(input: &str, current: T) -> Result<T, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(current);
    }
    input.parse().map_err(|_| input.to_string())
}

/// Send each line to `tx` until input ends, fails or the receiver is gone.
///
/// Returns the number of lines delivered.
fn forward_lines<R: BufRead>(reader: R, tx: &Sender<String>) -> usize {
    let mut forwarded = 0;
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if tx.send(line).is_err() {
            break;
        }
        forwarded += 1;
    }
    forwarded
}

/// Operator lines, delivered from a background stdin reader
struct LineInput {
    lines: Receiver<String>,
}

impl LineInput {
    fn spawn() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("stdin".to_string())
            .spawn(move || {
                let forwarded = forward_lines(io::stdin().lock(), &tx);
                debug!("stdin closed after {} lines", forwarded);
            })?;
        Ok(Self { lines: rx })
    }

    /// Wait for a line; `None` on shutdown or end of input
    fn next_line(&self, shutdown: &ShutdownSignal) -> Option<String> {
        loop {
            if shutdown.is_triggered() {
                return None;
            }
            match self.lines.recv_timeout(INPUT_POLL) {
                Ok(line) => return Some(line),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

/// The interactive menu over one session
pub struct Console<'a> {
    session: &'a mut ModemSession,
    shutdown: ShutdownSignal,
    input: LineInput,
}

impl<'a> Console<'a> {
    pub fn new(session: &'a mut ModemSession) -> io::Result<Self> {
        let shutdown = session.shutdown_signal();
        Ok(Self {
            session,
            shutdown,
            input: LineInput::spawn()?,
        })
    }

    /// Run until the operator exits, input ends or shutdown is signalled
    pub fn run(&mut self) {
        self.print_menu();
        while let Some(line) = self.prompt("Select") {
            match MenuChoice::parse(&line) {
                Some(MenuChoice::Settings(name)) => self.edit_settings(name),
                Some(MenuChoice::Send(name)) => self.send(name),
                Some(MenuChoice::Toggle(name)) => self.toggle(name),
                Some(MenuChoice::Help) => print_help(),
                Some(MenuChoice::Exit) => {
                    self.shutdown.trigger();
                    break;
                }
                None if line.trim().is_empty() => {}
                None => println!("{} Unknown option: {}", "[ERROR]".red().bold(), line.trim()),
            }
            if self.shutdown.is_triggered() {
                break;
            }
            self.print_menu();
        }
    }

    fn prompt(&self, label: &str) -> Option<String> {
        print!("{}> ", label.cyan());
        // A failed flush only delays the prompt text
        let _ = io::stdout().flush();
        self.input.next_line(&self.shutdown)
    }

    /// Ask for one field; invalid answers keep the current value
    fn ask<T: FromStr + Display + Clone>(&self, label: &str, current: T) -> Option<T> {
        let line = self.prompt(&format!("  {} [{}]", label, current))?;
        match parse_field(&line, current.clone()) {
            Ok(value) => Some(value),
            Err(bad) => {
                println!(
                    "{} Invalid {} '{}', keeping {}",
                    "[WARN]".yellow().bold(),
                    label.to_lowercase(),
                    bad,
                    current
                );
                Some(current)
            }
        }
    }

    fn print_menu(&self) {
        println!("\n{}", "=".repeat(60));
        println!("{}", "Modem Link".cyan().bold());
        println!("{}", "=".repeat(60));
        for status in self.session.status() {
            let state = if status.open {
                "ON ".green().bold()
            } else {
                "OFF".red().bold()
            };
            println!(
                "  {:<16} {}  {} @ {} baud",
                format!("{} modem:", status.name),
                state,
                status.config.port.white(),
                status.config.baud_rate
            );
        }
        println!();
        println!("  1. Acoustic modem settings");
        println!("  2. Light modem settings");
        println!("  3. Send message to acoustic modem");
        println!("  4. Send message to light modem");
        println!("  5. Help");
        println!("  6. Exit");
        println!("  7. Connect/disconnect acoustic modem");
        println!("  8. Connect/disconnect light modem");
    }

    fn edit_settings(&mut self, name: ChannelName) {
        let Some(cfg) = self.prompt_config(name) else {
            return;
        };
        match self.session.reconfigure(name, cfg) {
            Ok(applied) => println!(
                "{} {} modem connected on {} at {} baud",
                "[OK]".green().bold(),
                name,
                applied.port.white(),
                applied.baud_rate
            ),
            Err(e) => println!(
                "{} {}; previous settings kept",
                "[ERROR]".red().bold(),
                e
            ),
        }
    }

    fn prompt_config(&self, name: ChannelName) -> Option<ChannelConfig> {
        let current = self.session.channel(name).config();
        println!("\n{}", format!("{} modem settings", name).white().bold());
        print_ports();
        println!("  Press Enter to keep a value.");

        let port: String = self.ask("Port", current.port.clone())?;
        let allowed: Vec<String> = ALLOWED_BAUD_RATES.iter().map(u32::to_string).collect();
        println!("  Baud rates: {}", allowed.join(", ").dimmed());
        let baud_rate = self.ask("Baud rate", current.baud_rate)?;
        let data_bits = self.ask("Data bits", current.data_bits)?;

        let stop_code = self.ask("Stop bits (1, 2)", current.stop_bits.code())?;
        let stop_bits = StopBits::from_code(stop_code).unwrap_or_else(|| {
            println!("{} Unsupported stop bits, using 1", "[WARN]".yellow().bold());
            StopBits::One
        });
        let parity_code = self.ask("Parity (0=None, 1=Odd, 2=Even)", current.parity.code())?;
        let parity = Parity::from_code(parity_code).unwrap_or_else(|| {
            println!("{} Unsupported parity, using None", "[WARN]".yellow().bold());
            Parity::None
        });

        Some(
            ChannelConfig::new(name, &port)
                .with_baud_rate(baud_rate)
                .with_data_bits(data_bits)
                .with_stop_bits(stop_bits)
                .with_parity(parity),
        )
    }

    fn send(&mut self, name: ChannelName) {
        if !self.session.channel(name).is_open() {
            println!("{} {} modem is not connected", "[ERROR]".red().bold(), name);
            return;
        }
        let Some(format) = self.prompt("Send as (1) hex (2) text [1]") else {
            return;
        };
        let payload = match format.trim() {
            "2" => {
                let Some(text) = self.prompt("Text") else {
                    return;
                };
                Payload::Text(text)
            }
            _ => {
                let label = format!("Hex (up to {} bytes)", MAX_PAYLOAD_LEN);
                let Some(hex) = self.prompt(&label) else {
                    return;
                };
                Payload::Hex(hex)
            }
        };

        match self.session.send(name, &payload) {
            Ok(sent) => println!(
                "{} Sent {} bytes to {} modem",
                "[TX]".cyan().bold(),
                sent,
                name
            ),
            Err(e) => println!("{} {}", "[ERROR]".red().bold(), e),
        }
    }

    fn toggle(&mut self, name: ChannelName) {
        if self.session.channel(name).is_open() {
            self.session.close(name);
            println!("{} {} modem disconnected", "[OK]".green().bold(), name);
            return;
        }
        match self.session.reopen(name) {
            Ok(()) => println!("{} {} modem connected", "[OK]".green().bold(), name),
            Err(e) => println!("{} {}", "[ERROR]".red().bold(), e),
        }
    }
}

fn print_help() {
    println!("\n{}", "Help".white().bold());
    println!("  Settings changes are tried on the new port first. If the new port");
    println!("  cannot be opened, the current connection stays as it was.");
    println!("  Hex messages are pairs of hex digits; spaces are ignored and at most");
    println!("  {} bytes are sent. Text messages are sent as typed.", MAX_PAYLOAD_LEN);
    println!("  Received data is printed as it arrives. Ctrl+C or Exit quits.");
}
