//! Background draining of inbound data
//!
//! One reader thread runs per open channel. It reads through the channel's
//! lock with a bounded wait, hands non-empty chunks to a [`MessageSink`] and
//! stops once the shutdown signal is set or the channel is closed.

use super::channel::{Channel, ReadOutcome};
use crate::config::ChannelName;
use crate::shutdown::ShutdownSignal;
use chrono::Local;
use colored::Colorize;
use log::{debug, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Largest chunk read at once
pub const READ_BUFFER_SIZE: usize = 2047;

/// Pause after an empty read so the control thread can take the lock
const IDLE_BACKOFF: Duration = Duration::from_millis(5);

/// Pause after a failed read
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Receiver of inbound data
pub trait MessageSink: Send + Sync {
    fn on_received(&self, channel: ChannelName, data: &[u8]);
}

/// Prints received messages to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    pub show_timestamps: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            show_timestamps: true,
        }
    }

    /// Format one received chunk as a console line
    pub fn format(&self, channel: ChannelName, data: &[u8]) -> String {
        let mut output = String::new();
        if self.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S%.3f");
            output.push_str(&format!("{} ", timestamp.to_string().dimmed()));
        }
        output.push_str(&format!(
            "{} >> {}",
            format!("Received Message({})", channel).cyan(),
            String::from_utf8_lossy(data)
        ));
        output
    }
}

impl MessageSink for ConsoleSink {
    fn on_received(&self, channel: ChannelName, data: &[u8]) {
        println!("{}", self.format(channel, data));
    }
}

/// Why a reader stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    Shutdown,
    ChannelClosed,
}

/// Reader for one channel
pub struct ReaderLoop {
    channel: Arc<Channel>,
    shutdown: ShutdownSignal,
    sink: Arc<dyn MessageSink>,
}

impl ReaderLoop {
    pub fn new(channel: Arc<Channel>, shutdown: ShutdownSignal, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            channel,
            shutdown,
            sink,
        }
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<ReaderExit>> {
        let name = format!("reader-{}", self.channel.name()).to_lowercase();
        thread::Builder::new().name(name).spawn(move || self.run())
    }

    /// Drain the channel until shutdown or close
    pub fn run(self) -> ReaderExit {
        let name = self.channel.name();
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        debug!("{} reader started", name);

        let exit = loop {
            if self.shutdown.is_triggered() {
                break ReaderExit::Shutdown;
            }

            match self.channel.read(&mut buffer) {
                Ok(ReadOutcome::Closed) => break ReaderExit::ChannelClosed,
                Ok(ReadOutcome::Data(0)) => thread::sleep(IDLE_BACKOFF),
                Ok(ReadOutcome::Data(n)) => self.sink.on_received(name, &buffer[..n]),
                Err(e) => {
                    warn!("{}", e);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        };

        debug!("{} reader stopped ({:?})", name, exit);
        exit
    }
}
