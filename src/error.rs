//! Error types for modem link operations

use crate::codec::CodecError;
use crate::config::{ChannelName, StoreError};
use crate::serial::ConfigureStep;

#[derive(Debug, thiserror::Error)]
pub enum ModemError {
    #[error("settings store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to open serial port {port}: {source}")]
    PortOpenFailed {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to configure serial port {port} ({step}): {source}")]
    PortConfigureFailed {
        port: String,
        step: ConfigureStep,
        #[source]
        source: serialport::Error,
    },

    #[error("invalid payload: {0}")]
    Encoding(#[from] CodecError),

    #[error("failed to send message on {channel}: {source}")]
    WriteFailed {
        channel: ChannelName,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read from {channel}: {source}")]
    ReadFailed {
        channel: ChannelName,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} modem is not connected")]
    NotOpen(ChannelName),
}

pub type Result<T> = std::result::Result<T, ModemError>;
