//! Error types for the duplex audio transport

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid format: {0}")]
    InvalidFormat(#[from] FormatError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error ends the client session (but never the process)
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Audio(AudioError::FatalDeviceState(_))
        )
    }
}

/// Rejected operator-entered format values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("sample rate must be positive, got {0}")]
    SampleRate(i64),

    #[error("channel count must be positive, got {0}")]
    Channels(i64),

    #[error("sample size must be one of 8, 16, 24 or 32 bits, got {0}")]
    SampleSize(i64),

    #[error("float samples must be 32 bits wide, got {0}")]
    FloatWidth(u16),

    #[error("period must contain at least one frame")]
    PeriodFrames,
}

/// Audio device errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Write of {requested} bytes exceeds free capacity of {free} bytes")]
    Overflow { requested: usize, free: usize },

    #[error("Buffer overrun")]
    Overrun,

    #[error("Device suspended")]
    Suspended,

    #[error("Unrecoverable device state: {0}")]
    FatalDeviceState(String),

    #[error("Stream error: {0}")]
    StreamError(String),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Could not resolve {0}")]
    Resolve(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection attempt timed out")]
    ConnectTimeout,

    #[error("Remote host closed the connection")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Socket bind failed: {0}")]
    BindFailed(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ending_errors() {
        assert!(Error::from(NetworkError::Closed).ends_session());
        assert!(Error::from(AudioError::FatalDeviceState("disconnected".into())).ends_session());
        assert!(!Error::from(AudioError::Overrun).ends_session());
        assert!(!Error::from(FormatError::Channels(0)).ends_session());
    }

    #[test]
    fn test_format_error_message() {
        let err = Error::from(FormatError::SampleSize(12));
        assert_eq!(
            err.to_string(),
            "Invalid format: sample size must be one of 8, 16, 24 or 32 bits, got 12"
        );
    }
}
