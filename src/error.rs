//! Error types for the device protocol engine.
//!
//! This module provides the error handling for the bioharness library. All
//! errors implement `std::error::Error` and carry structured context for
//! debugging and recovery guidance.
//!
//! ## Error Categories
//!
//! - **Transport Errors**: the byte source failed or disconnected
//! - **File Errors**: capture dumps or timing indexes could not be read or written
//! - **Decode Errors**: a checksum-valid frame carried a payload its codec cannot accept
//! - **Heartbeat Errors**: HxM beat history could not be reconstructed across a gap
//! - **Configuration Errors**: invalid engine settings
//!
//! Framing errors ([`FramingError`]) are a separate, smaller type: the frame
//! parser recovers from them locally by resynchronizing and never hands them
//! to callers of the read loop.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use bioharness::HarnessError;
//!
//! let error = HarnessError::transport_failed("serial port closed");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// Main error type for engine operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HarnessError {
    #[error("Transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Capture file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timing index error in {context}: {details}")]
    Timing { context: String, details: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Cannot decode payload of message {message_id:#04x}: {details}")]
    Decode { message_id: u8, details: String },

    #[error("Payload of {length} bytes exceeds the 128 byte frame limit")]
    PayloadTooLong { length: usize },

    #[error("Samplerate of stream '{stream}' changed from {expected} Hz to {found} Hz without a discontinuity")]
    SampleRateMismatch { stream: String, expected: f64, found: f64 },

    #[error("Heartbeat history overflow: {increment} new beats exceed the 15 beat message history")]
    CalculationHistoryOverflow { increment: u8 },

    #[error("Background task failed: {reason}")]
    Task { reason: String },
}

impl HarnessError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            HarnessError::Transport { .. } => true,
            HarnessError::CalculationHistoryOverflow { .. } => true,
            HarnessError::File { .. } => false,
            HarnessError::Timing { .. } => false,
            HarnessError::Config { .. } => false,
            HarnessError::Decode { .. } => false,
            HarnessError::PayloadTooLong { .. } => false,
            HarnessError::SampleRateMismatch { .. } => false,
            HarnessError::Task { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            HarnessError::Transport { .. } => vec![
                "Check that the device is powered and paired",
                "Re-open the serial port",
                "Move the device closer to the receiver",
            ],
            HarnessError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
                "Ensure sufficient disk space when recording",
            ],
            HarnessError::Timing { .. } => vec![
                "Verify the timing index matches the dump file",
                "Use the .csv or .json timing format",
            ],
            HarnessError::Config { .. } => vec![
                "Check configuration values are positive",
                "Compare against the default configuration",
            ],
            HarnessError::Decode { .. } => vec![
                "Verify the device firmware emits the documented payload layout",
                "Check the capture was not truncated",
            ],
            HarnessError::PayloadTooLong { .. } => vec!["Split the payload or shorten it"],
            HarnessError::SampleRateMismatch { .. } => vec![
                "Restart the session so the stream history is rebuilt",
            ],
            HarnessError::CalculationHistoryOverflow { .. } => vec![
                "Discard the heartbeat analyzer and start a new one from this message",
                "Accept the gap in heartbeat interval history",
            ],
            HarnessError::Task { .. } => vec!["Restart the session"],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        HarnessError::File { path, source }
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        HarnessError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        HarnessError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for payload decode errors.
    pub fn decode_error(message_id: u8, details: impl Into<String>) -> Self {
        HarnessError::Decode { message_id, details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(reason: impl Into<String>) -> Self {
        HarnessError::Config { reason: reason.into() }
    }

    /// Helper constructor for timing index errors.
    pub fn timing_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        HarnessError::Timing { context: context.into(), details: details.into() }
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        HarnessError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<tokio::task::JoinError> for HarnessError {
    fn from(err: tokio::task::JoinError) -> Self {
        HarnessError::Task { reason: err.to_string() }
    }
}

/// Byte-level framing failures.
///
/// Each one discards the in-progress frame and resets the parser to seek
/// the next start byte.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    #[error("Invalid payload length {0}")]
    InvalidLength(u8),

    #[error("Checksum mismatch: calculated {expected:#04x}, received {received:#04x}")]
    ChecksumMismatch { expected: u8, received: u8 },

    #[error("Invalid terminator byte {0:#04x}")]
    InvalidTerminator(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_contain_their_context(
            reason in ".*",
            message_id in any::<u8>(),
            details in ".*",
            increment in 16u8..=255u8
          ) {
            let transport = HarnessError::transport_failed(reason.clone());
            prop_assert!(transport.to_string().contains(&reason));

            let decode = HarnessError::decode_error(message_id, details.clone());
            let decode_msg = decode.to_string();
            prop_assert!(decode_msg.contains(&details));
            let id_hex = format!("{:#04x}", message_id);
            prop_assert!(decode_msg.contains(&id_hex));

            let overflow = HarnessError::CalculationHistoryOverflow { increment };
            prop_assert!(overflow.to_string().contains(&increment.to_string()));
          }

          #[test]
          fn io_errors_convert_to_file_errors(reason in ".*") {
            let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, reason.clone());
            let converted: HarnessError = io_err.into();
            match converted {
              HarnessError::File { source, .. } => {
                prop_assert_eq!(source.to_string(), reason);
              }
              _ => prop_assert!(false, "Expected File error from io::Error conversion"),
            }
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<HarnessError>();
        assert_send_sync_static::<FramingError>();

        let error = HarnessError::transport_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn recovery_methods_work() {
        let transport = HarnessError::transport_failed("gone");
        let decode = HarnessError::decode_error(0x21, "short");
        let overflow = HarnessError::CalculationHistoryOverflow { increment: 20 };

        assert!(transport.is_retryable());
        assert!(!decode.is_retryable());
        assert!(overflow.is_retryable());

        for error in [&transport, &decode, &overflow] {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn transport_source_is_chained() {
        use std::error::Error;
        let io = std::io::Error::other("port vanished");
        let err = HarnessError::transport_failed_with_source("read failed", Box::new(io));
        assert!(err.source().is_some());
        assert!(err.source().unwrap().to_string().contains("port vanished"));
    }

    #[test]
    fn framing_errors_format() {
        assert_eq!(FramingError::InvalidLength(200).to_string(), "Invalid payload length 200");
        let mismatch = FramingError::ChecksumMismatch { expected: 0x1a, received: 0x2b };
        assert!(mismatch.to_string().contains("0x1a"));
        assert!(FramingError::InvalidTerminator(0x07).to_string().contains("0x07"));
    }
}
