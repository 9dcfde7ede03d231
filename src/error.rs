//! Error types for telemetry capture and session persistence.
//!
//! All errors implement `std::error::Error` and carry enough context to decide
//! whether an operation can be retried.
//!
//! ## Error Categories
//!
//! - **Connection / Socket Errors**: binding, sending heartbeats, receiving datagrams
//! - **Decrypt / Parse Errors**: corrupt or truncated datagrams (recoverable, counted)
//! - **Precondition Errors**: lifecycle commands issued in the wrong state
//! - **Storage / Serialization Errors**: local key-value persistence
//! - **Upload Errors**: the remote collaborator rejected or failed a request
//! - **Config Errors**: invalid or unreadable configuration
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use slipstream::TelemetryError;
//!
//! let error = TelemetryError::connection_failed("port 33740 already in use");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type alias for telemetry operations.
pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

/// Main error type for telemetry operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    #[error("Failed to connect to console: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Socket error during {operation}")]
    Socket {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Datagram could not be decrypted: expected magic {expected:#010x}, found {found:#010x}")]
    Decrypt { expected: u32, found: u32 },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Operation not allowed: {reason}")]
    Precondition { reason: String },

    #[error("Storage error for key '{key}': {details}")]
    Storage {
        key: String,
        details: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Serialization error: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Upload of session {session_id} failed: {reason}")]
    Upload { session_id: String, reason: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

impl TelemetryError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Connection { .. } => true,
            TelemetryError::Socket { .. } => true,
            TelemetryError::Decrypt { .. } => false,
            TelemetryError::Parse { .. } => false,
            TelemetryError::Precondition { .. } => false,
            TelemetryError::Storage { .. } => true,
            TelemetryError::Serialization { .. } => false,
            TelemetryError::Upload { .. } => true,
            TelemetryError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TelemetryError::Connection { .. } => vec![
                "Ensure the console is powered on and on the same network",
                "Check that no other application is bound to the receive port",
                "Verify the configured console address",
            ],
            TelemetryError::Socket { .. } => vec![
                "Check firewall rules for UDP traffic",
                "Reconnect once the network interface is back",
            ],
            TelemetryError::Decrypt { .. } => vec![
                "Verify the packet type matches the heartbeat being sent",
                "Check for other traffic on the receive port",
            ],
            TelemetryError::Parse { .. } => vec![
                "Check data format compatibility",
                "Verify source data integrity",
            ],
            TelemetryError::Precondition { .. } => vec![
                "Connect to the console before starting a recording",
                "Check the connection state before issuing commands",
            ],
            TelemetryError::Storage { .. } => vec![
                "Ensure sufficient disk space",
                "Check permissions of the storage directory",
                "Retry the operation",
            ],
            TelemetryError::Serialization { .. } => vec![
                "Check stored data for corruption",
                "Delete the affected session if it cannot be read",
            ],
            TelemetryError::Upload { .. } => vec![
                "Check network connectivity to the upload service",
                "Retry the upload; local data is kept intact",
            ],
            TelemetryError::Config { .. } => vec![
                "Check the configuration file for typos",
                "Remove the offending key to fall back to its default",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        TelemetryError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        TelemetryError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for socket errors with the failing operation.
    pub fn socket_error(operation: impl Into<String>, source: std::io::Error) -> Self {
        TelemetryError::Socket { operation: operation.into(), source }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        TelemetryError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for rejected lifecycle commands.
    pub fn precondition(reason: impl Into<String>) -> Self {
        TelemetryError::Precondition { reason: reason.into() }
    }

    /// Helper constructor for storage errors.
    pub fn storage_error(key: impl Into<String>, details: impl Into<String>) -> Self {
        TelemetryError::Storage { key: key.into(), details: details.into(), source: None }
    }

    /// Helper constructor for storage errors caused by I/O.
    pub fn storage_io_error(key: impl Into<String>, source: std::io::Error) -> Self {
        TelemetryError::Storage {
            key: key.into(),
            details: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Helper constructor for JSON (de)serialization errors.
    pub fn serialization_error(context: impl Into<String>, source: serde_json::Error) -> Self {
        TelemetryError::Serialization { context: context.into(), source }
    }

    /// Helper constructor for upload errors.
    pub fn upload_failed(session_id: impl Into<String>, reason: impl Into<String>) -> Self {
        TelemetryError::Upload { session_id: session_id.into(), reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(reason: impl Into<String>) -> Self {
        TelemetryError::Config { reason: reason.into() }
    }
}

impl From<std::io::Error> for TelemetryError {
    fn from(err: std::io::Error) -> Self {
        TelemetryError::Socket { operation: "<unknown>".to_string(), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn error_messages_format_correctly_with_arbitrary_context(
                reason in ".*",
                key in "[a-z]+:[a-z0-9-]+",
                expected in any::<u32>(),
                found in any::<u32>(),
            ) {
                let connection = TelemetryError::connection_failed(reason.clone());
                prop_assert!(connection.to_string().contains(&reason));

                let precondition = TelemetryError::precondition(reason.clone());
                prop_assert!(precondition.to_string().contains(&reason));

                let storage = TelemetryError::storage_error(key.clone(), reason.clone());
                prop_assert!(storage.to_string().contains(&key));

                let decrypt = TelemetryError::Decrypt { expected, found };
                let message = decrypt.to_string();
                let expected_hex = format!("{:#010x}", expected);
                let found_hex = format!("{:#010x}", found);
                prop_assert!(message.contains(&expected_hex));
                prop_assert!(message.contains(&found_hex));
            }

            #[test]
            fn io_conversions_preserve_message(reason in ".*") {
                let io_err = std::io::Error::other(reason.clone());
                let converted: TelemetryError = io_err.into();
                match converted {
                    TelemetryError::Socket { source, .. } => {
                        prop_assert_eq!(source.to_string(), reason);
                    }
                    _ => prop_assert!(false, "Expected Socket error from io::Error conversion"),
                }
            }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<TelemetryError>();

        let error = TelemetryError::connection_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retry_classification() {
        assert!(TelemetryError::connection_failed("bind").is_retryable());
        assert!(TelemetryError::storage_error("session:1", "disk full").is_retryable());
        assert!(TelemetryError::upload_failed("abc", "503").is_retryable());
        assert!(!TelemetryError::precondition("not connected").is_retryable());
        assert!(!TelemetryError::Decrypt { expected: 1, found: 2 }.is_retryable());

        for error in [
            TelemetryError::connection_failed("test"),
            TelemetryError::precondition("test"),
            TelemetryError::config_error("test"),
        ] {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn storage_io_error_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let error = TelemetryError::storage_io_error("session:abc", io_err);
        assert!(std::error::Error::source(&error).is_some());
        assert!(error.to_string().contains("session:abc"));
    }
}
