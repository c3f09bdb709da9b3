//! Error types for Device Farm operations.
//!
//! Every fallible library operation returns [`DeviceFarmResult<T>`]. The
//! variants are grouped by how the pipeline reacts to them:
//!
//! - **Fatal before upload**: [`NotFound`](DeviceFarmError::NotFound),
//!   [`InvalidDevicePool`](DeviceFarmError::InvalidDevicePool)
//! - **Fatal during upload**: [`Transfer`](DeviceFarmError::Transfer),
//!   [`Cancelled`](DeviceFarmError::Cancelled)
//! - **Reported outcome**: [`Timeout`](DeviceFarmError::Timeout)
//! - **Logged only**: [`Classification`](DeviceFarmError::Classification)
//! - **Remote call failures**: [`Api`](DeviceFarmError::Api),
//!   [`Network`](DeviceFarmError::Network), [`Decode`](DeviceFarmError::Decode)

/// Result type for Device Farm operations.
pub type DeviceFarmResult<T> = Result<T, DeviceFarmError>;

/// Errors raised while talking to the device farm or handling its artifacts.
#[derive(Debug, thiserror::Error)]
pub enum DeviceFarmError {
    /// A project, device pool or test spec lookup found no match.
    #[error("{kind} '{name}' not found.")]
    NotFound { kind: &'static str, name: String },

    /// An artifact could not be read, transferred, or processed remotely.
    #[error("transfer failed for {artifact}: {message}")]
    Transfer { artifact: String, message: String },

    /// A run did not reach a terminal state before the wait ceiling.
    #[error("run {arn} did not complete within {waited_secs}s")]
    Timeout { arn: String, waited_secs: u64 },

    /// A remote test result string is not one of the known values.
    #[error("unrecognized test result '{value}' for test '{test}'")]
    Classification { test: String, value: String },

    /// The device pool rules could not be expanded into device ARNs.
    #[error("device pool '{pool}' has no usable device rule: {reason}")]
    InvalidDevicePool { pool: String, reason: String },

    /// The service answered with a non-success status.
    #[error("{operation} failed with status {status}: {message}")]
    Api {
        operation: String,
        status: u16,
        message: String,
    },

    /// The request never produced a response.
    #[error("network error: {message}")]
    Network { message: String },

    /// A response body did not match the expected shape.
    #[error("invalid response from {operation}: {message}")]
    Decode { operation: String, message: String },

    /// Cancellation arrived before any run was scheduled.
    #[error("cancelled before scheduling ({} uploads unprocessed)", .unprocessed.len())]
    Cancelled { unprocessed: Vec<String> },

    /// I/O error outside of artifact transfer.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceFarmError {
    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn transfer(artifact: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transfer {
            artifact: artifact.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for DeviceFarmError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}
