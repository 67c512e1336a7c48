/*!
 * Error types for Portcullis
 */

use portcullis_connect::ConnectError;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PortcullisError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Error, Debug)]
pub enum PortcullisError {
    /// Discovery returned nothing, or a record without an address
    #[error("Workload not found: {0}")]
    WorkloadNotFound(String),

    /// Transport, 4xx or 5xx failure from the access-control API
    #[error("Access API error: {0}")]
    Remote(#[from] ConnectError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PortcullisError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PortcullisError::WorkloadNotFound(_) | PortcullisError::Config(_) => EXIT_FATAL,
            PortcullisError::Remote(_) | PortcullisError::Io(_) => EXIT_PARTIAL,
        }
    }

    /// True when the caller should answer with a not-found response
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortcullisError::WorkloadNotFound(_))
    }
}
