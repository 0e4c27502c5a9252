//! Custom error types for wikifan operations.

use std::io;

use thiserror::Error;

/// Result type alias for wikifan operations
pub type Result<T> = std::result::Result<T, FanoutError>;

/// Error type for wikifan operations
#[derive(Error, Debug)]
pub enum FanoutError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// Input file missing or unreadable
    #[error("Invalid {file_type} file '{path}': {reason}")]
    InvalidFileFormat {
        /// Type of file (e.g., "Input dump")
        file_type: String,
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// More consumers registered than fit in the seen mask
    #[error("Too many consumers registered already (maximum is {max})")]
    TooManyConsumers {
        /// Maximum number of consumers
        max: usize,
    },

    /// The pipeline was started without any registered consumer
    #[error("At least one consumer must be registered before starting the pipeline")]
    NoConsumers,

    /// The stream could not be rewound after sniffing its compression magic
    #[error("Failed to rewind input after compression detection: {0}")]
    Rewind(#[source] io::Error),

    /// Releasing the input stream failed
    #[error("Failed to close input stream: {0}")]
    InputClose(#[source] io::Error),

    /// The decoder hit malformed input
    #[error("Decode error at byte {position}: {reason}")]
    Decode {
        /// Byte offset reported by the decoder
        position: u64,
        /// Description of the problem
        reason: String,
    },

    /// A pipeline thread could not be spawned
    #[error("Failed to spawn {role} thread: {source}")]
    ThreadSpawn {
        /// Role of the thread (e.g. "source")
        role: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A pipeline thread panicked outside of consumer hooks
    #[error("{role} thread panicked: {message}")]
    ThreadPanicked {
        /// Role of the thread
        role: String,
        /// Panic payload message
        message: String,
    },

    /// The pipeline was aborted
    #[error("Pipeline aborted")]
    Aborted,

    /// I/O failure
    #[error(transparent)]
    Io(#[from] io::Error),
}
