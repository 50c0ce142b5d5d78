use std::fmt;
use std::io;

/// Custom error type for airoom
#[derive(Debug)]
pub enum Error {
    /// Error initializing the LLM backend
    BackendInitError(String),
    /// The model file is missing or could not be loaded
    ModelUnavailable(String),
    /// Error creating the context
    ContextCreationError(String),
    /// Error tokenizing input
    TokenizationError(String),
    /// Error decoding tokens
    DecodingError(String),
    /// Error with batch operations
    BatchError(String),
    /// Error parsing parameters
    ParseError(String),
    /// The prompt does not fit in the context window
    ContextOverflow(String),
    /// Error with chat template
    ChatTemplateError(String),
    /// Error selecting or querying a compute device
    DeviceError(String),
    /// IO error
    IoError(io::Error),
    /// Other error
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendInitError(msg) => write!(f, "Backend initialization error: {}", msg),
            Error::ModelUnavailable(msg) => write!(f, "Model unavailable: {}", msg),
            Error::ContextCreationError(msg) => write!(f, "Context creation error: {}", msg),
            Error::TokenizationError(msg) => write!(f, "Tokenization error: {}", msg),
            Error::DecodingError(msg) => write!(f, "Decoding error: {}", msg),
            Error::BatchError(msg) => write!(f, "Batch operation error: {}", msg),
            Error::ParseError(msg) => write!(f, "Parse error: {}", msg),
            Error::ContextOverflow(msg) => write!(f, "Context overflow: {}", msg),
            Error::ChatTemplateError(msg) => write!(f, "Chat template error: {}", msg),
            Error::DeviceError(msg) => write!(f, "Device error: {}", msg),
            Error::IoError(err) => write!(f, "IO error: {}", err),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

/// A specialized Result type for airoom operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why the completion gateway could not produce an assistant turn.
///
/// Both variants are recoverable: the caller decides whether to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The engine answered, but with nothing but whitespace
    EmptyCompletion,
    /// The engine faulted; carries a human readable cause
    GenerationFailed(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::EmptyCompletion => write!(f, "Empty completion from model"),
            GenerationError::GenerationFailed(cause) => {
                write!(f, "Error generating response: {}", cause)
            }
        }
    }
}

impl std::error::Error for GenerationError {}

impl From<Error> for GenerationError {
    fn from(err: Error) -> Self {
        GenerationError::GenerationFailed(err.to_string())
    }
}
