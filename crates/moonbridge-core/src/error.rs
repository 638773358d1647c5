//! Error taxonomy for the Moonbridge bridge layer

use thiserror::Error;

use crate::value::Value;

/// Errors raised by `Value` accessors and table indexing.
///
/// These are host-side errors: they are raised synchronously by the
/// call site that queried the value and are meant to be handled there.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    /// A typed accessor was called on a value holding a different case
    #[error("type mismatch: '{expected}' was expected but '{found}' was found")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A read-mode table lookup did not find the key
    #[error("trying to access a table with an invalid key ({key})")]
    NoSuchKey { key: Box<Value> },
}

/// Errors crossing the host/runtime boundary, classified per the
/// runtime's failure codes, plus the value-level errors above.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Value(#[from] ValueError),

    /// The runtime reported an error while running a chunk or callable
    #[error("runtime error: {0}")]
    Runtime(String),

    /// The runtime could not read a chunk source
    #[error("file error: {0}")]
    File(String),

    /// The runtime rejected a chunk as malformed
    #[error("syntax error: {0}")]
    Syntax(String),

    /// The runtime ran out of memory
    #[error("out of memory: {0}")]
    Memory(String),

    /// The runtime failed while already handling another error
    #[error("error while handling another error: {0}")]
    ErrorHandler(String),

    /// A foreign value with no `Value` representation was encountered
    #[error("unsupported type '{found}' in call to '{operation}'")]
    UnsupportedType {
        operation: &'static str,
        found: &'static str,
    },

    /// A `Value` could not be represented as JSON, or vice versa
    #[error("json conversion failed: {0}")]
    Json(String),
}

impl Error {
    /// The raw diagnostic text, without the kind prefix added by
    /// `Display`. This is the message that travels across the call
    /// boundary when the error is re-signaled on the other side.
    pub fn message(&self) -> String {
        match self {
            Error::Runtime(m)
            | Error::File(m)
            | Error::Syntax(m)
            | Error::Memory(m)
            | Error::ErrorHandler(m)
            | Error::Json(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;
