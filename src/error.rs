use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`ShadowEnv`](crate::ShadowEnv) operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The variable is absent from the shadow mapping.
    #[error("could not find environment variable `{name}`")]
    NotFound { name: String },

    /// The environment target refused a write.
    #[error("cannot set environment variable `{name}`: {reason}")]
    EnvironmentWrite {
        name: String,
        reason: WriteRejection,
    },

    /// An override file could not be statted or read.
    #[error("cannot access override file `{}`: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An override file was read but its content is malformed.
    #[error("cannot decode override file `{}`: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
}

impl Error {
    pub(crate) fn not_found(name: &str) -> Self {
        Self::NotFound {
            name: name.to_owned(),
        }
    }
}

/// Why a write to the environment target was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteRejection {
    #[error("name is empty")]
    EmptyName,
    #[error("name contains `=` or a NUL byte")]
    InvalidName,
    #[error("value contains a NUL byte")]
    InvalidValue,
}

/// Failure to turn dotenv text into entries.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("invalid UTF-8 input: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at line {line}, column {column}: {kind}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(line: u32, column: u32, kind: ParseErrorKind) -> Self {
        Self { line, column, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("invalid syntax")]
    InvalidSyntax,
    #[error("missing key")]
    MissingKey,
    #[error("invalid key")]
    InvalidKey,
    #[error("unterminated quote")]
    UnterminatedQuote,
}
