use std::ffi::CString;
use std::fmt;
use std::io;

use thiserror::Error;

/// Why a file was not treated as a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotADirectiveReason {
    /// The file could not be opened or read.
    Unreadable,
    /// The first two bytes are not `#!`.
    MissingMarker,
    /// Nothing follows the marker.
    Empty,
    /// A NUL byte appears before the end of the directive line.
    EmbeddedNul,
    /// No newline within the directive buffer.
    LineTooLong,
}

impl fmt::Display for NotADirectiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unreadable => "file is unreadable",
            Self::MissingMarker => "no #! marker",
            Self::Empty => "nothing after the #! marker",
            Self::EmbeddedNul => "NUL byte in directive line",
            Self::LineTooLong => "directive line is not terminated within the buffer",
        };
        f.write_str(s)
    }
}

/// The scanned file carries no usable interpreter directive.
///
/// This is an ordinary outcome, not a failure of the scanner: callers fall
/// back to whatever error the direct exec attempt produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("not an interpreter directive: {reason}")]
pub struct NotADirective {
    pub reason: NotADirectiveReason,
}

impl NotADirective {
    pub(crate) fn new(reason: NotADirectiveReason) -> Self {
        Self { reason }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("out of memory reserving an argument vector of {elements} entries")]
    OutOfMemory { elements: usize },
    #[error("directive word {index} contains a NUL byte")]
    InteriorNul { index: usize },
}

/// Why a file cannot be run through its interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrepareError {
    #[error(transparent)]
    NotADirective(#[from] NotADirective),
    #[error(transparent)]
    Build(#[from] BuildError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("directive buffer size must be non-zero")]
    ZeroBufSize,
    #[error("directive word limit must be non-zero")]
    ZeroMaxWords,
}

/// Failure of an exec attempt, with or without interpreter emulation.
///
/// The message always reports the failure of the direct attempt; a failure
/// of the interpreter attempt is kept as the error source.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to execute {}: {source}", .path.to_string_lossy())]
    Direct {
        path: CString,
        #[source]
        source: io::Error,
    },
    #[error("failed to execute {}: {original}", .path.to_string_lossy())]
    Build {
        path: CString,
        original: io::Error,
        #[source]
        source: BuildError,
    },
    #[error("failed to execute {}: {original}", .path.to_string_lossy())]
    Interpreter {
        path: CString,
        interpreter: CString,
        original: io::Error,
        #[source]
        source: io::Error,
    },
}

impl ExecError {
    /// The error from the direct exec attempt.
    pub fn original(&self) -> &io::Error {
        match self {
            Self::Direct { source, .. } => source,
            Self::Build { original, .. } | Self::Interpreter { original, .. } => original,
        }
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        self.original().raw_os_error()
    }

    /// Interpreter named by the script, when emulation got that far.
    pub fn interpreter(&self) -> Option<&CString> {
        match self {
            Self::Interpreter { interpreter, .. } => Some(interpreter),
            _ => None,
        }
    }
}

impl From<ExecError> for io::Error {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Direct { source, .. } => source,
            ExecError::Build { original, .. } | ExecError::Interpreter { original, .. } => {
                original
            }
        }
    }
}
