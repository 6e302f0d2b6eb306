//! Interpreter directive (`#!`) emulation for `execve`.
//!
//! When the host refuses to execute a file because it is not a recognized
//! binary format, the file may still be a script. This crate reads the
//! script's first line, splits the directive into words and rebuilds the
//! argument vector so the named interpreter can be executed instead:
//!
//! ```text
//! #!/bin/sh -x          argv: script foo bar
//!                   =>  /bin/sh -x /path/to/script foo bar
//! ```
//!
//! [`scan`] and [`argv::build`] are the core; [`execve`] wires them into the
//! direct-attempt-then-fallback flow.

pub mod argv;
pub mod config;
pub mod env;
pub mod error;
pub mod exec;
pub mod scan;

mod carray;

// Platform-specific exec primitives
#[cfg(unix)]
#[path = "platform/unix.rs"]
mod platform;

#[cfg(not(unix))]
#[path = "platform/unsupported.rs"]
mod platform;

pub use argv::{build, ReconstructedArgv};
pub use carray::CArray;
pub use config::{ScanConfig, DIRECTIVE_BUF_SIZE, DIRECTIVE_MAX_WORDS};
pub use env::Environment;
pub use error::{
    BuildError, ConfigError, ExecError, NotADirective, NotADirectiveReason, PrepareError,
};
pub use exec::{execve, execve_with, prepare, Emulation, Executor, SystemExecutor};
pub use scan::{scan, scan_reader, tokenize, Directive};
