//! Demo interpreter: print command line arguments and environment as JSON
//!
//! Usage: print-args [args...]
//! Outputs:
//!   {"argv": ["<arg0>", "<arg1>", ...], "env": {"<key>": "<value>", ...}}
//!
//! Scripts under test name this program in their `#!` line, so the runner
//! can see exactly which argument vector the interpreter received.

use std::env;
use std::process::ExitCode;

use serde_json::{json, Map, Value};

fn main() -> ExitCode {
    let argv: Vec<String> = env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    let mut vars: Vec<(String, String)> = env::vars_os()
        .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
        .collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));

    let env: Map<String, Value> = vars
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    println!("{}", json!({ "argv": argv, "env": env }));
    ExitCode::SUCCESS
}
