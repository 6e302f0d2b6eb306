use std::ffi::{CStr, CString, OsStr, OsString};
use std::io;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::builder::FalseyValueParser;
use clap::Parser;
use log::debug;
use serde_json::json;

use hashbang::{
    Environment, ExecError, PrepareError, ScanConfig, SystemExecutor, DIRECTIVE_BUF_SIZE,
    DIRECTIVE_MAX_WORDS,
};

/// Execute a file, emulating `#!` interpreter lines when the OS refuses it.
#[derive(Parser, Debug)]
#[command(name = "hashbang-exec", version)]
struct Cli {
    /// Program name passed as argv[0] (default: FILE)
    #[arg(long, value_name = "NAME")]
    argv0: Option<OsString>,

    /// Scan and build only; print the interpreter argument vector as JSON
    #[arg(long)]
    print: bool,

    /// Treat carriage returns in the directive line as whitespace
    #[arg(long, env = "HASHBANG_CRLF", value_parser = FalseyValueParser::new())]
    crlf: bool,

    /// Maximum directive words; extra words are dropped
    #[arg(long, env = "HASHBANG_MAX_WORDS", default_value_t = DIRECTIVE_MAX_WORDS)]
    max_words: usize,

    /// Directive line buffer size in bytes
    #[arg(long, env = "HASHBANG_BUF_SIZE", default_value_t = DIRECTIVE_BUF_SIZE)]
    buf_size: usize,

    /// Start from an empty environment instead of inheriting
    #[arg(long)]
    clear_env: bool,

    /// Set an environment variable for the executed program (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<OsString>,

    /// File to execute
    file: OsString,

    /// Arguments passed after argv[0]
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<OsString>,
}

impl Cli {
    fn scan_config(&self) -> Result<ScanConfig> {
        let config = ScanConfig::default()
            .with_buf_size(self.buf_size)
            .with_max_words(self.max_words)
            .with_crlf(self.crlf);
        config.validate()?;
        Ok(config)
    }

    fn argv(&self) -> Result<Vec<CString>> {
        let argv0 = self.argv0.as_deref().unwrap_or(self.file.as_os_str());
        std::iter::once(argv0)
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(to_cstring)
            .collect()
    }

    fn explicit_env(&self) -> bool {
        self.clear_env || !self.env.is_empty()
    }

    /// Entries for an explicit environment. Later `--env` entries replace
    /// earlier ones with the same key.
    fn env_entries(&self) -> Result<Vec<CString>> {
        let mut entries = if self.clear_env {
            Vec::new()
        } else {
            hashbang::env::snapshot()
        };

        for raw in &self.env {
            let entry = to_cstring(raw)?;
            let Some(eq) = entry.as_bytes().iter().position(|&b| b == b'=') else {
                bail!("--env expects KEY=VALUE, got {}", raw.to_string_lossy());
            };
            let key = &entry.as_bytes()[..=eq];
            entries.retain(|existing| !existing.as_bytes().starts_with(key));
            entries.push(entry);
        }

        Ok(entries)
    }
}

#[cfg(unix)]
fn to_cstring(s: &OsStr) -> Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(s.as_bytes())
        .with_context(|| format!("{} contains a NUL byte", s.to_string_lossy()))
}

#[cfg(not(unix))]
fn to_cstring(s: &OsStr) -> Result<CString> {
    let s = s
        .to_str()
        .with_context(|| format!("{} is not valid UTF-8", s.to_string_lossy()))?;
    CString::new(s).with_context(|| format!("{s} contains a NUL byte"))
}

fn refs(items: &[CString]) -> Vec<&CStr> {
    items.iter().map(CString::as_c_str).collect()
}

fn lossy(s: &CStr) -> String {
    s.to_string_lossy().into_owned()
}

/// `--print`: show what would be executed in place of the file.
fn print_emulation(path: &CStr, argv: &[&CStr], config: &ScanConfig) -> Result<ExitCode> {
    match hashbang::prepare(path, argv, config) {
        Ok(emulation) => {
            let report = json!({
                "interpreter": lossy(&emulation.interpreter),
                "argv": emulation.argv.to_vec_lossy(),
                "words": emulation.argv.word_count(),
                "truncated_words": emulation.truncated_words,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(PrepareError::NotADirective(err)) => {
            let report = json!({
                "directive": null,
                "reason": err.reason.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::from(1))
        }
        Err(PrepareError::Build(err)) => {
            Err(err).with_context(|| format!("cannot build argv for {}", lossy(path)))
        }
    }
}

/// Exit status for a failed exec, following the shell convention.
fn exit_code(err: &ExecError) -> ExitCode {
    if err.original().kind() == io::ErrorKind::NotFound {
        ExitCode::from(127)
    } else {
        ExitCode::from(126)
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = cli.scan_config()?;
    let path = to_cstring(&cli.file)?;
    let argv = cli.argv()?;
    let argv_refs = refs(&argv);

    if cli.print {
        return print_emulation(&path, &argv_refs, &config);
    }

    let env_entries = if cli.explicit_env() {
        cli.env_entries()?
    } else {
        Vec::new()
    };
    let env_refs = refs(&env_entries);
    let env = if cli.explicit_env() {
        Environment::Explicit(&env_refs)
    } else {
        Environment::Inherit
    };

    let err = hashbang::execve_with(&mut SystemExecutor, &path, &argv_refs, env, &config);

    eprintln!("hashbang-exec: {err}");
    if let ExecError::Interpreter {
        interpreter, source, ..
    } = &err
    {
        debug!("interpreter {} also failed: {}", lossy(interpreter), source);
    }
    Ok(exit_code(&err))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}
