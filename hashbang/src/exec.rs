//! `execve` with interpreter directive emulation.
//!
//! The file is executed directly first. Only when that fails with ENOEXEC is
//! it scanned for a `#!` line, and the interpreter executed in its place.
//! When emulation does not apply or fails, the caller gets the error of the
//! direct attempt.

use std::ffi::{CStr, CString};
use std::io;

use log::debug;

use crate::argv::{self, ReconstructedArgv};
use crate::carray::CArray;
use crate::config::ScanConfig;
use crate::env::Environment;
use crate::error::{ExecError, PrepareError};
use crate::platform;
use crate::scan;

/// The OS primitive the wrapper drives.
pub trait Executor {
    /// Replace the process image. Returns only on failure.
    fn execve(&mut self, path: &CStr, argv: &CArray<'_>, envp: &CArray<'_>) -> io::Error;

    /// Whether `err` means "exists, but not in a format the OS can run".
    fn is_not_executable_format(&self, err: &io::Error) -> bool {
        platform::is_not_executable_format(err)
    }
}

/// Executes through the host's `execve`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn execve(&mut self, path: &CStr, argv: &CArray<'_>, envp: &CArray<'_>) -> io::Error {
        platform::execve(path, argv, envp)
    }
}

/// What to execute in place of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emulation<'a> {
    /// Executable path: the first directive word, or the script itself.
    pub interpreter: CString,
    /// Argument vector with the caller's program name restored.
    pub argv: ReconstructedArgv<'a>,
    /// Directive words dropped past [`ScanConfig::max_words`].
    pub truncated_words: usize,
}

/// Scan `path` and build the interpreter invocation for it.
///
/// The caller's `argv[0]`, when present and non-empty, replaces the
/// interpreter in slot 0 of the new vector, as it would on a kernel with
/// native `#!` support.
pub fn prepare<'a>(
    path: &'a CStr,
    argv: &[&'a CStr],
    config: &ScanConfig,
) -> Result<Emulation<'a>, PrepareError> {
    let directive = scan::scan(platform::cstr_to_path(path), config)?;
    let mut new_argv = argv::build(&directive, path, argv)?;
    let interpreter = new_argv.interpreter().to_owned();

    if let Some(&program_name) = argv.first() {
        if !program_name.to_bytes().is_empty() {
            new_argv.set_program_name(program_name);
        }
    }

    Ok(Emulation {
        interpreter,
        argv: new_argv,
        truncated_words: directive.truncated_words(),
    })
}

/// Execute `path`, falling back to its `#!` interpreter on ENOEXEC.
///
/// Uses the host `execve` and the default scan limits. Only returns on
/// failure.
pub fn execve(path: &CStr, argv: &[&CStr], env: Environment<'_>) -> ExecError {
    execve_with(&mut SystemExecutor, path, argv, env, &ScanConfig::default())
}

pub fn execve_with<E: Executor + ?Sized>(
    executor: &mut E,
    path: &CStr,
    argv: &[&CStr],
    env: Environment<'_>,
    config: &ScanConfig,
) -> ExecError {
    let env = env.resolve();
    let env_entries = env.entries();
    let envp = CArray::new(env_entries.iter().copied());

    let original = executor.execve(path, &CArray::new(argv.iter().copied()), &envp);
    if !executor.is_not_executable_format(&original) {
        return ExecError::Direct {
            path: path.to_owned(),
            source: original,
        };
    }

    let emulation = match prepare(path, argv, config) {
        Ok(emulation) => emulation,
        Err(PrepareError::NotADirective(err)) => {
            debug!("{}: {}", path.to_string_lossy(), err);
            return ExecError::Direct {
                path: path.to_owned(),
                source: original,
            };
        }
        Err(PrepareError::Build(source)) => {
            return ExecError::Build {
                path: path.to_owned(),
                original,
                source,
            };
        }
    };

    debug!(
        "script {} needs interpreter {} to exec",
        path.to_string_lossy(),
        emulation.interpreter.to_string_lossy()
    );

    let source = executor.execve(&emulation.interpreter, &emulation.argv.as_c_argv(), &envp);
    let Emulation {
        interpreter,
        argv: new_argv,
        ..
    } = emulation;
    drop(new_argv);

    ExecError::Interpreter {
        path: path.to_owned(),
        interpreter,
        original,
        source,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::VecDeque;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use super::*;
    use crate::error::{NotADirective, NotADirectiveReason};

    #[derive(Debug, PartialEq)]
    struct Call {
        path: String,
        argv: Vec<String>,
        envp: Vec<String>,
    }

    /// Records every attempt and fails with the queued errors.
    struct Recorder {
        calls: Vec<Call>,
        errors: VecDeque<io::Error>,
    }

    impl Recorder {
        fn failing_with(codes: &[i32]) -> Self {
            Self {
                calls: Vec::new(),
                errors: codes.iter().map(|&c| io::Error::from_raw_os_error(c)).collect(),
            }
        }
    }

    fn lossy(array: &CArray<'_>) -> Vec<String> {
        let slots = array.as_slice();
        assert!(slots[array.len()].is_null());
        slots[..array.len()]
            .iter()
            .map(|&ptr| unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
            .collect()
    }

    impl Executor for Recorder {
        fn execve(&mut self, path: &CStr, argv: &CArray<'_>, envp: &CArray<'_>) -> io::Error {
            self.calls.push(Call {
                path: path.to_string_lossy().into_owned(),
                argv: lossy(argv),
                envp: lossy(envp),
            });
            self.errors
                .pop_front()
                .unwrap_or_else(|| io::Error::from_raw_os_error(libc::EIO))
        }
    }

    fn write_script(dir: &Path, name: &str, content: &[u8]) -> CString {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        CString::new(path.to_str().unwrap()).unwrap()
    }

    fn cstrings(items: &[&str]) -> Vec<CString> {
        items.iter().map(|s| CString::new(*s).unwrap()).collect()
    }

    fn refs(items: &[CString]) -> Vec<&CStr> {
        items.iter().map(CString::as_c_str).collect()
    }

    #[test]
    fn other_failures_skip_the_directive_scan() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "s", b"#!/bin/sh\n");
        let argv = cstrings(&["s"]);
        let mut exec = Recorder::failing_with(&[libc::EACCES]);

        let err = execve_with(
            &mut exec,
            &script,
            &refs(&argv),
            Environment::Explicit(&[]),
            &ScanConfig::default(),
        );

        assert!(matches!(err, ExecError::Direct { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::EACCES));
        assert_eq!(exec.calls.len(), 1);
    }

    #[test]
    fn enoexec_retries_with_interpreter_and_restored_program_name() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "tool", b"#!/bin/sh -x\necho hi\n");
        let script_str = script.to_str().unwrap().to_owned();
        let argv = cstrings(&["tool", "foo", "bar"]);
        let env = cstrings(&["LANG=C"]);
        let mut exec = Recorder::failing_with(&[libc::ENOEXEC, libc::ENOENT]);

        let err = execve_with(
            &mut exec,
            &script,
            &refs(&argv),
            Environment::Explicit(&refs(&env)),
            &ScanConfig::default(),
        );

        assert_eq!(exec.calls.len(), 2);
        assert_eq!(exec.calls[0].path, script_str);
        assert_eq!(exec.calls[0].argv, ["tool", "foo", "bar"]);
        assert_eq!(exec.calls[1].path, "/bin/sh");
        assert_eq!(exec.calls[1].argv, ["tool", "-x", script_str.as_str(), "foo", "bar"]);
        assert_eq!(exec.calls[0].envp, ["LANG=C"]);
        assert_eq!(exec.calls[1].envp, ["LANG=C"]);

        // The direct attempt's failure is what gets reported.
        assert_eq!(err.raw_os_error(), Some(libc::ENOEXEC));
        match err {
            ExecError::Interpreter { interpreter, source, .. } => {
                assert_eq!(interpreter.to_str().unwrap(), "/bin/sh");
                assert_eq!(source.raw_os_error(), Some(libc::ENOENT));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn enoexec_without_directive_reports_original_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "plain", b"echo no marker\n");
        let mut exec = Recorder::failing_with(&[libc::ENOEXEC]);

        let err = execve_with(
            &mut exec,
            &script,
            &[],
            Environment::Explicit(&[]),
            &ScanConfig::default(),
        );

        assert!(matches!(err, ExecError::Direct { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::ENOEXEC));
        assert_eq!(exec.calls.len(), 1);
    }

    #[test]
    fn empty_program_name_keeps_interpreter_in_slot_zero() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "s", b"#!/usr/bin/env python3\n");
        let script_str = script.to_str().unwrap().to_owned();
        let argv = cstrings(&["", "-q"]);

        let emulation = prepare(&script, &refs(&argv), &ScanConfig::default()).unwrap();
        assert_eq!(emulation.interpreter.to_str().unwrap(), "/usr/bin/env");
        assert_eq!(
            emulation.argv.to_vec_lossy(),
            ["/usr/bin/env", "python3", script_str.as_str(), "-q"]
        );
    }

    #[test]
    fn missing_argv_still_passes_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "s", b"#!/bin/sh -e\n");
        let script_str = script.to_str().unwrap().to_owned();

        let emulation = prepare(&script, &[], &ScanConfig::default()).unwrap();
        assert_eq!(emulation.argv.to_vec_lossy(), ["/bin/sh", "-e", script_str.as_str()]);
    }

    #[test]
    fn empty_directive_reexecutes_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "s", b"#!\n");
        let script_str = script.to_str().unwrap().to_owned();
        let argv = cstrings(&["s", "a"]);
        let mut exec = Recorder::failing_with(&[libc::ENOEXEC, libc::ENOEXEC]);

        let err = execve_with(
            &mut exec,
            &script,
            &refs(&argv),
            Environment::Explicit(&[]),
            &ScanConfig::default(),
        );

        assert_eq!(exec.calls[1].path, script_str);
        assert_eq!(exec.calls[1].argv, ["s", "a"]);
        assert!(matches!(err, ExecError::Interpreter { .. }));
    }

    #[test]
    fn prepare_reports_why_emulation_does_not_apply() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "nul", b"#!/bin/sh\0\n");

        let err = prepare(&script, &[], &ScanConfig::default()).unwrap_err();
        assert_eq!(
            err,
            PrepareError::NotADirective(NotADirective {
                reason: NotADirectiveReason::EmbeddedNul
            })
        );
    }

    #[test]
    fn inherited_environment_is_snapshotted_once_for_both_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "s", b"#!/bin/sh\n");
        let mut exec = Recorder::failing_with(&[libc::ENOEXEC, libc::ENOENT]);

        execve_with(&mut exec, &script, &[], Environment::Inherit, &ScanConfig::default());

        assert_eq!(exec.calls.len(), 2);
        assert_eq!(exec.calls[0].envp, exec.calls[1].envp);
        assert_eq!(exec.calls[0].envp.len(), crate::env::snapshot().len());
    }

    #[test]
    fn system_exec_of_missing_file_fails_directly() {
        let path = CString::new("/nonexistent/hashbang/target").unwrap();
        let argv = cstrings(&["target"]);

        let err = execve(&path, &refs(&argv), Environment::Explicit(&[]));
        assert!(matches!(err, ExecError::Direct { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn system_exec_of_unknown_format_without_directive_fails_directly() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "data", b"\x01\x02not a program\n");

        let err = execve(&script, &[], Environment::Explicit(&[]));
        assert!(matches!(err, ExecError::Direct { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::ENOEXEC));
    }
}
