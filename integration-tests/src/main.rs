//! Test runner for hashbang-exec
//!
//! This test runner validates directive emulation end to end by:
//! 1. Writing scripts whose `#!` line names the print-args demo interpreter
//! 2. Running hashbang-exec on them, in `--print` mode and for real
//! 3. Checking the argument vectors and environments print-args reports
//!
//! Usage: test-runner --hashbang-exec <path> --test-binaries <dir> [--work-dir <dir>]
//!
//! Scripts only run on Unix hosts; elsewhere the exec tests are skipped.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use serde_json::Value;

/// Executable extension
#[cfg(windows)]
const EXE_EXT: &str = ".exe";
#[cfg(not(windows))]
const EXE_EXT: &str = "";

type TestFn = fn(&TestConfig) -> Result<(), String>;

/// Test configuration
struct TestConfig {
    /// Path to the hashbang-exec binary
    exec_path: PathBuf,
    /// Directory containing test binaries (print-args)
    test_binaries_dir: PathBuf,
    /// Working directory for test artifacts
    work_dir: PathBuf,
}

impl TestConfig {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = env::args().collect();

        let mut exec_path = None;
        let mut test_binaries_dir = None;
        let mut work_dir = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--hashbang-exec" => {
                    i += 1;
                    exec_path = args.get(i).map(PathBuf::from);
                }
                "--test-binaries" => {
                    i += 1;
                    test_binaries_dir = args.get(i).map(PathBuf::from);
                }
                "--work-dir" => {
                    i += 1;
                    work_dir = args.get(i).map(PathBuf::from);
                }
                "--help" | "-h" => {
                    println!("Usage: test-runner --hashbang-exec <path> --test-binaries <dir> [--work-dir <dir>]");
                    println!();
                    println!("Options:");
                    println!("  --hashbang-exec  Path to hashbang-exec binary");
                    println!("  --test-binaries  Directory containing test binaries");
                    println!("  --work-dir       Working directory for test artifacts (default: temp dir)");
                    std::process::exit(0);
                }
                _ => {
                    return Err(format!("Unknown argument: {}", args[i]));
                }
            }
            i += 1;
        }

        let exec_path = exec_path.ok_or("--hashbang-exec is required")?;
        let test_binaries_dir = test_binaries_dir.ok_or("--test-binaries is required")?;
        let work_dir = work_dir.unwrap_or_else(|| env::temp_dir().join("hashbang-tests"));

        // Scripts name their interpreter by absolute path
        let exec_path = fs::canonicalize(&exec_path)
            .map_err(|e| format!("hashbang-exec not found: {}: {}", exec_path.display(), e))?;
        let test_binaries_dir = fs::canonicalize(&test_binaries_dir).map_err(|e| {
            format!("Test binaries dir not found: {}: {}", test_binaries_dir.display(), e)
        })?;

        Ok(Self {
            exec_path,
            test_binaries_dir,
            work_dir,
        })
    }

    fn print_args(&self) -> PathBuf {
        self.test_binaries_dir.join(format!("print-args{}", EXE_EXT))
    }

    fn test_dir(&self, name: &str) -> Result<PathBuf, String> {
        let dir = self.work_dir.join(name);
        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create test dir: {}", e))?;
        Ok(dir)
    }
}

/// Write a script file and mark it executable
fn write_script(dir: &Path, name: &str, content: &[u8]) -> Result<PathBuf, String> {
    let path = dir.join(name);
    fs::write(&path, content).map_err(|e| format!("Failed to write {}: {}", name, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path)
            .map_err(|e| format!("Failed to get permissions: {}", e))?
            .permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms)
            .map_err(|e| format!("Failed to set permissions: {}", e))?;
    }

    Ok(path)
}

/// Run hashbang-exec and capture its output
fn run_exec(
    config: &TestConfig,
    args: &[&str],
    envs: &[(&str, &str)],
) -> Result<(String, String, i32), String> {
    let mut cmd = Command::new(&config.exec_path);
    cmd.args(args);
    cmd.env_remove("HASHBANG_CRLF");
    cmd.env_remove("HASHBANG_MAX_WORDS");
    cmd.env_remove("HASHBANG_BUF_SIZE");
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let output = cmd.output().map_err(|e| format!("Failed to run hashbang-exec: {}", e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    Ok((stdout, stderr, exit_code))
}

fn parse_json(stdout: &str) -> Result<Value, String> {
    serde_json::from_str(stdout).map_err(|e| format!("Invalid JSON output ({}): {}", e, stdout))
}

fn string_list(value: &Value, field: &str) -> Result<Vec<String>, String> {
    value[field]
        .as_array()
        .ok_or_else(|| format!("Missing '{}' array in {}", field, value))?
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .ok_or_else(|| format!("Non-string entry in '{}': {}", field, item))
        })
        .collect()
}

fn path_str(path: &Path) -> Result<&str, String> {
    path.to_str()
        .ok_or_else(|| format!("Non UTF-8 path: {}", path.display()))
}

/// Test: --print splits the directive and appends the script and arguments
fn test_print_splits_directive(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: print_splits_directive");

    let test_dir = config.test_dir("test_print_splits_directive")?;
    let interpreter = config.print_args();
    let interpreter = path_str(&interpreter)?;
    let script = write_script(
        &test_dir,
        "script",
        format!("#!{} -x\t--flag \n\necho ignored\n", interpreter).as_bytes(),
    )?;
    let script = path_str(&script)?;

    let (stdout, stderr, exit_code) = run_exec(config, &["--print", script, "foo", "bar"], &[])?;
    if exit_code != 0 {
        return Err(format!("--print failed with exit code {}: {}", exit_code, stderr));
    }

    let report = parse_json(&stdout)?;
    if report["interpreter"] != interpreter {
        return Err(format!("Wrong interpreter: {}", report["interpreter"]));
    }
    let argv = string_list(&report, "argv")?;
    let expected = [script, "-x", "--flag", script, "foo", "bar"];
    if argv != expected {
        return Err(format!("Expected argv {:?}, got {:?}", expected, argv));
    }
    if report["words"] != 3 || report["truncated_words"] != 0 {
        return Err(format!("Unexpected word counts: {}", report));
    }

    println!("    PASS (program name restored, tokens before script)");

    let (stdout, stderr, exit_code) =
        run_exec(config, &["--print", "--argv0", "", script, "foo"], &[])?;
    if exit_code != 0 {
        return Err(format!("--print failed with exit code {}: {}", exit_code, stderr));
    }
    let argv = string_list(&parse_json(&stdout)?, "argv")?;
    let expected = [interpreter, "-x", "--flag", script, "foo"];
    if argv != expected {
        return Err(format!("Expected argv {:?}, got {:?}", expected, argv));
    }

    println!("    PASS (empty program name keeps interpreter)");

    Ok(())
}

/// Test: files without a usable directive report why and exit 1
fn test_print_reports_missing_directive(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: print_reports_missing_directive");

    let test_dir = config.test_dir("test_print_reports_missing_directive")?;
    let long_line: Vec<u8> = [&b"#!/"[..], &[b'a'; 2000][..], &b"\n"[..]].concat();
    let cases: [(&str, &[u8], &str); 4] = [
        ("plain", b"echo hello\n", "no #! marker"),
        ("empty", b"#!", "nothing after the #! marker"),
        ("nul", b"#!/bin/sh\0-x\n", "NUL byte in directive line"),
        ("long", &long_line, "directive line is not terminated within the buffer"),
    ];

    for (name, content, reason) in &cases {
        let script = write_script(&test_dir, name, content)?;
        let (stdout, stderr, exit_code) = run_exec(config, &["--print", path_str(&script)?], &[])?;
        if exit_code != 1 {
            return Err(format!("{}: expected exit code 1, got {}: {}", name, exit_code, stderr));
        }
        let report = parse_json(&stdout)?;
        if !report["directive"].is_null() || report["reason"] != *reason {
            return Err(format!("{}: unexpected report {}", name, report));
        }
        println!("    PASS ({})", name);
    }

    Ok(())
}

/// Test: words past --max-words are dropped and counted
fn test_print_truncates_words(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: print_truncates_words");

    let test_dir = config.test_dir("test_print_truncates_words")?;
    let script = write_script(&test_dir, "script", b"#!/bin/interp a b c d\n")?;
    let script = path_str(&script)?;

    let (stdout, stderr, exit_code) =
        run_exec(config, &["--print", "--max-words", "3", script], &[])?;
    if exit_code != 0 {
        return Err(format!("--print failed with exit code {}: {}", exit_code, stderr));
    }

    let report = parse_json(&stdout)?;
    let argv = string_list(&report, "argv")?;
    let expected = [script, "a", "b", script];
    if argv != expected {
        return Err(format!("Expected argv {:?}, got {:?}", expected, argv));
    }
    if report["words"] != 3 || report["truncated_words"] != 2 {
        return Err(format!("Unexpected word counts: {}", report));
    }

    println!("    PASS (--max-words)");

    let (stdout, _, _) = run_exec(config, &["--print", script], &[("HASHBANG_MAX_WORDS", "1")])?;
    let report = parse_json(&stdout)?;
    if report["truncated_words"] != 4 {
        return Err(format!("HASHBANG_MAX_WORDS not honored: {}", report));
    }

    println!("    PASS (HASHBANG_MAX_WORDS)");

    Ok(())
}

/// Test: carriage returns only separate words in CRLF mode
fn test_print_crlf_directive(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: print_crlf_directive");

    let test_dir = config.test_dir("test_print_crlf_directive")?;
    let script = write_script(&test_dir, "script", b"#!/bin/interp -x\r\n")?;
    let script = path_str(&script)?;

    let (stdout, _, _) = run_exec(config, &["--print", script], &[])?;
    let argv = string_list(&parse_json(&stdout)?, "argv")?;
    if argv.get(1).map(String::as_str) != Some("-x\r") {
        return Err(format!("Carriage return should be kept by default: {:?}", argv));
    }

    let (stdout, _, _) = run_exec(config, &["--print", "--crlf", script], &[])?;
    let argv = string_list(&parse_json(&stdout)?, "argv")?;
    if argv.get(1).map(String::as_str) != Some("-x") {
        return Err(format!("Carriage return should separate with --crlf: {:?}", argv));
    }

    let (stdout, _, _) = run_exec(config, &["--print", script], &[("HASHBANG_CRLF", "1")])?;
    let argv = string_list(&parse_json(&stdout)?, "argv")?;
    if argv.get(1).map(String::as_str) != Some("-x") {
        return Err(format!("HASHBANG_CRLF not honored: {:?}", argv));
    }

    println!("    PASS");

    Ok(())
}

/// Test: a script runs under its interpreter with the expected arguments
///
/// The host may handle `#!` itself, so only the arguments after the program
/// name are checked.
fn test_exec_runs_script(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: exec_runs_script");

    let test_dir = config.test_dir("test_exec_runs_script")?;
    let interpreter = config.print_args();
    let script = write_script(
        &test_dir,
        "script",
        format!("#!{} fixed\n", path_str(&interpreter)?).as_bytes(),
    )?;
    let script = path_str(&script)?;

    let (stdout, stderr, exit_code) = run_exec(config, &[script, "a", "--b"], &[])?;
    if exit_code != 0 {
        return Err(format!("Script failed with exit code {}: {}", exit_code, stderr));
    }

    let argv = string_list(&parse_json(&stdout)?, "argv")?;
    let expected = ["fixed", script, "a", "--b"];
    if argv.is_empty() || argv[1..] != expected {
        return Err(format!("Expected arguments {:?}, got {:?}", expected, argv));
    }

    println!("    PASS");

    Ok(())
}

/// Test: a directive the host rejects is emulated
///
/// Linux refuses `#!` lines whose interpreter path does not fit its own
/// 256 byte buffer. Repeated slashes keep the path valid while pushing it
/// past that limit but within ours.
fn test_exec_emulates_rejected_directive(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: exec_emulates_rejected_directive");

    if !cfg!(target_os = "linux") {
        println!("    SKIP (host-specific directive limit)");
        return Ok(());
    }

    let test_dir = config.test_dir("test_exec_emulates_rejected_directive")?;
    let interpreter = format!("{}{}", "/".repeat(300), path_str(&config.print_args())?);
    let script = write_script(&test_dir, "script", format!("#!{}\n", interpreter).as_bytes())?;
    let script = path_str(&script)?;

    let (stdout, stderr, exit_code) = run_exec(
        config,
        &[script, "a"],
        &[("RUST_LOG", "hashbang=debug")],
    )?;
    if exit_code != 0 {
        return Err(format!("Emulated exec failed with exit code {}: {}", exit_code, stderr));
    }

    let argv = string_list(&parse_json(&stdout)?, "argv")?;
    let expected = [script, script, "a"];
    if argv != expected {
        return Err(format!("Expected argv {:?}, got {:?}", expected, argv));
    }
    if !stderr.contains("needs interpreter") {
        return Err(format!("Expected emulation to be logged: {}", stderr));
    }

    println!("    PASS (program name restored)");

    let (stdout, stderr, exit_code) = run_exec(config, &["--argv0", "custom", script], &[])?;
    if exit_code != 0 {
        return Err(format!("Emulated exec failed with exit code {}: {}", exit_code, stderr));
    }
    let argv = string_list(&parse_json(&stdout)?, "argv")?;
    let expected = ["custom", script];
    if argv != expected {
        return Err(format!("Expected argv {:?}, got {:?}", expected, argv));
    }

    println!("    PASS (--argv0)");

    Ok(())
}

/// Test: a failing interpreter is reported with the original error
fn test_exec_interpreter_failure(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: exec_interpreter_failure");

    let test_dir = config.test_dir("test_exec_interpreter_failure")?;
    // Executable, but neither a binary nor a script
    let not_a_program = write_script(&test_dir, "not-a-program", b"plain text\n")?;
    let script = write_script(
        &test_dir,
        "script",
        format!("#!{}\n", path_str(&not_a_program)?).as_bytes(),
    )?;
    let script = path_str(&script)?;

    let (_, stderr, exit_code) = run_exec(config, &[script], &[])?;
    if exit_code != 126 {
        return Err(format!("Expected exit code 126, got {}: {}", exit_code, stderr));
    }
    let expected = format!("failed to execute {}: ", script);
    if !stderr.contains(&expected) {
        return Err(format!("Expected '{}' in: {}", expected, stderr));
    }

    println!("    PASS");

    Ok(())
}

/// Test: a missing file exits 127 without trying an interpreter
fn test_exec_missing_file(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: exec_missing_file");

    let missing = config.work_dir.join("does-not-exist");
    let missing = path_str(&missing)?;

    let (_, stderr, exit_code) =
        run_exec(config, &[missing], &[("RUST_LOG", "hashbang=debug")])?;
    if exit_code != 127 {
        return Err(format!("Expected exit code 127, got {}: {}", exit_code, stderr));
    }
    if stderr.contains("needs interpreter") {
        return Err(format!("Missing file must not be scanned: {}", stderr));
    }

    println!("    PASS");

    Ok(())
}

/// Test: --clear-env and --env control the interpreter's environment
fn test_exec_explicit_environment(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: exec_explicit_environment");

    let test_dir = config.test_dir("test_exec_explicit_environment")?;
    let interpreter = config.print_args();
    let script = write_script(
        &test_dir,
        "script",
        format!("#!{}\n", path_str(&interpreter)?).as_bytes(),
    )?;
    let script = path_str(&script)?;

    let (stdout, stderr, exit_code) = run_exec(
        config,
        &["--clear-env", "--env", "HB_TEST=1", "--env", "HB_TEST=2", script],
        &[],
    )?;
    if exit_code != 0 {
        return Err(format!("Script failed with exit code {}: {}", exit_code, stderr));
    }

    let report = parse_json(&stdout)?;
    let env = report["env"]
        .as_object()
        .ok_or_else(|| format!("Missing env object: {}", report))?;
    if env.len() != 1 || env.get("HB_TEST") != Some(&Value::from("2")) {
        return Err(format!("Expected only HB_TEST=2, got {:?}", env));
    }

    println!("    PASS (--clear-env)");

    let (stdout, stderr, exit_code) = run_exec(
        config,
        &["--env", "HB_EXTRA=yes", script],
        &[("HB_INHERITED", "kept")],
    )?;
    if exit_code != 0 {
        return Err(format!("Script failed with exit code {}: {}", exit_code, stderr));
    }

    let report = parse_json(&stdout)?;
    if report["env"]["HB_INHERITED"] != "kept" || report["env"]["HB_EXTRA"] != "yes" {
        return Err(format!("Inherited and added variables expected: {}", report["env"]));
    }

    println!("    PASS (inherit + --env)");

    Ok(())
}

fn main() -> ExitCode {
    println!("=== hashbang-exec Test Suite ===");
    println!();

    let config = match TestConfig::from_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            return ExitCode::from(1);
        }
    };

    // Clean and recreate work directory
    if config.work_dir.exists() {
        if let Err(e) = fs::remove_dir_all(&config.work_dir) {
            eprintln!("Warning: Failed to clean work dir: {}", e);
        }
    }
    if let Err(e) = fs::create_dir_all(&config.work_dir) {
        eprintln!("Error: Failed to create work dir: {}", e);
        return ExitCode::from(1);
    }

    println!("Configuration:");
    println!("  hashbang-exec: {}", config.exec_path.display());
    println!("  Test binaries: {}", config.test_binaries_dir.display());
    println!("  Work dir:      {}", config.work_dir.display());
    println!();

    let mut tests: Vec<(&str, TestFn)> = vec![
        ("print_splits_directive", test_print_splits_directive),
        ("print_reports_missing_directive", test_print_reports_missing_directive),
        ("print_truncates_words", test_print_truncates_words),
        ("print_crlf_directive", test_print_crlf_directive),
    ];
    // Exec tests need executable scripts
    if cfg!(unix) {
        tests.extend([
            ("exec_missing_file", test_exec_missing_file as TestFn),
            ("exec_runs_script", test_exec_runs_script),
            ("exec_emulates_rejected_directive", test_exec_emulates_rejected_directive),
            ("exec_interpreter_failure", test_exec_interpreter_failure),
            ("exec_explicit_environment", test_exec_explicit_environment),
        ]);
    }

    let mut passed = 0;
    let mut failed = 0;

    println!("Running {} tests...", tests.len());
    println!();

    for (_name, test_fn) in &tests {
        match test_fn(&config) {
            Ok(()) => {
                passed += 1;
            }
            Err(e) => {
                println!("  FAILED: {}", e);
                failed += 1;
            }
        }
    }

    println!();
    println!("=== Results ===");
    println!("Passed: {}", passed);
    println!("Failed: {}", failed);
    println!();

    if failed > 0 {
        ExitCode::from(1)
    } else {
        println!("All tests passed!");
        ExitCode::SUCCESS
    }
}
