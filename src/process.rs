use crate::constants::PROCESS_WAIT_INTERVAL_MILLIS;
use crate::error::ManagerError;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CmdOutput {
    pub(crate) code: Option<i32>,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl CmdOutput {
    pub(crate) fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Completed(CmdOutput),
    TimedOut,
}

/// Spawns external programs on behalf of the executor.
///
/// `run` captures stdout/stderr and enforces the optional timeout.
/// `run_interactive` hands the terminal to the child and returns its exit code.
pub(crate) trait ProcessRunner {
    fn run(&self, argv: &[String], timeout: Option<Duration>) -> Result<RunOutcome, ManagerError>;

    fn run_interactive(&self, argv: &[String]) -> Result<Option<i32>, ManagerError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, argv: &[String], timeout: Option<Duration>) -> Result<RunOutcome, ManagerError> {
        let (program, args) = split_program(argv)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| launch_failure(program, &err))?;

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let Some(status) = wait_with_deadline(&mut child, program, timeout)? else {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(RunOutcome::TimedOut);
        };

        Ok(RunOutcome::Completed(CmdOutput {
            code: status.code(),
            stdout: join_reader(stdout),
            stderr: join_reader(stderr),
        }))
    }

    fn run_interactive(&self, argv: &[String]) -> Result<Option<i32>, ManagerError> {
        let (program, args) = split_program(argv)?;
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|err| launch_failure(program, &err))?;
        Ok(status.code())
    }
}

fn split_program(argv: &[String]) -> Result<(&str, &[String]), ManagerError> {
    match argv.split_first() {
        Some((program, args)) => Ok((program.as_str(), args)),
        None => Err(ManagerError::CommandExecution(
            "refusing to run an empty command".to_string(),
        )),
    }
}

fn launch_failure(program: &str, err: &std::io::Error) -> ManagerError {
    ManagerError::ConnectionFailure {
        program: program.to_string(),
        message: err.to_string(),
    }
}

fn spawn_reader<T>(pipe: Option<T>) -> Option<JoinHandle<String>>
where
    T: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).to_string()
        })
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn wait_with_deadline(
    child: &mut Child,
    program: &str,
    timeout: Option<Duration>,
) -> Result<Option<ExitStatus>, ManagerError> {
    let wait_failure = |err: std::io::Error| {
        ManagerError::CommandExecution(format!("failed to wait for `{program}`: {err}"))
    };

    let Some(timeout) = timeout else {
        return child.wait().map(Some).map_err(wait_failure);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(wait_failure)? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(PROCESS_WAIT_INTERVAL_MILLIS));
    }
}

pub(crate) fn print_command_output(command: &str, stdout: &str, stderr: &str) {
    println!("- {command}");
    let out = stdout.trim();
    let err = stderr.trim();
    if !out.is_empty() {
        for line in out.lines() {
            println!("  {line}");
        }
    }
    if !err.is_empty() {
        for line in err.lines() {
            println!("  [stderr] {line}");
        }
    }
}

pub(crate) fn best_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return "unknown error".to_string();
    }

    if let Some(line) = lines
        .iter()
        .find(|line| line.to_ascii_lowercase().starts_with("error"))
    {
        return (*line).to_string();
    }

    lines
        .last()
        .map(|line| (*line).to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| (*part).to_string()).collect()
    }

    #[test]
    fn test_best_error_line_prefers_error_prefix() {
        let stderr = "warning: deprecated flag\nError from server (NotFound): not found\n";
        assert_eq!(
            best_error_line(stderr),
            "Error from server (NotFound): not found"
        );
        assert_eq!(best_error_line("first\nlast\n"), "last");
        assert_eq!(best_error_line("  \n"), "unknown error");
    }

    #[test]
    fn test_run_rejects_empty_argv() {
        let err = SystemRunner.run(&[], None).expect_err("empty argv must fail");
        assert!(matches!(err, ManagerError::CommandExecution(_)));
    }

    #[test]
    fn test_run_reports_missing_binary_as_connection_failure() {
        let err = SystemRunner
            .run(&argv(&["argo-manager-test-missing-binary"]), None)
            .expect_err("missing binary must fail");
        assert!(matches!(err, ManagerError::ConnectionFailure { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_streams_and_exit_code() {
        let outcome = SystemRunner
            .run(
                &argv(&["sh", "-c", "echo out; echo err >&2; exit 3"]),
                Some(Duration::from_secs(10)),
            )
            .expect("run sh");
        let RunOutcome::Completed(output) = outcome else {
            panic!("expected completed run");
        };
        assert_eq!(output.code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_times_out() {
        let outcome = SystemRunner
            .run(&argv(&["sleep", "5"]), Some(Duration::from_millis(100)))
            .expect("run sleep");
        assert_eq!(outcome, RunOutcome::TimedOut);
    }
}
