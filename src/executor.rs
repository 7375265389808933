use crate::config::Connection;
use crate::constants::SERVER_PLACEHOLDER;
use crate::error::ManagerError;
use crate::process::{CmdOutput, ProcessRunner, RunOutcome};
use crate::prompt::Prompter;
use crate::session::SessionContext;
use crate::shell::loggable_command;
use crate::translate::translate;
use std::time::Duration;
use tracing::debug;

/// Runs the controller binary for one connection at a time.
pub(crate) struct Executor<R, P> {
    runner: R,
    prompter: P,
    session: SessionContext,
    controller_bin: String,
}

impl<R: ProcessRunner, P: Prompter> Executor<R, P> {
    pub(crate) fn new(
        runner: R,
        prompter: P,
        session: SessionContext,
        controller_bin: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            prompter,
            session,
            controller_bin: controller_bin.into(),
        }
    }

    pub(crate) fn runner(&self) -> &R {
        &self.runner
    }

    pub(crate) fn prompter(&self) -> &P {
        &self.prompter
    }

    pub(crate) fn session(&self) -> &SessionContext {
        &self.session
    }

    pub(crate) fn session_mut(&mut self) -> &mut SessionContext {
        &mut self.session
    }

    pub(crate) fn controller_bin(&self) -> &str {
        &self.controller_bin
    }

    /// Runs `controller <args> --server <url> <forwarded flags>`.
    ///
    /// A non-zero exit that still printed something on stdout is returned as
    /// success (`app diff` exits 1 when it finds differences). Otherwise the
    /// error carries stderr with the server URL replaced by a placeholder.
    pub(crate) fn run(
        &mut self,
        connection: &Connection,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, ManagerError> {
        let (parsed, argv) = translate(
            &self.controller_bin,
            &connection.name,
            &connection.login_command,
            args,
        )?;
        let server_url = parsed.server_url.as_deref();
        debug!(
            cluster = %connection.name,
            command = %redact_server(&loggable_command(&argv), server_url),
            "executing controller command"
        );

        self.ensure_production_confirmed(&connection.name)?;

        let output = match self.runner.run(&argv, Some(timeout))? {
            RunOutcome::Completed(output) => output,
            RunOutcome::TimedOut => return Err(ManagerError::Timeout(timeout.as_secs())),
        };
        if output.success() {
            return Ok(output.stdout);
        }

        let stdout = output.stdout.trim();
        if !stdout.is_empty() {
            debug!(code = ?output.code, "controller exited non-zero with usable stdout");
            return Ok(stdout.to_string());
        }

        let stderr = output.stderr.trim();
        let message = if stderr.is_empty() {
            "unknown error"
        } else {
            stderr
        };
        Err(ManagerError::CommandExecution(redact_server(
            message, server_url,
        )))
    }

    /// Runs the stored login command as-is (no flag filtering), capturing its
    /// output. Words are split with shell quoting rules.
    pub(crate) fn run_login(&self, connection: &Connection) -> Result<CmdOutput, ManagerError> {
        let argv = login_argv(connection)?;
        debug!(
            cluster = %connection.name,
            command = %loggable_command(&argv),
            "running stored login command"
        );
        match self.runner.run(&argv, None)? {
            RunOutcome::Completed(output) => Ok(output),
            RunOutcome::TimedOut => Err(ManagerError::CommandExecution(format!(
                "login command for `{}` did not finish",
                connection.name
            ))),
        }
    }

    /// Runs the stored login command attached to the terminal.
    pub(crate) fn run_login_interactive(
        &self,
        connection: &Connection,
    ) -> Result<Option<i32>, ManagerError> {
        let argv = login_argv(connection)?;
        self.runner.run_interactive(&argv)
    }

    fn ensure_production_confirmed(&mut self, cluster: &str) -> Result<(), ManagerError> {
        if !self.session.needs_production_confirmation(cluster) {
            return Ok(());
        }
        let question = format!("Cluster '{cluster}' looks like production. Continue connecting?");
        if !self.prompter.confirm(&question, false)? {
            return Err(ManagerError::UserAborted(format!(
                "connection to production cluster `{cluster}` was declined"
            )));
        }
        self.session.mark_production_confirmed(cluster);
        Ok(())
    }
}

fn login_argv(connection: &Connection) -> Result<Vec<String>, ManagerError> {
    let argv = shell_words::split(&connection.login_command).map_err(|err| {
        ManagerError::Configuration(format!(
            "cannot parse login command for `{}`: {err}",
            connection.name
        ))
    })?;
    if argv.is_empty() {
        return Err(ManagerError::Configuration(format!(
            "login command for `{}` is empty",
            connection.name
        )));
    }
    Ok(argv)
}

pub(crate) fn redact_server(text: &str, server_url: Option<&str>) -> String {
    match server_url {
        Some(url) if !url.is_empty() => text.replace(url, SERVER_PLACEHOLDER),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::SystemRunner;
    use crate::testing::{FakeRunner, ScriptedPrompter, completed, connection, failed, strings};

    fn executor(
        runner: FakeRunner,
        answers: &[&str],
    ) -> Executor<FakeRunner, ScriptedPrompter> {
        Executor::new(
            runner,
            ScriptedPrompter::new(answers),
            SessionContext::default(),
            "argocd",
        )
    }

    fn timeout() -> Duration {
        Duration::from_secs(30)
    }

    #[test]
    fn test_run_returns_stdout_on_success() {
        let runner = FakeRunner::new();
        runner.push(completed(0, "[]", ""));
        let mut exec = executor(runner, &[]);
        let conn = connection("c1", "argocd login cd.example.com --sso --grpc-web");

        let out = exec
            .run(&conn, &strings(&["app", "list", "--output", "json"]), timeout())
            .expect("run");
        assert_eq!(out, "[]");
        assert_eq!(
            exec.runner().calls(),
            vec![strings(&[
                "argocd",
                "app",
                "list",
                "--output",
                "json",
                "--server",
                "cd.example.com",
                "--grpc-web"
            ])]
        );
    }

    #[test]
    fn test_non_zero_exit_with_stdout_is_success() {
        let runner = FakeRunner::new();
        runner.push(completed(1, "===== apps/Deployment web =====\n- replicas: 1\n", "exit 1"));
        let mut exec = executor(runner, &[]);
        let conn = connection("c1", "argocd login cd.example.com");

        let out = exec
            .run(&conn, &strings(&["app", "diff", "web"]), timeout())
            .expect("diff output is a success");
        assert!(out.contains("replicas"));
    }

    #[test]
    fn test_failure_redacts_server_url() {
        let runner = FakeRunner::new();
        runner.push(failed(
            "rpc error: dial tcp cd.example.com:443: connection refused",
        ));
        let mut exec = executor(runner, &[]);
        let conn = connection("c1", "argocd login cd.example.com");

        let err = exec
            .run(&conn, &strings(&["proj", "list"]), timeout())
            .expect_err("must fail");
        let ManagerError::CommandExecution(message) = err else {
            panic!("expected command execution error");
        };
        assert_eq!(
            message,
            "rpc error: dial tcp <server>:443: connection refused"
        );
    }

    #[test]
    fn test_empty_stderr_reports_unknown_error() {
        let runner = FakeRunner::new();
        runner.push(completed(2, "  \n", ""));
        let mut exec = executor(runner, &[]);
        let conn = connection("c1", "argocd login cd.example.com");
        let err = exec
            .run(&conn, &strings(&["proj", "list"]), timeout())
            .expect_err("must fail");
        assert!(matches!(err, ManagerError::CommandExecution(ref m) if m == "unknown error"));
    }

    #[test]
    fn test_timeout_maps_to_timeout_error() {
        let runner = FakeRunner::new();
        runner.push(RunOutcome::TimedOut);
        let mut exec = executor(runner, &[]);
        let conn = connection("c1", "argocd login cd.example.com");
        let err = exec
            .run(&conn, &strings(&["app", "sync", "web"]), Duration::from_secs(300))
            .expect_err("must time out");
        assert!(matches!(err, ManagerError::Timeout(300)));
    }

    #[test]
    fn test_declined_production_confirmation_launches_nothing() {
        let mut exec = executor(FakeRunner::new(), &["n"]);
        let conn = connection("Prod-East", "argocd login cd.prod.example.com --grpc-web");

        let err = exec
            .run(&conn, &strings(&["app", "list"]), timeout())
            .expect_err("declined");
        assert!(matches!(err, ManagerError::UserAborted(_)));
        assert!(exec.runner().calls().is_empty());
        assert!(!exec.session().is_production_confirmed("Prod-East"));
    }

    #[test]
    fn test_production_confirmation_is_asked_once_per_run() {
        let runner = FakeRunner::new();
        runner.push(completed(0, "a", ""));
        runner.push(completed(0, "b", ""));
        let mut exec = executor(runner, &["y"]);
        let conn = connection("paywell-prod", "argocd login cd.prod.example.com");

        exec.run(&conn, &strings(&["proj", "list"]), timeout())
            .expect("first run");
        exec.run(&conn, &strings(&["app", "list"]), timeout())
            .expect("second run");
        assert_eq!(exec.prompter().asked().len(), 1);
        assert_eq!(exec.runner().calls().len(), 2);
    }

    #[test]
    fn test_malformed_login_command_launches_nothing() {
        let mut exec = executor(FakeRunner::new(), &[]);
        let conn = connection("c1", "argocd cd.example.com --grpc-web");
        let err = exec
            .run(&conn, &strings(&["app", "list"]), timeout())
            .expect_err("malformed");
        assert!(matches!(err, ManagerError::MalformedLoginCommand(_)));
        assert!(exec.runner().calls().is_empty());
    }

    #[test]
    fn test_run_login_uses_shell_words_and_keeps_all_flags() {
        let runner = FakeRunner::new();
        runner.push(completed(0, "Logged in", ""));
        let exec = executor(runner, &[]);
        let conn = connection(
            "c1",
            "argocd login cd.example.com --sso --username 'ops team'",
        );
        let output = exec.run_login(&conn).expect("login");
        assert!(output.success());
        assert_eq!(
            exec.runner().calls(),
            vec![strings(&[
                "argocd",
                "login",
                "cd.example.com",
                "--sso",
                "--username",
                "ops team"
            ])]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_diff_style_exit_is_success() {
        // `sh -c <script> --server <url>` binds the forwarded flags to $0/$1.
        let mut exec = Executor::new(
            SystemRunner,
            ScriptedPrompter::new(&[]),
            SessionContext::default(),
            "sh",
        );
        let conn = connection("c1", "argocd login cd.example.com");
        let out = exec
            .run(
                &conn,
                &strings(&["-c", "echo differences; exit 1"]),
                Duration::from_secs(10),
            )
            .expect("non-zero with stdout");
        assert_eq!(out, "differences");

        let err = exec
            .run(
                &conn,
                &strings(&["-c", "echo \"cannot reach $1\" >&2; exit 1"]),
                Duration::from_secs(10),
            )
            .expect_err("no stdout");
        assert!(matches!(
            err,
            ManagerError::CommandExecution(ref m) if m == "cannot reach <server>"
        ));
    }
}
