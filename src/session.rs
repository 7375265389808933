//! Per-run session state and the authentication recovery loop.
//!
//! A controller failure whose message looks like an expired or missing
//! session is reclassified as [`ManagerError::AuthenticationFailure`]. The
//! guard then re-runs the stored login command, polls a cheap read until the
//! session is accepted, and retries the original call exactly once.

use crate::config::Connection;
use crate::constants::{
    AUTH_FAILURE_PATTERNS, LOGIN_CHECK_TIMEOUT_SECS, LOGIN_POLL_ATTEMPTS, LOGIN_POLL_DELAY_SECS,
    PRODUCTION_MARKER,
};
use crate::error::ManagerError;
use crate::executor::Executor;
use crate::process::{ProcessRunner, print_command_output};
use crate::prompt::Prompter;
use std::collections::HashSet;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Process-wide state for one invocation. Never persisted.
#[derive(Debug, Default)]
pub(crate) struct SessionContext {
    confirmed_production: HashSet<String>,
    verbose: bool,
}

impl SessionContext {
    pub(crate) fn new(verbose: bool) -> Self {
        Self {
            confirmed_production: HashSet::new(),
            verbose,
        }
    }

    pub(crate) fn verbose(&self) -> bool {
        self.verbose
    }

    pub(crate) fn needs_production_confirmation(&self, cluster: &str) -> bool {
        is_production_like(cluster) && !self.is_production_confirmed(cluster)
    }

    pub(crate) fn is_production_confirmed(&self, cluster: &str) -> bool {
        self.confirmed_production.contains(cluster)
    }

    pub(crate) fn mark_production_confirmed(&mut self, cluster: &str) {
        self.confirmed_production.insert(cluster.to_string());
    }
}

pub(crate) fn is_production_like(cluster: &str) -> bool {
    cluster.to_lowercase().contains(PRODUCTION_MARKER)
}

pub(crate) fn is_auth_failure(message: &str) -> bool {
    let message = message.to_lowercase();
    AUTH_FAILURE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

/// Promotes command failures that match an auth pattern; every other error is
/// returned unchanged.
pub(crate) fn classify_failure(err: ManagerError) -> ManagerError {
    match err {
        ManagerError::CommandExecution(message) if is_auth_failure(&message) => {
            ManagerError::AuthenticationFailure(message)
        }
        other => other,
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SessionGuard {
    poll_attempts: u32,
    poll_delay: Duration,
    check_timeout: Duration,
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self {
            poll_attempts: LOGIN_POLL_ATTEMPTS,
            poll_delay: Duration::from_secs(LOGIN_POLL_DELAY_SECS),
            check_timeout: Duration::from_secs(LOGIN_CHECK_TIMEOUT_SECS),
        }
    }
}

impl SessionGuard {
    pub(crate) fn with_poll_delay(mut self, poll_delay: Duration) -> Self {
        self.poll_delay = poll_delay;
        self
    }

    /// Runs `call`; on an authentication failure runs the login-recovery
    /// cycle and calls it once more. The second result is returned as-is.
    pub(crate) fn guarded<R, P, T, F>(
        &self,
        exec: &mut Executor<R, P>,
        connection: &Connection,
        mut call: F,
    ) -> Result<T, ManagerError>
    where
        R: ProcessRunner,
        P: Prompter,
        F: FnMut(&mut Executor<R, P>) -> Result<T, ManagerError>,
    {
        match call(&mut *exec).map_err(classify_failure) {
            Err(ManagerError::AuthenticationFailure(message)) => {
                debug!(cluster = %connection.name, %message, "authentication failure");
                self.recover_login(exec, connection)?;
                call(&mut *exec).map_err(classify_failure)
            }
            result => result,
        }
    }

    pub(crate) fn recover_login<R, P>(
        &self,
        exec: &mut Executor<R, P>,
        connection: &Connection,
    ) -> Result<(), ManagerError>
    where
        R: ProcessRunner,
        P: Prompter,
    {
        let cluster = connection.name.as_str();
        let verbose = exec.session().verbose();
        if !verbose {
            eprintln!("==> authentication required for '{cluster}'; running stored login command");
        }

        let output = exec.run_login(connection)?;
        if verbose {
            print_command_output(&format!("login {cluster}"), &output.stdout, &output.stderr);
        }
        if !output.success() {
            warn!(
                cluster,
                code = ?output.code,
                "login command exited unsuccessfully; polling anyway"
            );
        }

        if !verbose {
            eprintln!("==> waiting for authentication to complete");
        }
        let check = session_check_args();
        for attempt in 1..=self.poll_attempts {
            match exec
                .run(connection, &check, self.check_timeout)
                .map_err(classify_failure)
            {
                Ok(_) => {
                    info!(cluster, attempt, "authentication verified");
                    if is_production_like(cluster) {
                        exec.session_mut().mark_production_confirmed(cluster);
                    }
                    return Ok(());
                }
                Err(ManagerError::AuthenticationFailure(_)) => {
                    debug!(cluster, attempt, "session not valid yet");
                    if attempt < self.poll_attempts {
                        thread::sleep(self.poll_delay);
                    }
                }
                Err(err) => {
                    debug!(cluster, attempt, %err, "login verification failed");
                    return Err(err);
                }
            }
        }
        Err(ManagerError::AuthenticationTimeout(cluster.to_string()))
    }
}

fn session_check_args() -> Vec<String> {
    ["proj", "list", "--output", "json"]
        .iter()
        .map(|arg| (*arg).to_string())
        .collect()
}
