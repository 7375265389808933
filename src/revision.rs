//! Changing an application's target revision: pick the source, run
//! `argocd app set`, and only when explicitly allowed fall back to patching the
//! Application resource with kubectl.

use crate::app::{Application, Source};
use crate::config::Connection;
use crate::constants::{APPLICATION_RESOURCE, APPLICATION_RESOURCE_FALLBACK, COMMAND_TIMEOUT_SECS};
use crate::error::ManagerError;
use crate::executor::Executor;
use crate::process::{ProcessRunner, RunOutcome, best_error_line};
use crate::prompt::{Choice, Prompter};
use crate::session::SessionGuard;
use crate::shell::shell_join;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub(crate) struct RevisionRequest {
    pub(crate) app: String,
    pub(crate) revision: String,
    pub(crate) repo: Option<String>,
    pub(crate) source_index: Option<usize>,
    pub(crate) dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceSelection {
    /// Single-source app, or nothing to disambiguate.
    Unspecified,
    Index(usize),
    Skipped,
}

#[derive(Debug, Clone)]
pub(crate) struct RevisionMutator {
    allow_patch: bool,
    patch_bin: String,
    timeout: Duration,
}

impl RevisionMutator {
    pub(crate) fn new(allow_patch: bool, patch_bin: impl Into<String>) -> Self {
        Self {
            allow_patch,
            patch_bin: patch_bin.into(),
            timeout: Duration::from_secs(COMMAND_TIMEOUT_SECS),
        }
    }

    /// Returns `Ok(false)` when the operator skipped the source chooser or
    /// every mutation attempt failed; fetch failures are returned as errors.
    pub(crate) fn set_target_revision<R, P>(
        &self,
        exec: &mut Executor<R, P>,
        guard: &SessionGuard,
        connection: &Connection,
        request: &RevisionRequest,
    ) -> Result<bool, ManagerError>
    where
        R: ProcessRunner,
        P: Prompter,
    {
        let app = fetch_application(exec, guard, connection, &request.app)?;
        let sources = app.sources();

        let index = match select_source(exec.prompter(), connection, request, &sources)? {
            SourceSelection::Index(index) => Some(index),
            SourceSelection::Unspecified => None,
            SourceSelection::Skipped => {
                println!("Skipping {} on {}", request.app, connection.name);
                return Ok(false);
            }
        };

        let args = set_revision_args(request, index);
        if request.dry_run {
            let mut shown = vec![exec.controller_bin().to_string()];
            shown.extend(args.iter().cloned());
            println!(
                "DRY RUN: {} --server <server-from-config>",
                shell_join(&shown)
            );
            return Ok(true);
        }

        let timeout = self.timeout;
        let primary = guard.guarded(exec, connection, |exec| {
            exec.run(connection, &args, timeout)
        });
        match primary {
            Ok(out) => {
                if exec.session().verbose() && !out.trim().is_empty() {
                    println!("{}", out.trim_end());
                }
                return Ok(true);
            }
            Err(err) => {
                eprintln!("argocd app set failed: {err}");
                if !self.allow_patch {
                    eprintln!(
                        "kubectl patch fallback is disabled; rerun with --allow-patch to enable it"
                    );
                    return Ok(false);
                }
            }
        }

        self.patch_fallback(exec.runner(), &app, request, index)
    }

    fn patch_fallback<R: ProcessRunner>(
        &self,
        runner: &R,
        app: &Application,
        request: &RevisionRequest,
        index: Option<usize>,
    ) -> Result<bool, ManagerError> {
        let mut last_error = String::new();
        for resource in [APPLICATION_RESOURCE, APPLICATION_RESOURCE_FALLBACK] {
            let argv = patch_argv(
                &self.patch_bin,
                app.namespace(),
                resource,
                &request.app,
                &request.revision,
                index,
            );
            debug!(command = %shell_join(&argv), "patching application resource");
            match runner.run(&argv, Some(self.timeout))? {
                RunOutcome::Completed(output) if output.success() => {
                    if !output.stdout.trim().is_empty() {
                        println!("{}", output.stdout.trim_end());
                    }
                    return Ok(true);
                }
                RunOutcome::Completed(output) => {
                    let detail = if output.stderr.trim().is_empty() {
                        &output.stdout
                    } else {
                        &output.stderr
                    };
                    last_error = best_error_line(detail);
                }
                RunOutcome::TimedOut => {
                    last_error = format!("timed out after {} seconds", self.timeout.as_secs());
                }
            }
        }
        eprintln!("kubectl patch failed: {last_error}");
        Ok(false)
    }
}

fn fetch_application<R, P>(
    exec: &mut Executor<R, P>,
    guard: &SessionGuard,
    connection: &Connection,
    app: &str,
) -> Result<Application, ManagerError>
where
    R: ProcessRunner,
    P: Prompter,
{
    let args = ["app", "get", app, "--output", "json"]
        .iter()
        .map(|arg| (*arg).to_string())
        .collect::<Vec<_>>();
    let timeout = Duration::from_secs(COMMAND_TIMEOUT_SECS);
    let raw = guard.guarded(exec, connection, |exec| exec.run(connection, &args, timeout))?;
    let document = serde_json::from_str(&raw).map_err(|err| {
        ManagerError::CommandExecution(format!("failed to parse `app get {app}` output: {err}"))
    })?;
    Application::from_document(&document)
}

/// Explicit index first, then a unique repository match among several
/// sources, then the operator.
pub(crate) fn select_source<P: Prompter>(
    prompter: &P,
    connection: &Connection,
    request: &RevisionRequest,
    sources: &[&Source],
) -> Result<SourceSelection, ManagerError> {
    if let Some(index) = request.source_index {
        if index >= sources.len() {
            return Err(ManagerError::InvalidSourceIndex {
                index,
                count: sources.len(),
            });
        }
        return Ok(SourceSelection::Index(index));
    }

    if sources.len() <= 1 {
        return Ok(SourceSelection::Unspecified);
    }

    if let Some(repo) = request.repo.as_deref() {
        let matching = sources
            .iter()
            .enumerate()
            .filter(|(_, source)| source.matches_repository(repo))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        if let [index] = matching.as_slice() {
            return Ok(SourceSelection::Index(*index));
        }
    }

    let header = format!(
        "Application '{}' on '{}' has multiple sources. Choose which source to update:",
        request.app, connection.name
    );
    let options = sources
        .iter()
        .map(|source| source.describe())
        .collect::<Vec<_>>();
    Ok(match prompter.choose(&header, &options)? {
        Choice::Index(index) => SourceSelection::Index(index),
        Choice::Skip => SourceSelection::Skipped,
    })
}

/// The controller counts source positions from 1.
pub(crate) fn set_revision_args(request: &RevisionRequest, index: Option<usize>) -> Vec<String> {
    let mut args = vec![
        "app".to_string(),
        "set".to_string(),
        request.app.clone(),
        "--revision".to_string(),
        request.revision.clone(),
    ];
    if let Some(repo) = &request.repo {
        args.push("--repo".to_string());
        args.push(repo.clone());
    }
    if let Some(index) = index {
        args.push("--source-position".to_string());
        args.push((index + 1).to_string());
    }
    args
}

pub(crate) fn patch_argv(
    patch_bin: &str,
    namespace: &str,
    resource: &str,
    app: &str,
    revision: &str,
    index: Option<usize>,
) -> Vec<String> {
    let (patch_type, body) = match index {
        Some(index) => (
            "--type=json",
            json!([{
                "op": "replace",
                "path": format!("/spec/sources/{index}/targetRevision"),
                "value": revision,
            }]),
        ),
        None => (
            "--type=merge",
            json!({"spec": {"source": {"targetRevision": revision}}}),
        ),
    };
    vec![
        patch_bin.to_string(),
        "-n".to_string(),
        namespace.to_string(),
        "patch".to_string(),
        resource.to_string(),
        app.to_string(),
        patch_type.to_string(),
        "-p".to_string(),
        body.to_string(),
    ]
}
