//! Connection management and the controller operations built on top of the
//! executor. Every controller call goes through the session guard so an
//! expired login is recovered transparently.

use crate::app::Application;
use crate::config::{Connection, ConnectionStore};
use crate::constants::{COMMAND_TIMEOUT_SECS, SYNC_BATCH_DELAY_SECS, SYNC_TIMEOUT_SECS};
use crate::error::ManagerError;
use crate::executor::Executor;
use crate::process::ProcessRunner;
use crate::prompt::Prompter;
use crate::resolver::{MatchKind, expand_patterns, is_pattern, resolve_name};
use crate::revision::{RevisionMutator, RevisionRequest};
use crate::session::SessionGuard;
use crate::ui::progress;
use serde_json::Value;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SyncOutcome {
    /// Dry run: the diff that a sync would apply, if any.
    Previewed(Option<String>),
    Declined,
    Synced(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchReport {
    pub(crate) succeeded: usize,
    pub(crate) total: usize,
}

impl BatchReport {
    pub(crate) fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TargetChange {
    pub(crate) request: RevisionRequest,
    pub(crate) show_diff: bool,
    pub(crate) sync: bool,
}

/// One cluster's view of an application for the overview table.
#[derive(Debug, Clone)]
pub(crate) struct OverviewEntry {
    pub(crate) cluster: String,
    pub(crate) state: Result<AppSnapshot, String>,
}

#[derive(Debug, Clone)]
pub(crate) struct AppSnapshot {
    pub(crate) targets: Vec<String>,
    pub(crate) sync: String,
    pub(crate) health: String,
    pub(crate) diff: Option<String>,
}

pub(crate) struct Manager<R, P> {
    store: ConnectionStore,
    executor: Executor<R, P>,
    guard: SessionGuard,
    mutator: RevisionMutator,
    batch_delay: Duration,
}

impl<R: ProcessRunner, P: Prompter> Manager<R, P> {
    pub(crate) fn new(
        store: ConnectionStore,
        executor: Executor<R, P>,
        guard: SessionGuard,
        mutator: RevisionMutator,
    ) -> Self {
        Self {
            store,
            executor,
            guard,
            mutator,
            batch_delay: Duration::from_secs(SYNC_BATCH_DELAY_SECS),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_batch_delay(mut self, batch_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self
    }

    pub(crate) fn store(&self) -> &ConnectionStore {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn executor(&self) -> &Executor<R, P> {
        &self.executor
    }

    /// Resolves a cluster name against the store, warning when the name used
    /// differs from the one typed.
    pub(crate) fn connection(&self, query: &str) -> Result<Connection, ManagerError> {
        let resolved = resolve_name(query, self.store.names())?;
        match resolved.kind {
            MatchKind::Exact => {}
            MatchKind::CaseInsensitive => {
                warn!(query, cluster = %resolved.name, "case-insensitive cluster match");
                eprintln!("Using cluster '{}' for '{query}'", resolved.name);
            }
            MatchKind::Fuzzy(ratio) => {
                warn!(query, cluster = %resolved.name, ratio, "fuzzy cluster match");
                eprintln!("Cluster '{query}' not found; using closest match '{}'", resolved.name);
            }
        }
        self.store
            .get(&resolved.name)
            .cloned()
            .ok_or(ManagerError::NotFound(resolved.name))
    }

    /// Plain names go through the resolver; glob patterns expand against the
    /// configured names. The result keeps first-seen order without repeats.
    pub(crate) fn expand_clusters(
        &self,
        args: &[String],
    ) -> Result<Vec<Connection>, ManagerError> {
        let mut selected: Vec<Connection> = Vec::new();
        for arg in args {
            let names = if is_pattern(arg) {
                let (expanded, unmatched) =
                    expand_patterns(std::slice::from_ref(arg), &self.store.names());
                for pattern in unmatched {
                    eprintln!("warning: pattern '{pattern}' matched no clusters");
                }
                expanded
            } else {
                vec![self.connection(arg)?.name]
            };
            for name in names {
                if selected.iter().any(|connection| connection.name == name) {
                    continue;
                }
                if let Some(connection) = self.store.get(&name) {
                    selected.push(connection.clone());
                }
            }
        }
        if selected.is_empty() {
            return Err(ManagerError::NotFound(args.join(" ")));
        }
        Ok(selected)
    }

    /// Returns `false` when the operator declined to overwrite an existing
    /// entry.
    pub(crate) fn add_connection(
        &mut self,
        name: &str,
        login_command: &str,
    ) -> Result<bool, ManagerError> {
        if self.store.contains(name) {
            let question = format!("Connection '{name}' already exists. Overwrite it?");
            if !self.executor.prompter().confirm(&question, false)? {
                return Ok(false);
            }
        }
        self.store.upsert(name, login_command)?;
        self.store.save()?;
        Ok(true)
    }

    /// Returns the removed name, or `None` when the operator backed out.
    pub(crate) fn remove_connection(
        &mut self,
        query: &str,
    ) -> Result<Option<String>, ManagerError> {
        let prompter = self.executor.prompter();
        let name = if self.store.contains(query) {
            query.to_string()
        } else {
            let resolved = resolve_name(query, self.store.names())?;
            let question = format!(
                "Connection '{query}' not found. Remove '{}' instead?",
                resolved.name
            );
            if !prompter.confirm(&question, false)? {
                return Ok(None);
            }
            resolved.name
        };

        if self.store.connections().len() == 1 {
            return Err(ManagerError::Configuration(format!(
                "refusing to remove '{name}', the last configured connection"
            )));
        }
        if !prompter.confirm(&format!("Remove connection '{name}'?"), false)? {
            return Ok(None);
        }
        self.store.remove(&name);
        self.store.save()?;
        Ok(Some(name))
    }

    pub(crate) fn import_connections(
        &mut self,
        path: &Path,
        merge: bool,
    ) -> Result<usize, ManagerError> {
        self.store.import_from(path, merge)?;
        self.store.save()?;
        Ok(self.store.connections().len())
    }

    pub(crate) fn export_connections(&self, path: &Path) -> Result<(), ManagerError> {
        self.store.export_to(path)
    }

    /// Runs the stored login command attached to the terminal.
    pub(crate) fn connect(&self, query: &str) -> Result<(String, Option<i32>), ManagerError> {
        let connection = self.connection(query)?;
        progress(&format!("logging in to '{}'", connection.name));
        let code = self.executor.run_login_interactive(&connection)?;
        Ok((connection.name, code))
    }

    fn controller_call(
        &mut self,
        connection: &Connection,
        args: Vec<String>,
        timeout: Duration,
    ) -> Result<String, ManagerError> {
        self.guard.guarded(&mut self.executor, connection, |exec| {
            exec.run(connection, &args, timeout)
        })
    }

    /// `null` and empty output both decode to `Value::Null`.
    fn controller_json(
        &mut self,
        connection: &Connection,
        args: Vec<String>,
        operation: &str,
    ) -> Result<Value, ManagerError> {
        let timeout = Duration::from_secs(COMMAND_TIMEOUT_SECS);
        let raw = self.controller_call(connection, args, timeout)?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(raw).map_err(|err| {
            ManagerError::CommandExecution(format!("failed to parse `{operation}` output: {err}"))
        })
    }

    fn controller_list(
        &mut self,
        connection: &Connection,
        args: Vec<String>,
        operation: &str,
    ) -> Result<Vec<Value>, ManagerError> {
        match self.controller_json(connection, args, operation)? {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => Ok(items),
            other => Err(ManagerError::CommandExecution(format!(
                "expected a list from `{operation}`, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub(crate) fn list_projects(
        &mut self,
        connection: &Connection,
    ) -> Result<Vec<Value>, ManagerError> {
        self.controller_list(connection, args(&["proj", "list", "--output", "json"]), "proj list")
    }

    pub(crate) fn get_project(
        &mut self,
        connection: &Connection,
        project: &str,
    ) -> Result<Value, ManagerError> {
        self.controller_json(
            connection,
            args(&["proj", "get", project, "--output", "json"]),
            "proj get",
        )
    }

    pub(crate) fn list_applications(
        &mut self,
        connection: &Connection,
        project: Option<&str>,
    ) -> Result<Vec<Application>, ManagerError> {
        let mut call = args(&["app", "list", "--output", "json"]);
        if let Some(project) = project {
            call.push("--project".to_string());
            call.push(project.to_string());
        }
        self.controller_list(connection, call, "app list")?
            .iter()
            .map(Application::from_document)
            .collect()
    }

    pub(crate) fn application_document(
        &mut self,
        connection: &Connection,
        app: &str,
    ) -> Result<Value, ManagerError> {
        self.controller_json(connection, args(&["app", "get", app, "--output", "json"]), "app get")
    }

    pub(crate) fn get_application(
        &mut self,
        connection: &Connection,
        app: &str,
    ) -> Result<Application, ManagerError> {
        let document = self.application_document(connection, app)?;
        Application::from_document(&document)
    }

    /// `None` when the live state matches the desired state.
    pub(crate) fn application_diff(
        &mut self,
        connection: &Connection,
        app: &str,
    ) -> Result<Option<String>, ManagerError> {
        let out = self.controller_call(
            connection,
            args(&["app", "diff", app]),
            Duration::from_secs(COMMAND_TIMEOUT_SECS),
        )?;
        let out = out.trim();
        Ok((!out.is_empty()).then(|| out.to_string()))
    }

    pub(crate) fn search_applications(
        &mut self,
        connection: &Connection,
        query: &str,
        project: Option<&str>,
    ) -> Result<Vec<Application>, ManagerError> {
        let needle = query.to_lowercase();
        Ok(self
            .list_applications(connection, project)?
            .into_iter()
            .filter(|app| app.name().to_lowercase().contains(&needle))
            .collect())
    }

    /// Per-cluster failures are recorded in the entry instead of aborting the
    /// remaining clusters.
    pub(crate) fn overview(&mut self, connections: &[Connection], app: &str) -> Vec<OverviewEntry> {
        connections
            .iter()
            .map(|connection| {
                progress(&format!("inspecting '{app}' on '{}'", connection.name));
                let state = self
                    .snapshot(connection, app)
                    .map_err(|err| err.to_string());
                OverviewEntry {
                    cluster: connection.name.clone(),
                    state,
                }
            })
            .collect()
    }

    fn snapshot(
        &mut self,
        connection: &Connection,
        app: &str,
    ) -> Result<AppSnapshot, ManagerError> {
        let application = self.get_application(connection, app)?;
        let diff = self.application_diff(connection, app)?;
        Ok(AppSnapshot {
            targets: application
                .sources()
                .iter()
                .map(|source| source.target_label())
                .collect(),
            sync: application.status.sync.status.to_string(),
            health: application.status.health.status.to_string(),
            diff,
        })
    }

    pub(crate) fn sync_application(
        &mut self,
        connection: &Connection,
        app: &str,
        dry_run: bool,
        prune: bool,
    ) -> Result<SyncOutcome, ManagerError> {
        if dry_run {
            return Ok(SyncOutcome::Previewed(self.application_diff(connection, app)?));
        }
        let question = format!("Sync application '{app}' on '{}'?", connection.name);
        if !self.executor.prompter().confirm(&question, true)? {
            return Ok(SyncOutcome::Declined);
        }
        self.run_sync(connection, app, prune).map(SyncOutcome::Synced)
    }

    /// One confirmation for the whole batch, then sequential syncs with a fixed
    /// pause between them. Individual failures are reported and counted.
    pub(crate) fn sync_applications(
        &mut self,
        connection: &Connection,
        apps: &[String],
        dry_run: bool,
        prune: bool,
    ) -> Result<BatchReport, ManagerError> {
        let total = apps.len();
        if dry_run {
            for app in apps {
                let diff = self.application_diff(connection, app)?;
                print_diff(&connection.name, app, diff.as_deref());
            }
            return Ok(BatchReport { succeeded: total, total });
        }

        let question = format!(
            "Sync {total} application(s) on '{}': {}?",
            connection.name,
            apps.join(", ")
        );
        if !self.executor.prompter().confirm(&question, true)? {
            return Err(ManagerError::UserAborted("batch sync declined".to_string()));
        }

        let mut succeeded = 0;
        for (position, app) in apps.iter().enumerate() {
            if position > 0 {
                thread::sleep(self.batch_delay);
            }
            progress(&format!(
                "syncing '{app}' on '{}' ({}/{total})",
                connection.name,
                position + 1
            ));
            match self.run_sync(connection, app, prune) {
                Ok(_) => succeeded += 1,
                // Every app in the batch shares the declined cluster.
                Err(err @ (ManagerError::UserAborted(_) | ManagerError::Interrupted)) => {
                    return Err(err);
                }
                Err(err) => eprintln!("sync of '{app}' failed: {err}"),
            }
        }
        Ok(BatchReport { succeeded, total })
    }

    fn run_sync(
        &mut self,
        connection: &Connection,
        app: &str,
        prune: bool,
    ) -> Result<String, ManagerError> {
        let mut call = args(&["app", "sync", app]);
        if prune {
            call.push("--prune".to_string());
        }
        self.controller_call(connection, call, Duration::from_secs(SYNC_TIMEOUT_SECS))
    }

    /// Applies the revision change cluster by cluster. A cluster that fails
    /// or is declined is reported and counted; only an interrupt stops the
    /// batch.
    pub(crate) fn set_target_revision(
        &mut self,
        connections: &[Connection],
        change: &TargetChange,
    ) -> Result<BatchReport, ManagerError> {
        let total = connections.len();
        let mut succeeded = 0;
        for connection in connections {
            progress(&format!(
                "setting '{}' to '{}' on '{}'",
                change.request.app, change.request.revision, connection.name
            ));
            let changed = match self.mutator.set_target_revision(
                &mut self.executor,
                &self.guard,
                connection,
                &change.request,
            ) {
                Ok(changed) => changed,
                Err(ManagerError::Interrupted) => return Err(ManagerError::Interrupted),
                Err(err) => {
                    eprintln!("{}: {err}", connection.name);
                    false
                }
            };
            if !changed {
                continue;
            }
            succeeded += 1;
            if change.request.dry_run {
                if !change.sync {
                    continue;
                }
                match self.apply_previewed(connection, change) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(ManagerError::Interrupted) => return Err(ManagerError::Interrupted),
                    Err(err) => {
                        eprintln!("{}: {err}", connection.name);
                        continue;
                    }
                }
            }
            match self.follow_up(connection, change) {
                Ok(()) => {}
                Err(ManagerError::Interrupted) => return Err(ManagerError::Interrupted),
                Err(err) => eprintln!("{}: {err}", connection.name),
            }
        }
        Ok(BatchReport { succeeded, total })
    }

    /// After a dry run with a sync requested, the change has to be applied
    /// for real before a diff means anything.
    fn apply_previewed(
        &mut self,
        connection: &Connection,
        change: &TargetChange,
    ) -> Result<bool, ManagerError> {
        let app = change.request.app.as_str();
        let question = format!(
            "This was a dry run. Apply the change on '{}' now so the diff can be shown \
             and the sync confirmed?",
            connection.name
        );
        if !self.executor.prompter().confirm(&question, false)? {
            println!("Skipping diff and sync of '{app}' on '{}' (dry run)", connection.name);
            return Ok(false);
        }
        progress(&format!("applying the change for real on '{}'", connection.name));
        let request = RevisionRequest {
            dry_run: false,
            ..change.request.clone()
        };
        let applied = self.mutator.set_target_revision(
            &mut self.executor,
            &self.guard,
            connection,
            &request,
        )?;
        if !applied {
            eprintln!("{}: failed to apply the change; skipping diff and sync", connection.name);
        }
        Ok(applied)
    }

    fn follow_up(
        &mut self,
        connection: &Connection,
        change: &TargetChange,
    ) -> Result<(), ManagerError> {
        let app = change.request.app.as_str();
        if !change.show_diff && !change.sync {
            return Ok(());
        }
        let diff = self.application_diff(connection, app)?;
        print_diff(&connection.name, app, diff.as_deref());
        if !change.sync {
            return Ok(());
        }
        let question = format!("Sync '{app}' on '{}' now?", connection.name);
        if !self.executor.prompter().confirm(&question, true)? {
            println!("Skipping sync of '{app}' on '{}'", connection.name);
            return Ok(());
        }
        self.run_sync(connection, app, false)?;
        println!("Synced '{app}' on '{}'", connection.name);
        Ok(())
    }
}

pub(crate) fn print_diff(cluster: &str, app: &str, diff: Option<&str>) {
    match diff {
        Some(diff) => {
            println!("--- diff for '{app}' on '{cluster}' ---");
            println!("{diff}");
        }
        None => println!("No differences for '{app}' on '{cluster}'"),
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
