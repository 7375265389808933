use crate::app::{Application, SyncStatus};
use crate::cli::{
    AppCommands, Cli, Commands, OutputFormat, ProjCommands, SetTargetArgs, SyncOptions,
    split_targets,
};
use crate::config::{Connection, ConnectionStore, Settings, default_connections_path};
use crate::constants::WATCH_INTERVAL_SECS;
use crate::error::ManagerError;
use crate::executor::Executor;
use crate::manager::{BatchReport, Manager, OverviewEntry, SyncOutcome, TargetChange, print_diff};
use crate::process::{ProcessRunner, SystemRunner};
use crate::prompt::{Prompter, TerminalPrompter};
use crate::resolver::is_pattern;
use crate::revision::{RevisionMutator, RevisionRequest};
use crate::session::{SessionContext, SessionGuard};
use crate::ui::{clear_screen, progress, render_table, truncate};
use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::thread;
use std::time::Duration;

const TARGET_COLUMN_MAX_CHARS: usize = 72;

pub(crate) fn run(cli: Cli, settings: Settings) -> Result<()> {
    let path = match cli.config.or(settings.connections_file) {
        Some(path) => path,
        None => default_connections_path()?,
    };
    let store = ConnectionStore::load(&path)
        .with_context(|| format!("failed to load connection config {}", path.display()))?;
    let executor = Executor::new(
        SystemRunner,
        TerminalPrompter,
        SessionContext::new(cli.verbose),
        settings.argocd_bin,
    );
    let mutator = RevisionMutator::new(
        cli.allow_patch || settings.allow_patch,
        settings.kubectl_bin,
    );
    let mut manager = Manager::new(store, executor, SessionGuard::default(), mutator);
    dispatch(&mut manager, cli.command)
}

pub(crate) fn dispatch<R: ProcessRunner, P: Prompter>(
    manager: &mut Manager<R, P>,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::List { detailed } => {
            cmd_list(manager.store(), detailed);
            Ok(())
        }
        Commands::Add { name, command } => cmd_add(manager, &name, &command.join(" ")),
        Commands::Remove { name } => cmd_remove(manager, &name),
        Commands::Connect { cluster } => cmd_connect(manager, &cluster),
        Commands::Export { file } => {
            manager.export_connections(&file)?;
            println!(
                "Exported {} connection(s) to {}",
                manager.store().connections().len(),
                file.display()
            );
            Ok(())
        }
        Commands::Import { file, merge } => {
            let count = manager.import_connections(&file, merge)?;
            let mode = if merge { "merged" } else { "replaced" };
            println!(
                "Imported {} ({mode}); {count} connection(s) configured",
                file.display()
            );
            Ok(())
        }
        Commands::Proj(command) => dispatch_proj(manager, command),
        Commands::App(command) => dispatch_app(manager, command),
    }
}

fn dispatch_proj<R: ProcessRunner, P: Prompter>(
    manager: &mut Manager<R, P>,
    command: ProjCommands,
) -> Result<()> {
    match command {
        ProjCommands::List { cluster } => {
            let connection = manager.connection(&cluster)?;
            let projects = manager.list_projects(&connection)?;
            if projects.is_empty() {
                println!("No projects on '{}'", connection.name);
                return Ok(());
            }
            let rows = projects
                .iter()
                .map(|project| {
                    vec![
                        json_str(project, &["metadata", "name"]).unwrap_or("N/A").to_string(),
                        json_str(project, &["spec", "description"]).unwrap_or("").to_string(),
                    ]
                })
                .collect::<Vec<_>>();
            println!("{}", render_table(&["NAME", "DESCRIPTION"], &rows));
            Ok(())
        }
        ProjCommands::Get { cluster, project } => {
            let connection = manager.connection(&cluster)?;
            let document = manager.get_project(&connection, &project)?;
            print_json(&document)
        }
        ProjCommands::Apps {
            cluster,
            project,
            watch,
        } => cmd_project_apps(manager, &cluster, &project, watch),
    }
}

fn dispatch_app<R: ProcessRunner, P: Prompter>(
    manager: &mut Manager<R, P>,
    command: AppCommands,
) -> Result<()> {
    match command {
        AppCommands::List { cluster, project } => {
            let connection = manager.connection(&cluster)?;
            let apps = manager.list_applications(&connection, project.as_deref())?;
            if apps.is_empty() {
                println!("No applications on '{}'", connection.name);
            } else {
                print_app_table(&apps);
            }
            Ok(())
        }
        AppCommands::Get {
            cluster,
            app,
            format,
        } => {
            let connection = manager.connection(&cluster)?;
            if format == OutputFormat::Json {
                return print_json(&manager.application_document(&connection, &app)?);
            }
            let application = manager.get_application(&connection, &app)?;
            print_application(&connection.name, &application, format);
            Ok(())
        }
        AppCommands::GetMulti { targets, format } => cmd_get_multi(manager, &targets, format),
        AppCommands::Diff { cluster, app } => {
            let connection = manager.connection(&cluster)?;
            let diff = manager.application_diff(&connection, &app)?;
            print_diff(&connection.name, &app, diff.as_deref());
            Ok(())
        }
        AppCommands::Overview {
            targets,
            show_diff,
            targets_full,
        } => cmd_overview(manager, &targets, show_diff, targets_full),
        AppCommands::Sync {
            cluster,
            app,
            options,
        } => cmd_sync(manager, &cluster, &app, options),
        AppCommands::SyncMulti {
            cluster,
            apps,
            options,
        } => {
            let connection = manager.connection(&cluster)?;
            let report =
                manager.sync_applications(&connection, &apps, options.dry_run, options.prune)?;
            if !options.dry_run {
                finish_batch("Synced", report)?;
            }
            Ok(())
        }
        AppCommands::Search {
            cluster,
            query,
            project,
        } => {
            let connection = manager.connection(&cluster)?;
            let apps = manager.search_applications(&connection, &query, project.as_deref())?;
            if apps.is_empty() {
                println!("No applications matching '{query}' on '{}'", connection.name);
            } else {
                print_app_table(&apps);
            }
            Ok(())
        }
        AppCommands::SetTarget(args) => cmd_set_target(manager, args),
    }
}

fn cmd_list(store: &ConnectionStore, detailed: bool) {
    println!("Connections ({}):", store.path().display());
    for (index, connection) in store.connections().iter().enumerate() {
        println!("  {}. {}", index + 1, connection.name);
        if detailed {
            println!("     {}", connection.login_command);
        }
    }
}

fn cmd_add<R: ProcessRunner, P: Prompter>(
    manager: &mut Manager<R, P>,
    name: &str,
    login_command: &str,
) -> Result<()> {
    if manager.add_connection(name, login_command)? {
        println!("Saved connection '{name}'");
    } else {
        println!("Left connection '{name}' unchanged");
    }
    Ok(())
}

fn cmd_remove<R: ProcessRunner, P: Prompter>(
    manager: &mut Manager<R, P>,
    query: &str,
) -> Result<()> {
    match manager.remove_connection(query)? {
        Some(name) => println!("Removed connection '{name}'"),
        None => println!("Nothing removed"),
    }
    Ok(())
}

fn cmd_connect<R: ProcessRunner, P: Prompter>(
    manager: &Manager<R, P>,
    query: &str,
) -> Result<()> {
    let (name, code) = manager.connect(query)?;
    match code {
        Some(0) => {
            println!("Logged in to '{name}'");
            Ok(())
        }
        Some(code) => bail!("login for '{name}' exited with status {code}"),
        None => bail!("login for '{name}' was terminated by a signal"),
    }
}

fn cmd_project_apps<R: ProcessRunner, P: Prompter>(
    manager: &mut Manager<R, P>,
    cluster: &str,
    project: &str,
    watch: bool,
) -> Result<()> {
    let connection = manager.connection(cluster)?;
    if !watch {
        return show_project_apps(manager, &connection, project);
    }
    loop {
        clear_screen();
        println!(
            "Every {WATCH_INTERVAL_SECS}s: applications in '{project}' on '{}' (Ctrl-C to stop)",
            connection.name
        );
        println!();
        if let Err(err) = show_project_apps(manager, &connection, project) {
            if stops_watch(&err) {
                return Err(err);
            }
            eprintln!("error: {err:#}");
        }
        io::stdout().flush().context("failed to flush stdout")?;
        thread::sleep(Duration::from_secs(WATCH_INTERVAL_SECS));
    }
}

/// Connection trouble is retried on the next redraw; the operator saying no
/// or pressing Ctrl-C ends the watch.
fn stops_watch(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ManagerError>(),
        Some(ManagerError::UserAborted(_) | ManagerError::Interrupted)
    )
}

fn show_project_apps<R: ProcessRunner, P: Prompter>(
    manager: &mut Manager<R, P>,
    connection: &Connection,
    project: &str,
) -> Result<()> {
    let apps = manager.list_applications(connection, Some(project))?;
    if apps.is_empty() {
        println!("No applications in project '{project}' on '{}'", connection.name);
        return Ok(());
    }
    print_app_table(&apps);
    let out_of_sync = apps
        .iter()
        .filter(|app| app.status.sync.status != SyncStatus::Synced)
        .count();
    let unhealthy = apps
        .iter()
        .filter(|app| app.status.health.status.is_unhealthy())
        .count();
    println!();
    println!(
        "{} application(s), {out_of_sync} not synced, {unhealthy} unhealthy",
        apps.len()
    );
    Ok(())
}

/// A plain name syncs on one cluster; a glob pattern syncs on each match
/// and reports like a batch.
fn cmd_sync<R: ProcessRunner, P: Prompter>(
    manager: &mut Manager<R, P>,
    cluster: &str,
    app: &str,
    options: SyncOptions,
) -> Result<()> {
    if !is_pattern(cluster) {
        let connection = manager.connection(cluster)?;
        let outcome = manager.sync_application(&connection, app, options.dry_run, options.prune)?;
        report_sync(&connection.name, app, outcome);
        return Ok(());
    }

    let connections = manager.expand_clusters(&[cluster.to_string()])?;
    let total = connections.len();
    let mut succeeded = 0;
    for connection in &connections {
        match manager.sync_application(connection, app, options.dry_run, options.prune) {
            Ok(outcome) => {
                if report_sync(&connection.name, app, outcome) {
                    succeeded += 1;
                }
            }
            Err(ManagerError::Interrupted) => return Err(ManagerError::Interrupted.into()),
            Err(err) => eprintln!("{}: {err}", connection.name),
        }
    }
    finish_batch("Synced", BatchReport { succeeded, total })
}

/// Returns `false` when the operator declined.
fn report_sync(cluster: &str, app: &str, outcome: SyncOutcome) -> bool {
    match outcome {
        SyncOutcome::Previewed(diff) => {
            println!("DRY RUN: showing what a sync of '{app}' on '{cluster}' would change");
            print_diff(cluster, app, diff.as_deref());
            true
        }
        SyncOutcome::Declined => {
            println!("Sync of '{app}' on '{cluster}' cancelled");
            false
        }
        SyncOutcome::Synced(output) => {
            if !output.trim().is_empty() {
                println!("{}", output.trim_end());
            }
            println!("Synced '{app}' on '{cluster}'");
            true
        }
    }
}

fn cmd_get_multi<R: ProcessRunner, P: Prompter>(
    manager: &mut Manager<R, P>,
    targets: &[String],
    format: OutputFormat,
) -> Result<()> {
    let Some((patterns, app)) = split_targets(targets) else {
        bail!("expected one or more clusters followed by an application name");
    };
    let connections = manager.expand_clusters(patterns)?;
    let failed = if format == OutputFormat::Json {
        let (documents, failed) = documents_by_cluster(manager, &connections, app)?;
        print_json(&Value::Object(documents))?;
        failed
    } else {
        let mut failed = 0;
        for (position, connection) in connections.iter().enumerate() {
            if position > 0 {
                println!();
            }
            match manager.get_application(connection, app) {
                Ok(application) => print_application(&connection.name, &application, format),
                Err(ManagerError::Interrupted) => return Err(ManagerError::Interrupted.into()),
                Err(err) => {
                    failed += 1;
                    eprintln!("{}: {err}", connection.name);
                }
            }
        }
        failed
    };
    if failed > 0 {
        bail!("failed to get '{app}' on {failed} of {} cluster(s)", connections.len());
    }
    Ok(())
}

/// Raw documents keyed by cluster, `null` where the fetch failed, plus the
/// failure count.
fn documents_by_cluster<R: ProcessRunner, P: Prompter>(
    manager: &mut Manager<R, P>,
    connections: &[Connection],
    app: &str,
) -> Result<(Map<String, Value>, usize)> {
    let mut documents = Map::new();
    let mut failed = 0;
    for connection in connections {
        let document = match manager.application_document(connection, app) {
            Ok(document) => document,
            Err(ManagerError::Interrupted) => return Err(ManagerError::Interrupted.into()),
            Err(err) => {
                failed += 1;
                eprintln!("{}: {err}", connection.name);
                Value::Null
            }
        };
        documents.insert(connection.name.clone(), document);
    }
    Ok((documents, failed))
}

fn cmd_overview<R: ProcessRunner, P: Prompter>(
    manager: &mut Manager<R, P>,
    targets: &[String],
    show_diff: bool,
    targets_full: bool,
) -> Result<()> {
    let Some((patterns, app)) = split_targets(targets) else {
        bail!("expected one or more clusters followed by an application name");
    };
    let connections = manager.expand_clusters(patterns)?;
    let entries = manager.overview(&connections, app);
    let rows = overview_rows(&entries, targets_full);
    println!();
    println!("{}", render_table(&["CLUSTER", "TARGET", "SYNC", "HEALTH", "DIFF"], &rows));
    if show_diff {
        for entry in &entries {
            if let Ok(snapshot) = &entry.state {
                println!();
                print_diff(&entry.cluster, app, snapshot.diff.as_deref());
            }
        }
    }
    Ok(())
}

pub(crate) fn overview_rows(entries: &[OverviewEntry], targets_full: bool) -> Vec<Vec<String>> {
    let target_cell = |text: String| {
        if targets_full {
            text
        } else {
            truncate(&text, TARGET_COLUMN_MAX_CHARS)
        }
    };
    entries
        .iter()
        .map(|entry| match &entry.state {
            Ok(snapshot) => vec![
                entry.cluster.clone(),
                target_cell(snapshot.targets.join(", ")),
                snapshot.sync.clone(),
                snapshot.health.clone(),
                (if snapshot.diff.is_some() { "yes" } else { "no" }).to_string(),
            ],
            Err(message) => vec![
                entry.cluster.clone(),
                target_cell(format!("error: {message}")),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
            ],
        })
        .collect()
}

fn cmd_set_target<R: ProcessRunner, P: Prompter>(
    manager: &mut Manager<R, P>,
    args: SetTargetArgs,
) -> Result<()> {
    let Some((patterns, app)) = split_targets(&args.targets) else {
        bail!("expected one or more clusters followed by an application name");
    };
    let connections = manager.expand_clusters(patterns)?;
    if connections.len() > 1 {
        progress(&format!(
            "updating '{app}' on {} clusters: {}",
            connections.len(),
            connections
                .iter()
                .map(|connection| connection.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    let change = TargetChange {
        request: RevisionRequest {
            app: app.to_string(),
            revision: args.revision,
            repo: args.repo,
            source_index: args.index,
            dry_run: args.dry_run,
        },
        show_diff: args.show_diff,
        sync: args.sync,
    };
    let report = manager.set_target_revision(&connections, &change)?;
    finish_batch("Updated", report)
}

fn finish_batch(verb: &str, report: BatchReport) -> Result<()> {
    println!("{verb} {}/{}", report.succeeded, report.total);
    if !report.all_succeeded() {
        bail!(
            "{} of {} operation(s) did not complete",
            report.total - report.succeeded,
            report.total
        );
    }
    Ok(())
}

fn print_app_table(apps: &[Application]) {
    let rows = apps
        .iter()
        .map(|app| {
            vec![
                app.name().to_string(),
                app.destination_namespace().to_string(),
                app.status.sync.status.to_string(),
                app.status.health.status.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    println!("{}", render_table(&["NAME", "NAMESPACE", "SYNC", "HEALTH"], &rows));
}

fn print_application(cluster: &str, app: &Application, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            println!("Cluster: {cluster}");
            if app.status.resources.is_empty() {
                println!("No resources available");
                return;
            }
            println!(
                "{}",
                render_table(
                    &["NAME", "NAMESPACE", "KIND", "SYNC", "HEALTH", "TARGET", "REV"],
                    &resource_rows(app)
                )
            );
        }
        OutputFormat::Summary | OutputFormat::Json => print_summary(cluster, app),
    }
}

fn resource_rows(app: &Application) -> Vec<Vec<String>> {
    let targets = app.target_revisions().join(",");
    let revisions = app.status.sync.revisions.join(",");
    app.status
        .resources
        .iter()
        .map(|resource| {
            vec![
                resource.name.clone(),
                resource.namespace.clone(),
                resource.kind.clone(),
                resource.status.clone(),
                resource.health_label(),
                targets.clone(),
                revisions.clone(),
            ]
        })
        .collect()
}

fn print_summary(cluster: &str, app: &Application) {
    println!("Application: {}", app.name());
    println!("Cluster:     {cluster}");
    println!("Namespace:   {}", app.destination_namespace());
    println!("Sync:        {}", app.status.sync.status);
    println!("Health:      {}", app.status.health.status);
    if !app.status.sync.revisions.is_empty() {
        println!("Revisions:   {}", app.status.sync.revisions.join(", "));
    }
    if let Some(reconciled_at) = &app.status.reconciled_at {
        println!("Reconciled:  {reconciled_at}");
    }
    let sources = app.sources();
    if sources.is_empty() {
        return;
    }
    println!("Sources:");
    for (index, source) in sources.iter().enumerate() {
        println!("  [{index}] {}", source.describe());
    }
}

fn print_json(value: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{rendered}");
    Ok(())
}

fn json_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |current, key| current.get(key))
        .and_then(Value::as_str)
}
