use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "argo-manager",
    version,
    about = "Manage several Argo CD controllers from one place using stored login commands"
)]
pub(crate) struct Cli {
    /// Show controller commands, login output and debug logs.
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
    /// Path to the connection config (defaults to ~/.argocd_urls.json).
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) config: Option<PathBuf>,
    /// Allow falling back to `kubectl patch` when `argocd app set` fails.
    #[arg(long, global = true)]
    pub(crate) allow_patch: bool,
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// List configured connections.
    #[command(alias = "ls")]
    List {
        /// Also print each stored login command.
        #[arg(short, long)]
        detailed: bool,
    },
    /// Add or replace a connection.
    Add {
        name: String,
        /// Login command, e.g. `argocd login cd.example.com --sso --grpc-web`.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Remove a connection.
    #[command(alias = "rm")]
    Remove { name: String },
    /// Run the stored login command for a cluster in this terminal.
    Connect { cluster: String },
    /// Write the connection config to a file.
    Export { file: PathBuf },
    /// Load connections from a file.
    Import {
        file: PathBuf,
        /// Merge into the current config instead of replacing it.
        #[arg(long)]
        merge: bool,
    },
    /// Project commands.
    #[command(subcommand)]
    Proj(ProjCommands),
    /// Application commands.
    #[command(subcommand)]
    App(AppCommands),
}

#[derive(Debug, Subcommand)]
pub(crate) enum ProjCommands {
    /// List projects on a cluster.
    List { cluster: String },
    /// Show one project as JSON.
    Get { cluster: String, project: String },
    /// List a project's applications with sync and health.
    Apps {
        cluster: String,
        project: String,
        /// Redraw the table every 5 seconds until interrupted.
        #[arg(short, long)]
        watch: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Summary,
    /// One row per managed resource.
    Table,
    Json,
}

#[derive(Debug, Subcommand)]
pub(crate) enum AppCommands {
    /// List applications on a cluster.
    List {
        cluster: String,
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Show one application.
    Get {
        cluster: String,
        app: String,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
    /// Show one application on several clusters.
    GetMulti {
        /// Cluster names or glob patterns followed by the application name.
        #[arg(required = true, num_args = 2..)]
        targets: Vec<String>,
        /// `json` prints one object keyed by cluster name.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
    /// Show the diff between live and desired state.
    Diff { cluster: String, app: String },
    /// Compare one application across clusters.
    Overview {
        /// Cluster names or glob patterns followed by the application name.
        #[arg(required = true, num_args = 2..)]
        targets: Vec<String>,
        /// Print each cluster's full diff below the table.
        #[arg(long)]
        show_diff: bool,
        /// Do not shorten the TARGET column.
        #[arg(long)]
        targets_full: bool,
    },
    /// Sync one application. A glob pattern syncs it on every matching cluster.
    Sync {
        cluster: String,
        app: String,
        #[command(flatten)]
        options: SyncOptions,
    },
    /// Sync several applications on one cluster.
    SyncMulti {
        cluster: String,
        #[arg(required = true)]
        apps: Vec<String>,
        #[command(flatten)]
        options: SyncOptions,
    },
    /// Find applications whose name contains a string.
    Search {
        cluster: String,
        query: String,
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Change the target revision of an application on one or more clusters.
    SetTarget(SetTargetArgs),
}

#[derive(Debug, Clone, Copy, Args)]
pub(crate) struct SyncOptions {
    /// Only show what would change.
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Delete resources that are no longer in the desired state.
    #[arg(long)]
    pub(crate) prune: bool,
}

#[derive(Debug, Args)]
pub(crate) struct SetTargetArgs {
    /// Cluster names or glob patterns followed by the application name.
    #[arg(required = true, num_args = 2..)]
    pub(crate) targets: Vec<String>,
    #[arg(short, long)]
    pub(crate) revision: String,
    /// Repository URL of the source to update.
    #[arg(long)]
    pub(crate) repo: Option<String>,
    /// Zero-based index of the source to update.
    #[arg(long)]
    pub(crate) index: Option<usize>,
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Print the diff after a successful change.
    #[arg(long)]
    pub(crate) show_diff: bool,
    /// Show the diff and offer to sync after a successful change. With
    /// `--dry-run`, first offer to apply the change for real.
    #[arg(long)]
    pub(crate) sync: bool,
}

/// Splits `<clusters..> <app>` positional arguments.
pub(crate) fn split_targets(targets: &[String]) -> Option<(&[String], &str)> {
    match targets.split_last() {
        Some((app, clusters)) if !clusters.is_empty() => Some((clusters, app.as_str())),
        _ => None,
    }
}
