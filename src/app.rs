//! Typed view over the Application documents returned by `argocd ... --output json`.
//! Only the fields this tool reads are modeled; everything else is ignored.

use crate::constants::DEFAULT_APP_NAMESPACE;
use crate::error::ManagerError;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Application {
    pub(crate) metadata: Metadata,
    pub(crate) spec: ApplicationSpec,
    pub(crate) status: ApplicationStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Metadata {
    pub(crate) name: Option<String>,
    pub(crate) namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ApplicationSpec {
    pub(crate) source: Option<Source>,
    pub(crate) sources: Option<Vec<Source>>,
    pub(crate) destination: Option<Destination>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Destination {
    pub(crate) server: Option<String>,
    pub(crate) namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct Source {
    #[serde(rename = "repoURL")]
    pub(crate) repo_url: Option<String>,
    pub(crate) chart: Option<String>,
    pub(crate) path: Option<String>,
    pub(crate) target_revision: Option<String>,
    #[serde(rename = "ref")]
    pub(crate) reference: Option<String>,
    pub(crate) helm: Option<HelmSource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct HelmSource {
    pub(crate) repo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ApplicationStatus {
    pub(crate) sync: SyncInfo,
    pub(crate) health: HealthInfo,
    pub(crate) reconciled_at: Option<String>,
    pub(crate) resources: Vec<ResourceStatus>,
}

/// One managed resource as listed under `status.resources`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ResourceStatus {
    pub(crate) kind: String,
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) status: String,
    pub(crate) health: Option<HealthInfo>,
}

impl ResourceStatus {
    pub(crate) fn health_label(&self) -> String {
        self.health
            .as_ref()
            .map(|health| health.status.to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SyncInfo {
    pub(crate) status: SyncStatus,
    pub(crate) revisions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct HealthInfo {
    pub(crate) status: HealthStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub(crate) enum SyncStatus {
    Synced,
    OutOfSync,
    #[default]
    Unknown,
}

impl From<String> for SyncStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Synced" => Self::Synced,
            "OutOfSync" => Self::OutOfSync,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Synced => "Synced",
            Self::OutOfSync => "OutOfSync",
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub(crate) enum HealthStatus {
    Healthy,
    Progressing,
    Degraded,
    Suspended,
    Missing,
    #[default]
    Unknown,
}

impl From<String> for HealthStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Healthy" => Self::Healthy,
            "Progressing" => Self::Progressing,
            "Degraded" => Self::Degraded,
            "Suspended" => Self::Suspended,
            "Missing" => Self::Missing,
            _ => Self::Unknown,
        }
    }
}

impl HealthStatus {
    pub(crate) fn is_unhealthy(self) -> bool {
        matches!(self, Self::Degraded | Self::Missing)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Healthy => "Healthy",
            Self::Progressing => "Progressing",
            Self::Degraded => "Degraded",
            Self::Suspended => "Suspended",
            Self::Missing => "Missing",
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

impl Application {
    pub(crate) fn from_document(document: &Value) -> Result<Self, ManagerError> {
        serde_json::from_value(document.clone()).map_err(|err| {
            ManagerError::CommandExecution(format!("unexpected application document: {err}"))
        })
    }

    pub(crate) fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("N/A")
    }

    pub(crate) fn namespace(&self) -> &str {
        self.metadata
            .namespace
            .as_deref()
            .filter(|namespace| !namespace.is_empty())
            .unwrap_or(DEFAULT_APP_NAMESPACE)
    }

    /// `spec.sources` when present (even if empty), else `spec.source`.
    pub(crate) fn sources(&self) -> Vec<&Source> {
        match (&self.spec.sources, &self.spec.source) {
            (Some(sources), _) => sources.iter().collect(),
            (None, Some(source)) => vec![source],
            (None, None) => Vec::new(),
        }
    }

    /// Distinct target revisions across all sources, in source order.
    pub(crate) fn target_revisions(&self) -> Vec<&str> {
        let mut revisions: Vec<&str> = Vec::new();
        for revision in self.sources().into_iter().filter_map(Source::revision) {
            if !revisions.contains(&revision) {
                revisions.push(revision);
            }
        }
        revisions
    }

    pub(crate) fn destination_namespace(&self) -> &str {
        self.spec
            .destination
            .as_ref()
            .and_then(|destination| destination.namespace.as_deref())
            .unwrap_or("N/A")
    }
}

impl Source {
    pub(crate) fn repository(&self) -> Option<&str> {
        self.repo_url
            .as_deref()
            .or_else(|| self.helm.as_ref().and_then(|helm| helm.repo.as_deref()))
    }

    pub(crate) fn revision(&self) -> Option<&str> {
        self.target_revision
            .as_deref()
            .or(self.reference.as_deref())
            .filter(|revision| !revision.is_empty())
    }

    pub(crate) fn chart_or_path(&self) -> Option<&str> {
        self.chart.as_deref().or(self.path.as_deref())
    }

    pub(crate) fn matches_repository(&self, repo: &str) -> bool {
        self.repository()
            .is_some_and(|own| own.trim_end_matches('/') == repo.trim_end_matches('/'))
    }

    /// `repo@revision`, falling back to chart/path for the location.
    pub(crate) fn target_label(&self) -> String {
        let location = self.repository().or_else(|| self.chart_or_path());
        match (location, self.revision()) {
            (Some(location), Some(revision)) => format!("{location}@{revision}"),
            (Some(location), None) => location.to_string(),
            (None, Some(revision)) => revision.to_string(),
            (None, None) => "<unknown>".to_string(),
        }
    }

    pub(crate) fn describe(&self) -> String {
        format!(
            "repo: {} | chart/path: {} | targetRevision: {}",
            self.repository().unwrap_or("<no-repo>"),
            self.chart_or_path().unwrap_or("<no-chart>"),
            self.revision().unwrap_or("<none>")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_multi_source_document() {
        let document = json!({
            "metadata": {"name": "web", "namespace": "argocd-apps"},
            "spec": {
                "sources": [
                    {"repoURL": "https://git.example.com/charts.git/", "path": "web",
                     "targetRevision": "main"},
                    {"chart": "redis", "helm": {"repo": "https://charts.example.com"},
                     "targetRevision": "17.0.1"}
                ],
                "destination": {"namespace": "web"}
            },
            "status": {
                "sync": {"status": "OutOfSync", "revisions": ["abc123"]},
                "health": {"status": "Degraded"}
            }
        });
        let app = Application::from_document(&document).expect("parse");
        assert_eq!(app.name(), "web");
        assert_eq!(app.namespace(), "argocd-apps");
        assert_eq!(app.destination_namespace(), "web");
        assert_eq!(app.status.sync.status, SyncStatus::OutOfSync);
        assert_eq!(app.status.health.status, HealthStatus::Degraded);
        assert!(app.status.health.status.is_unhealthy());

        let sources = app.sources();
        assert_eq!(sources.len(), 2);
        assert!(sources[0].matches_repository("https://git.example.com/charts.git"));
        assert_eq!(sources[1].repository(), Some("https://charts.example.com"));
        assert_eq!(
            sources[1].target_label(),
            "https://charts.example.com@17.0.1"
        );
    }

    #[test]
    fn test_single_source_and_unknown_statuses() {
        let document = json!({
            "metadata": {"name": "api"},
            "spec": {"source": {
                "repoURL": "https://git.example.com/api.git",
                "targetRevision": ""
            }},
            "status": {"sync": {"status": "Drifting"}, "health": {"status": "Exploded"}}
        });
        let app = Application::from_document(&document).expect("parse");
        assert_eq!(app.namespace(), DEFAULT_APP_NAMESPACE);
        assert_eq!(app.status.sync.status, SyncStatus::Unknown);
        assert_eq!(app.status.health.status, HealthStatus::Unknown);
        let sources = app.sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].target_label(), "https://git.example.com/api.git");
        assert_eq!(
            sources[0].describe(),
            "repo: https://git.example.com/api.git | chart/path: <no-chart> | targetRevision: <none>"
        );
    }

    #[test]
    fn test_resources_and_target_revisions() {
        let document = json!({
            "spec": {"sources": [
                {"repoURL": "https://git.example.com/a.git", "targetRevision": "v2"},
                {"repoURL": "https://git.example.com/b.git", "targetRevision": "v2"},
                {"repoURL": "https://git.example.com/c.git", "ref": "main"}
            ]},
            "status": {"resources": [
                {"kind": "Deployment", "name": "web", "namespace": "apps", "status": "OutOfSync",
                 "health": {"status": "Progressing"}},
                {"kind": "ConfigMap", "name": "web-config", "namespace": "apps", "status": "Synced"}
            ]}
        });
        let app = Application::from_document(&document).expect("parse");
        assert_eq!(app.target_revisions(), vec!["v2", "main"]);
        let resources = &app.status.resources;
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].kind, "Deployment");
        assert_eq!(resources[0].health_label(), "Progressing");
        assert_eq!(resources[1].health_label(), "");
    }

    #[test]
    fn test_empty_document_has_no_sources() {
        let app = Application::from_document(&json!({})).expect("parse");
        assert!(app.sources().is_empty());
        assert_eq!(app.name(), "N/A");
    }
}
