use crate::constants::{
    DEFAULT_CONNECTIONS, DEFAULT_CONNECTIONS_FILE, DEFAULT_CONTROLLER_BIN, DEFAULT_PATCH_BIN,
};
use crate::error::ManagerError;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default)]
struct PartialSettings {
    argocd_bin: Option<String>,
    kubectl_bin: Option<String>,
    allow_patch: Option<bool>,
    connections_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub(crate) argocd_bin: String,
    pub(crate) kubectl_bin: String,
    pub(crate) allow_patch: bool,
    pub(crate) connections_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            argocd_bin: DEFAULT_CONTROLLER_BIN.to_string(),
            kubectl_bin: DEFAULT_PATCH_BIN.to_string(),
            allow_patch: false,
            connections_file: None,
        }
    }
}

impl Settings {
    pub(crate) fn load() -> Result<Self> {
        let mut settings = Self::default();
        for path in settings_paths() {
            if !path.exists() {
                continue;
            }
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings file {}", path.display()))?;
            settings
                .apply_toml(&raw)
                .with_context(|| format!("failed to parse settings file {}", path.display()))?;
            break;
        }
        Ok(settings)
    }

    fn apply_toml(&mut self, raw: &str) -> Result<()> {
        let parsed: PartialSettings = toml::from_str(raw)?;
        if let Some(argocd_bin) = parsed.argocd_bin
            && !argocd_bin.trim().is_empty()
        {
            self.argocd_bin = argocd_bin;
        }
        if let Some(kubectl_bin) = parsed.kubectl_bin
            && !kubectl_bin.trim().is_empty()
        {
            self.kubectl_bin = kubectl_bin;
        }
        if let Some(allow_patch) = parsed.allow_patch {
            self.allow_patch = allow_patch;
        }
        if parsed.connections_file.is_some() {
            self.connections_file = parsed.connections_file;
        }
        Ok(())
    }
}

fn settings_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("argo-manager").join("config.toml"));
    }
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".argo-manager.toml"));
    }
    paths
}

pub(crate) fn default_connections_path() -> Result<PathBuf, ManagerError> {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_CONNECTIONS_FILE))
        .ok_or_else(|| {
            ManagerError::Configuration("could not determine the home directory".to_string())
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Connection {
    pub(crate) name: String,
    pub(crate) login_command: String,
}

/// Named login commands, persisted as a JSON object in insertion order.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionStore {
    path: PathBuf,
    connections: Vec<Connection>,
}

impl ConnectionStore {
    /// Seeds the file with the built-in defaults when it does not exist yet.
    pub(crate) fn load(path: &Path) -> Result<Self, ManagerError> {
        if !path.exists() {
            let store = Self {
                path: path.to_path_buf(),
                connections: DEFAULT_CONNECTIONS
                    .iter()
                    .map(|(name, login_command)| Connection {
                        name: (*name).to_string(),
                        login_command: (*login_command).to_string(),
                    })
                    .collect(),
            };
            store.save()?;
            eprintln!("created connection config at {}", path.display());
            return Ok(store);
        }

        let connections = read_connections(path)?;
        if connections.is_empty() {
            return Err(ManagerError::Configuration(format!(
                "connection config {} is empty",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            connections,
        })
    }

    pub(crate) fn save(&self) -> Result<(), ManagerError> {
        write_connections(&self.path, &self.connections)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub(crate) fn names(&self) -> Vec<&str> {
        self.connections
            .iter()
            .map(|connection| connection.name.as_str())
            .collect()
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|connection| connection.name == name)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replaces the command of an existing name in place, otherwise appends.
    pub(crate) fn upsert(&mut self, name: &str, login_command: &str) -> Result<(), ManagerError> {
        if name.trim().is_empty() || login_command.trim().is_empty() {
            return Err(ManagerError::Configuration(
                "connection name and command cannot be empty".to_string(),
            ));
        }
        match self
            .connections
            .iter_mut()
            .find(|connection| connection.name == name)
        {
            Some(existing) => existing.login_command = login_command.to_string(),
            None => self.connections.push(Connection {
                name: name.to_string(),
                login_command: login_command.to_string(),
            }),
        }
        Ok(())
    }

    pub(crate) fn remove(&mut self, name: &str) -> bool {
        let before = self.connections.len();
        self.connections.retain(|connection| connection.name != name);
        self.connections.len() != before
    }

    pub(crate) fn export_to(&self, path: &Path) -> Result<(), ManagerError> {
        write_connections(path, &self.connections)
    }

    /// With `merge`, imported names overwrite existing ones and new names are
    /// appended; otherwise the imported mapping replaces the current one.
    pub(crate) fn import_from(&mut self, path: &Path, merge: bool) -> Result<(), ManagerError> {
        let imported = read_connections(path)?;
        let mut next = if merge {
            self.clone()
        } else {
            Self {
                path: self.path.clone(),
                connections: Vec::new(),
            }
        };
        for connection in imported {
            next.upsert(&connection.name, &connection.login_command)?;
        }
        if next.connections.is_empty() {
            return Err(ManagerError::Configuration(format!(
                "imported config {} has no connections",
                path.display()
            )));
        }
        *self = next;
        Ok(())
    }
}

fn read_connections(path: &Path) -> Result<Vec<Connection>, ManagerError> {
    let raw = fs::read_to_string(path).map_err(|err| {
        ManagerError::Configuration(format!("failed to read {}: {err}", path.display()))
    })?;
    let parsed: Map<String, Value> = serde_json::from_str(&raw).map_err(|err| {
        ManagerError::Configuration(format!("invalid JSON in {}: {err}", path.display()))
    })?;

    parsed
        .into_iter()
        .map(|(name, value)| match value {
            Value::String(login_command) => Ok(Connection {
                name,
                login_command,
            }),
            other => Err(ManagerError::Configuration(format!(
                "connection `{name}` in {} must map to a login command string, found {other}",
                path.display()
            ))),
        })
        .collect()
}

fn write_connections(path: &Path, connections: &[Connection]) -> Result<(), ManagerError> {
    let map = connections
        .iter()
        .map(|connection| {
            (
                connection.name.clone(),
                Value::String(connection.login_command.clone()),
            )
        })
        .collect::<Map<_, _>>();
    let rendered = serde_json::to_string_pretty(&Value::Object(map)).map_err(|err| {
        ManagerError::Configuration(format!("failed to serialize connections: {err}"))
    })?;
    fs::write(path, rendered + "\n").map_err(|err| {
        ManagerError::Configuration(format!("failed to write {}: {err}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, raw: &str) {
        fs::write(path, raw).expect("write fixture");
    }

    #[test]
    fn test_load_seeds_defaults_when_missing() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("urls.json");

        let store = ConnectionStore::load(&path).expect("load");
        assert_eq!(store.names(), vec!["paywell-prod", "paywell-acc"]);
        assert!(path.exists());

        let reloaded = ConnectionStore::load(&path).expect("reload");
        assert_eq!(reloaded.connections(), store.connections());
    }

    #[test]
    fn test_load_rejects_empty_and_invalid_configs() {
        let temp = TempDir::new().expect("tempdir");
        let empty = temp.path().join("empty.json");
        write(&empty, "{}");
        assert!(matches!(
            ConnectionStore::load(&empty),
            Err(ManagerError::Configuration(_))
        ));

        let invalid = temp.path().join("invalid.json");
        write(&invalid, "{not json");
        assert!(matches!(
            ConnectionStore::load(&invalid),
            Err(ManagerError::Configuration(_))
        ));

        let wrong_type = temp.path().join("wrong.json");
        write(&wrong_type, r#"{"c1": 42}"#);
        assert!(matches!(
            ConnectionStore::load(&wrong_type),
            Err(ManagerError::Configuration(_))
        ));
    }

    #[test]
    fn test_load_preserves_file_order() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("urls.json");
        write(
            &path,
            r#"{"zeta": "argocd login z", "alpha": "argocd login a", "mid": "argocd login m"}"#,
        );
        let store = ConnectionStore::load(&path).expect("load");
        assert_eq!(store.names(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_upsert_remove_and_save_round_trip() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("urls.json");
        write(&path, r#"{"c1": "argocd login one"}"#);

        let mut store = ConnectionStore::load(&path).expect("load");
        store.upsert("c2", "argocd login two").expect("add c2");
        store.upsert("c1", "argocd login uno").expect("overwrite c1");
        assert!(store.upsert("", "argocd login x").is_err());
        assert!(store.upsert("c3", "   ").is_err());
        store.save().expect("save");

        let reloaded = ConnectionStore::load(&path).expect("reload");
        assert_eq!(reloaded.names(), vec!["c1", "c2"]);
        assert_eq!(
            reloaded.get("c1").map(|c| c.login_command.as_str()),
            Some("argocd login uno")
        );

        let mut store = reloaded;
        assert!(store.remove("c1"));
        assert!(!store.remove("c1"));
        assert!(!store.contains("c1"));
    }

    #[test]
    fn test_import_merge_and_replace() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("urls.json");
        write(&path, r#"{"c1": "argocd login one", "c2": "argocd login two"}"#);
        let incoming = temp.path().join("incoming.json");
        write(&incoming, r#"{"c2": "argocd login deux", "c3": "argocd login three"}"#);

        let mut merged = ConnectionStore::load(&path).expect("load");
        merged.import_from(&incoming, true).expect("merge");
        assert_eq!(merged.names(), vec!["c1", "c2", "c3"]);
        assert_eq!(
            merged.get("c2").map(|c| c.login_command.as_str()),
            Some("argocd login deux")
        );

        let mut replaced = ConnectionStore::load(&path).expect("load");
        replaced.import_from(&incoming, false).expect("replace");
        assert_eq!(replaced.names(), vec!["c2", "c3"]);

        let empty = temp.path().join("empty.json");
        write(&empty, "{}");
        let mut untouched = ConnectionStore::load(&path).expect("load");
        assert!(untouched.import_from(&empty, false).is_err());
        assert_eq!(untouched.names(), vec!["c1", "c2"]);
    }

    #[test]
    fn test_export_writes_loadable_json() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("urls.json");
        write(&path, r#"{"c1": "argocd login one"}"#);
        let store = ConnectionStore::load(&path).expect("load");

        let exported = temp.path().join("export.json");
        store.export_to(&exported).expect("export");
        let raw = fs::read_to_string(&exported).expect("read export");
        let value: Value = serde_json::from_str(&raw).expect("parse export");
        assert_eq!(value["c1"], "argocd login one");
    }

    #[test]
    fn test_settings_apply_toml() {
        let mut settings = Settings::default();
        settings
            .apply_toml(
                r#"
argocd_bin = "/opt/bin/argocd"
kubectl_bin = "  "
allow_patch = true
connections_file = "/tmp/urls.json"
"#,
            )
            .expect("parse settings");
        assert_eq!(settings.argocd_bin, "/opt/bin/argocd");
        assert_eq!(settings.kubectl_bin, "kubectl");
        assert!(settings.allow_patch);
        assert_eq!(
            settings.connections_file,
            Some(PathBuf::from("/tmp/urls.json"))
        );

        assert!(Settings::default().apply_toml("allow_patch = \"yes\"").is_err());
    }
}
