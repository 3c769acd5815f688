use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

pub const CONFIG_DIR: &str = ".blueprint";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { port: 3001 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite file, relative to the project root
    pub path: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: ".blueprint/blueprint.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    /// JSON array of context items
    pub path: String,
    /// `first_match` or `most_recently_updated`
    pub ranker: String,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            path: ".blueprint/catalog.json".to_string(),
            ranker: "first_match".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerSection {
    /// Directory workspaces are created under
    pub root: String,
}

impl Default for ProvisionerSection {
    fn default() -> Self {
        Self {
            root: "workspaces".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub enabled: bool,
    pub max_concurrent_applications: usize,
    /// Entity snapshots are fetched from `{snapshot_base_url}/{entity_id}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_base_url: Option<String>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_applications: 4,
            snapshot_base_url: None,
        }
    }
}

/// Project configuration stored in `.blueprint/config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueprintConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub catalog: CatalogSection,
    pub provisioner: ProvisionerSection,
    pub scheduler: SchedulerSection,
}

impl BlueprintConfig {
    pub fn config_path(project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Read config from the project directory, falling back to defaults.
    pub async fn read(project_root: &Path) -> Self {
        let config_path = Self::config_path(project_root);

        if !config_path.exists() {
            warn!(path = %config_path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(&config_path).await {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    debug!(path = %config_path.display(), "Config loaded");
                    config
                }
                Err(e) => {
                    warn!(
                        path = %config_path.display(),
                        error = %e,
                        "Failed to parse config, using defaults"
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!(
                    path = %config_path.display(),
                    error = %e,
                    "Failed to read config file, using defaults"
                );
                Self::default()
            }
        }
    }

    pub async fn write(&self, project_root: &Path) -> std::io::Result<()> {
        let config_dir = project_root.join(CONFIG_DIR);
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).await?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let config_path = config_dir.join(CONFIG_FILE);
        fs::write(&config_path, content).await?;
        debug!(path = %config_path.display(), "Config saved");

        Ok(())
    }

    pub fn database_url(&self, project_root: &Path) -> String {
        if self.database.path == ":memory:" {
            return "sqlite::memory:".to_string();
        }
        format!("sqlite:{}", resolve(project_root, &self.database.path).display())
    }

    pub fn catalog_path(&self, project_root: &Path) -> PathBuf {
        resolve(project_root, &self.catalog.path)
    }

    pub fn workspace_root(&self, project_root: &Path) -> PathBuf {
        resolve(project_root, &self.provisioner.root)
    }
}

fn resolve(project_root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}
