//! Workspace materialization.

use async_trait::async_trait;
use blueprint_core::{AppliedContextItem, WorkspaceConfig};
use chrono::Utc;
use regex::{Captures, Regex};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CONTEXT_MANIFEST: &str = ".blueprint-context.json";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Invalid workspace name '{0}'")]
    InvalidName(String),

    #[error("File template path escapes the workspace: {0}")]
    UnsafePath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),
}

/// Creates a workspace from a resolved template and returns its id.
#[async_trait]
pub trait WorkspaceProvisioner: Send + Sync {
    async fn create(
        &self,
        config: &WorkspaceConfig,
        context_items: &[AppliedContextItem],
        variables: &HashMap<String, Value>,
    ) -> Result<String, ProvisionError>;
}

/// Replace `{{name}}` placeholders. Unknown placeholders are left as written.
pub fn render_template(template: &str, variables: &HashMap<String, Value>) -> String {
    let re = match Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}") {
        Ok(re) => re,
        Err(_) => return template.to_string(),
    };

    re.replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => caps[0].to_string(),
        Some(other) => other.to_string(),
    })
    .into_owned()
}

/// Reduce a rendered name to a single safe directory component.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = false;

    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    slug.trim_matches(|c| c == '-' || c == '.').to_string()
}

fn is_relative_inside(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && path.components().next().is_some()
}

async fn populate(
    dir: &Path,
    files: &[(PathBuf, String)],
    manifest: &Value,
) -> Result<(), ProvisionError> {
    for (relative, content) in files {
        let target = dir.join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
    }
    tokio::fs::write(dir.join(CONTEXT_MANIFEST), serde_json::to_vec_pretty(manifest)?).await?;
    Ok(())
}

/// Removes a half-written workspace directory unless kept. Dropping it
/// without `keep` (a cancelled create) schedules the removal.
struct PartialWorkspace {
    dir: Option<PathBuf>,
}

impl PartialWorkspace {
    fn new(dir: PathBuf) -> Self {
        Self { dir: Some(dir) }
    }

    fn keep(mut self) {
        self.dir = None;
    }

    async fn remove(mut self) {
        if let Some(dir) = self.dir.take() {
            remove_workspace_dir(dir).await;
        }
    }
}

impl Drop for PartialWorkspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(remove_workspace_dir(dir));
            }
        }
    }
}

async fn remove_workspace_dir(dir: PathBuf) {
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => debug!(path = %dir.display(), "Removed partial workspace"),
        Err(e) => warn!(path = %dir.display(), error = %e, "Failed to remove partial workspace"),
    }
}

/// Materializes workspaces as directories under a root.
#[derive(Debug, Clone)]
pub struct LocalProvisioner {
    root: PathBuf,
}

impl LocalProvisioner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn reserve_dir(&self, base: &str) -> Result<(String, PathBuf), ProvisionError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let mut name = base.to_string();
        for attempt in 2..100 {
            let dir = self.root.join(&name);
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => return Ok((name, dir)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    name = format!("{}-{}", base, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ProvisionError::Failed(format!(
            "Could not find a free workspace directory for '{}'",
            base
        )))
    }
}

#[async_trait]
impl WorkspaceProvisioner for LocalProvisioner {
    async fn create(
        &self,
        config: &WorkspaceConfig,
        context_items: &[AppliedContextItem],
        variables: &HashMap<String, Value>,
    ) -> Result<String, ProvisionError> {
        let now = Utc::now();
        let mut scope = variables.clone();
        scope
            .entry("timestamp".to_string())
            .or_insert_with(|| json!(now.format("%Y%m%d%H%M%S").to_string()));
        scope
            .entry("date".to_string())
            .or_insert_with(|| json!(now.format("%Y-%m-%d").to_string()));

        let rendered = render_template(&config.naming_pattern, &scope);
        let base = slugify(&rendered);
        if base.is_empty() {
            return Err(ProvisionError::InvalidName(rendered));
        }

        let mut files = Vec::with_capacity(config.file_templates.len());
        for file in &config.file_templates {
            let relative = PathBuf::from(render_template(&file.path, &scope));
            if !is_relative_inside(&relative) {
                return Err(ProvisionError::UnsafePath(relative.display().to_string()));
            }
            files.push((relative, render_template(&file.content, &scope)));
        }

        let (workspace_id, dir) = self.reserve_dir(&base).await?;
        debug!(workspace_id = %workspace_id, path = %dir.display(), "Created workspace directory");

        let partial = PartialWorkspace::new(dir.clone());
        let manifest = json!({
            "workspace_id": workspace_id,
            "created_at": now,
            "context_items": context_items,
            "variables": variables,
        });
        if let Err(err) = populate(&dir, &files, &manifest).await {
            partial.remove().await;
            return Err(err);
        }
        partial.keep();

        info!(
            workspace_id = %workspace_id,
            files = config.file_templates.len(),
            context_items = context_items.len(),
            "Workspace provisioned"
        );
        Ok(workspace_id)
    }
}
