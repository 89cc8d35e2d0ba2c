//! Project registry: named projects, each holding registered configuration
//! databases.
//!
//! The registry is a single JSON file (`projects.json`). Each project groups
//! the index databases built from related configuration exports (a base
//! configuration and its extensions, typically). The `StoreCache` keeps one
//! pool per opened database file, opening lazily on first use.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::db;

/// One index database registered under a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// SQLite file holding the index.
    pub store_path: PathBuf,
    /// Configuration export directory this database was built from.
    pub export_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub databases: Vec<DatabaseEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    projects: Vec<Project>,
    #[serde(default)]
    active_project: Option<String>,
}

/// The registry file with load/save plumbing. All mutating operations save
/// immediately; the file is small and rewriting it keeps crash behavior
/// simple.
pub struct ProjectRegistry {
    path: PathBuf,
    file: RegistryFile,
}

impl ProjectRegistry {
    /// Loads the registry; a missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        let file = if path.is_file() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read registry {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("registry {} is not valid JSON", path.display()))?
        } else {
            RegistryFile::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&self.file)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write registry {}", self.path.display()))?;
        Ok(())
    }

    pub fn projects(&self) -> &[Project] {
        &self.file.projects
    }

    pub fn find_project(&self, name: &str) -> Option<&Project> {
        self.file.projects.iter().find(|p| p.name == name)
    }

    fn find_project_mut(&mut self, name: &str) -> Result<&mut Project> {
        self.file
            .projects
            .iter_mut()
            .find(|p| p.name == name)
            .with_context(|| format!("project '{name}' not found"))
    }

    pub fn create_project(&mut self, name: &str, description: &str) -> Result<()> {
        if name.trim().is_empty() {
            bail!("project name must not be empty");
        }
        if self.find_project(name).is_some() {
            bail!("project '{name}' already exists");
        }
        let now = Utc::now();
        self.file.projects.push(Project {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
            databases: Vec::new(),
        });
        self.save()
    }

    pub fn remove_project(&mut self, name: &str) -> Result<()> {
        let before = self.file.projects.len();
        self.file.projects.retain(|p| p.name != name);
        if self.file.projects.len() == before {
            bail!("project '{name}' not found");
        }
        if self.file.active_project.as_deref() == Some(name) {
            self.file.active_project = None;
        }
        self.save()
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        if self.find_project(name).is_none() {
            bail!("project '{name}' not found");
        }
        self.file.active_project = Some(name.to_string());
        self.save()
    }

    pub fn active_project(&self) -> Option<&Project> {
        self.file
            .active_project
            .as_deref()
            .and_then(|name| self.find_project(name))
    }

    pub fn add_database(
        &mut self,
        project: &str,
        name: &str,
        description: &str,
        store_path: &Path,
        export_path: &Path,
    ) -> Result<()> {
        let now = Utc::now();
        let entry = DatabaseEntry {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            store_path: store_path.to_path_buf(),
            export_path: export_path.to_path_buf(),
            created_at: now,
            updated_at: now,
        };
        let proj = self.find_project_mut(project)?;
        if proj.databases.iter().any(|d| d.name == name) {
            bail!("database '{name}' already exists in project '{project}'");
        }
        proj.databases.push(entry);
        proj.updated_at = now;
        self.save()
    }

    pub fn update_database(
        &mut self,
        project: &str,
        name: &str,
        description: Option<&str>,
        export_path: Option<&Path>,
    ) -> Result<()> {
        let now = Utc::now();
        let proj = self.find_project_mut(project)?;
        let db = proj
            .databases
            .iter_mut()
            .find(|d| d.name == name)
            .with_context(|| format!("database '{name}' not found in project '{project}'"))?;
        if let Some(description) = description {
            db.description = description.to_string();
        }
        if let Some(export_path) = export_path {
            db.export_path = export_path.to_path_buf();
        }
        db.updated_at = now;
        proj.updated_at = now;
        self.save()
    }

    pub fn remove_database(&mut self, project: &str, name: &str) -> Result<()> {
        let proj = self.find_project_mut(project)?;
        let before = proj.databases.len();
        proj.databases.retain(|d| d.name != name);
        if proj.databases.len() == before {
            bail!("database '{name}' not found in project '{project}'");
        }
        proj.updated_at = Utc::now();
        self.save()
    }

    pub fn find_database(&self, project: &str, name: &str) -> Option<&DatabaseEntry> {
        self.find_project(project)?
            .databases
            .iter()
            .find(|d| d.name == name)
    }
}

/// Lazily-opened pools keyed by store path. Pools are cheap to clone
/// (internally reference-counted), so callers get owned handles.
#[derive(Default)]
pub struct StoreCache {
    pools: HashMap<PathBuf, SqlitePool>,
}

impl StoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&mut self, path: &Path) -> Result<SqlitePool> {
        if let Some(pool) = self.pools.get(path) {
            return Ok(pool.clone());
        }
        let pool = db::connect(path).await?;
        self.pools.insert(path.to_path_buf(), pool.clone());
        Ok(pool)
    }

    pub async fn close_all(&mut self) {
        for (_, pool) in self.pools.drain() {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("projects.json");

        let mut registry = ProjectRegistry::load(&path).unwrap();
        registry.create_project("erp", "trade management").unwrap();
        registry
            .add_database(
                "erp",
                "base",
                "",
                &tmp.path().join("base.db"),
                &tmp.path().join("export"),
            )
            .unwrap();

        let reloaded = ProjectRegistry::load(&path).unwrap();
        let project = reloaded.find_project("erp").unwrap();
        assert_eq!(project.description, "trade management");
        assert_eq!(project.databases.len(), 1);
        assert_eq!(project.databases[0].name, "base");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("projects.json");

        let mut registry = ProjectRegistry::load(&path).unwrap();
        registry.create_project("erp", "").unwrap();
        assert!(registry.create_project("erp", "").is_err());

        registry
            .add_database("erp", "base", "", Path::new("a.db"), Path::new("export"))
            .unwrap();
        assert!(registry
            .add_database("erp", "base", "", Path::new("b.db"), Path::new("export"))
            .is_err());
    }

    #[test]
    fn active_project_is_cleared_on_removal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("projects.json");

        let mut registry = ProjectRegistry::load(&path).unwrap();
        registry.create_project("erp", "").unwrap();
        registry.set_active("erp").unwrap();
        assert!(registry.active_project().is_some());

        registry.remove_project("erp").unwrap();
        assert!(registry.active_project().is_none());
    }

    #[test]
    fn update_and_remove_database() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("projects.json");

        let mut registry = ProjectRegistry::load(&path).unwrap();
        registry.create_project("erp", "").unwrap();
        registry
            .add_database("erp", "base", "", Path::new("a.db"), Path::new("export"))
            .unwrap();

        registry
            .update_database("erp", "base", Some("v2"), None)
            .unwrap();
        assert_eq!(
            registry.find_database("erp", "base").unwrap().description,
            "v2"
        );

        registry.remove_database("erp", "base").unwrap();
        assert!(registry.find_database("erp", "base").is_none());
        assert!(registry.remove_database("erp", "base").is_err());
    }
}
