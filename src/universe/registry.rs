//! Universe record storage and the transition service on top of it

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::mapper::{self, UniverseView};
use super::{GitRepoConfig, SlotType, SyncStatus, Universe, UniverseError, UniverseResult};

/// Where universe records live.
///
/// The backend is the only writer; callers request transitions through
/// [`FederationService`].
pub trait UniverseBackend {
    fn list_universes(&self) -> UniverseResult<Vec<Universe>>;

    fn active_slug(&self) -> UniverseResult<Option<String>>;

    fn sync_statuses(&self) -> UniverseResult<HashMap<String, SyncStatus>>;

    /// Insert or replace a universe record by slug
    fn save_universe(&mut self, universe: Universe) -> UniverseResult<()>;

    fn set_active(&mut self, slug: &str) -> UniverseResult<()>;

    fn get_universe(&self, slug: &str) -> UniverseResult<Universe> {
        self.list_universes()?
            .into_iter()
            .find(|u| u.slug == slug)
            .ok_or_else(|| UniverseError::NotFound(slug.to_string()))
    }
}

/// Serialized registry contents
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDocument {
    #[serde(default)]
    pub active_slug: Option<String>,
    #[serde(default)]
    pub universes: Vec<Universe>,
    #[serde(default)]
    pub sync_status: HashMap<String, SyncStatus>,
}

impl RegistryDocument {
    fn upsert(&mut self, universe: Universe) {
        match self.universes.iter_mut().find(|u| u.slug == universe.slug) {
            Some(existing) => *existing = universe,
            None => self.universes.push(universe),
        }
    }

    fn activate(&mut self, slug: &str) -> UniverseResult<()> {
        if !self.universes.iter().any(|u| u.slug == slug) {
            return Err(UniverseError::NotFound(slug.to_string()));
        }
        self.active_slug = Some(slug.to_string());
        Ok(())
    }
}

/// Backend held in memory, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    doc: RegistryDocument,
}

impl InMemoryBackend {
    pub fn new(universes: Vec<Universe>) -> Self {
        let active_slug = universes.first().map(|u| u.slug.clone());
        Self {
            doc: RegistryDocument {
                active_slug,
                universes,
                sync_status: HashMap::new(),
            },
        }
    }

    pub fn set_sync_status(&mut self, slug: &str, status: SyncStatus) {
        self.doc.sync_status.insert(slug.to_string(), status);
    }
}

impl UniverseBackend for InMemoryBackend {
    fn list_universes(&self) -> UniverseResult<Vec<Universe>> {
        Ok(self.doc.universes.clone())
    }

    fn active_slug(&self) -> UniverseResult<Option<String>> {
        Ok(self.doc.active_slug.clone())
    }

    fn sync_statuses(&self) -> UniverseResult<HashMap<String, SyncStatus>> {
        Ok(self.doc.sync_status.clone())
    }

    fn save_universe(&mut self, universe: Universe) -> UniverseResult<()> {
        self.doc.upsert(universe);
        Ok(())
    }

    fn set_active(&mut self, slug: &str) -> UniverseResult<()> {
        self.doc.activate(slug)
    }
}

/// Backend persisted as a JSON file (`universes.json` in the data dir)
#[derive(Debug, Clone)]
pub struct JsonRegistry {
    path: PathBuf,
}

impl JsonRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> UniverseResult<RegistryDocument> {
        if !self.path.exists() {
            return Ok(RegistryDocument::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, doc: &RegistryDocument) -> UniverseResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(doc)?;
        std::fs::write(&self.path, json)?;
        tracing::debug!("Wrote universe registry to {}", self.path.display());
        Ok(())
    }
}

impl UniverseBackend for JsonRegistry {
    fn list_universes(&self) -> UniverseResult<Vec<Universe>> {
        Ok(self.read()?.universes)
    }

    fn active_slug(&self) -> UniverseResult<Option<String>> {
        Ok(self.read()?.active_slug)
    }

    fn sync_statuses(&self) -> UniverseResult<HashMap<String, SyncStatus>> {
        Ok(self.read()?.sync_status)
    }

    fn save_universe(&mut self, universe: Universe) -> UniverseResult<()> {
        let mut doc = self.read()?;
        if doc.active_slug.is_none() {
            doc.active_slug = Some(universe.slug.clone());
        }
        doc.upsert(universe);
        self.write(&doc)
    }

    fn set_active(&mut self, slug: &str) -> UniverseResult<()> {
        let mut doc = self.read()?;
        doc.activate(slug)?;
        self.write(&doc)
    }
}

/// Requests slot transitions from a backend and projects its records
pub struct FederationService<B: UniverseBackend> {
    backend: B,
}

impl<B: UniverseBackend> FederationService<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Display projections of every universe
    pub fn universes(&self) -> UniverseResult<Vec<UniverseView>> {
        let active = self.backend.active_slug()?;
        let statuses = self.backend.sync_statuses()?;
        Ok(self
            .backend
            .list_universes()?
            .iter()
            .map(|u| mapper::map_universe(u, active.as_deref(), &statuses))
            .collect())
    }

    pub fn view(&self, slug: &str) -> UniverseResult<UniverseView> {
        let universe = self.backend.get_universe(slug)?;
        let active = self.backend.active_slug()?;
        let statuses = self.backend.sync_statuses()?;
        Ok(mapper::map_universe(&universe, active.as_deref(), &statuses))
    }

    /// Register a new universe. An existing slug is an error, never a replace.
    pub fn create_universe(&mut self, universe: Universe) -> UniverseResult<UniverseView> {
        let slug = universe.slug.clone();
        match self.backend.get_universe(&slug) {
            Ok(_) => return Err(UniverseError::AlreadyExists(slug)),
            Err(UniverseError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.backend.save_universe(universe)?;
        tracing::info!("Created universe {}", slug);
        self.view(&slug)
    }

    pub fn attach_git_repository(
        &mut self,
        slug: &str,
        repo: GitRepoConfig,
    ) -> UniverseResult<UniverseView> {
        let current = self.backend.get_universe(slug)?;
        let linked = repo.linked_repo.clone();
        self.backend
            .save_universe(mapper::attach_git_repository(&current, repo))?;
        tracing::info!("Attached {} to universe {}", linked, slug);
        self.view(slug)
    }

    pub fn detach_git_repository(&mut self, slug: &str) -> UniverseResult<UniverseView> {
        let current = self.backend.get_universe(slug)?;
        self.backend
            .save_universe(mapper::detach_git_repository(&current)?)?;
        tracing::info!("Detached Git repository from universe {}", slug);
        self.view(slug)
    }

    pub fn set_source_of_truth(
        &mut self,
        slug: &str,
        slot: SlotType,
    ) -> UniverseResult<UniverseView> {
        let current = self.backend.get_universe(slug)?;
        self.backend
            .save_universe(mapper::set_source_of_truth(&current, slot)?)?;
        tracing::info!("Universe {} source of truth is now {}", slug, slot);
        self.view(slug)
    }

    pub fn switch_active(&mut self, slug: &str) -> UniverseResult<()> {
        self.backend.set_active(slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::SyncState;
    use tempfile::TempDir;

    #[test]
    fn test_service_attach_then_detach() {
        let backend = InMemoryBackend::new(vec![Universe::new("u", "U")]);
        let mut service = FederationService::new(backend);

        let view = service
            .attach_git_repository("u", GitRepoConfig::new("alice/graphs"))
            .unwrap();
        assert_eq!(view.source_of_truth, SlotType::Browser);
        assert_eq!(view.sync.state, SyncState::Standby);

        service.set_source_of_truth("u", SlotType::Git).unwrap();
        let view = service.detach_git_repository("u").unwrap();
        assert_eq!(view.source_of_truth, SlotType::Browser);
        assert_eq!(view.sync.state, SyncState::Disconnected);
    }

    #[test]
    fn test_service_unknown_universe() {
        let mut service = FederationService::new(InMemoryBackend::default());
        assert!(matches!(
            service.detach_git_repository("nope"),
            Err(UniverseError::NotFound(_))
        ));
    }

    #[test]
    fn test_sync_status_flows_into_view() {
        let mut backend =
            InMemoryBackend::new(vec![Universe::new("u", "U").with_git_repo("a/b")]);
        backend.set_sync_status(
            "u",
            SyncStatus {
                has_changes: true,
                ..Default::default()
            },
        );
        let service = FederationService::new(backend);
        let views = service.universes().unwrap();
        assert_eq!(views[0].sync.state, SyncState::Unsaved);
        assert!(views[0].is_active);
    }

    #[test]
    fn test_json_registry_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("universes.json");

        let mut service = FederationService::new(JsonRegistry::new(&path));
        service.create_universe(Universe::new("a", "A")).unwrap();
        service.create_universe(Universe::new("b", "B")).unwrap();
        service.switch_active("b").unwrap();

        let reopened = FederationService::new(JsonRegistry::new(&path));
        let views = reopened.universes().unwrap();
        assert_eq!(views.len(), 2);
        assert!(views.iter().find(|v| v.slug == "b").unwrap().is_active);
        assert!(reopened.backend().path().exists());
    }

    #[test]
    fn test_create_existing_slug_keeps_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("universes.json");
        let mut service = FederationService::new(JsonRegistry::new(&path));
        service
            .create_universe(
                Universe::new("u", "Original")
                    .with_local_file("/tmp/u.redstring", true)
                    .with_source_of_truth(SlotType::Local),
            )
            .unwrap();

        let err = service
            .create_universe(Universe::new("u", "Other"))
            .unwrap_err();
        assert!(matches!(err, UniverseError::AlreadyExists(ref slug) if slug == "u"));

        let kept = JsonRegistry::new(&path).get_universe("u").unwrap();
        assert_eq!(kept.name, "Original");
        assert_eq!(kept.source_of_truth, SlotType::Local);
        assert!(kept.local_file.is_some());
    }

    #[test]
    fn test_switch_to_missing_universe_fails() {
        let dir = TempDir::new().unwrap();
        let mut registry = JsonRegistry::new(dir.path().join("u.json"));
        assert!(registry.set_active("ghost").is_err());
    }
}
