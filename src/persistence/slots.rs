//! Slot implementations: local `.redstring` files and the redb session cache

use redb::ReadableTable;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{PersistenceResult, SavedSession, SlotStore};
use crate::universe::{SlotType, Universe};

const SESSIONS_TABLE: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("sessions");

/// A session stored as pretty JSON in a local file
#[derive(Debug, Clone)]
pub struct LocalFileSlot {
    path: PathBuf,
}

impl LocalFileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SlotStore for LocalFileSlot {
    fn slot_type(&self) -> SlotType {
        SlotType::Local
    }

    fn load(&self) -> PersistenceResult<Option<SavedSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, session: &SavedSession) -> PersistenceResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("redstring.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(session)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Sessions keyed by universe in a shared redb database
pub struct CacheSlot {
    db: Arc<redb::Database>,
    key: String,
}

impl CacheSlot {
    pub fn new(db: Arc<redb::Database>, key: &str) -> Self {
        Self {
            db,
            key: key.to_string(),
        }
    }

    /// Open (or create) the cache database file
    pub fn open_database(path: &Path) -> PersistenceResult<Arc<redb::Database>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = redb::Database::create(path).map_err(redb::Error::from)?;
        Ok(Arc::new(db))
    }

    /// Default cache location under the user cache dir
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("redstring")
            .join("sessions.redb")
    }

    fn read_bytes(&self) -> Result<Option<Vec<u8>>, redb::Error> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SESSIONS_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = table.get(self.key.as_str())?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn write_bytes(&self, bytes: &[u8]) -> Result<(), redb::Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;
            table.insert(self.key.as_str(), bytes)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl SlotStore for CacheSlot {
    fn slot_type(&self) -> SlotType {
        SlotType::Browser
    }

    fn load(&self) -> PersistenceResult<Option<SavedSession>> {
        match self.read_bytes()? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, session: &SavedSession) -> PersistenceResult<()> {
        let bytes = serde_json::to_vec(session)?;
        self.write_bytes(&bytes)?;
        Ok(())
    }

    fn location(&self) -> String {
        format!("cache:{}", self.key)
    }
}

/// Slots of a universe that can be reached from this machine.
///
/// The Git slot is synced by the backend process and is not opened here.
pub fn open_slots(
    universe: &Universe,
    cache: Option<Arc<redb::Database>>,
) -> Vec<Box<dyn SlotStore>> {
    let mut slots: Vec<Box<dyn SlotStore>> = Vec::new();
    for slot in universe.slots() {
        match slot {
            SlotType::Git => {
                tracing::debug!("Skipping git slot for {}: synced remotely", universe.slug)
            }
            SlotType::Local => {
                match universe.local_file.as_ref().and_then(|l| l.path.as_deref()) {
                    Some(path) => slots.push(Box::new(LocalFileSlot::new(path))),
                    None => tracing::debug!("Local slot for {} has no file yet", universe.slug),
                }
            }
            SlotType::Browser => match (&cache, universe.browser_storage.as_ref()) {
                (Some(db), Some(cfg)) => slots.push(Box::new(CacheSlot::new(Arc::clone(db), &cfg.key))),
                _ => tracing::debug!("No cache database for {}", universe.slug),
            },
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphState, NewGraph};
    use crate::persistence::{reconcile, save_all};
    use tempfile::TempDir;

    fn sample() -> SavedSession {
        let mut state = GraphState::new();
        state.create_new_graph(NewGraph::named("Solar System")).unwrap();
        SavedSession::from_state(&state).unwrap()
    }

    #[test]
    fn test_local_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let slot = LocalFileSlot::new(dir.path().join("space.redstring"));
        assert!(slot.load().unwrap().is_none());

        let session = sample();
        slot.save(&session).unwrap();
        assert_eq!(slot.load().unwrap(), Some(session));
        assert!(!dir.path().join("space.redstring.tmp").exists());
    }

    #[test]
    fn test_cache_slots_are_keyed() {
        let dir = TempDir::new().unwrap();
        let db = CacheSlot::open_database(&dir.path().join("sessions.redb")).unwrap();
        let a = CacheSlot::new(Arc::clone(&db), "universe_a");
        let b = CacheSlot::new(db, "universe_b");

        assert!(a.load().unwrap().is_none());
        a.save(&sample()).unwrap();
        assert!(a.load().unwrap().is_some());
        assert!(b.load().unwrap().is_none());
    }

    /// Positions that only reparse exactly with float_roundtrip
    fn scattered(count: usize) -> SavedSession {
        let mut state = GraphState::new();
        state
            .create_new_graph(NewGraph::named("Field").with_ids("g", "field"))
            .unwrap();
        state
            .add_node_prototype(crate::graph::NodePrototype::new("dot", "Dot"))
            .unwrap();
        for i in 0..count {
            let x = i as f64;
            let instance = crate::graph::NodeInstance::new(&format!("n{}", i), "dot")
                .at(x * 1.37 + 0.3 / (x + 1.0), x / 7.0 - 0.1 / (x + 3.0));
            state.add_node("g", instance).unwrap();
        }
        SavedSession::from_state(&state).unwrap()
    }

    #[test]
    fn test_float_positions_verify_after_reload() {
        let dir = TempDir::new().unwrap();
        let session = scattered(2000);

        let file = LocalFileSlot::new(dir.path().join("field.redstring"));
        file.save(&session).unwrap();
        let from_file = file.load().unwrap().unwrap();
        assert!(from_file.verify().unwrap());
        assert_eq!(from_file.content_hash, session.content_hash);

        let db = CacheSlot::open_database(&dir.path().join("sessions.redb")).unwrap();
        let cache = CacheSlot::new(db, "universe_field");
        cache.save(&session).unwrap();
        let from_cache = cache.load().unwrap().unwrap();
        assert!(from_cache.verify().unwrap());
        assert_eq!(from_cache.document, session.document);
    }

    #[test]
    fn test_reconcile_keeps_source_of_truth_with_float_positions() {
        let dir = TempDir::new().unwrap();
        let universe = Universe::new("field", "Field")
            .with_local_file(dir.path().join("field.redstring").to_str().unwrap(), true)
            .with_source_of_truth(SlotType::Local);
        let db = CacheSlot::open_database(&dir.path().join("c.redb")).unwrap();
        let slots = open_slots(&universe, Some(db));

        save_all(SlotType::Local, &slots, &scattered(500)).unwrap();

        let result = reconcile(SlotType::Local, &slots);
        assert_eq!(result.loaded_from, Some(SlotType::Local));
        assert!(result.divergent.is_empty());
        let state = result.session.unwrap().document.into_state();
        assert_eq!(state.graphs()["g"].instances.len(), 500);
    }

    #[test]
    fn test_open_slots_and_save_all() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("u.redstring");
        let universe = Universe::new("u", "U")
            .with_git_repo("a/b")
            .with_local_file(file.to_str().unwrap(), true)
            .with_source_of_truth(SlotType::Local);
        let db = CacheSlot::open_database(&dir.path().join("c.redb")).unwrap();

        let slots = open_slots(&universe, Some(db));
        let kinds: Vec<_> = slots.iter().map(|s| s.slot_type()).collect();
        assert_eq!(kinds, vec![SlotType::Local, SlotType::Browser]);

        let written = save_all(SlotType::Local, &slots, &sample()).unwrap();
        assert_eq!(written.len(), 2);

        let result = reconcile(SlotType::Local, &slots);
        assert_eq!(result.loaded_from, Some(SlotType::Local));
        assert!(result.divergent.is_empty());
    }
}
