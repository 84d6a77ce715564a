// Durable slots for the task collection
// The whole collection lives as one JSON document under one key; every save replaces it.
use rusqlite::{Connection, OptionalExtension};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use crate::app::error::PersistenceError;
use crate::app::models::Task;

pub const DEFAULT_STORAGE_KEY: &str = "tasks";

pub trait Persistence {
    // Ok(None) when nothing is stored under the key yet
    fn load(&self) -> Result<Option<Vec<Task>>, PersistenceError>;

    fn save(&mut self, tasks: &[Task]) -> Result<(), PersistenceError>;
}

// Key-value slot in a SQLite file
pub struct SqliteSlot {
    db_con: Connection,
    key: String,
}

impl SqliteSlot {
    pub fn open(path: &Path, key: &str) -> Result<SqliteSlot, PersistenceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    PersistenceError::Unavailable(format!(
                        "cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let slot = SqliteSlot {
            db_con: Connection::open(path)?,
            key: key.to_string(),
        };
        slot.create_table_if_not_exists()?;
        Ok(slot)
    }

    #[cfg(test)]
    pub fn in_memory(key: &str) -> Result<SqliteSlot, PersistenceError> {
        let slot = SqliteSlot {
            db_con: Connection::open_in_memory()?,
            key: key.to_string(),
        };
        slot.create_table_if_not_exists()?;
        Ok(slot)
    }

    fn create_table_if_not_exists(&self) -> Result<(), PersistenceError> {
        self.db_con.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
            (),
        )?;
        Ok(())
    }

    // Raw access to the stored document, bypassing JSON decoding
    pub fn read_raw(&self) -> Result<Option<String>, PersistenceError> {
        let raw = self
            .db_con
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1;",
                [&self.key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(raw)
    }

    pub fn write_raw(&self, document: &str) -> Result<(), PersistenceError> {
        self.db_con.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            (&self.key, document),
        )?;
        Ok(())
    }
}

impl Persistence for SqliteSlot {
    // READ
    fn load(&self) -> Result<Option<Vec<Task>>, PersistenceError> {
        return match self.read_raw()? {
            Some(document) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        };
    }

    // WRITE (single upsert, so a reader never sees half a collection)
    fn save(&mut self, tasks: &[Task]) -> Result<(), PersistenceError> {
        let document = serde_json::to_string(tasks)?;
        self.write_raw(&document)
    }
}

// In-process slot. Clones share the same document, so a test can keep a
// handle after moving the slot into a store.
#[derive(Clone, Default)]
pub struct MemorySlot {
    document: Rc<RefCell<Option<String>>>,
    saves: Rc<Cell<usize>>,
    fail_writes: bool,
}

impl MemorySlot {
    pub fn new() -> MemorySlot {
        MemorySlot::default()
    }

    #[cfg(test)]
    pub fn with_document(document: &str) -> MemorySlot {
        let slot = MemorySlot::default();
        *slot.document.borrow_mut() = Some(document.to_string());
        slot
    }

    // Every save after this fails, like a full disk or exceeded quota
    #[cfg(test)]
    pub fn failing_writes(mut self) -> MemorySlot {
        self.fail_writes = true;
        self
    }

    #[cfg(test)]
    pub fn document(&self) -> Option<String> {
        self.document.borrow().clone()
    }

    #[cfg(test)]
    pub fn save_count(&self) -> usize {
        self.saves.get()
    }
}

impl Persistence for MemorySlot {
    fn load(&self) -> Result<Option<Vec<Task>>, PersistenceError> {
        return match self.document.borrow().as_deref() {
            Some(document) => Ok(Some(serde_json::from_str(document)?)),
            None => Ok(None),
        };
    }

    fn save(&mut self, tasks: &[Task]) -> Result<(), PersistenceError> {
        if self.fail_writes {
            return Err(PersistenceError::Unavailable("quota exceeded".into()));
        }
        let document = serde_json::to_string(tasks)?;
        *self.document.borrow_mut() = Some(document);
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn task(id: u64, title: &str) -> Task {
        Task {
            id,
            title: title.into(),
            completed: false,
            priority: None,
            due_date: None,
            category: None,
            notes: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, id as u32).unwrap(),
            completed_at: None,
        }
    }

    #[test]
    fn empty_sqlite_slot_loads_nothing() {
        let slot = SqliteSlot::in_memory(DEFAULT_STORAGE_KEY).unwrap();
        assert!(slot.load().unwrap().is_none());
    }

    #[test]
    fn sqlite_slot_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("tasks.db");

        let mut slot = SqliteSlot::open(&path, DEFAULT_STORAGE_KEY).unwrap();
        slot.save(&[task(1, "one"), task(2, "two")]).unwrap();
        slot.save(&[task(2, "two")]).unwrap();
        drop(slot);

        let reopened = SqliteSlot::open(&path, DEFAULT_STORAGE_KEY).unwrap();
        let loaded = reopened.load().unwrap().unwrap();
        assert_eq!(loaded, vec![task(2, "two")]);
    }

    #[test]
    fn sqlite_keys_are_independent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.db");

        let mut work = SqliteSlot::open(&path, "work").unwrap();
        work.save(&[task(1, "ship it")]).unwrap();

        let home = SqliteSlot::open(&path, "home").unwrap();
        assert!(home.load().unwrap().is_none());
    }

    #[test]
    fn sqlite_garbage_is_reported_as_corrupt() {
        let slot = SqliteSlot::in_memory(DEFAULT_STORAGE_KEY).unwrap();
        slot.write_raw("{\"not\": \"an array\"}").unwrap();
        assert!(matches!(slot.load(), Err(PersistenceError::Corrupt(_))));
    }

    #[test]
    fn memory_slot_clones_share_the_document() {
        let handle = MemorySlot::new();
        let mut slot = handle.clone();
        slot.save(&[task(1, "one")]).unwrap();

        assert_eq!(handle.save_count(), 1);
        assert!(handle.document().unwrap().contains("\"Id\":1"));
    }

    #[test]
    fn failing_memory_slot_keeps_old_document() {
        let mut slot = MemorySlot::with_document("[]").failing_writes();
        assert!(slot.save(&[task(1, "one")]).is_err());
        assert_eq!(slot.document().as_deref(), Some("[]"));
        assert_eq!(slot.save_count(), 0);
    }
}
