//! The task store: sole owner of the task collection.
//!
//! [`TaskStore`] is the contract the UI talks to. [`LocalTaskStore`] keeps the
//! collection in memory and writes all of it back to a [`Persistence`] slot
//! after every mutation. The remote adapter lives in `remote.rs`.

use chrono::Utc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::app::error::StoreError;
use crate::app::models::{NewTask, Task, TaskPatch};
use crate::app::storage::Persistence;

const DEFAULT_TASKS: &str = include_str!("seed_tasks.json");

pub trait TaskStore {
    /// Human readable name of the backing store, shown in the UI title.
    fn describe(&self) -> String;

    /// All tasks, newest first.
    fn get_all(&self) -> Result<Vec<Task>, StoreError>;

    fn get_by_id(&self, id: u64) -> Result<Task, StoreError>;

    fn create(&mut self, fields: NewTask) -> Result<Task, StoreError>;

    /// Merges the supplied fields. `completed_at` is not derived from `completed`.
    fn update(&mut self, id: u64, patch: &TaskPatch) -> Result<Task, StoreError>;

    /// Returns the removed record so the caller can offer undo.
    fn delete(&mut self, id: u64) -> Result<Task, StoreError>;

    /// Unknown ids are skipped. Results follow the order of `ids`.
    fn bulk_update(&mut self, ids: &[u64], patch: &TaskPatch) -> Result<Vec<Task>, StoreError>;

    /// Unknown ids are skipped. Results follow the order of `ids`.
    fn bulk_delete(&mut self, ids: &[u64]) -> Result<Vec<Task>, StoreError>;
}

/// The bundled sample collection used when the slot has nothing usable.
pub fn default_tasks() -> Vec<Task> {
    serde_json::from_str(DEFAULT_TASKS).unwrap_or_else(|e| {
        error!(error = %e, "Bundled default tasks are invalid");
        Vec::new()
    })
}

pub(crate) fn newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

pub struct LocalTaskStore<P: Persistence> {
    slot: P,
    tasks: Vec<Task>,
    latency: Duration,
}

impl<P: Persistence> LocalTaskStore<P> {
    /// Loads the collection from the slot. Missing or unreadable data falls
    /// back to [`default_tasks`]; neither case is an error.
    pub fn open(slot: P) -> LocalTaskStore<P> {
        let mut tasks = match slot.load() {
            Ok(Some(tasks)) => {
                debug!(count = tasks.len(), "Loaded tasks from storage");
                tasks
            }
            Ok(None) => {
                info!("No stored tasks, starting from the default set");
                default_tasks()
            }
            Err(e) => {
                warn!(error = %e, "Stored tasks unreadable, starting from the default set");
                default_tasks()
            }
        };
        newest_first(&mut tasks);

        LocalTaskStore {
            slot,
            tasks,
            latency: Duration::ZERO,
        }
    }

    // Every operation waits this long before running
    pub fn with_latency(mut self, latency: Duration) -> LocalTaskStore<P> {
        self.latency = latency;
        self
    }

    fn pause(&self) {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
    }

    fn next_id(&self) -> u64 {
        self.tasks.iter().map(|task| task.id).max().map_or(1, |max| max + 1)
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    // Write the whole collection back. A failed write is logged and swallowed:
    // the in-memory change stands.
    fn persist(&mut self) {
        if let Err(e) = self.slot.save(&self.tasks) {
            warn!(error = %e, count = self.tasks.len(), "Failed to persist tasks");
        }
    }
}

impl<P: Persistence> TaskStore for LocalTaskStore<P> {
    fn describe(&self) -> String {
        "local".to_string()
    }

    fn get_all(&self) -> Result<Vec<Task>, StoreError> {
        self.pause();
        let mut tasks = self.tasks.clone();
        newest_first(&mut tasks);
        Ok(tasks)
    }

    fn get_by_id(&self, id: u64) -> Result<Task, StoreError> {
        self.pause();
        self.tasks
            .iter()
            .find(|task| task.id == id)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }

    // CREATE
    fn create(&mut self, fields: NewTask) -> Result<Task, StoreError> {
        self.pause();
        let task = Task {
            id: self.next_id(),
            title: fields.title,
            completed: false,
            priority: fields.priority,
            due_date: fields.due_date,
            category: fields.category,
            notes: fields.notes.unwrap_or_default(),
            created_at: Utc::now(),
            completed_at: None,
        };
        self.tasks.insert(0, task.clone());
        self.persist();
        debug!(id = task.id, "Created task");
        Ok(task)
    }

    // UPDATE
    fn update(&mut self, id: u64, patch: &TaskPatch) -> Result<Task, StoreError> {
        self.pause();
        let index = self.position(id).ok_or(StoreError::NotFound { id })?;
        patch.apply_to(&mut self.tasks[index]);
        let updated = self.tasks[index].clone();
        self.persist();
        debug!(id, "Updated task");
        Ok(updated)
    }

    // DELETE
    fn delete(&mut self, id: u64) -> Result<Task, StoreError> {
        self.pause();
        let index = self.position(id).ok_or(StoreError::NotFound { id })?;
        let removed = self.tasks.remove(index);
        self.persist();
        debug!(id, "Deleted task");
        Ok(removed)
    }

    fn bulk_update(&mut self, ids: &[u64], patch: &TaskPatch) -> Result<Vec<Task>, StoreError> {
        self.pause();
        let mut updated = Vec::new();
        for &id in ids {
            if let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) {
                patch.apply_to(task);
                updated.push(task.clone());
            }
        }
        self.persist();
        debug!(requested = ids.len(), updated = updated.len(), "Bulk updated tasks");
        Ok(updated)
    }

    fn bulk_delete(&mut self, ids: &[u64]) -> Result<Vec<Task>, StoreError> {
        self.pause();
        let mut removed = Vec::new();
        for &id in ids {
            if let Some(index) = self.position(id) {
                removed.push(self.tasks.remove(index));
            }
        }
        self.persist();
        debug!(requested = ids.len(), removed = removed.len(), "Bulk deleted tasks");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{Patch, Priority};
    use crate::app::storage::MemorySlot;
    use chrono::NaiveDate;
    use std::time::Instant;

    fn empty_store() -> (LocalTaskStore<MemorySlot>, MemorySlot) {
        let handle = MemorySlot::with_document("[]");
        (LocalTaskStore::open(handle.clone()), handle)
    }

    #[test]
    fn buy_milk_scenario() {
        let (mut store, _) = empty_store();

        let created = store.create(NewTask::titled("Buy milk")).unwrap();
        assert_eq!(created.id, 1);
        assert!(!created.completed);
        assert_eq!(created.priority, None);

        let done = store
            .update(1, &TaskPatch::completion(true, Utc::now()))
            .unwrap();
        assert!(done.completed);
        assert!(done.completed_at.is_some());

        let removed = store.delete(1).unwrap();
        assert!(removed.completed);
        assert!(removed.completed_at.is_some());
        assert!(matches!(
            store.get_by_id(1),
            Err(StoreError::NotFound { id: 1 })
        ));
    }

    #[test]
    fn ids_strictly_increase() {
        let (mut store, _) = empty_store();
        let ids: Vec<u64> = (0..5)
            .map(|i| store.create(NewTask::titled(format!("task {i}"))).unwrap().id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn next_id_follows_the_maximum_not_the_count() {
        let (mut store, _) = empty_store();
        for i in 0..3 {
            store.create(NewTask::titled(format!("task {i}"))).unwrap();
        }
        store.delete(1).unwrap();
        store.delete(2).unwrap();
        assert_eq!(store.create(NewTask::titled("next")).unwrap().id, 4);

        store.delete(4).unwrap();
        store.delete(3).unwrap();
        assert_eq!(store.create(NewTask::titled("fresh")).unwrap().id, 1);
    }

    #[test]
    fn get_all_is_newest_first() {
        let (mut store, _) = empty_store();
        for title in ["first", "second", "third"] {
            store.create(NewTask::titled(title)).unwrap();
        }
        let titles: Vec<String> = store
            .get_all()
            .unwrap()
            .into_iter()
            .map(|task| task.title)
            .collect();
        assert_eq!(titles, vec!["third", "second", "first"]);
    }

    #[test]
    fn create_then_read_applies_defaults() {
        let (mut store, _) = empty_store();
        let fields = NewTask {
            title: "Dentist".into(),
            priority: Some(Priority::High),
            due_date: NaiveDate::from_ymd_opt(2024, 5, 2),
            category: None,
            notes: None,
        };
        let created = store.create(fields).unwrap();
        let read = store.get_by_id(created.id).unwrap();

        assert_eq!(read, created);
        assert_eq!(read.title, "Dentist");
        assert_eq!(read.priority, Some(Priority::High));
        assert_eq!(read.due_date, NaiveDate::from_ymd_opt(2024, 5, 2));
        assert_eq!(read.notes, "");
        assert!(!read.completed);
        assert_eq!(read.completed_at, None);
    }

    #[test]
    fn update_missing_id_is_not_found() {
        let (mut store, handle) = empty_store();
        let result = store.update(42, &TaskPatch::title("nope"));
        assert!(matches!(result, Err(StoreError::NotFound { id: 42 })));
        assert!(matches!(store.delete(42), Err(StoreError::NotFound { id: 42 })));
        assert_eq!(handle.save_count(), 0);
    }

    #[test]
    fn update_does_not_manage_completed_at() {
        let (mut store, _) = empty_store();
        let task = store.create(NewTask::titled("Laundry")).unwrap();
        let patch = TaskPatch {
            completed: Patch::Set(true),
            ..TaskPatch::default()
        };
        let updated = store.update(task.id, &patch).unwrap();
        assert!(updated.completed);
        assert_eq!(updated.completed_at, None);
    }

    #[test]
    fn completion_round_trip() {
        let (mut store, _) = empty_store();
        let task = store.create(NewTask::titled("Laundry")).unwrap();

        store
            .update(task.id, &TaskPatch::completion(true, Utc::now()))
            .unwrap();
        let read = store.get_by_id(task.id).unwrap();
        assert!(read.completed && read.completed_at.is_some());

        store
            .update(task.id, &TaskPatch::completion(false, Utc::now()))
            .unwrap();
        let read = store.get_by_id(task.id).unwrap();
        assert!(!read.completed);
        assert_eq!(read.completed_at, None);
    }

    #[test]
    fn bulk_update_skips_unknown_ids_and_keeps_input_order() {
        let (mut store, handle) = empty_store();
        for title in ["a", "b", "c"] {
            store.create(NewTask::titled(title)).unwrap();
        }
        let saves_before = handle.save_count();

        let updated = store
            .bulk_update(&[3, 99, 1], &TaskPatch::completion(true, Utc::now()))
            .unwrap();
        let ids: Vec<u64> = updated.iter().map(|task| task.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert!(updated.iter().all(|task| task.completed));
        assert!(!store.get_by_id(2).unwrap().completed);
        assert_eq!(handle.save_count(), saves_before + 1);
    }

    #[test]
    fn bulk_delete_twice_is_harmless() {
        let (mut store, handle) = empty_store();
        for title in ["a", "b", "c"] {
            store.create(NewTask::titled(title)).unwrap();
        }

        let removed = store.bulk_delete(&[1, 3]).unwrap();
        assert_eq!(removed.len(), 2);
        let saves_after_first = handle.save_count();

        let again = store.bulk_delete(&[1, 3]).unwrap();
        assert!(again.is_empty());
        assert_eq!(handle.save_count(), saves_after_first + 1);
        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn returned_copies_do_not_alias_state() {
        let (mut store, _) = empty_store();
        let task = store.create(NewTask::titled("Original")).unwrap();
        let mut all = store.get_all().unwrap();
        all[0].title = "Changed outside".into();
        assert_eq!(store.get_by_id(task.id).unwrap().title, "Original");
    }

    #[test]
    fn every_mutation_is_written_and_reads_are_not() {
        let (mut store, handle) = empty_store();
        let task = store.create(NewTask::titled("Write")).unwrap();
        assert_eq!(handle.save_count(), 1);

        store.get_all().unwrap();
        store.get_by_id(task.id).unwrap();
        assert_eq!(handle.save_count(), 1);

        store.update(task.id, &TaskPatch::title("Rewrite")).unwrap();
        assert_eq!(handle.save_count(), 2);

        let persisted: Vec<Task> = serde_json::from_str(&handle.document().unwrap()).unwrap();
        assert_eq!(persisted[0].title, "Rewrite");
    }

    #[test]
    fn reopening_sees_persisted_state() {
        let (mut store, handle) = empty_store();
        store.create(NewTask::titled("Persist me")).unwrap();
        drop(store);

        let reopened = LocalTaskStore::open(handle);
        let all = reopened.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Persist me");
    }

    #[test]
    fn empty_slot_starts_from_default_tasks() {
        let store = LocalTaskStore::open(MemorySlot::new());
        assert_eq!(store.get_all().unwrap(), {
            let mut tasks = default_tasks();
            newest_first(&mut tasks);
            tasks
        });
        assert!(!default_tasks().is_empty());
    }

    #[test]
    fn corrupt_slot_falls_back_to_default_tasks() {
        let handle = MemorySlot::with_document("{ definitely not json");
        let mut store = LocalTaskStore::open(handle.clone());
        assert_eq!(store.get_all().unwrap().len(), default_tasks().len());

        // New ids continue after the defaults
        let max = default_tasks().iter().map(|task| task.id).max().unwrap();
        assert_eq!(store.create(NewTask::titled("after")).unwrap().id, max + 1);
    }

    #[test]
    fn failed_writes_do_not_fail_operations() {
        let handle = MemorySlot::with_document("[]").failing_writes();
        let mut store = LocalTaskStore::open(handle.clone());

        let task = store.create(NewTask::titled("Kept in memory")).unwrap();
        assert_eq!(store.get_by_id(task.id).unwrap().title, "Kept in memory");
        assert_eq!(handle.document().as_deref(), Some("[]"));
    }

    #[test]
    fn latency_is_applied() {
        let (store, _) = empty_store();
        let store = store.with_latency(Duration::from_millis(20));
        let started = Instant::now();
        store.get_all().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
