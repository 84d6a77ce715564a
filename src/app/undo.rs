use std::time::{Duration, Instant};

use crate::app::models::{NewTask, Task};

pub const UNDO_WINDOW: Duration = Duration::from_secs(5);

// Holds the last deleted task for a short while after deletion.
// Undo does not restore the record: it re-creates it under a new id.
#[derive(Debug, Clone)]
pub struct UndoWindow {
    task: Task,
    deadline: Instant,
}

impl UndoWindow {
    pub fn open(task: Task, now: Instant) -> UndoWindow {
        UndoWindow {
            task,
            deadline: now + UNDO_WINDOW,
        }
    }

    pub fn is_live(&self, now: Instant) -> bool {
        now < self.deadline
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    pub fn title(&self) -> &str {
        &self.task.title
    }

    // The fields to re-submit, if the window is still open
    pub fn take(self, now: Instant) -> Option<NewTask> {
        if self.is_live(now) {
            Some(NewTask::from(&self.task))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn deleted() -> Task {
        Task {
            id: 4,
            title: "Renew passport".into(),
            completed: false,
            priority: None,
            due_date: None,
            category: Some("admin".into()),
            notes: "bring photos".into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            completed_at: None,
        }
    }

    #[test]
    fn undo_inside_the_window_gives_the_fields_back() {
        let start = Instant::now();
        let window = UndoWindow::open(deleted(), start);

        let draft = window.take(start + Duration::from_secs(4)).unwrap();
        assert_eq!(draft.title, "Renew passport");
        assert_eq!(draft.category.as_deref(), Some("admin"));
        assert_eq!(draft.notes.as_deref(), Some("bring photos"));
    }

    #[test]
    fn window_closes_after_five_seconds() {
        let start = Instant::now();
        let window = UndoWindow::open(deleted(), start);

        assert!(window.is_live(start));
        assert_eq!(window.remaining(start + Duration::from_secs(2)), Duration::from_secs(3));
        assert!(!window.is_live(start + UNDO_WINDOW));
        assert!(window.take(start + Duration::from_secs(6)).is_none());
    }
}
