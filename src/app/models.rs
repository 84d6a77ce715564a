use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// A single task record, as persisted and as handed out by the store.
// Field names follow the persisted JSON document ("Id", "dueDate", ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "Id")]
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Priority> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }

    // Form input uses digits: 0 = none, 1 = low, 2 = medium, 3 = high
    pub fn from_digit(digit: char) -> Option<Option<Priority>> {
        match digit {
            '0' => Some(None),
            '1' => Some(Some(Priority::Low)),
            '2' => Some(Some(Priority::Medium)),
            '3' => Some(Some(Priority::High)),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        };
        f.write_str(label)
    }
}

/// A field of a partial update: either left alone or replaced.
///
/// `Set(None)` on an optional field clears it, which is different from `Keep`.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Keep,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T: Clone> Patch<T> {
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(value) => Some(value),
            Patch::Keep => None,
        }
    }

    fn apply(&self, target: &mut T) {
        if let Patch::Set(value) = self {
            *target = value.clone();
        }
    }
}

// Field-level merge payload for update and bulk update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Patch<String>,
    pub completed: Patch<bool>,
    pub priority: Patch<Option<Priority>>,
    pub due_date: Patch<Option<NaiveDate>>,
    pub category: Patch<Option<String>>,
    pub notes: Patch<String>,
    pub completed_at: Patch<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    // The completion transition callers are expected to send:
    // completedAt follows completed.
    pub fn completion(completed: bool, now: DateTime<Utc>) -> TaskPatch {
        TaskPatch {
            completed: Patch::Set(completed),
            completed_at: Patch::Set(if completed { Some(now) } else { None }),
            ..TaskPatch::default()
        }
    }

    #[cfg(test)]
    pub fn title(title: impl Into<String>) -> TaskPatch {
        TaskPatch {
            title: Patch::Set(title.into()),
            ..TaskPatch::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    // Merge every supplied field into the task. Id and createdAt are never touched.
    pub fn apply_to(&self, task: &mut Task) {
        self.title.apply(&mut task.title);
        self.completed.apply(&mut task.completed);
        self.priority.apply(&mut task.priority);
        self.due_date.apply(&mut task.due_date);
        self.category.apply(&mut task.category);
        self.notes.apply(&mut task.notes);
        self.completed_at.apply(&mut task.completed_at);
    }
}

// Caller-supplied fields for a new task. There is no id: the store assigns it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub notes: Option<String>,
}

impl NewTask {
    #[cfg(test)]
    pub fn titled(title: impl Into<String>) -> NewTask {
        NewTask {
            title: title.into(),
            ..NewTask::default()
        }
    }
}

// Used by undo: re-submit a deleted record's values as a fresh task
impl From<&Task> for NewTask {
    fn from(task: &Task) -> NewTask {
        NewTask {
            title: task.title.clone(),
            priority: task.priority,
            due_date: task.due_date,
            category: task.category.clone(),
            notes: Some(task.notes.clone()),
        }
    }
}
