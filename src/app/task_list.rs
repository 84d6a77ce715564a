use chrono::{DateTime, Local, NaiveDate};
use now::DateTimeNow;
use ratatui::style::{Color, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::*;

use crate::app::models::{Priority, Task};

// Tabs above the list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl TaskFilter {
    pub const TABS: [TaskFilter; 3] = [TaskFilter::All, TaskFilter::Active, TaskFilter::Completed];

    pub fn label(&self) -> &'static str {
        match self {
            TaskFilter::All => "All Tasks",
            TaskFilter::Active => "Active",
            TaskFilter::Completed => "Completed",
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        match self {
            TaskFilter::All => true,
            TaskFilter::Active => !task.completed,
            TaskFilter::Completed => task.completed,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            TaskFilter::All => 0,
            TaskFilter::Active => 1,
            TaskFilter::Completed => 2,
        }
    }

    pub fn next(&self) -> TaskFilter {
        TaskFilter::TABS[(self.index() + 1) % TaskFilter::TABS.len()]
    }
}

// Possible task list sorting orders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortedBy {
    ByDueDate,
    ByName,
    ByPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueStatus {
    Overdue,
    Today,
    Tomorrow,
    Upcoming,
}

pub fn due_status(due: NaiveDate, today: NaiveDate) -> DueStatus {
    if due < today {
        DueStatus::Overdue
    } else if due == today {
        DueStatus::Today
    } else if Some(due) == today.succ_opt() {
        DueStatus::Tomorrow
    } else {
        DueStatus::Upcoming
    }
}

// "Today", "Tomorrow" or a short date like "Mar 4"
pub fn due_label(due: NaiveDate, today: NaiveDate) -> String {
    match due_status(due, today) {
        DueStatus::Today => "Today".to_string(),
        DueStatus::Tomorrow => "Tomorrow".to_string(),
        _ => due.format("%b %-d").to_string(),
    }
}

// Case-insensitive match on the title, or on the notes when there are any
pub fn matches_search(task: &Task, query: &str) -> bool {
    let query = query.to_lowercase();
    task.title.to_lowercase().contains(&query)
        || (!task.notes.is_empty() && task.notes.to_lowercase().contains(&query))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub overdue: usize,
    pub due_this_week: usize,
}

impl TaskStats {
    pub fn collect(tasks: &[Task], now: DateTime<Local>) -> TaskStats {
        let today = now.date_naive();
        let week_end = now.end_of_week().date_naive();
        let open_due_dates = || {
            tasks
                .iter()
                .filter(|task| !task.completed)
                .filter_map(|task| task.due_date)
        };

        TaskStats {
            total: tasks.len(),
            active: tasks.iter().filter(|task| !task.completed).count(),
            completed: tasks.iter().filter(|task| task.completed).count(),
            overdue: open_due_dates().filter(|due| *due < today).count(),
            due_this_week: open_due_dates()
                .filter(|due| *due >= today && *due <= week_end)
                .count(),
        }
    }

    pub fn count_for(&self, filter: TaskFilter) -> usize {
        match filter {
            TaskFilter::All => self.total,
            TaskFilter::Active => self.active,
            TaskFilter::Completed => self.completed,
        }
    }

    // Rounded percentage of completed tasks
    pub fn completion_rate(&self) -> u16 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed as f64 / self.total as f64) * 100.0).round() as u16
    }

    pub fn encouragement(&self) -> Option<String> {
        if self.total == 0 {
            return None;
        }
        let message = if self.completion_rate() == 100 {
            "All done! Time to celebrate!".to_string()
        } else if self.active == 0 {
            "No active tasks - ready to add more?".to_string()
        } else if self.active == 1 {
            "Just one task left - you're almost there!".to_string()
        } else {
            format!("{} tasks to go - keep up the momentum!", self.active)
        };
        Some(message)
    }
}

pub struct TaskList {
    pub state: ListState,
    pub items: Vec<Task>,
    pub filter: TaskFilter,
    pub search: String,
    sorted_by: Option<SortedBy>,
    reversed: bool,
}

impl TaskList {
    pub fn with_items(items: Vec<Task>) -> TaskList {
        TaskList {
            state: ListState::default(),
            items,
            filter: TaskFilter::All,
            search: String::new(),
            sorted_by: None,
            reversed: false,
        }
    }

    // Replace everything after a reload; the chosen sort survives
    pub fn set_items(&mut self, items: Vec<Task>) {
        self.items = items;
        if let Some(sorted_by) = self.sorted_by {
            self.sort_items(sorted_by);
        }
        self.clamp_selection();
    }

    // Tasks passing the current filter and search, in display order
    pub fn visible(&self) -> Vec<&Task> {
        self.items
            .iter()
            .filter(|task| self.filter.matches(task) && matches_search(task, &self.search))
            .collect()
    }

    #[cfg(test)]
    pub fn visible_ids(&self) -> Vec<u64> {
        self.visible().iter().map(|task| task.id).collect()
    }

    pub fn set_filter(&mut self, filter: TaskFilter) {
        self.filter = filter;
        self.clamp_selection();
    }

    pub fn push_search_char(&mut self, c: char) {
        self.search.push(c);
        self.clamp_selection();
    }

    pub fn pop_search_char(&mut self) {
        self.search.pop();
        self.clamp_selection();
    }

    pub fn clear_search(&mut self) {
        self.search.clear();
        self.clamp_selection();
    }

    // Move the selection to the next item
    pub fn next(&mut self) {
        let len = self.visible().len();
        let i = match self.state.selected() {
            Some(i) => {
                if len == 0 || i >= len - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    // Move the selection to the previous item
    pub fn previous(&mut self) {
        let len = self.visible().len();
        let i = match self.state.selected() {
            Some(i) => {
                if len == 0 {
                    0
                } else if i == 0 {
                    len - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn unselect(&mut self) {
        self.state.select(None);
    }

    pub fn get_selected(&self) -> Option<&Task> {
        let i = self.state.selected()?;
        self.visible().get(i).copied()
    }

    fn clamp_selection(&mut self) {
        let len = self.visible().len();
        match self.state.selected() {
            Some(_) if len == 0 => self.state.select(None),
            Some(i) if i >= len => self.state.select(Some(len - 1)),
            _ => {}
        }
    }

    // Optimistic updates: only ever fed with records the store returned

    pub fn prepend(&mut self, task: Task) {
        self.items.insert(0, task);
        self.clamp_selection();
    }

    pub fn replace(&mut self, task: Task) {
        if let Some(existing) = self.items.iter_mut().find(|item| item.id == task.id) {
            *existing = task;
        }
        self.clamp_selection();
    }

    pub fn remove(&mut self, id: u64) {
        self.items.retain(|item| item.id != id);
        self.clamp_selection();
    }

    pub fn stats(&self, now: DateTime<Local>) -> TaskStats {
        TaskStats::collect(&self.items, now)
    }

    // Sort the items by the given order; the same order twice reverses it
    pub fn set_sort(&mut self, sorted_by: SortedBy) {
        self.reversed = self.sorted_by == Some(sorted_by) && !self.reversed;
        self.sorted_by = Some(sorted_by);
        self.sort_items(sorted_by);
    }

    fn sort_items(&mut self, sorted_by: SortedBy) {
        match sorted_by {
            SortedBy::ByName => self
                .items
                .sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase())),
            // Highest priority first, no priority last
            SortedBy::ByPriority => self.items.sort_by(|a, b| b.priority.cmp(&a.priority)),
            // Undated tasks go last
            SortedBy::ByDueDate => self.items.sort_by_key(|task| {
                (task.due_date.is_none(), task.due_date)
            }),
        }
        if self.reversed {
            self.items.reverse();
        }
    }
}

fn priority_color(priority: Option<Priority>) -> Color {
    match priority {
        Some(Priority::High) => Color::Red,
        Some(Priority::Medium) => Color::Yellow,
        Some(Priority::Low) => Color::Blue,
        None => Color::White,
    }
}

fn due_color(status: DueStatus) -> Color {
    match status {
        DueStatus::Overdue => Color::Red,
        DueStatus::Today => Color::LightRed,
        DueStatus::Tomorrow => Color::Yellow,
        DueStatus::Upcoming => Color::Gray,
    }
}

// Build the UI (list) for the visible tasks
pub fn get_list_items_ui<'a>(tasks: &[&'a Task], today: NaiveDate) -> Vec<ListItem<'a>> {
    return tasks
        .iter()
        .map(|task| {
            let mut lines = Vec::new();

            let title = Span::from(task.title.as_str());
            let title = if task.completed {
                title.fg(Color::DarkGray).crossed_out()
            } else {
                title.fg(priority_color(task.priority))
            };
            lines.push(Line::from(vec![
                Span::from(if task.completed { "[✓] " } else { "[ ] " }),
                title,
            ]));

            let mut meta = vec![Span::from("    ")];
            if let Some(priority) = task.priority {
                meta.push(Span::from(format!("{} ", priority)).fg(priority_color(Some(priority))));
            }
            if let Some(due) = task.due_date {
                let status = due_status(due, today);
                meta.push(Span::from(format!("Due: {} ", due_label(due, today))).fg(due_color(status)));
            }
            if let Some(category) = &task.category {
                meta.push(Span::from(format!("#{} ", category)).fg(Color::Cyan));
            }
            if let (true, Some(done)) = (task.completed, task.completed_at) {
                let done = done.with_timezone(&Local).format("%b %-d");
                meta.push(Span::from(format!("Completed {}", done)).fg(Color::Green));
            }
            lines.push(Line::from(meta));

            if !task.notes.is_empty() {
                lines.push(Line::from(
                    Span::from(format!("    {}", task.notes)).fg(Color::Gray),
                ));
            }
            ListItem::new(lines).style(Style::default().fg(Color::White))
        })
        .collect();
}

// Build the UI (lines) for statistics infobox
pub fn get_statistics_ui<'a>(stats: &TaskStats) -> Vec<Line<'a>> {
    let mut lines = vec![
        Line::from(format!("Total tasks: {}", stats.total)),
        Line::from(format!("Active: {}", stats.active)),
        Line::from(format!("Completed: {}", stats.completed)),
        Line::from(format!("Due this week: {}", stats.due_this_week)),
        Line::from(format!("Late: {}", stats.overdue)),
    ];
    if let Some(message) = stats.encouragement() {
        lines.push(Line::raw(""));
        lines.push(Line::from(Span::from(message).italic()));
    }
    return lines;
}

// Build the UI (lines) for instructions infobox
pub fn get_instructions_ui<'a>() -> Vec<Line<'a>> {
    return vec![
        "Enter - toggle do/done".into(),
        "a - add a task, e - edit a task".into(),
        "x - delete a task, u - undo delete".into(),
        "/ - search, Tab - switch filter".into(),
        "C - clear completed, M - complete visible".into(),
        "d/f/g - sort by due date/name/priority".into(),
        "r - reload, q - quit".into(),
    ];
}
