use chrono::{Local, Utc};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{prelude::*, widgets::*};
use std::{
    io,
    time::{Duration, Instant},
};
use tracing::{error, info};

use crate::app::error::StoreError;
use crate::app::models::{NewTask, Task, TaskPatch};
use crate::app::store::TaskStore;
use crate::app::task_edit::{get_task_edit_ui, DialogOutcome, TaskEditDialogState};
use crate::app::task_list::*;
use crate::app::undo::{UndoWindow, UNDO_WINDOW};

const NOTICE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

// Transient message in the footer
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NoticeKind,
    pub message: String,
    expires: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
}

pub struct App {
    pub items: TaskList,
    pub task_edit_dialog_state: TaskEditDialogState,
    pub mode: InputMode,
    store: Box<dyn TaskStore>,
    // One window per deletion, latest last
    undo: Vec<UndoWindow>,
    notification: Option<Notification>,
    load_error: Option<String>,
}

impl App {
    pub fn new(store: Box<dyn TaskStore>) -> App {
        let mut app = App {
            items: TaskList::with_items(Vec::new()),
            task_edit_dialog_state: TaskEditDialogState::default(),
            mode: InputMode::Normal,
            store,
            undo: Vec::new(),
            notification: None,
            load_error: None,
        };
        app.reload();
        app
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    #[cfg(test)]
    pub fn can_undo(&self, now: Instant) -> bool {
        self.undo.iter().any(|window| window.is_live(now))
    }

    fn notify(&mut self, kind: NoticeKind, message: impl Into<String>, ttl: Duration) {
        self.notification = Some(Notification {
            kind,
            message: message.into(),
            expires: Instant::now() + ttl,
        });
    }

    // Store failures leave the list as it was and show up in the footer
    fn report(&mut self, action: &str, err: StoreError) {
        error!(error = %err, action, "Task operation failed");
        self.notify(
            NoticeKind::Error,
            format!("Failed to {}: {}", action, err),
            NOTICE_TTL,
        );
    }

    // Refresh the items of the list from the store
    pub fn reload(&mut self) {
        match self.store.get_all() {
            Ok(tasks) => {
                info!(count = tasks.len(), "Loaded tasks");
                self.items.set_items(tasks);
                self.load_error = None;
            }
            Err(err) => {
                error!(error = %err, "Failed to load tasks");
                self.load_error = Some(format!("Failed to load tasks: {}. Press r to try again.", err));
            }
        }
    }

    pub fn add_task(&mut self, fields: NewTask) {
        match self.store.create(fields) {
            Ok(task) => {
                self.items.prepend(task);
                self.notify(NoticeKind::Success, "Task added successfully!", NOTICE_TTL);
            }
            Err(err) => self.report("add task", err),
        }
    }

    pub fn update_task(&mut self, id: u64, patch: &TaskPatch) {
        if patch.is_empty() {
            return;
        }
        match self.store.update(id, patch) {
            Ok(task) => {
                let message = match patch.completed.as_set() {
                    Some(true) => "Task completed!",
                    Some(false) => "Task marked as incomplete",
                    None => "Task updated",
                };
                self.items.replace(task);
                self.notify(NoticeKind::Success, message, NOTICE_TTL);
            }
            Err(err) => self.report("update task", err),
        }
    }

    // Change the state of the selected task to completed/to do.
    // completedAt travels with completed in the same update.
    pub fn toggle_completed(&mut self) {
        let Some(task) = self.items.get_selected() else {
            return;
        };
        let id = task.id;
        let patch = TaskPatch::completion(!task.completed, Utc::now());
        self.update_task(id, &patch);
    }

    // Delete the selected task and keep it around for undo
    pub fn delete_selected(&mut self) {
        let Some(id) = self.items.get_selected().map(|task| task.id) else {
            return;
        };
        match self.store.delete(id) {
            Ok(removed) => {
                self.items.remove(removed.id);
                self.undo.push(UndoWindow::open(removed, Instant::now()));
                self.notify(NoticeKind::Info, "Task deleted", UNDO_WINDOW);
            }
            Err(err) => self.report("delete task", err),
        }
    }

    // Re-create the latest deleted task (under a new id) while its window is open.
    // Earlier deletions stay undoable until their own windows close.
    pub fn undo_delete(&mut self) {
        let Some(window) = self.undo.pop() else {
            return;
        };
        match window.take(Instant::now()) {
            Some(fields) => match self.store.create(fields) {
                Ok(task) => {
                    self.items.prepend(task);
                    self.notify(NoticeKind::Success, "Task restored!", NOTICE_TTL);
                }
                Err(err) => self.report("restore task", err),
            },
            None => self.notify(NoticeKind::Info, "Nothing to undo", NOTICE_TTL),
        }
    }

    pub fn clear_completed(&mut self) {
        let ids: Vec<u64> = self
            .items
            .items
            .iter()
            .filter(|task| task.completed)
            .map(|task| task.id)
            .collect();
        if ids.is_empty() {
            return;
        }
        match self.store.bulk_delete(&ids) {
            Ok(removed) => {
                for task in &removed {
                    self.items.remove(task.id);
                }
                self.notify(
                    NoticeKind::Success,
                    format!("Cleared {} completed tasks", removed.len()),
                    NOTICE_TTL,
                );
            }
            Err(err) => {
                self.report("clear completed tasks", err);
                // Some of the batch may have gone through
                self.reload();
            }
        }
    }

    pub fn complete_visible(&mut self) {
        let ids: Vec<u64> = self
            .items
            .visible()
            .iter()
            .filter(|task| !task.completed)
            .map(|task| task.id)
            .collect();
        if ids.is_empty() {
            return;
        }
        match self
            .store
            .bulk_update(&ids, &TaskPatch::completion(true, Utc::now()))
        {
            Ok(updated) => {
                let count = updated.len();
                for task in updated {
                    self.items.replace(task);
                }
                self.notify(
                    NoticeKind::Success,
                    format!("Completed {} tasks", count),
                    NOTICE_TTL,
                );
            }
            Err(err) => {
                self.report("complete tasks", err);
                self.reload();
            }
        }
    }

    fn save_dialog(&mut self) {
        match self.task_edit_dialog_state.save_task() {
            Some(DialogOutcome::Create(fields)) => self.add_task(fields),
            Some(DialogOutcome::Update(id, patch)) => self.update_task(id, &patch),
            None => {}
        }
    }

    // Drop expired notifications and undo windows
    pub fn tick(&mut self, now: Instant) {
        if self.notification.as_ref().is_some_and(|n| now >= n.expires) {
            self.notification = None;
        }
        self.undo.retain(|window| window.is_live(now));
    }

    // Returns true when the user asked to quit
    pub fn handle_key(&mut self, code: KeyCode) -> bool {
        if self.task_edit_dialog_state.dialog_active {
            // Handle input for the task edit dialog
            match code {
                KeyCode::Down => self.task_edit_dialog_state.move_cursor_down(),
                KeyCode::Up => self.task_edit_dialog_state.move_cursor_up(),
                KeyCode::Esc => self.task_edit_dialog_state.close(),
                KeyCode::Enter => self.save_dialog(),
                KeyCode::Left => self.task_edit_dialog_state.move_cursor_left(),
                KeyCode::Right => self.task_edit_dialog_state.move_cursor_right(),
                KeyCode::Backspace => self.task_edit_dialog_state.delete_char(),
                KeyCode::Char(to_insert) => self.task_edit_dialog_state.input(to_insert),
                _ => {}
            }
            return false;
        }

        if self.mode == InputMode::Search {
            match code {
                KeyCode::Esc => {
                    self.items.clear_search();
                    self.mode = InputMode::Normal;
                }
                KeyCode::Enter => self.mode = InputMode::Normal,
                KeyCode::Backspace => self.items.pop_search_char(),
                KeyCode::Down => self.items.next(),
                KeyCode::Up => self.items.previous(),
                KeyCode::Char(c) => self.items.push_search_char(c),
                _ => {}
            }
            return false;
        }

        // Handle input for the task list navigation, sorting and state change
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('x') | KeyCode::Delete => self.delete_selected(),
            KeyCode::Char('u') => self.undo_delete(),
            KeyCode::Left => self.items.unselect(),
            KeyCode::Down | KeyCode::Char('j') => self.items.next(),
            KeyCode::Up | KeyCode::Char('k') => self.items.previous(),
            KeyCode::Char('a') => self.task_edit_dialog_state.create_a_new_task(),
            KeyCode::Char('e') => {
                if let Some(task) = self.items.get_selected() {
                    self.task_edit_dialog_state.edit_task(task);
                }
            }
            KeyCode::Char('/') => self.mode = InputMode::Search,
            KeyCode::Tab => self.items.set_filter(self.items.filter.next()),
            KeyCode::Char('1') => self.items.set_filter(TaskFilter::All),
            KeyCode::Char('2') => self.items.set_filter(TaskFilter::Active),
            KeyCode::Char('3') => self.items.set_filter(TaskFilter::Completed),
            KeyCode::Char('C') => self.clear_completed(),
            KeyCode::Char('M') => self.complete_visible(),
            KeyCode::Char('r') => self.reload(),
            KeyCode::Char('d') => self.items.set_sort(SortedBy::ByDueDate),
            KeyCode::Char('f') => self.items.set_sort(SortedBy::ByName),
            KeyCode::Char('g') => self.items.set_sort(SortedBy::ByPriority),
            KeyCode::Enter | KeyCode::Char(' ') => self.toggle_completed(),
            _ => {}
        }
        false
    }
}

pub fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    tick_rate: Duration,
) -> io::Result<()> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| draw_ui(f, &mut app))?;
        let timeout = tick_rate.saturating_sub(last_tick.elapsed());

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_key(key.code) {
                    return Ok(());
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick(Instant::now());
            last_tick = Instant::now();
        }
    }
}

fn notice_style(kind: NoticeKind) -> Style {
    match kind {
        NoticeKind::Info => Style::new().fg(Color::Cyan),
        NoticeKind::Success => Style::new().fg(Color::LightGreen),
        NoticeKind::Error => Style::new().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

// Draws the whole user interface
fn draw_ui(f: &mut Frame, app: &mut App) {
    let now = Local::now();
    let stats = app.items.stats(now);

    // Header with search, filter tabs, body, footer
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(f.size());

    let search_style = if app.mode == InputMode::Search {
        Style::new().fg(Color::Yellow)
    } else {
        Style::new().fg(Color::Gray)
    };
    let search_text = if app.items.search.is_empty() && app.mode != InputMode::Search {
        "Press / to search tasks...".to_string()
    } else {
        format!("Search: {}", app.items.search)
    };
    let header = Paragraph::new(Line::from(Span::styled(search_text, search_style))).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Task Flow [{}]", app.store.describe())),
    );
    f.render_widget(header, rows[0]);

    let tab_titles: Vec<String> = TaskFilter::TABS
        .iter()
        .map(|filter| format!("{} ({})", filter.label(), stats.count_for(*filter)))
        .collect();
    let tabs = Tabs::new(tab_titles)
        .block(Block::default().borders(Borders::ALL).title("Filter"))
        .select(app.items.filter.index())
        .highlight_style(
            Style::default()
                .fg(Color::LightGreen)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, rows[1]);

    // Create two chunks of screen in 60-40 ratio
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[2]);

    // DRAW LEFT PART
    // Owned copies so the list state can be borrowed mutably below
    let visible_tasks: Vec<Task> = app.items.visible().into_iter().cloned().collect();
    let visible: Vec<&Task> = visible_tasks.iter().collect();
    if let Some(load_error) = &app.load_error {
        let message = Paragraph::new(load_error.as_str())
            .style(Style::new().fg(Color::Red))
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("List"));
        f.render_widget(message, chunks[0]);
    } else if visible.is_empty() {
        let hint = if app.items.items.is_empty() {
            "No tasks yet. Press a to add your first task."
        } else {
            "No tasks match the current filter."
        };
        let empty = Paragraph::new(hint)
            .style(Style::new().fg(Color::Gray))
            .block(Block::default().borders(Borders::ALL).title("List"));
        f.render_widget(empty, chunks[0]);
    } else {
        // Create a List from the visible tasks and highlight the currently selected one
        let task_list = List::new(get_list_items_ui(&visible, now.date_naive()))
            .block(Block::default().borders(Borders::ALL).title("List"))
            .highlight_style(
                Style::default()
                    .bg(Color::LightGreen)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(">> ");
        f.render_stateful_widget(task_list, chunks[0], &mut app.items.state);
    }

    // DRAW RIGHT PART
    if app.task_edit_dialog_state.dialog_active {
        let title = if app.task_edit_dialog_state.is_editing() {
            "Edit Task"
        } else {
            "Add Task"
        };
        let create_or_edit_task = Paragraph::new(get_task_edit_ui(&app.task_edit_dialog_state))
            .block(Block::new().title(title).borders(Borders::ALL))
            .style(Style::new().white());

        f.render_widget(create_or_edit_task, chunks[1]);
    } else {
        // If not editing, display instructions, statistics and progress
        let right_side = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Percentage(50),
                Constraint::Min(5),
                Constraint::Length(3),
            ])
            .split(chunks[1]);

        let instructions = Paragraph::new(get_instructions_ui())
            .block(Block::new().title("Commands").borders(Borders::ALL))
            .style(Style::new().white());

        let statistics = Paragraph::new(get_statistics_ui(&stats))
            .block(Block::new().title("Statistics").borders(Borders::ALL))
            .style(Style::new().white());

        let progress = Gauge::default()
            .block(Block::new().title("Progress").borders(Borders::ALL))
            .gauge_style(Style::new().fg(Color::LightGreen))
            .percent(stats.completion_rate());

        f.render_widget(instructions, right_side[0]);
        f.render_widget(statistics, right_side[1]);
        f.render_widget(progress, right_side[2]);
    }

    // Footer: pending undo first, then the latest notification
    let instant = Instant::now();
    let undo_hint = app
        .undo
        .last()
        .filter(|window| window.is_live(instant))
        .map(|window| {
            format!(
                "Deleted \"{}\" - press u to undo ({}s)",
                window.title(),
                window.remaining(instant).as_secs() + 1
            )
        });
    let footer = match (undo_hint, &app.notification) {
        (Some(hint), _) => Some(Span::styled(hint, notice_style(NoticeKind::Info))),
        (None, Some(notification)) => Some(Span::styled(
            notification.message.clone(),
            notice_style(notification.kind),
        )),
        (None, None) => None,
    };
    if let Some(footer) = footer {
        f.render_widget(Paragraph::new(footer), rows[3]);
    }
}
