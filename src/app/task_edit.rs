use chrono::NaiveDate;
use derivative::Derivative;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::app::models::{NewTask, Patch, Priority, Task, TaskPatch};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TITLE_LINE: usize = 0;
const NOTES_LINE: usize = 1;
const DUE_DATE_LINE: usize = 2;
const CATEGORY_LINE: usize = 3;
const PRIORITY_LINE: usize = 4;

// State object for the task edit dialog
// Keeps track of the state of the dialog and the content of the task being edited
#[derive(Derivative)]
#[derivative(Default)]
pub struct TaskEditDialogState {
    pub dialog_active: bool,
    task_id: Option<u64>,
    content: TaskEditDialogContent,
    error_message: Option<String>,
    // (column in chars, line)
    #[derivative(Default(value = "(0, TITLE_LINE)"))]
    cursor_position: (usize, usize),
}

// Current content of the task being edited/created
#[derive(Debug, Clone, Default, PartialEq)]
struct TaskEditDialogContent {
    title: String,
    notes: String,
    due_date: String,
    category: String,
    priority: Option<Priority>,
}

// What the dialog asks the store to do once the input is valid
#[derive(Debug, Clone, PartialEq)]
pub enum DialogOutcome {
    Create(NewTask),
    Update(u64, TaskPatch),
}

// Byte offset of the char at `char_index`, or the end of the string
fn byte_index(value: &str, char_index: usize) -> usize {
    value
        .char_indices()
        .nth(char_index)
        .map_or(value.len(), |(i, _)| i)
}

fn priority_text(priority: Option<Priority>) -> String {
    match priority {
        None => "0 (none)".to_string(),
        Some(Priority::Low) => "1 (low)".to_string(),
        Some(Priority::Medium) => "2 (medium)".to_string(),
        Some(Priority::High) => "3 (high)".to_string(),
    }
}

fn optional_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl TaskEditDialogState {
    // Opens the dialog and prepares to accept an input for the new task
    pub fn create_a_new_task(&mut self) {
        *self = TaskEditDialogState::default();
        self.dialog_active = true;
    }

    // Opens the dialog and prepares to accept an input for the existing task
    pub fn edit_task(&mut self, task: &Task) {
        *self = TaskEditDialogState::default();
        self.dialog_active = true;
        self.task_id = Some(task.id);
        self.content = TaskEditDialogContent {
            title: task.title.clone(),
            notes: task.notes.clone(),
            due_date: task
                .due_date
                .map(|date| date.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            category: task.category.clone().unwrap_or_default(),
            priority: task.priority,
        };
        self.cursor_position = (self.line_len(TITLE_LINE), TITLE_LINE);
    }

    pub fn close(&mut self) {
        self.dialog_active = false;
        self.error_message = None;
    }

    pub fn is_editing(&self) -> bool {
        self.task_id.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    fn field(&self, line: usize) -> Option<&String> {
        match line {
            TITLE_LINE => Some(&self.content.title),
            NOTES_LINE => Some(&self.content.notes),
            DUE_DATE_LINE => Some(&self.content.due_date),
            CATEGORY_LINE => Some(&self.content.category),
            _ => None,
        }
    }

    fn field_mut(&mut self, line: usize) -> Option<&mut String> {
        match line {
            TITLE_LINE => Some(&mut self.content.title),
            NOTES_LINE => Some(&mut self.content.notes),
            DUE_DATE_LINE => Some(&mut self.content.due_date),
            CATEGORY_LINE => Some(&mut self.content.category),
            _ => None,
        }
    }

    // Length in chars of the text on the given line; the priority line has no cursor
    fn line_len(&self, line: usize) -> usize {
        self.field(line).map_or(0, |value| value.chars().count())
    }

    // Move the cursor one line BELOW the current one, keeping the column if possible
    pub fn move_cursor_down(&mut self) {
        let (x, y) = self.cursor_position;
        let y = (y + 1).min(PRIORITY_LINE);
        self.cursor_position = (x.min(self.line_len(y)), y);
    }

    // Move the cursor one line ABOVE the current one, keeping the column if possible
    pub fn move_cursor_up(&mut self) {
        let (x, y) = self.cursor_position;
        let y = y.saturating_sub(1);
        self.cursor_position = (x.min(self.line_len(y)), y);
    }

    pub fn move_cursor_left(&mut self) {
        let (x, y) = self.cursor_position;
        self.cursor_position = (x.saturating_sub(1), y);
    }

    pub fn move_cursor_right(&mut self) {
        let (x, y) = self.cursor_position;
        self.cursor_position = ((x + 1).min(self.line_len(y)), y);
    }

    // Delete the char before the cursor
    pub fn delete_char(&mut self) {
        let (x, y) = self.cursor_position;
        if x == 0 {
            return;
        }
        if let Some(value) = self.field_mut(y) {
            let at = byte_index(value, x - 1);
            if at < value.len() {
                value.remove(at);
            }
        }
        self.move_cursor_left();
    }

    // Handles the input of a char by inserting it into the currently active field
    pub fn input(&mut self, to_insert: char) {
        let (x, y) = self.cursor_position;
        if y == PRIORITY_LINE {
            if let Some(priority) = Priority::from_digit(to_insert) {
                self.content.priority = priority;
            }
            return;
        }

        if let Some(value) = self.field_mut(y) {
            let at = byte_index(value, x);
            value.insert(at, to_insert);
        }
        self.move_cursor_right();
    }

    // Validates the input. On success the dialog closes and the caller gets
    // the store operation to run; on failure the error is shown in the dialog.
    pub fn save_task(&mut self) -> Option<DialogOutcome> {
        let content = self.content.clone();

        let title = content.title.trim();
        if title.is_empty() {
            self.error_message = Some("Title cannot be empty".to_string());
            return None;
        }

        let due_date = match content.due_date.trim() {
            "" => None,
            value => match NaiveDate::parse_from_str(value, DATE_FORMAT) {
                Ok(date) => Some(date),
                Err(_e) => {
                    self.error_message = Some("Date should be in format yyyy-mm-dd".to_string());
                    return None;
                }
            },
        };

        let outcome = match self.task_id {
            Some(id) => DialogOutcome::Update(
                id,
                TaskPatch {
                    title: Patch::Set(title.to_string()),
                    priority: Patch::Set(content.priority),
                    due_date: Patch::Set(due_date),
                    category: Patch::Set(optional_text(&content.category)),
                    notes: Patch::Set(content.notes.trim().to_string()),
                    ..TaskPatch::default()
                },
            ),
            None => DialogOutcome::Create(NewTask {
                title: title.to_string(),
                priority: content.priority,
                due_date,
                category: optional_text(&content.category),
                notes: optional_text(&content.notes),
            }),
        };

        self.error_message = None;
        self.dialog_active = false;
        Some(outcome)
    }
}

// Returns the UI content for the task edit dialog
pub fn get_task_edit_ui<'a>(dialog: &'a TaskEditDialogState) -> Vec<Line<'a>> {
    const GRAY_TEXT: Style = Style::new().fg(Color::Rgb(62, 62, 62));
    const WHITE_TEXT: Style = Style::new().fg(Color::White);
    const BLACK_ON_WHITE: Style = Style::new().fg(Color::Black).bg(Color::White);
    let mut text = Vec::new();

    struct TextDialogInputLine {
        prefix: &'static str,
        placeholder: &'static str,
        value: String,
    }

    // Define the lines (input fields) of the dialog
    let lines = [
        TextDialogInputLine {
            prefix: "Title:     ",
            placeholder: "What needs to be done?",
            value: dialog.content.title.clone(),
        },
        TextDialogInputLine {
            prefix: "Notes:     ",
            placeholder: "Add notes (optional)",
            value: dialog.content.notes.clone(),
        },
        TextDialogInputLine {
            prefix: "Due date:  ",
            placeholder: "2024-11-23",
            value: dialog.content.due_date.clone(),
        },
        TextDialogInputLine {
            prefix: "Category:  ",
            placeholder: "work",
            value: dialog.content.category.clone(),
        },
        TextDialogInputLine {
            prefix: "Priority:  ",
            placeholder: "",
            value: priority_text(dialog.content.priority),
        },
    ];

    let (cursor_x, cursor_y) = dialog.cursor_position;

    for (i, line) in lines.iter().enumerate() {
        let mut spans = vec![Span::styled(line.prefix, WHITE_TEXT)];

        if i == PRIORITY_LINE {
            // No free text here, the whole value is highlighted when selected
            let style = if cursor_y == i { BLACK_ON_WHITE } else { WHITE_TEXT };
            spans.push(Span::styled(line.value.clone(), style));
        } else if line.value.is_empty() {
            if cursor_y == i {
                // Line is selected. First char is highlighted, the rest is gray
                spans.push(Span::styled(
                    line.placeholder.chars().take(1).collect::<String>(),
                    BLACK_ON_WHITE,
                ));
                spans.push(Span::styled(
                    line.placeholder.chars().skip(1).collect::<String>(),
                    GRAY_TEXT,
                ));
            } else {
                spans.push(Span::styled(line.placeholder, GRAY_TEXT));
            }
        } else if cursor_y == i {
            // All chars are white, except for the one at the cursor position which is highlighted
            spans.push(Span::styled(
                line.value.chars().take(cursor_x).collect::<String>(),
                WHITE_TEXT,
            ));
            spans.push(Span::styled(
                line.value.chars().skip(cursor_x).take(1).collect::<String>(),
                BLACK_ON_WHITE,
            ));
            spans.push(Span::styled(
                line.value.chars().skip(cursor_x + 1).collect::<String>(),
                WHITE_TEXT,
            ));
            if cursor_x == line.value.chars().count() {
                spans.push(Span::styled(" ", BLACK_ON_WHITE));
            }
        } else {
            spans.push(Span::styled(line.value.clone(), WHITE_TEXT));
        }

        text.push(Line::from(spans));
    }

    text.push(Line::raw(""));

    if let Some(error_message) = dialog.error_message() {
        text.push(Line::from(vec![Span::styled(
            error_message,
            Style::new().fg(Color::Red),
        )]));
        text.push(Line::raw(""));
    }

    text.push(Line::from(vec![Span::styled(
        "Priority: press 0-3 on its line",
        GRAY_TEXT,
    )]));
    text.push(Line::from(vec![Span::styled(
        "Enter - save, Esc - cancel",
        WHITE_TEXT,
    )]));

    return text;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn type_text(dialog: &mut TaskEditDialogState, text: &str) {
        for c in text.chars() {
            dialog.input(c);
        }
    }

    #[test]
    fn new_task_from_typed_input() {
        let mut dialog = TaskEditDialogState::default();
        dialog.create_a_new_task();
        type_text(&mut dialog, "  Buy milk ");
        dialog.move_cursor_down();
        dialog.move_cursor_down();
        type_text(&mut dialog, "2024-06-01");
        dialog.move_cursor_down();
        dialog.move_cursor_down();
        dialog.input('3');

        let outcome = dialog.save_task().unwrap();
        assert_eq!(
            outcome,
            DialogOutcome::Create(NewTask {
                title: "Buy milk".into(),
                priority: Some(Priority::High),
                due_date: NaiveDate::from_ymd_opt(2024, 6, 1),
                category: None,
                notes: None,
            })
        );
        assert!(!dialog.dialog_active);
    }

    #[test]
    fn whitespace_title_is_rejected_before_the_store() {
        let mut dialog = TaskEditDialogState::default();
        dialog.create_a_new_task();
        type_text(&mut dialog, "   ");

        assert_eq!(dialog.save_task(), None);
        assert_eq!(dialog.error_message(), Some("Title cannot be empty"));
        assert!(dialog.dialog_active);
    }

    #[test]
    fn bad_date_is_rejected() {
        let mut dialog = TaskEditDialogState::default();
        dialog.create_a_new_task();
        type_text(&mut dialog, "Taxes");
        dialog.move_cursor_down();
        dialog.move_cursor_down();
        type_text(&mut dialog, "31.12.2024");

        assert_eq!(dialog.save_task(), None);
        assert_eq!(
            dialog.error_message(),
            Some("Date should be in format yyyy-mm-dd")
        );
    }

    #[test]
    fn editing_produces_a_full_patch() {
        let task = Task {
            id: 9,
            title: "Draft".into(),
            completed: true,
            priority: Some(Priority::Low),
            due_date: NaiveDate::from_ymd_opt(2024, 2, 29),
            category: Some("work".into()),
            notes: "first pass".into(),
            created_at: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            completed_at: Some(Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap()),
        };
        let mut dialog = TaskEditDialogState::default();
        dialog.edit_task(&task);
        assert!(dialog.is_editing());
        type_text(&mut dialog, " v2");

        // Clear the category
        dialog.move_cursor_down();
        dialog.move_cursor_down();
        dialog.move_cursor_down();
        for _ in 0..4 {
            dialog.move_cursor_right();
        }
        for _ in 0..4 {
            dialog.delete_char();
        }

        match dialog.save_task().unwrap() {
            DialogOutcome::Update(id, patch) => {
                assert_eq!(id, 9);
                assert_eq!(patch.title, Patch::Set("Draft v2".to_string()));
                assert_eq!(patch.category, Patch::Set(None));
                assert_eq!(patch.due_date, Patch::Set(NaiveDate::from_ymd_opt(2024, 2, 29)));
                assert_eq!(patch.notes, Patch::Set("first pass".to_string()));
                // Completion is toggled elsewhere
                assert_eq!(patch.completed, Patch::Keep);
                assert_eq!(patch.completed_at, Patch::Keep);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn cursor_works_in_chars_not_bytes() {
        let mut dialog = TaskEditDialogState::default();
        dialog.create_a_new_task();
        type_text(&mut dialog, "Café ☕");
        dialog.move_cursor_left();
        dialog.delete_char();
        dialog.input('!');

        assert_eq!(dialog.content.title, "Café!☕");
        assert_eq!(dialog.cursor_position, (5, TITLE_LINE));
    }

    #[test]
    fn cursor_stays_inside_the_form() {
        let mut dialog = TaskEditDialogState::default();
        dialog.create_a_new_task();
        dialog.move_cursor_up();
        dialog.move_cursor_left();
        dialog.delete_char();
        assert_eq!(dialog.cursor_position, (0, TITLE_LINE));

        for _ in 0..10 {
            dialog.move_cursor_down();
        }
        assert_eq!(dialog.cursor_position, (0, PRIORITY_LINE));
        dialog.input('x');
        assert_eq!(dialog.content.priority, None);
    }

    #[test]
    fn dialog_renders_error_line() {
        let mut dialog = TaskEditDialogState::default();
        dialog.create_a_new_task();
        dialog.save_task();
        let lines = get_task_edit_ui(&dialog);
        let rendered: Vec<String> = lines
            .iter()
            .map(|line| line.spans.iter().map(|span| span.content.as_ref()).collect::<String>())
            .collect();
        assert!(rendered.iter().any(|line| line == "Title cannot be empty"));
    }
}
