use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(()),
        }
    }
}

/// Tag distinguishing plain tasks from tasks that also live on the calendar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Task,
    Event,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Task => "task",
            TaskKind::Event => "event",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    /// `None` means the task is unscheduled and sits in no column.
    #[serde(default)]
    pub column_id: Option<String>,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TaskKind>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            column_id: None,
            position: 0,
            completed: false,
            start_date: None,
            end_date: None,
            all_day: false,
            kind: None,
        }
    }

    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(column_id) = &patch.column_id {
            self.column_id = Some(column_id.clone());
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(start) = patch.start_date {
            self.start_date = Some(start);
        }
        if let Some(end) = patch.end_date {
            self.end_date = Some(end);
        }
        if let Some(all_day) = patch.all_day {
            self.all_day = all_day;
        }
        if let Some(kind) = patch.kind {
            self.kind = Some(kind);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskColumn {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub order: i64,
    /// Display order; `tasks[i].position` is expected to equal `i` after a reorder.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl TaskColumn {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            group_id: String::new(),
            order: 0,
            tasks: Vec::new(),
        }
    }

    pub fn index_of(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == task_id)
    }

    /// Rewrites `position` and `column_id` of every task from its display index.
    pub fn renumber(&mut self) {
        for (idx, task) in self.tasks.iter_mut().enumerate() {
            task.position = idx as i64;
            task.column_id = Some(self.id.clone());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskGroup {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<TaskColumn>,
}

/// Partial update sent to the backend. Absent fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_day: Option<bool>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TaskKind>,
}

impl TaskPatch {
    /// Every patch built from an existing task carries its `kind` forward.
    fn preserving(task: &Task) -> Self {
        Self {
            kind: task.kind,
            ..Self::default()
        }
    }

    pub fn reposition(task: &Task, position: i64) -> Self {
        Self {
            position: Some(position),
            ..Self::preserving(task)
        }
    }

    pub fn transfer(task: &Task, column_id: impl Into<String>, position: i64) -> Self {
        Self {
            column_id: Some(column_id.into()),
            position: Some(position),
            ..Self::preserving(task)
        }
    }

    pub fn schedule(task: &Task, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start_date: Some(start),
            end_date: Some(end),
            ..Self::preserving(task)
        }
    }

    pub fn completion(task: &Task, completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::preserving(task)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    pub column_id: Option<String>,
    pub position: i64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TaskKind>,
}

/// Fields a user fills in before a task gets a column and position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub kind: Option<TaskKind>,
}

impl TaskDraft {
    pub fn into_new_task(self, column_id: impl Into<String>, position: i64) -> NewTask {
        NewTask {
            title: self.title,
            description: self.description,
            priority: self.priority,
            column_id: Some(column_id.into()),
            position,
            completed: false,
            start_date: None,
            end_date: None,
            all_day: false,
            kind: self.kind,
        }
    }
}
