//! Position reconciliation for drag-and-drop and keyboard moves

use std::str::FromStr;

use tracing::debug;

use crate::types::{Task, TaskColumn};

/// Result of reconciling one move against a column set.
///
/// `before` is the column set the move was computed from and `after` is the
/// column set with the task moved and every touched column renumbered.
#[derive(Debug, Clone, PartialEq)]
pub struct DropPlan {
    pub task_id: String,
    pub from_column: String,
    pub from_index: usize,
    pub to_column: String,
    pub to_index: usize,
    pub before: Vec<TaskColumn>,
    pub after: Vec<TaskColumn>,
}

impl DropPlan {
    pub fn is_transfer(&self) -> bool {
        self.from_column != self.to_column
    }

    /// The moved task as it stood before the move.
    pub fn original_task(&self) -> Option<&Task> {
        find_task(&self.before, &self.task_id)
    }

    /// The moved task with its new column and position.
    pub fn moved_task(&self) -> Option<&Task> {
        find_task(&self.after, &self.task_id)
    }
}

/// Keyboard move of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nudge {
    Up,
    Down,
    Left,
    Right,
}

impl FromStr for Nudge {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Nudge::Up),
            "down" => Ok(Nudge::Down),
            "left" => Ok(Nudge::Left),
            "right" => Ok(Nudge::Right),
            _ => Err(()),
        }
    }
}

/// Returns `(column index, task index)` of a task in the column set.
pub fn locate(columns: &[TaskColumn], task_id: &str) -> Option<(usize, usize)> {
    columns.iter().enumerate().find_map(|(col_idx, column)| {
        column
            .index_of(task_id)
            .map(|task_idx| (col_idx, task_idx))
    })
}

pub fn find_task<'a>(columns: &'a [TaskColumn], task_id: &str) -> Option<&'a Task> {
    locate(columns, task_id).map(|(col, idx)| &columns[col].tasks[idx])
}

/// Column that would receive a drop on `over_id`: the owner of the task with
/// that id, otherwise the column with that id.
pub fn resolve_target_column(columns: &[TaskColumn], over_id: &str) -> Option<usize> {
    locate(columns, over_id)
        .map(|(col, _)| col)
        .or_else(|| columns.iter().position(|column| column.id == over_id))
}

/// Computes the column set after dropping `active_id` onto `over_id`.
///
/// `over_id` is either a task id or a column id. Returns `None` when the
/// dragged task is not in the set, when the target is unknown, or when the
/// drop would leave the task where it already is.
pub fn plan_drop(columns: &[TaskColumn], active_id: &str, over_id: &str) -> Option<DropPlan> {
    let Some((from_col, from_index)) = locate(columns, active_id) else {
        debug!(task_id = %active_id, "dragged task is not in the column set, ignoring drop");
        return None;
    };

    let (to_col, to_index) = match locate(columns, over_id) {
        Some((col, over_index)) if col == from_col => {
            if from_index < over_index {
                (col, over_index - 1)
            } else {
                (col, over_index)
            }
        }
        Some((col, over_index)) => (col, over_index + 1),
        None => {
            let Some(col) = columns.iter().position(|column| column.id == over_id) else {
                debug!(over_id = %over_id, "drop target is neither a task nor a column");
                return None;
            };
            let len = columns[col].tasks.len();
            if col == from_col {
                (col, len - 1)
            } else {
                (col, len)
            }
        }
    };

    if to_col == from_col && to_index == from_index {
        debug!(task_id = %active_id, index = from_index, "drop leaves task in place");
        return None;
    }

    Some(build_plan(columns, from_col, from_index, to_col, to_index))
}

/// Keyboard counterpart of [`plan_drop`]. Up and down swap with the
/// neighbour; left and right move the task to the top of the adjacent column.
pub fn plan_nudge(columns: &[TaskColumn], task_id: &str, nudge: Nudge) -> Option<DropPlan> {
    let (col, idx) = locate(columns, task_id)?;
    let (to_col, to_index) = match nudge {
        Nudge::Up => {
            if idx == 0 {
                return None;
            }
            (col, idx - 1)
        }
        Nudge::Down => {
            if idx + 1 >= columns[col].tasks.len() {
                return None;
            }
            (col, idx + 1)
        }
        Nudge::Left => {
            if col == 0 {
                return None;
            }
            (col - 1, 0)
        }
        Nudge::Right => {
            if col + 1 >= columns.len() {
                return None;
            }
            (col + 1, 0)
        }
    };

    Some(build_plan(columns, col, idx, to_col, to_index))
}

fn build_plan(
    columns: &[TaskColumn],
    from_col: usize,
    from_index: usize,
    to_col: usize,
    to_index: usize,
) -> DropPlan {
    let mut after = columns.to_vec();
    let task = after[from_col].tasks.remove(from_index);
    let task_id = task.id.clone();
    let to_index = to_index.min(after[to_col].tasks.len());
    after[to_col].tasks.insert(to_index, task);

    after[from_col].renumber();
    if to_col != from_col {
        after[to_col].renumber();
    }

    debug!(
        task_id = %task_id,
        from_column = %columns[from_col].id,
        from_index,
        to_column = %columns[to_col].id,
        to_index,
        "planned task move"
    );

    DropPlan {
        task_id,
        from_column: columns[from_col].id.clone(),
        from_index,
        to_column: columns[to_col].id.clone(),
        to_index,
        before: columns.to_vec(),
        after,
    }
}
