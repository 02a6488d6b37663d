//! Drag session state machine for the kanban board

use tracing::debug;

use crate::reorder::{self, DropPlan};
use crate::types::TaskColumn;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Active {
        active_id: String,
        over_id: Option<String>,
    },
}

/// Advisory feedback while the pointer is over a candidate target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverPreview {
    pub over_id: String,
    pub column_id: String,
}

/// One pointer gesture on the board. Hovering never touches the column set;
/// the move is computed once, when the gesture ends.
#[derive(Debug, Clone, Default)]
pub struct DragSession {
    state: DragState,
}

impl DragSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn active_id(&self) -> Option<&str> {
        match &self.state {
            DragState::Active { active_id, .. } => Some(active_id.as_str()),
            DragState::Idle => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, DragState::Active { .. })
    }

    pub fn begin(&mut self, task_id: impl Into<String>) {
        let task_id = task_id.into();
        if let DragState::Active { active_id, .. } = &self.state {
            debug!(previous = %active_id, "replacing unfinished drag session");
        }
        debug!(task_id = %task_id, "drag started");
        self.state = DragState::Active {
            active_id: task_id,
            over_id: None,
        };
    }

    pub fn hover(&mut self, over_id: &str, columns: &[TaskColumn]) -> Option<HoverPreview> {
        let DragState::Active {
            over_id: current, ..
        } = &mut self.state
        else {
            return None;
        };
        *current = Some(over_id.to_string());

        let col = reorder::resolve_target_column(columns, over_id)?;
        Some(HoverPreview {
            over_id: over_id.to_string(),
            column_id: columns[col].id.clone(),
        })
    }

    /// Finishes the gesture and returns the move to commit, if any. The session
    /// is idle afterwards whatever the outcome.
    pub fn end(&mut self, over_id: Option<&str>, columns: &[TaskColumn]) -> Option<DropPlan> {
        let DragState::Active { active_id, .. } = std::mem::take(&mut self.state) else {
            return None;
        };

        let Some(over_id) = over_id else {
            debug!(task_id = %active_id, "drag ended outside any target");
            return None;
        };

        reorder::plan_drop(columns, &active_id, over_id)
    }

    pub fn cancel(&mut self) {
        if let DragState::Active { active_id, .. } = std::mem::take(&mut self.state) {
            debug!(task_id = %active_id, "drag cancelled");
        }
    }
}
