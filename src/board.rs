//! Board store: the cached server columns plus the optimistic overlay of at
//! most one in-flight gesture.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::reorder::{self, DropPlan};
use crate::types::{Task, TaskColumn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GestureId(u64);

impl fmt::Display for GestureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gesture-{}", self.0)
    }
}

/// Captures the store epoch when a fetch starts; see [`BoardStore::apply_refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    epoch: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoardState {
    Synced {
        server: Vec<TaskColumn>,
    },
    Pending {
        server: Vec<TaskColumn>,
        overlay: Vec<TaskColumn>,
        gesture: GestureId,
    },
    RollingBack {
        server: Vec<TaskColumn>,
        error: String,
    },
}

impl BoardState {
    fn server(&self) -> &Vec<TaskColumn> {
        match self {
            BoardState::Synced { server }
            | BoardState::Pending { server, .. }
            | BoardState::RollingBack { server, .. } => server,
        }
    }

    fn server_mut(&mut self) -> &mut Vec<TaskColumn> {
        match self {
            BoardState::Synced { server }
            | BoardState::Pending { server, .. }
            | BoardState::RollingBack { server, .. } => server,
        }
    }

    pub fn visible(&self) -> &[TaskColumn] {
        match self {
            BoardState::Pending { overlay, .. } => overlay,
            other => other.server(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    GestureInFlight(GestureId),
    TaskNotFound(String),
    ColumnNotFound(String),
    /// The task carries no column id, so it cannot be placed on the board.
    Unscheduled(String),
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardError::GestureInFlight(gesture) => {
                write!(f, "{gesture} is still waiting for the server")
            }
            BoardError::TaskNotFound(id) => write!(f, "task {id} is not on the board"),
            BoardError::ColumnNotFound(id) => write!(f, "column {id} is not on the board"),
            BoardError::Unscheduled(id) => write!(f, "task {id} is not in any column"),
        }
    }
}

impl std::error::Error for BoardError {}

#[derive(Debug)]
struct Inner {
    state: BoardState,
    epoch: u64,
    next_gesture: u64,
    stale: bool,
}

#[derive(Debug, Clone)]
pub struct BoardStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for BoardStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl BoardStore {
    pub fn new(columns: Vec<TaskColumn>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: BoardState::Synced {
                    server: normalize(columns),
                },
                epoch: 0,
                next_gesture: 1,
                stale: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Columns the board should render right now.
    pub fn columns(&self) -> Vec<TaskColumn> {
        self.lock().state.visible().to_vec()
    }

    pub fn server_columns(&self) -> Vec<TaskColumn> {
        self.lock().state.server().clone()
    }

    pub fn state(&self) -> BoardState {
        self.lock().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.lock().state, BoardState::Pending { .. })
    }

    /// True once a gesture was persisted and the cache has not been refreshed since.
    pub fn is_stale(&self) -> bool {
        self.lock().stale
    }

    pub fn find_task(&self, task_id: &str) -> Option<Task> {
        reorder::find_task(self.lock().state.visible(), task_id).cloned()
    }

    pub fn begin_gesture(&self, plan: &DropPlan) -> Result<GestureId, BoardError> {
        let mut inner = self.lock();
        if let BoardState::Pending { gesture, .. } = &inner.state {
            return Err(BoardError::GestureInFlight(*gesture));
        }

        let gesture = GestureId(inner.next_gesture);
        inner.next_gesture += 1;
        inner.epoch += 1;
        let server = std::mem::take(inner.state.server_mut());
        inner.state = BoardState::Pending {
            server,
            overlay: plan.after.clone(),
            gesture,
        };
        debug!(%gesture, task_id = %plan.task_id, "optimistic overlay applied");
        Ok(gesture)
    }

    /// Resolves the pending gesture. Returns false when `gesture` is not the
    /// one in flight.
    pub fn settle(&self, gesture: GestureId, outcome: Result<(), String>) -> bool {
        let mut inner = self.lock();
        let state = std::mem::replace(
            &mut inner.state,
            BoardState::Synced { server: Vec::new() },
        );

        let (server, overlay) = match state {
            BoardState::Pending {
                server,
                overlay,
                gesture: pending,
            } if pending == gesture => (server, overlay),
            other => {
                warn!(%gesture, "ignoring settle for a gesture that is not in flight");
                inner.state = other;
                return false;
            }
        };

        inner.epoch += 1;
        match outcome {
            Ok(()) => {
                debug!(%gesture, "gesture persisted");
                inner.state = BoardState::Synced { server: overlay };
                inner.stale = true;
            }
            Err(error) => {
                warn!(%gesture, error = %error, "gesture failed, rolling back");
                inner.state = BoardState::RollingBack { server, error };
                // Writes that landed before the failure are still on the backend.
                inner.stale = true;
            }
        }
        true
    }

    pub fn acknowledge(&self) {
        let mut inner = self.lock();
        if let BoardState::RollingBack { server, .. } = &mut inner.state {
            let server = std::mem::take(server);
            inner.state = BoardState::Synced { server };
        }
    }

    pub fn fetch_ticket(&self) -> FetchTicket {
        FetchTicket {
            epoch: self.lock().epoch,
        }
    }

    /// Replaces the cached columns with a fetched copy. The copy is dropped when
    /// a gesture is pending or when anything changed since `ticket` was taken.
    pub fn apply_refresh(&self, ticket: FetchTicket, columns: Vec<TaskColumn>) -> bool {
        let mut inner = self.lock();
        if ticket.epoch != inner.epoch {
            debug!(
                ticket_epoch = ticket.epoch,
                epoch = inner.epoch,
                "discarding outdated refresh"
            );
            return false;
        }
        if let BoardState::Pending { gesture, .. } = &inner.state {
            debug!(%gesture, "discarding refresh while a gesture is pending");
            return false;
        }

        inner.epoch += 1;
        inner.stale = false;
        inner.state = BoardState::Synced {
            server: normalize(columns),
        };
        true
    }

    /// Adds a task the backend created. The task lands at its `position` in its
    /// column, clamped to the column length.
    pub fn insert_task(&self, task: Task) -> Result<(), BoardError> {
        let column_id = task
            .column_id
            .clone()
            .ok_or_else(|| BoardError::Unscheduled(task.id.clone()))?;
        self.mutate(|columns| {
            let column = columns
                .iter_mut()
                .find(|column| column.id == column_id)
                .ok_or_else(|| BoardError::ColumnNotFound(column_id.clone()))?;
            let idx = usize::try_from(task.position)
                .unwrap_or(0)
                .min(column.tasks.len());
            column.tasks.insert(idx, task.clone());
            Ok(())
        })
    }

    pub fn replace_task(&self, task: Task) -> Result<(), BoardError> {
        self.mutate(|columns| {
            let (col, idx) = reorder::locate(columns, &task.id)
                .ok_or_else(|| BoardError::TaskNotFound(task.id.clone()))?;
            columns[col].tasks[idx] = task.clone();
            Ok(())
        })
    }

    pub fn remove_task(&self, task_id: &str) -> Result<Task, BoardError> {
        self.mutate(|columns| {
            let (col, idx) = reorder::locate(columns, task_id)
                .ok_or_else(|| BoardError::TaskNotFound(task_id.to_string()))?;
            Ok(columns[col].tasks.remove(idx))
        })
    }

    /// Removes a column together with all of its tasks.
    pub fn remove_column(&self, column_id: &str) -> Result<TaskColumn, BoardError> {
        self.mutate(|columns| {
            let idx = columns
                .iter()
                .position(|column| column.id == column_id)
                .ok_or_else(|| BoardError::ColumnNotFound(column_id.to_string()))?;
            Ok(columns.remove(idx))
        })
    }

    /// Applies a confirmed change to the cached columns and, when a gesture is
    /// pending, to its overlay as well.
    fn mutate<T>(
        &self,
        mut change: impl FnMut(&mut Vec<TaskColumn>) -> Result<T, BoardError>,
    ) -> Result<T, BoardError> {
        let mut inner = self.lock();
        let result = change(inner.state.server_mut())?;
        if let BoardState::Pending { overlay, .. } = &mut inner.state
            && let Err(err) = change(overlay)
        {
            debug!(error = %err, "change did not apply to the pending overlay");
        }
        inner.epoch += 1;
        Ok(result)
    }
}

fn normalize(mut columns: Vec<TaskColumn>) -> Vec<TaskColumn> {
    columns.sort_by_key(|column| column.order);
    for column in &mut columns {
        column.tasks.sort_by_key(|task| task.position);
    }
    columns
}
