//! Dropping a task from the board onto the calendar day view

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::settings::Settings;
use crate::types::{Task, TaskPatch};

/// Handed from the drag-start handler to the drop handler. Consumed by the
/// drop, so it can never outlive its gesture.
#[derive(Debug, PartialEq)]
pub struct ExternalDrag {
    task: Task,
}

impl ExternalDrag {
    pub fn begin(task: &Task) -> Self {
        Self { task: task.clone() }
    }

    pub fn task_id(&self) -> &str {
        &self.task.id
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn into_patch(self, slot: ScheduledSlot) -> (Task, TaskPatch) {
        let patch = TaskPatch::schedule(&self.task, slot.start, slot.end);
        (self.task, patch)
    }
}

/// Vertical layout of a day column: `day_start` sits at `y = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayGrid {
    pub day_start: NaiveTime,
    pub pixels_per_hour: f64,
}

impl Default for DayGrid {
    fn default() -> Self {
        Self {
            day_start: NaiveTime::MIN,
            pixels_per_hour: 48.0,
        }
    }
}

impl DayGrid {
    /// Unsnapped time under a pointer `y` pixels below the top of the grid.
    pub fn time_at(&self, date: NaiveDate, y: f64) -> NaiveDateTime {
        let hours = if self.pixels_per_hour > 0.0 {
            y.max(0.0) / self.pixels_per_hour
        } else {
            0.0
        };
        let seconds = (hours * 3600.0).round().min(86_400.0) as i64;
        date.and_time(self.day_start) + Duration::seconds(seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Rounds to the nearest multiple of `minutes` since midnight; ties round up.
pub fn snap_to_granularity(time: NaiveDateTime, minutes: u32) -> NaiveDateTime {
    let step = i64::from(minutes.max(1)) * 60;
    let midnight = time.date().and_time(NaiveTime::MIN);
    let seconds = (time - midnight).num_seconds();
    let remainder = seconds % step;
    let floor = seconds - remainder;
    let snapped = if remainder * 2 >= step {
        floor + step
    } else {
        floor
    };
    midnight + Duration::seconds(snapped)
}

/// Slot for a raw drop time, snapped and given the default duration.
pub fn slot_for(raw: NaiveDateTime, settings: &Settings) -> ScheduledSlot {
    let start = snap_to_granularity(raw, settings.snap_minutes).and_utc();
    let end = start + Duration::minutes(i64::from(settings.default_duration_minutes));
    ScheduledSlot { start, end }
}

/// Slot for a drop at pointer offset `y` on `date` in the day view.
pub fn slot_at(date: NaiveDate, y: f64, grid: &DayGrid, settings: &Settings) -> ScheduledSlot {
    slot_for(grid.time_at(date, y), settings)
}

/// Slot a calendar drop of `drag` would book. The token is only borrowed so
/// the caller can still hand it to `Coordinator::schedule_drop`.
pub fn plan_external_drop(
    drag: &ExternalDrag,
    date: NaiveDate,
    y: f64,
    grid: &DayGrid,
    settings: &Settings,
) -> ScheduledSlot {
    let slot = slot_at(date, y, grid, settings);
    tracing::debug!(
        task_id = %drag.task_id(),
        start = %slot.start,
        end = %slot.end,
        "calendar drop"
    );
    slot
}
