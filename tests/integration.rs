use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;

use planboard::board::{BoardError, BoardState, BoardStore};
use planboard::coordinator::{Coordinator, DropOutcome};
use planboard::drag::DragSession;
use planboard::notification::{NoticeLevel, RecordingNotifier};
use planboard::reorder::{Nudge, plan_drop};
use planboard::schedule::{DayGrid, ExternalDrag, plan_external_drop, slot_for};
use planboard::service::{MemoryTaskService, ServiceCall, TaskService};
use planboard::settings::Settings;
use planboard::types::{NewTask, Task, TaskColumn, TaskDraft, TaskGroup, TaskKind, TaskPatch};

const GROUP: &str = "board";

struct Fixture {
    service: Arc<MemoryTaskService>,
    notifier: RecordingNotifier,
    coordinator: Arc<Coordinator>,
}

impl Fixture {
    async fn new(columns: &[(&str, &[&str])]) -> Result<Self> {
        Self::with_settings(columns, Settings::default()).await
    }

    async fn with_settings(columns: &[(&str, &[&str])], settings: Settings) -> Result<Self> {
        let service = Arc::new(MemoryTaskService::new(vec![group(columns)]));
        let notifier = RecordingNotifier::new();
        let coordinator = Arc::new(Coordinator::new(
            BoardStore::default(),
            service.clone(),
            Arc::new(notifier.clone()),
            settings,
        ));
        coordinator.refresh(GROUP).await?;
        service.clear_calls();
        Ok(Self {
            service,
            notifier,
            coordinator,
        })
    }

    fn columns(&self) -> Vec<TaskColumn> {
        self.coordinator.board().columns()
    }

    fn ids(&self, column_id: &str) -> Vec<String> {
        self.columns()
            .into_iter()
            .find(|column| column.id == column_id)
            .map(|column| column.tasks.into_iter().map(|task| task.id).collect())
            .unwrap_or_default()
    }

    fn positions(&self, column_id: &str) -> Vec<i64> {
        self.columns()
            .into_iter()
            .find(|column| column.id == column_id)
            .map(|column| column.tasks.iter().map(|task| task.position).collect())
            .unwrap_or_default()
    }

    async fn drag(&self, task_id: &str, over_id: Option<&str>) -> Result<DropOutcome> {
        let mut session = DragSession::new();
        session.begin(task_id);
        self.coordinator.drop_gesture(&mut session, over_id).await
    }

    fn updates(&self) -> Vec<(String, TaskPatch)> {
        self.service
            .writes()
            .into_iter()
            .filter_map(|call| match call {
                ServiceCall::UpdateTask { task_id, patch } => Some((task_id, patch)),
                _ => None,
            })
            .collect()
    }
}

fn group(columns: &[(&str, &[&str])]) -> TaskGroup {
    TaskGroup {
        id: GROUP.to_string(),
        name: "Board".to_string(),
        description: None,
        columns: columns
            .iter()
            .enumerate()
            .map(|(order, (id, task_ids))| {
                let mut column = TaskColumn::new(*id, id.to_uppercase());
                column.group_id = GROUP.to_string();
                column.order = order as i64;
                column.tasks = task_ids
                    .iter()
                    .enumerate()
                    .map(|(position, task_id)| Task {
                        column_id: Some(id.to_string()),
                        position: position as i64,
                        kind: task_id.starts_with("ev").then_some(TaskKind::Event),
                        ..Task::new(*task_id, task_id.to_uppercase())
                    })
                    .collect();
                column
            })
            .collect(),
    }
}

#[tokio::test]
async fn integration_test_noop_drop_makes_no_calls() -> Result<()> {
    let fixture = Fixture::new(&[("x", &["a", "b", "c"])]).await?;
    let before = fixture.columns();

    assert_eq!(fixture.drag("b", Some("b")).await?, DropOutcome::Unchanged);
    assert_eq!(fixture.drag("c", Some("x")).await?, DropOutcome::Unchanged);
    assert_eq!(fixture.drag("a", None).await?, DropOutcome::Unchanged);

    assert!(fixture.service.calls().is_empty());
    assert_eq!(fixture.columns(), before);
    assert!(matches!(
        fixture.coordinator.board().state(),
        BoardState::Synced { .. }
    ));
    Ok(())
}

#[tokio::test]
async fn integration_test_same_column_reorder_keeps_positions_contiguous() -> Result<()> {
    let fixture = Fixture::new(&[("x", &["a", "b", "c", "d", "e"])]).await?;

    for (task, over) in [("a", "d"), ("e", "a"), ("c", "x"), ("b", "e")] {
        fixture.drag(task, Some(over)).await?;
        assert_eq!(fixture.positions("x"), vec![0, 1, 2, 3, 4]);
    }

    let local = fixture.ids("x");
    assert!(fixture.coordinator.refresh(GROUP).await?);
    assert_eq!(fixture.positions("x"), vec![0, 1, 2, 3, 4]);
    assert_eq!(fixture.ids("x"), local);
    Ok(())
}

#[tokio::test]
async fn integration_test_moves_preserve_event_type() -> Result<()> {
    let fixture = Fixture::new(&[("x", &["ev-1", "a"]), ("y", &["b"])]).await?;

    fixture.drag("ev-1", Some("b")).await?;
    fixture.drag("ev-1", Some("a")).await?;

    let updates = fixture.updates();
    let event_updates: Vec<_> = updates.iter().filter(|(id, _)| id == "ev-1").collect();
    assert_eq!(event_updates.len(), 2);
    assert!(
        event_updates
            .iter()
            .all(|(_, patch)| patch.kind == Some(TaskKind::Event))
    );
    assert_eq!(
        fixture.service.task("ev-1").and_then(|task| task.kind),
        Some(TaskKind::Event)
    );
    Ok(())
}

#[tokio::test]
async fn integration_test_cross_column_drop_lands_after_target() -> Result<()> {
    let fixture = Fixture::new(&[("x", &["p", "q", "a"]), ("y", &["b", "c"])]).await?;

    let outcome = fixture.drag("a", Some("b")).await?;
    assert!(matches!(outcome, DropOutcome::Persisted { writes: 1, .. }));

    assert_eq!(fixture.ids("y"), vec!["b", "a", "c"]);
    assert_eq!(fixture.positions("y"), vec![0, 1, 2]);
    assert_eq!(
        fixture.updates(),
        vec![(
            "a".to_string(),
            TaskPatch {
                column_id: Some("y".to_string()),
                position: Some(1),
                ..TaskPatch::default()
            }
        )]
    );
    assert!(fixture.coordinator.board().is_stale());
    Ok(())
}

#[tokio::test]
async fn integration_test_downward_move_uses_tie_break() -> Result<()> {
    let fixture = Fixture::new(&[("x", &["a", "b", "c", "d"])]).await?;

    fixture.drag("a", Some("c")).await?;

    assert_eq!(fixture.ids("x"), vec!["b", "a", "c", "d"]);
    let mut updates = fixture.updates();
    updates.sort_by(|left, right| left.0.cmp(&right.0));
    assert_eq!(
        updates,
        vec![
            ("a".to_string(), TaskPatch { position: Some(1), ..TaskPatch::default() }),
            ("b".to_string(), TaskPatch { position: Some(0), ..TaskPatch::default() }),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn integration_test_failed_move_rolls_back_and_notifies() -> Result<()> {
    let fixture = Fixture::new(&[("x", &["p", "q", "a"]), ("y", &["b"])]).await?;
    let before = fixture.columns();
    fixture.service.fail_next(1);

    let outcome = fixture.drag("a", Some("b")).await?;

    assert!(matches!(outcome, DropOutcome::RolledBack { .. }));
    assert_eq!(fixture.columns(), before);
    assert!(matches!(
        fixture.coordinator.board().state(),
        BoardState::RollingBack { .. }
    ));
    let errors = fixture.notifier.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].title, "Move failed");

    let next = fixture.drag("a", Some("y")).await?;
    assert!(matches!(next, DropOutcome::Persisted { .. }));
    assert_eq!(fixture.ids("y"), vec!["b", "a"]);
    Ok(())
}

#[tokio::test]
async fn integration_test_partial_failure_rolls_back_whole_reorder() -> Result<()> {
    let fixture = Fixture::new(&[("x", &["a", "b", "c", "d"])]).await?;
    let before = fixture.columns();
    fixture.service.fail_next(1);

    let outcome = fixture.drag("d", Some("a")).await?;

    assert!(matches!(outcome, DropOutcome::RolledBack { .. }));
    assert_eq!(fixture.columns(), before);
    // Some sibling writes reached the backend before the failure.
    assert!(!fixture.updates().is_empty());
    assert!(fixture.coordinator.board().is_stale());

    fixture.coordinator.board().acknowledge();
    assert!(fixture.coordinator.refresh(GROUP).await?);
    assert!(!fixture.coordinator.board().is_stale());
    Ok(())
}

#[tokio::test]
async fn integration_test_hung_call_times_out_and_rolls_back() -> Result<()> {
    let settings = Settings {
        request_timeout_ms: 50,
        ..Settings::default()
    };
    let fixture = Fixture::with_settings(&[("x", &["a"]), ("y", &[])], settings).await?;
    let before = fixture.columns();
    fixture.service.set_delay(Duration::from_millis(500));

    let outcome = fixture.drag("a", Some("y")).await?;

    let DropOutcome::RolledBack { error, .. } = outcome else {
        panic!("expected rollback, got {outcome:?}");
    };
    assert!(error.contains("did not answer"));
    assert_eq!(fixture.columns(), before);
    Ok(())
}

#[tokio::test]
async fn integration_test_overlay_is_visible_before_server_answers() -> Result<()> {
    let fixture = Fixture::new(&[("x", &["a", "b"]), ("y", &["c"])]).await?;
    fixture.service.set_delay(Duration::from_millis(100));

    let plan = plan_drop(&fixture.columns(), "a", "c").expect("plan");
    let coordinator = Arc::clone(&fixture.coordinator);
    let pending = tokio::spawn({
        let plan = plan.clone();
        async move { coordinator.commit_drop(plan).await }
    });

    while !fixture.coordinator.board().is_pending() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(fixture.ids("y"), vec!["c", "a"]);

    let second = fixture.coordinator.commit_drop(plan).await;
    let err = second.expect_err("second gesture must wait");
    assert!(matches!(
        err.downcast_ref::<BoardError>(),
        Some(BoardError::GestureInFlight(_))
    ));

    let ticket = fixture.coordinator.board().fetch_ticket();
    assert!(
        !fixture
            .coordinator
            .board()
            .apply_refresh(ticket, group(&[("x", &["a", "b"]), ("y", &["c"])]).columns)
    );

    let outcome = pending.await??;
    assert!(matches!(outcome, DropOutcome::Persisted { .. }));
    assert_eq!(fixture.ids("y"), vec!["c", "a"]);
    Ok(())
}

#[tokio::test]
async fn integration_test_renumber_policy_persists_siblings() -> Result<()> {
    let settings = Settings {
        persist_sibling_positions: true,
        ..Settings::default()
    };
    let fixture =
        Fixture::with_settings(&[("x", &["a", "p"]), ("y", &["b", "c"])], settings).await?;

    fixture.drag("a", Some("b")).await?;
    fixture.coordinator.refresh(GROUP).await?;

    assert_eq!(fixture.ids("y"), vec!["b", "a", "c"]);
    assert_eq!(fixture.positions("y"), vec![0, 1, 2]);
    assert_eq!(fixture.positions("x"), vec![0]);
    assert_eq!(fixture.updates().len(), 3);
    Ok(())
}

#[tokio::test]
async fn integration_test_keyboard_nudges_persist() -> Result<()> {
    let fixture = Fixture::new(&[("x", &["a", "b"]), ("y", &["c"])]).await?;

    fixture.coordinator.nudge("a", Nudge::Down).await?;
    assert_eq!(fixture.ids("x"), vec!["b", "a"]);

    fixture.coordinator.nudge("a", Nudge::Right).await?;
    assert_eq!(fixture.ids("y"), vec!["a", "c"]);

    assert_eq!(
        fixture.coordinator.nudge("a", Nudge::Up).await?,
        DropOutcome::Unchanged
    );
    Ok(())
}

#[tokio::test]
async fn integration_test_external_drop_snaps_to_quarter_hour() -> Result<()> {
    let fixture = Fixture::new(&[("x", &["ev-1"])]).await?;
    let task = fixture
        .coordinator
        .board()
        .find_task("ev-1")
        .expect("task on board");
    let date = NaiveDate::from_ymd_opt(2026, 10, 14).expect("valid date");
    let raw = date.and_hms_opt(10, 7, 0).expect("valid time");

    let slot = slot_for(raw, fixture.coordinator.settings());
    let updated = fixture
        .coordinator
        .schedule_drop(ExternalDrag::begin(&task), slot)
        .await?;

    let start = date.and_hms_opt(10, 0, 0).expect("valid time").and_utc();
    let end = date.and_hms_opt(11, 0, 0).expect("valid time").and_utc();
    assert_eq!(updated.start_date, Some(start));
    assert_eq!(updated.end_date, Some(end));
    assert_eq!(updated.column_id.as_deref(), Some("x"));
    assert_eq!(
        fixture.updates(),
        vec![(
            "ev-1".to_string(),
            TaskPatch {
                start_date: Some(start),
                end_date: Some(end),
                kind: Some(TaskKind::Event),
                ..TaskPatch::default()
            }
        )]
    );
    assert_eq!(
        fixture
            .coordinator
            .board()
            .find_task("ev-1")
            .and_then(|t| t.start_date),
        Some(start)
    );
    assert_eq!(fixture.notifier.notices()[0].level, NoticeLevel::Info);
    Ok(())
}

#[tokio::test]
async fn integration_test_external_drop_failure_notifies() -> Result<()> {
    let fixture = Fixture::new(&[("x", &["a"])]).await?;
    let task = fixture
        .coordinator
        .board()
        .find_task("a")
        .expect("task on board");
    fixture.service.fail_next(1);

    let date = NaiveDate::from_ymd_opt(2026, 10, 14).expect("valid date");
    let drag = ExternalDrag::begin(&task);
    let slot = plan_external_drop(
        &drag,
        date,
        96.0,
        &DayGrid::default(),
        fixture.coordinator.settings(),
    );
    let result = fixture.coordinator.schedule_drop(drag, slot).await;

    assert!(result.is_err());
    assert_eq!(fixture.notifier.errors()[0].title, "Scheduling failed");
    assert!(
        fixture
            .coordinator
            .board()
            .find_task("a")
            .is_some_and(|t| t.start_date.is_none())
    );
    Ok(())
}

#[tokio::test]
async fn integration_test_create_and_delete_tasks() -> Result<()> {
    let fixture = Fixture::new(&[("x", &["a", "b"]), ("y", &["c"])]).await?;

    let created = fixture
        .coordinator
        .create_task(
            "x",
            TaskDraft {
                title: "New".to_string(),
                ..TaskDraft::default()
            },
        )
        .await?;
    assert_eq!(created.position, 2);
    assert_eq!(fixture.ids("x").last(), Some(&created.id));

    let done = fixture.coordinator.set_completed("c", true).await?;
    assert!(done.completed);
    assert!(
        fixture
            .coordinator
            .board()
            .find_task("c")
            .is_some_and(|t| t.completed)
    );

    fixture.coordinator.delete_task("a").await?;
    assert_eq!(fixture.ids("x"), vec!["b".to_string(), created.id.clone()]);

    fixture.coordinator.delete_column("y").await?;
    assert!(fixture.coordinator.board().find_task("c").is_none());
    assert!(fixture.service.task("c").is_none());

    let missing = fixture
        .coordinator
        .create_task("y", TaskDraft::default())
        .await;
    assert!(missing.is_err());
    Ok(())
}

#[tokio::test]
async fn integration_test_unscheduled_event_drops_onto_calendar() -> Result<()> {
    let fixture = Fixture::new(&[("x", &["a"])]).await?;
    let task = fixture
        .service
        .create_task(NewTask {
            title: "Dentist".to_string(),
            description: String::new(),
            priority: Default::default(),
            column_id: None,
            position: 0,
            completed: false,
            start_date: None,
            end_date: None,
            all_day: false,
            kind: Some(TaskKind::Event),
        })
        .await?;
    fixture.service.clear_calls();

    let date = NaiveDate::from_ymd_opt(2026, 10, 15).expect("valid date");
    let raw = date.and_hms_opt(10, 7, 0).expect("valid time");
    let slot = slot_for(raw, fixture.coordinator.settings());
    let updated = fixture
        .coordinator
        .schedule_drop(ExternalDrag::begin(&task), slot)
        .await?;

    let start = date.and_hms_opt(10, 0, 0).expect("valid time").and_utc();
    let end = date.and_hms_opt(11, 0, 0).expect("valid time").and_utc();
    assert_eq!(
        fixture.updates(),
        vec![(
            task.id.clone(),
            TaskPatch {
                start_date: Some(start),
                end_date: Some(end),
                kind: Some(TaskKind::Event),
                ..TaskPatch::default()
            }
        )]
    );
    assert!(updated.column_id.is_none());
    assert_eq!(updated.kind, Some(TaskKind::Event));
    assert_eq!(fixture.service.unscheduled(), vec![updated]);
    assert!(fixture.coordinator.board().find_task(&task.id).is_none());
    assert_eq!(fixture.ids("x"), vec!["a"]);
    Ok(())
}
