use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Subcommand};
use serde_json::{Value, json};
use tracing::error;

use crate::{
    board::{BoardError, BoardStore},
    coordinator::{Coordinator, DropOutcome},
    drag::DragSession,
    notification::{LogNotifier, Notifier, RecordingNotifier},
    reorder::Nudge,
    schedule::{self, ExternalDrag},
    service::{MemoryTaskService, RestTaskService, TaskService},
    settings::Settings,
    types::{Priority, Task, TaskColumn, TaskGroup, TaskKind},
};

const SCHEMA_VERSION: &str = "cli.v1";

#[derive(Debug, Clone, Subcommand)]
pub enum RootCommand {
    /// List the groups the backend knows about
    Groups,
    /// Print the columns of a group
    Show(GroupArgs),
    /// Drop a task onto another task or a column
    Move(MoveArgs),
    /// Move a task one step up, down, left or right
    Nudge(NudgeArgs),
    /// Put a task on the calendar at a date and time
    Schedule(ScheduleArgs),
    /// Mark a task done, or not done with --undo
    Complete(CompleteArgs),
    /// Run a scripted session against an in-memory board
    Demo,
}

#[derive(Debug, Clone, Args)]
pub struct GroupArgs {
    #[arg(long, value_name = "GROUP_ID")]
    pub group: String,
}

#[derive(Debug, Clone, Args)]
pub struct MoveArgs {
    #[arg(long, value_name = "GROUP_ID")]
    pub group: String,

    #[arg(long, value_name = "TASK_ID")]
    pub task: String,

    /// Task or column id under the pointer at release
    #[arg(long, value_name = "ID")]
    pub over: String,
}

#[derive(Debug, Clone, Args)]
pub struct NudgeArgs {
    #[arg(long, value_name = "GROUP_ID")]
    pub group: String,

    #[arg(long, value_name = "TASK_ID")]
    pub task: String,

    #[arg(long, value_name = "up|down|left|right")]
    pub direction: String,
}

#[derive(Debug, Clone, Args)]
pub struct ScheduleArgs {
    #[arg(long, value_name = "GROUP_ID")]
    pub group: String,

    #[arg(long, value_name = "TASK_ID")]
    pub task: String,

    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: String,

    /// Raw drop time; it is snapped to the configured granularity
    #[arg(long, value_name = "HH:MM")]
    pub time: String,
}

#[derive(Debug, Clone, Args)]
pub struct CompleteArgs {
    #[arg(long, value_name = "GROUP_ID")]
    pub group: String,

    #[arg(long, value_name = "TASK_ID")]
    pub task: String,

    #[arg(long)]
    pub undo: bool,
}

pub async fn run(command: RootCommand, settings: Settings, json_output: bool, quiet: bool) -> i32 {
    match execute(command, settings).await {
        Ok(output) => {
            print_success(output, json_output, quiet);
            0
        }
        Err(err) => {
            print_error(&err, json_output);
            err.exit_code
        }
    }
}

struct CommandOutput {
    command: &'static str,
    data: Value,
    text: String,
}

#[derive(Debug)]
struct CliError {
    exit_code: i32,
    code: &'static str,
    message: String,
}

type CliResult<T> = Result<T, CliError>;

async fn execute(command: RootCommand, settings: Settings) -> CliResult<CommandOutput> {
    match command {
        RootCommand::Demo => run_demo(settings).await,
        RootCommand::Groups => {
            let service = rest_service(&settings)?;
            let groups = service.list_groups().await.map_err(runtime_error)?;
            let text = groups
                .iter()
                .map(|group| format!("{}\t{}", group.id, group.name))
                .collect::<Vec<_>>()
                .join("\n");
            Ok(CommandOutput {
                command: "groups",
                data: json!({ "groups": groups.iter().map(group_summary).collect::<Vec<_>>() }),
                text,
            })
        }
        RootCommand::Show(args) => {
            let service = rest_service(&settings)?;
            let coordinator = connect(service, settings, &args.group).await?;
            let columns = coordinator.board().columns();
            Ok(CommandOutput {
                command: "show",
                data: json!({ "group": args.group, "columns": columns }),
                text: render_columns(&columns),
            })
        }
        RootCommand::Move(args) => {
            let service = rest_service(&settings)?;
            let coordinator = connect(service, settings, &args.group).await?;
            require_task(&coordinator, &args.task)?;
            let mut session = DragSession::new();
            session.begin(args.task.as_str());
            let outcome = coordinator
                .drop_gesture(&mut session, Some(args.over.as_str()))
                .await
                .map_err(classify_error)?;
            outcome_output("move", &coordinator, outcome)
        }
        RootCommand::Nudge(args) => {
            let nudge = Nudge::from_str(&args.direction).map_err(|()| {
                invalid_input_error(
                    "INVALID_DIRECTION",
                    format!("direction '{}' must be up, down, left or right", args.direction),
                )
            })?;
            let coordinator = connect(rest_service(&settings)?, settings, &args.group).await?;
            require_task(&coordinator, &args.task)?;
            let outcome = coordinator
                .nudge(&args.task, nudge)
                .await
                .map_err(classify_error)?;
            outcome_output("nudge", &coordinator, outcome)
        }
        RootCommand::Schedule(args) => {
            let service = rest_service(&settings)?;
            let date = NaiveDate::parse_from_str(&args.date, "%Y-%m-%d").map_err(|err| {
                invalid_input_error("INVALID_DATE", format!("'{}': {err}", args.date))
            })?;
            let time = NaiveTime::parse_from_str(&args.time, "%H:%M").map_err(|err| {
                invalid_input_error("INVALID_TIME", format!("'{}': {err}", args.time))
            })?;
            let coordinator = connect(service, settings, &args.group).await?;
            let task = require_task(&coordinator, &args.task)?;
            let slot = schedule::slot_for(date.and_time(time), coordinator.settings());
            let updated = coordinator
                .schedule_drop(ExternalDrag::begin(&task), slot)
                .await
                .map_err(runtime_error)?;
            Ok(CommandOutput {
                command: "schedule",
                data: json!({ "task": updated }),
                text: format!(
                    "{} scheduled {} - {}",
                    updated.title,
                    slot.start.format("%Y-%m-%d %H:%M"),
                    slot.end.format("%H:%M")
                ),
            })
        }
        RootCommand::Complete(args) => {
            let service = rest_service(&settings)?;
            let coordinator = connect(service, settings, &args.group).await?;
            let updated = coordinator
                .set_completed(&args.task, !args.undo)
                .await
                .map_err(classify_error)?;
            Ok(CommandOutput {
                command: "complete",
                data: json!({ "task": updated }),
                text: format!(
                    "{} marked {}",
                    updated.title,
                    if updated.completed { "done" } else { "not done" }
                ),
            })
        }
    }
}

fn rest_service(settings: &Settings) -> CliResult<Arc<dyn TaskService>> {
    let service = RestTaskService::new(settings.api_base_url.clone(), settings.request_timeout())
        .map_err(runtime_error)?;
    Ok(Arc::new(service))
}

async fn connect(
    service: Arc<dyn TaskService>,
    settings: Settings,
    group_id: &str,
) -> CliResult<Coordinator> {
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let coordinator = Coordinator::new(BoardStore::default(), service, notifier, settings);
    coordinator
        .refresh(group_id)
        .await
        .map_err(|err| lookup_error("GROUP_NOT_FOUND", err))?;
    Ok(coordinator)
}

fn require_task(coordinator: &Coordinator, task_id: &str) -> CliResult<Task> {
    coordinator.board().find_task(task_id).ok_or_else(|| {
        not_found_error("TASK_NOT_FOUND", format!("task {task_id} is not on this board"))
    })
}

fn outcome_output(
    command: &'static str,
    coordinator: &Coordinator,
    outcome: DropOutcome,
) -> CliResult<CommandOutput> {
    let columns = coordinator.board().columns();
    match outcome {
        DropOutcome::Unchanged => Ok(CommandOutput {
            command,
            data: json!({ "outcome": "unchanged", "columns": columns }),
            text: "nothing to move".to_string(),
        }),
        DropOutcome::Persisted { writes, .. } => Ok(CommandOutput {
            command,
            data: json!({ "outcome": "persisted", "writes": writes, "columns": columns }),
            text: render_columns(&columns),
        }),
        DropOutcome::RolledBack { error, .. } => Err(CliError {
            exit_code: 5,
            code: "MOVE_ROLLED_BACK",
            message: error,
        }),
    }
}

async fn run_demo(settings: Settings) -> CliResult<CommandOutput> {
    let memory = Arc::new(MemoryTaskService::new(vec![demo_group()]));
    let recorder = RecordingNotifier::new();
    let coordinator = Coordinator::new(
        BoardStore::default(),
        memory.clone(),
        Arc::new(recorder.clone()),
        settings,
    );
    coordinator.refresh("home").await.map_err(runtime_error)?;

    let mut steps = Vec::new();
    let mut session = DragSession::new();

    session.begin("pay-rent");
    let outcome = coordinator
        .drop_gesture(&mut session, Some("groceries"))
        .await
        .map_err(classify_error)?;
    steps.push(("drag pay-rent onto groceries", outcome));

    memory.fail_next(1);
    session.begin("dentist");
    let outcome = coordinator
        .drop_gesture(&mut session, Some("done"))
        .await
        .map_err(classify_error)?;
    coordinator.board().acknowledge();
    steps.push(("drag dentist onto done while offline", outcome));

    let outcome = coordinator
        .nudge("groceries", Nudge::Down)
        .await
        .map_err(classify_error)?;
    steps.push(("nudge groceries down", outcome));

    coordinator.refresh("home").await.map_err(runtime_error)?;
    let columns = coordinator.board().columns();

    let mut text = String::new();
    for (label, outcome) in &steps {
        text.push_str(&format!("{label}: {}\n", describe_outcome(outcome)));
    }
    for notice in recorder.notices() {
        text.push_str(&format!("[{}] {}: {}\n", notice.level.as_str(), notice.title, notice.detail));
    }
    text.push('\n');
    text.push_str(&render_columns(&columns));

    Ok(CommandOutput {
        command: "demo",
        data: json!({
            "steps": steps
                .iter()
                .map(|(label, outcome)| json!({ "step": label, "outcome": describe_outcome(outcome) }))
                .collect::<Vec<_>>(),
            "backend_writes": memory.writes().len(),
            "columns": columns,
        }),
        text,
    })
}

fn describe_outcome(outcome: &DropOutcome) -> String {
    match outcome {
        DropOutcome::Unchanged => "unchanged".to_string(),
        DropOutcome::Persisted { writes, .. } => format!("persisted ({writes} writes)"),
        DropOutcome::RolledBack { error, .. } => format!("rolled back ({error})"),
    }
}

fn demo_group() -> TaskGroup {
    let column = |id: &str, title: &str, order: i64, tasks: &[(&str, &str, Option<TaskKind>)]| {
        let mut column = TaskColumn::new(id, title);
        column.group_id = "home".to_string();
        column.order = order;
        column.tasks = tasks
            .iter()
            .enumerate()
            .map(|(idx, (task_id, title, kind))| Task {
                column_id: Some(id.to_string()),
                position: idx as i64,
                kind: *kind,
                priority: if idx == 0 { Priority::High } else { Priority::Medium },
                ..Task::new(*task_id, *title)
            })
            .collect();
        column
    };

    TaskGroup {
        id: "home".to_string(),
        name: "Home".to_string(),
        description: Some("Errands and appointments".to_string()),
        columns: vec![
            column(
                "todo",
                "To do",
                0,
                &[
                    ("groceries", "Buy groceries", Some(TaskKind::Task)),
                    ("dentist", "Dentist appointment", Some(TaskKind::Event)),
                ],
            ),
            column(
                "doing",
                "Doing",
                1,
                &[("pay-rent", "Pay rent", Some(TaskKind::Task))],
            ),
            column("done", "Done", 2, &[]),
        ],
    }
}

fn render_columns(columns: &[TaskColumn]) -> String {
    let mut out = Vec::new();
    for column in columns {
        out.push(format!("{} ({})", column.title, column.tasks.len()));
        for task in &column.tasks {
            let check = if task.completed { "x" } else { " " };
            out.push(format!(
                "  {}. [{check}] {} ({}, {})",
                task.position,
                task.title,
                task.id,
                task.priority.as_str()
            ));
        }
    }
    out.join("\n")
}

fn group_summary(group: &TaskGroup) -> Value {
    json!({
        "id": group.id,
        "name": group.name,
        "description": group.description,
        "columns": group.columns.len(),
    })
}

fn not_found_error(code: &'static str, message: impl Into<String>) -> CliError {
    CliError {
        exit_code: 3,
        code,
        message: message.into(),
    }
}

fn invalid_input_error(code: &'static str, message: impl Into<String>) -> CliError {
    CliError {
        exit_code: 2,
        code,
        message: message.into(),
    }
}

fn conflict_error(code: &'static str, message: impl Into<String>) -> CliError {
    CliError {
        exit_code: 4,
        code,
        message: message.into(),
    }
}

fn runtime_error(err: impl std::fmt::Display) -> CliError {
    CliError {
        exit_code: 5,
        code: "RUNTIME_ERROR",
        message: err.to_string(),
    }
}

fn lookup_error(code: &'static str, err: anyhow::Error) -> CliError {
    let message = format!("{err:#}");
    if message.contains("404") || message.contains("not found") {
        return not_found_error(code, message);
    }
    runtime_error(message)
}

fn classify_error(err: anyhow::Error) -> CliError {
    match err.downcast_ref::<BoardError>() {
        Some(BoardError::GestureInFlight(_)) => conflict_error("GESTURE_IN_FLIGHT", err.to_string()),
        Some(BoardError::TaskNotFound(_)) => not_found_error("TASK_NOT_FOUND", err.to_string()),
        Some(BoardError::ColumnNotFound(_)) => not_found_error("COLUMN_NOT_FOUND", err.to_string()),
        Some(BoardError::Unscheduled(_)) => invalid_input_error("TASK_UNSCHEDULED", err.to_string()),
        None => runtime_error(format!("{err:#}")),
    }
}

fn print_success(output: CommandOutput, json_output: bool, quiet: bool) {
    if json_output {
        let payload = json!({
            "schema_version": SCHEMA_VERSION,
            "command": output.command,
            "data": output.data
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(value) => println!("{value}"),
            Err(_) => println!("{}", payload),
        }
        return;
    }

    if quiet {
        return;
    }

    if output.text.is_empty() {
        println!("ok");
    } else {
        println!("{}", output.text);
    }
}

fn print_error(err: &CliError, json_output: bool) {
    error!(code = err.code, message = %err.message, "cli command failed");

    if json_output {
        let payload = json!({
            "schema_version": SCHEMA_VERSION,
            "error": {
                "code": err.code,
                "message": err.message,
            }
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(value) => eprintln!("{value}"),
            Err(_) => eprintln!("{}", payload),
        }
        return;
    }

    eprintln!("error[{}]: {}", err.code, err.message);
}
