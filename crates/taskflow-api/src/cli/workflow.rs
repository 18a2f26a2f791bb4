//! Workflow CLI commands: listing, inspection, and task steering.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use taskflow_types::task::{TaskState, TaskStatus};
use taskflow_types::workflow::WorkflowSummary;

use crate::state::AppState;

/// Which workflows `list` shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    All,
    Finished,
    Running,
}

impl ListFilter {
    pub fn from_flags(finished: bool, running: bool) -> Self {
        match (finished, running) {
            (true, _) => ListFilter::Finished,
            (_, true) => ListFilter::Running,
            _ => ListFilter::All,
        }
    }

    fn keeps(self, summary: &WorkflowSummary) -> bool {
        match self {
            ListFilter::All => true,
            ListFilter::Finished => summary.is_finished(),
            ListFilter::Running => !summary.is_finished(),
        }
    }
}

pub async fn list_workflows(state: &AppState, filter: ListFilter, json: bool) -> Result<()> {
    let mut summaries: Vec<WorkflowSummary> = state
        .client
        .list_workflows()
        .await?
        .into_iter()
        .filter(|s| filter.keeps(s))
        .collect();
    summaries.sort_by(|a, b| b.start_timestamp.cmp(&a.start_timestamp));

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!();
        println!("  {}", style("No workflows found.").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Workflow").fg(Color::White),
        Cell::new("State").fg(Color::White),
        Cell::new("Started").fg(Color::White),
        Cell::new("Finished").fg(Color::White),
        Cell::new("Key").fg(Color::White),
    ]);

    for summary in &summaries {
        let state_cell = if summary.is_finished() {
            Cell::new("● finished").fg(Color::Green)
        } else {
            Cell::new("○ running").fg(Color::Cyan)
        };
        table.add_row(vec![
            Cell::new(&summary.id),
            state_cell,
            Cell::new(format_ts(summary.start_timestamp)),
            Cell::new(summary.end_timestamp.map(format_ts).unwrap_or_default()),
            Cell::new(&summary.key).fg(Color::DarkGrey),
        ]);
    }

    println!("{table}");
    println!("  {} workflow(s)", style(summaries.len()).bold());
    Ok(())
}

pub async fn show_workflow(state: &AppState, workflow_id: &str, json: bool) -> Result<()> {
    let workflow = state.client.find_workflow(workflow_id).await?;
    let key = state.client.find_workflow_key(workflow_id).await?;

    if json {
        let result = serde_json::json!({
            "key": key,
            "meta": workflow.meta(),
            "tasks": workflow.tasks(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let meta = workflow.meta();
    println!();
    println!("  {} {}", style("Workflow").bold(), style(workflow.id()).cyan().bold());
    if let Some(key) = &key {
        println!("  {}  {}", style("key").dim(), key);
    }
    if let Some(start) = meta.start_timestamp {
        println!("  {}  {}", style("started").dim(), format_ts(start));
    }
    if let Some(end) = meta.end_timestamp {
        println!("  {}  {}", style("finished").dim(), format_ts(end));
    }
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Task").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Queue").fg(Color::White),
        Cell::new("Start").fg(Color::White),
        Cell::new("Children").fg(Color::White),
        Cell::new("Error").fg(Color::White),
    ]);
    for task in workflow.tasks() {
        table.add_row(task_row(task));
    }
    println!("{table}");
    Ok(())
}

fn task_row(task: &TaskState) -> Vec<Cell> {
    let start = match task.start_date {
        Some(ts) => format_ts(ts),
        None => "external".to_string(),
    };
    vec![
        Cell::new(&task.id),
        status_cell(task.status),
        Cell::new(&task.queue),
        Cell::new(start),
        Cell::new(task.children.join(", ")),
        Cell::new(task.error_msg.as_deref().unwrap_or("")).fg(Color::Red),
    ]
}

fn status_cell(status: TaskStatus) -> Cell {
    let color = match status {
        TaskStatus::Pending => Color::White,
        TaskStatus::Enqueued => Color::Cyan,
        TaskStatus::Succeeded => Color::Green,
        TaskStatus::Failed => Color::Red,
        TaskStatus::Skipped => Color::DarkGrey,
        TaskStatus::AwaitingRetry => Color::Yellow,
    };
    Cell::new(status.as_str()).fg(color)
}

pub async fn start_task(state: &AppState, workflow_id: &str, task_id: &str, json: bool) -> Result<()> {
    state.client.start_task(workflow_id, task_id).await?;
    report(json, "started", workflow_id, task_id, true)
}

pub async fn restart_task(
    state: &AppState,
    workflow_id: &str,
    task_id: &str,
    json: bool,
) -> Result<()> {
    let restarted = state.client.restart_task(workflow_id, task_id).await?;
    if !restarted && !json {
        println!();
        println!(
            "  {} Task '{}' is still in flight, not restarted",
            style("!").yellow(),
            style(task_id).cyan()
        );
        println!();
        return Ok(());
    }
    report(json, "restarted", workflow_id, task_id, restarted)
}

pub async fn clear_task(state: &AppState, workflow_id: &str, task_id: &str, json: bool) -> Result<()> {
    state.client.clear_task(workflow_id, task_id).await?;
    report(json, "cleared", workflow_id, task_id, true)
}

pub async fn set_queue(
    state: &AppState,
    workflow_id: &str,
    task_id: &str,
    queue: &str,
    json: bool,
) -> Result<()> {
    state.client.set_task_queue(workflow_id, task_id, queue).await?;
    if json {
        let result = serde_json::json!({
            "workflow_id": workflow_id,
            "task_id": task_id,
            "queue": queue,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!(
            "  {} Task '{}' now runs on queue '{}'",
            style("ok").green(),
            style(task_id).cyan(),
            style(queue).cyan()
        );
        println!();
    }
    Ok(())
}

pub async fn destroy_workflow(state: &AppState, workflow_id: &str, json: bool) -> Result<()> {
    let destroyed = state.client.destroy_workflow(workflow_id).await?;
    if json {
        let result = serde_json::json!({
            "workflow_id": workflow_id,
            "destroyed": destroyed,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if destroyed {
        println!();
        println!(
            "  {} Destroyed workflow '{}'",
            style("ok").green(),
            style(workflow_id).cyan()
        );
        println!();
    } else {
        println!();
        println!(
            "  {} Workflow '{}' not found",
            style("!").yellow(),
            style(workflow_id).cyan()
        );
        println!();
    }
    Ok(())
}

pub async fn prune(state: &AppState, json: bool) -> Result<()> {
    let removed = state.client.destroy_succeeded_workflows().await?;
    if json {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else {
        println!();
        println!(
            "  {} Removed {} finished workflow(s)",
            style("ok").green(),
            style(removed).bold()
        );
        println!();
    }
    Ok(())
}

fn report(json: bool, action: &str, workflow_id: &str, task_id: &str, done: bool) -> Result<()> {
    if json {
        let result = serde_json::json!({
            "workflow_id": workflow_id,
            "task_id": task_id,
            action: done,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!(
            "  {} Task '{}' {} in '{}'",
            style("ok").green(),
            style(task_id).cyan(),
            action,
            style(workflow_id).cyan()
        );
        println!();
    }
    Ok(())
}

/// Epoch seconds as local-agnostic UTC text.
fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, end: Option<i64>) -> WorkflowSummary {
        WorkflowSummary {
            id: id.to_string(),
            key: format!("workflows.{id}_100_{}", end.unwrap_or(0)),
            start_timestamp: 100,
            end_timestamp: end,
        }
    }

    #[test]
    fn test_list_filter() {
        let done = summary("a", Some(200));
        let open = summary("b", None);
        assert_eq!(ListFilter::from_flags(false, false), ListFilter::All);
        assert!(ListFilter::Finished.keeps(&done));
        assert!(!ListFilter::Finished.keeps(&open));
        assert!(ListFilter::from_flags(false, true).keeps(&open));
        assert!(!ListFilter::Running.keeps(&done));
    }

    #[test]
    fn test_format_ts() {
        assert_eq!(format_ts(0), "1970-01-01 00:00:00");
        assert_eq!(format_ts(1_700_000_000), "2023-11-14 22:13:20");
    }

    #[test]
    fn test_task_row_marks_external() {
        let row = task_row(&TaskState::new("t").external());
        assert_eq!(row.len(), 6);
    }
}
