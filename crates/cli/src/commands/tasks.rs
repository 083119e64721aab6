//! `braindump tasks` / `braindump mark`: Inspect and update tasks.

use std::path::Path;

use braindump_core::task::{Task, TaskStatus};
use tracing::info;

pub async fn run(config_path: Option<&Path>, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let store = super::open_store(&config).await?;
    let tasks = store.recent_tasks(limit).await?;

    print!("{}", render(&tasks));
    Ok(())
}

pub async fn mark(
    config_path: Option<&Path>,
    id: i64,
    status: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let status: TaskStatus = status.parse()?;
    let config = super::load_config(config_path)?;
    let store = super::open_store(&config).await?;

    let task = store.set_task_status(id, status).await?;
    info!(task_id = id, status = %task.status, "Task status updated");
    println!("{}", task.snapshot_line());
    Ok(())
}

/// One snapshot line per task, or a hint when there are none.
fn render(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks yet. Try `braindump ingest \"...\"`\n".into();
    }
    tasks
        .iter()
        .map(|t| format!("{}\n", t.snapshot_line()))
        .collect()
}
