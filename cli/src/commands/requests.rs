//! Commands that enqueue work or touch stored run requests.

use std::path::Path;

use tokio::sync::broadcast::{self, error::RecvError};

use autoprobe_core::api::{CliError, JobRegistry, Summary, TaskDefinition, TaskEvent, TaskStatus};

use super::cli::{NameArgs, RerunArgs, RunArgs, UpdateArgs};
use crate::context::AppContext;
use crate::output;

/// Exit code when at least one run ended in `error`.
pub const EXIT_RUN_FAILED: i32 = 30;

pub fn read_request(path: &Path) -> Result<TaskDefinition, CliError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| CliError::Command(format!("invalid run request {}: {e}", path.display())))
}

pub async fn run(ctx: &AppContext, args: RunArgs, json: bool) -> Result<i32, CliError> {
    let mut definition = read_request(&args.request)?;
    if let Some(repeat) = args.repeat {
        definition.repeat = repeat;
    }
    definition.debug |= args.debug;
    if !definition.debug && ctx.cfg().inference.model.trim().is_empty() {
        return Err(CliError::Config(
            "inference.model is not configured (set it in config.toml or OPENAI_MODEL)".into(),
        ));
    }

    let registry = ctx.registry();
    let events = registry.subscribe();
    let ids = registry.enqueue(definition, args.owner.as_deref()).await?;
    follow(registry, &ids, events, json).await
}

pub async fn rerun(ctx: &AppContext, args: RerunArgs, json: bool) -> Result<i32, CliError> {
    let registry = ctx.registry();
    let events = registry.subscribe();
    let ids = registry.rerun(&args.task_name, args.owner.as_deref()).await?;
    follow(registry, &ids, events, json).await
}

pub async fn show_request(ctx: &AppContext, args: NameArgs) -> Result<i32, CliError> {
    let definition = ctx.registry().get_definition(&args.task_name).await?;
    let rendered = serde_json::to_string_pretty(&definition).map_err(anyhow::Error::from)?;
    println!("{rendered}");
    Ok(0)
}

pub async fn update_request(ctx: &AppContext, args: UpdateArgs) -> Result<i32, CliError> {
    let definition = read_request(&args.request)?;
    ctx.registry()
        .update_definition(&args.task_name, definition)
        .await?;
    println!("updated {}", args.task_name);
    Ok(0)
}

/// Waits for `ids`, printing step progress to stderr. Ctrl-C cancels them.
async fn follow(
    registry: &JobRegistry,
    ids: &[String],
    events: broadcast::Receiver<TaskEvent>,
    json: bool,
) -> Result<i32, CliError> {
    let progress = (!json).then(|| tokio::spawn(print_progress(events, ids.to_vec())));

    let interrupted = tokio::select! {
        waited = wait_all(registry, ids) => {
            waited?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        tracing::warn!(target: "autoprobe.cli", tasks = ids.len(), "interrupted, cancelling queued runs");
        for id in ids {
            registry.cancel(id).await?;
        }
        wait_all(registry, ids).await?;
    }
    if let Some(handle) = progress {
        handle.abort();
    }

    let mut summaries: Vec<Summary> = Vec::with_capacity(ids.len());
    for id in ids {
        summaries.push(registry.result(id).await?);
    }
    if json {
        let rendered = serde_json::to_string_pretty(&summaries).map_err(anyhow::Error::from)?;
        println!("{rendered}");
    } else {
        for summary in &summaries {
            print!("{}", output::render_summary(summary));
        }
    }

    let failed = summaries.iter().any(|s| s.status == TaskStatus::Error);
    Ok(if failed { EXIT_RUN_FAILED } else { 0 })
}

async fn wait_all(registry: &JobRegistry, ids: &[String]) -> Result<(), CliError> {
    for id in ids {
        registry.wait(id).await?;
    }
    Ok(())
}

async fn print_progress(mut events: broadcast::Receiver<TaskEvent>, ids: Vec<String>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        if !ids.iter().any(|id| id == event.task_id()) {
            continue;
        }
        match event {
            TaskEvent::Started { task_id } => eprintln!("[{}] started", output::short_id(&task_id)),
            TaskEvent::StepRecorded {
                task_id,
                index,
                action,
                success,
                message,
            } => eprintln!(
                "{}",
                output::render_progress(&task_id, index, &action, success, &message)
            ),
            TaskEvent::Finished { task_id, status } => {
                eprintln!("[{}] {status}", output::short_id(&task_id))
            }
            TaskEvent::Queued { .. } | TaskEvent::Deleted { .. } => {}
        }
    }
}
