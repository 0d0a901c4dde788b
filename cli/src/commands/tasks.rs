use autoprobe_core::api::CliError;

use super::cli::{ListArgs, TaskIdArgs};
use crate::context::AppContext;
use crate::output;

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?;
    println!("{rendered}");
    Ok(())
}

pub async fn list(ctx: &AppContext, args: ListArgs, json: bool) -> Result<i32, CliError> {
    let groups = ctx.registry().list_by_owner(args.owner.as_deref()).await?;
    if json {
        print_json(&groups)?;
    } else {
        print!("{}", output::render_groups(&groups));
    }
    Ok(0)
}

pub async fn status(ctx: &AppContext, args: TaskIdArgs, json: bool) -> Result<i32, CliError> {
    let status = ctx.registry().status(&args.task_id).await?;
    if json {
        print_json(&serde_json::json!({ "task_id": args.task_id, "status": status }))?;
    } else {
        println!("{status}");
    }
    Ok(0)
}

pub async fn result(ctx: &AppContext, args: TaskIdArgs, json: bool) -> Result<i32, CliError> {
    let summary = ctx.registry().result(&args.task_id).await?;
    if json {
        print_json(&summary)?;
    } else {
        print!("{}", output::render_summary(&summary));
    }
    Ok(0)
}

pub async fn delete(ctx: &AppContext, args: TaskIdArgs) -> Result<i32, CliError> {
    ctx.registry().delete(&args.task_id).await?;
    println!("deleted {}", args.task_id);
    Ok(0)
}
