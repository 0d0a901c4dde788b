use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "autoprobe", version, about = "LLM-driven UI test runner for Appium and WebDriver targets")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of ~/.autoprobe/config.toml or ./autoprobe.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enqueue a run request file and wait for every repetition to finish.
    Run(RunArgs),
    /// Enqueue the stored definition of a task name again.
    Rerun(RerunArgs),
    /// Print the stored definition of a task name.
    ShowRequest(NameArgs),
    /// Replace the stored definition of a task name with a request file.
    UpdateRequest(UpdateArgs),
    /// List stored tasks grouped by status.
    List(ListArgs),
    /// Print the status of one task.
    Status(TaskIdArgs),
    /// Print the summary of a finished task.
    Result(TaskIdArgs),
    /// Delete a task and its stored record.
    Delete(TaskIdArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// JSON run request (prompt, tasks, targets, ...).
    pub request: PathBuf,

    #[arg(long)]
    pub owner: Option<String>,

    /// Override the request's `repeat` count.
    #[arg(long)]
    pub repeat: Option<u32>,

    /// Answer decisions from the terminal instead of the model.
    #[arg(long)]
    pub debug: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RerunArgs {
    pub task_name: String,

    #[arg(long)]
    pub owner: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct NameArgs {
    pub task_name: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct UpdateArgs {
    pub task_name: String,
    pub request: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ListArgs {
    #[arg(long)]
    pub owner: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct TaskIdArgs {
    pub task_id: String,
}
