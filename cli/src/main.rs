use autoprobe_cli::commands::{cli, requests, tasks};
use autoprobe_cli::context::{load_config, AppContext};
use autoprobe_core::api::{CliError, LoggingConfig, RegistryError};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = load_config(args.config.as_deref())?;
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    let ctx = AppContext::new(cfg)?;
    dispatch(args.command, args.json, &ctx).await
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 11: config error
    // 20: io / invalid request / unknown task
    // 30: a run finished in `error` (returned as a normal exit code)
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Registry(re) => match re {
            RegistryError::Validation(_)
            | RegistryError::NotFound(_)
            | RegistryError::Conflict(_)
            | RegistryError::Store(_) => 20,
            RegistryError::QueueClosed => 50,
        },
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

async fn dispatch(cmd: cli::Commands, json: bool, ctx: &AppContext) -> Result<i32, CliError> {
    match cmd {
        cli::Commands::Run(args) => requests::run(ctx, args, json).await,
        cli::Commands::Rerun(args) => requests::rerun(ctx, args, json).await,
        cli::Commands::ShowRequest(args) => requests::show_request(ctx, args).await,
        cli::Commands::UpdateRequest(args) => requests::update_request(ctx, args).await,
        cli::Commands::List(args) => tasks::list(ctx, args, json).await,
        cli::Commands::Status(args) => tasks::status(ctx, args, json).await,
        cli::Commands::Result(args) => tasks::result(ctx, args, json).await,
        cli::Commands::Delete(args) => tasks::delete(ctx, args).await,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("autoprobe"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("autoprobe.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
