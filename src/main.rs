use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use docforge::api::{AppState, api_routes};
use docforge::config::AppConfig;
use docforge::jobs::{InMemoryJobStore, JobManager, spawn_sweep_task};
use docforge::llm::create_provider;
use docforge::progress::ProgressNotifier;
use docforge::tools::ToolConfig;
use docforge::workflow::WorkflowRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📄 docforge v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {} ({})", config.llm.backend, config.llm.model);
    eprintln!("   API: http://0.0.0.0:{}/api/tools", config.port);
    eprintln!("   Progress WS: ws://0.0.0.0:{}/ws/progress/<session>", config.port);

    // A missing credential is not fatal: jobs that need the LLM fail with a
    // configuration error instead.
    let llm = match create_provider(&config.llm) {
        Ok(provider) => Some(provider),
        Err(e) => {
            tracing::warn!(error = %e, "LLM provider unavailable; generation tools will fail");
            None
        }
    };

    let jobs = JobManager::new(
        Arc::new(InMemoryJobStore::new()),
        Arc::new(ProgressNotifier::new()),
    );

    let workflows = Arc::new(
        WorkflowRegistry::load_dir(&config.workflows.definitions_dir)
            .context("failed to load workflow definitions")?,
    );
    eprintln!(
        "   Workflows: {} from {}",
        workflows.count(),
        config.workflows.definitions_dir.display()
    );

    let state = AppState::build(
        jobs.clone(),
        workflows,
        ToolConfig::new(llm, config.llm.backend, config.llm.max_tokens),
        config.workflows.step_timeout,
        config.workflows.poll_interval,
    );
    eprintln!("   Tools: {} registered", state.tools.count());

    let _sweep_handle = spawn_sweep_task(jobs, config.jobs.ttl, config.jobs.sweep_interval);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "docforge server started");

    axum::serve(listener, api_routes(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "docforge.log"));
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}
