//! `reviewpilot` 바이너리 진입점.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use reviewpilot::application::ports::ConfigRepository;
use reviewpilot::application::usecases::inspect_config::InspectConfigUseCase;
use reviewpilot::infrastructure::adapters::{JsonConfigRepository, ProviderFactoryAdapter};
use reviewpilot::infrastructure::queue::ensure_shared_queue;
use reviewpilot::interface::cli::{Cli, Command};
use reviewpilot::interface::composition::AppComposition;
use reviewpilot::interface::http;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli.command).await {
        error!(error = %format!("{err:#}"), "reviewpilot exited with an error");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    let config_repo = JsonConfigRepository;

    match command {
        Command::Config => {
            let usecase = InspectConfigUseCase {
                config_repo: &config_repo,
                provider_factory: &ProviderFactoryAdapter,
            };
            println!("{}", usecase.execute()?);
        }
        Command::DeadLetters => {
            let app = AppComposition::open(config_repo.load()?).await?;
            println!("{}", app.dead_letters_usecase().execute().await?);
        }
        Command::Worker { workers } => {
            let config = config_repo.load()?;
            ensure_shared_queue(&config.queue_url())?;
            let app = AppComposition::open(config).await?;
            let provider = app.build_provider()?;
            let count = workers.unwrap_or_else(|| app.config().worker_concurrency());
            let (stop_tx, stop_rx) = watch::channel(false);
            tokio::spawn(forward_shutdown(stop_tx));

            let stats = app.run_workers(provider.as_ref(), count, stop_rx).await;
            info!(completed = stats.completed, failed = stats.failed, "workers stopped");
        }
        Command::Serve { bind, workers } => {
            let app = AppComposition::open(config_repo.load()?).await?;
            let provider = app.build_provider()?;
            let count = workers.unwrap_or_else(|| app.config().worker_concurrency());
            let addr = bind.unwrap_or_else(|| app.config().bind_address());
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;

            let (stop_tx, stop_rx) = watch::channel(false);
            tokio::spawn(forward_shutdown(stop_tx));

            let mut server_stop = stop_rx.clone();
            let server = http::serve(listener, app.http_state(), async move {
                let _ = server_stop.wait_for(|stop| *stop).await;
            });
            let workers = app.run_workers(provider.as_ref(), count, stop_rx);

            let (served, stats) = tokio::join!(server, workers);
            info!(completed = stats.completed, failed = stats.failed, "workers stopped");
            served?;
            info!("shut down gracefully");
        }
    }

    Ok(())
}

/// SIGINT/SIGTERM을 받으면 모든 워커와 서버에 종료를 알린다.
async fn forward_shutdown(stop: watch::Sender<bool>) {
    if let Err(err) = shutdown_signal().await {
        // sender를 버리면 워커가 곧바로 멈추므로 붙잡아 둔다.
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested; finishing in-flight jobs");
    let _ = stop.send(true);
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await
    }
}
