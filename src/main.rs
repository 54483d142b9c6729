use clap::{Parser, Subcommand};
use repo_analytics::config::{AppConfig, PipelineConfig};
use repo_analytics::summary::{self, FAILURE_END, FAILURE_START};
use repo_analytics::{create_app, pipeline, AppState};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "repo-analytics")]
#[command(about = "Collects GitHub repository activity into charts and CSV exports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the web front end and trigger runs over HTTP
    Serve,
    /// Run the analytics pipeline once, configured from the environment
    Run,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    match Cli::parse().command {
        Command::Serve => serve().await,
        Command::Run => run().await,
    }
}

/// Logs go to stderr so stdout only carries the run summary.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "repo_analytics=debug,tower_http=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run() -> ExitCode {
    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {:#}. Exiting.", e);
            return ExitCode::FAILURE;
        }
    };

    match pipeline::run(&config).await {
        Ok(run_summary) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = summary::write_summary_block(&run_summary, &mut stdout) {
                tracing::error!("Failed to write run summary: {}", e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{FAILURE_START}");
            eprintln!("Unexpected error: {e:?}");
            eprintln!("{FAILURE_END}");
            ExitCode::FAILURE
        }
    }
}

async fn serve() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}. Exiting.", e);
            return ExitCode::FAILURE;
        }
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = create_app(Arc::new(AppState::new(config)));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
