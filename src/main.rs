use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use seat_watcher::engine::{ContinuousRunner, SessionManager, SqliteWatchStore, SweepScheduler};
use seat_watcher::mosaic::{MosaicConnector, MosaicExtractor, MosaicSession};
use seat_watcher::plugins::NotificationDispatcher;
use seat_watcher::AppConfig;

/// Seat Watcher: polls course availability and alerts watchers when seats open.
#[derive(Parser)]
#[command(name = "seat-watcher", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single sweep over every active watch, then exit.
    Check,

    /// Sweep continuously until interrupted.
    Run {
        /// Minutes to wait between sweeps.
        #[arg(short, long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },

    /// Register a course watch for a user.
    AddWatch {
        #[arg(long)]
        email: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        course_number: String,
        /// Term label as shown in the search form, e.g. "2026 Winter".
        #[arg(long)]
        term: String,
        #[arg(long)]
        phone: Option<String>,
        /// Record status changes without sending alerts.
        #[arg(long)]
        no_notify: bool,
    },

    /// Print watch store totals.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _guard = init_tracing(&config)?;

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()
            .context("Failed to start metrics exporter")?;
        info!("Metrics available on port {}", config.metrics.port);
    }

    let store = Arc::new(SqliteWatchStore::connect(&config.database).await?);

    match cli.command.unwrap_or(Command::Check) {
        Command::Check => {
            let mut runner = build_runner(&config, store).await;
            let summary = runner.run_once().await?;
            println!("Sweep complete: {}", summary);
        }
        Command::Run { interval } => {
            let mut runner = build_runner(&config, store)
                .await
                .with_interval(Duration::from_secs(interval * 60));

            let cancel = CancellationToken::new();
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown requested; finishing current sweep");
                    shutdown.cancel();
                }
            });

            runner.run(cancel).await;
        }
        Command::AddWatch {
            email,
            subject,
            course_number,
            term,
            phone,
            no_notify,
        } => {
            let user_id = store.get_or_create_user(&email, phone.as_deref()).await?;
            let course_id = store
                .get_or_create_course(
                    &subject.to_uppercase(),
                    &course_number.to_uppercase(),
                    &term,
                    None,
                )
                .await?;
            let watch_id = store.register_watch(user_id, course_id, !no_notify).await?;
            println!(
                "Watch #{}: {} is now watching {} {} ({})",
                watch_id,
                email,
                subject.to_uppercase(),
                course_number.to_uppercase(),
                term
            );
        }
        Command::Stats => {
            let stats = store.stats().await?;
            println!("Total users: {}", stats.total_users);
            println!("Active watches: {}", stats.active_watches);
            println!("Monitored courses: {}", stats.monitored_courses);
        }
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid logging.level directive")?;

    let (file_layer, guard) = match &config.logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn build_runner(
    config: &AppConfig,
    store: Arc<SqliteWatchStore>,
) -> ContinuousRunner<MosaicConnector> {
    let dispatcher = NotificationDispatcher::from_config(&config.notifications).await;
    let extractor = Arc::new(MosaicExtractor::new(&config.mosaic));
    let scheduler: SweepScheduler<MosaicSession> =
        SweepScheduler::new(store, extractor, dispatcher, config.mosaic.search_url.clone());

    let sessions = SessionManager::new(MosaicConnector::new(config.mosaic.clone()))
        .with_login_timeout(Duration::from_secs(config.mosaic.login_timeout_secs));

    ContinuousRunner::new(sessions, scheduler)
}
