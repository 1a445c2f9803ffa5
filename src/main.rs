use std::{process, sync::Arc};

use diramo::{
    application::{
        channels::ChannelRegistry,
        error::AppError,
        policy,
        processor::QueueProcessor,
        repos::{ActivityRepo, ContentRepo, QueueRepo, ScheduledJobsRepo},
        runner::BroadcastRunner,
        scheduler::TokioScheduler,
        sync::SyncController,
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let registry = ChannelRegistry::from_settings(&settings.channels)
        .map_err(|err| AppError::from(InfraError::Channels(err.to_string())))?;

    let queue: Arc<dyn QueueRepo> = repositories.clone();
    let content: Arc<dyn ContentRepo> = repositories.clone();
    let activity: Arc<dyn ActivityRepo> = repositories.clone();
    let jobs: Arc<dyn ScheduledJobsRepo> = repositories.clone();

    let processor = Arc::new(
        QueueProcessor::new(
            queue.clone(),
            content.clone(),
            activity.clone(),
            registry.clone(),
            policy::any_succeeded,
            Arc::new(TokioScheduler),
        )
        .with_batch_size(settings.queue.batch_size)
        .with_stale_after(settings.queue.stale_after),
    );
    let runner = Arc::new(BroadcastRunner::new(jobs, activity.clone(), registry));
    let sync = Arc::new(SyncController::new(
        content,
        activity.clone(),
        settings.sync.webhook_secret.clone(),
    ));

    processor.start(settings.queue.poll_interval);

    let state = HttpState {
        queue,
        activity,
        processor: processor.clone(),
        runner,
        sync,
        cron_secret: settings.cron.secret.clone(),
    };

    let result = serve_http(&settings, state).await;

    processor.stop();
    result
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let url = settings.database.url.as_deref().ok_or_else(|| {
        AppError::from(InfraError::configuration(
            "database.url is required (set DIRAMO__DATABASE__URL or --database-url)",
        ))
    })?;

    let pool = PostgresRepositories::connect(url, settings.database.max_connections)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    info!(
        target = "diramo::startup",
        max_connections = settings.database.max_connections,
        "database ready"
    );
    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "diramo::startup",
        addr = %settings.server.addr,
        "listening"
    );

    let shutdown_started = Arc::new(tokio::sync::Notify::new());
    let notify = Arc::clone(&shutdown_started);
    let serve = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            notify.notify_one();
        },
    );

    http::drain_within(
        std::future::IntoFuture::into_future(serve),
        shutdown_started,
        settings.server.graceful_shutdown,
    )
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => error!(error = %err, "failed to install terminate handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(target = "diramo::shutdown", "shutdown signal received");
}
