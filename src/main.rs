use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wordle_leaderboard::config::{Cli, Command, StoreArgs};
use wordle_leaderboard::ingest::FileBatchSource;
use wordle_leaderboard::reporting;
use wordle_leaderboard::{
    AppError, AppState, InMemoryStore, IngestionService, PostgresStore, ProfileIngestionService,
    ReportingService, Stores,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wordle_leaderboard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let stores = connect(&cli.store).await?;
    let retry = cli.store.retry_policy();

    match cli.command {
        Command::IngestScores {
            root,
            bucket,
            object,
            policy,
            workers,
        } => {
            let service = IngestionService::builder(&stores)
                .with_policy(policy)
                .with_retry(retry)
                .with_workers(workers)
                .build();
            let source = FileBatchSource::new(root);
            let report = service.run_object(&source, &bucket, &object).await?;
            print_report(&report);
        }
        Command::IngestProfiles {
            root,
            bucket,
            object,
        } => {
            let service = ProfileIngestionService::new(stores.profiles.clone()).with_retry(retry);
            let source = FileBatchSource::new(root);
            let report = service.run_object(&source, &bucket, &object).await?;
            print_report(&report);
        }
        Command::Serve { port } => {
            let reporting = ReportingService::new(&stores).with_retry(retry);
            let app = reporting::router(AppState::new(Arc::new(reporting)));

            let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
            info!("Server running on http://localhost:{}", port);
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

async fn connect(args: &StoreArgs) -> Result<Stores, AppError> {
    match &args.database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url).await?;
            let store = PostgresStore::new(pool);
            store.migrate().await?;
            info!("Connected to Postgres");
            Ok(Stores::from_backend(Arc::new(store)))
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory store; nothing will persist");
            Ok(Stores::from_backend(Arc::new(InMemoryStore::new())))
        }
    }
}

fn print_report<T: serde::Serialize>(report: &T) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{json}"),
        Err(err) => warn!(error = %err, "Failed to render report"),
    }
}
