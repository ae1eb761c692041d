use anyhow::Result;
use aws_config::BehaviorVersion;
use std::env;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

mod archive;
mod deletion;
mod error;
mod hub;
mod middleware;
mod models;
mod moderation;
mod repositories;
mod routes;
mod state;
mod storage;

use common::database::{DatabaseConfig, init_pool};

use crate::hub::GalleryHub;
use crate::moderation::ModerationClient;
use crate::repositories::{UserRepository, photo::PhotoRepository};
use crate::state::AppState;
use crate::storage::S3ObjectStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting Snapwall API service");

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    // AWS clients for blob storage and moderation
    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_client = aws_sdk_s3::Client::new(&aws_config);
    let rekognition_client = aws_sdk_rekognition::Client::new(&aws_config);

    let bucket_name =
        env::var("PHOTO_BUCKET_NAME").unwrap_or_else(|_| "snapwall-photos".to_string());
    let region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3001".to_string());

    // Initialize repositories and collaborators
    let user_repository = UserRepository::new(pool.clone());
    let photo_repository = PhotoRepository::new(pool.clone());
    let storage = S3ObjectStore::new(s3_client, bucket_name, region);
    let moderation = ModerationClient::new(rekognition_client);
    let hub = GalleryHub::new();

    let app_state = AppState {
        db_pool: pool,
        user_repository,
        photo_repository,
        storage,
        moderation,
        hub,
    };

    info!("Snapwall API service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Snapwall API service listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
