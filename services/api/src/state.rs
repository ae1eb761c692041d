//! Application state shared across handlers

use sqlx::PgPool;

use crate::hub::GalleryHub;
use crate::moderation::ModerationClient;
use crate::repositories::{UserRepository, photo::PhotoRepository};
use crate::storage::S3ObjectStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub user_repository: UserRepository,
    pub photo_repository: PhotoRepository,
    pub storage: S3ObjectStore,
    pub moderation: ModerationClient,
    pub hub: GalleryHub,
}
