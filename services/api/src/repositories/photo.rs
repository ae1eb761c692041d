//! Photo repository for database operations

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::photo::{GalleryPhoto, ModerationOutcome, Photo, PhotoOwner};

/// Fields needed to persist a freshly uploaded photo
#[derive(Debug)]
pub struct NewPhoto {
    pub user_id: Uuid,
    pub storage_key: String,
    pub url: String,
    pub description: Option<String>,
    pub moderation: ModerationOutcome,
}

/// Photo repository for database operations
#[derive(Clone)]
pub struct PhotoRepository {
    pool: PgPool,
}

impl PhotoRepository {
    /// Create a new photo repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a photo record. Called only after the storage object was
    /// durably written, so a row never references a blob that was not put.
    pub async fn create(&self, new_photo: &NewPhoto) -> Result<Photo> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO photos (id, user_id, storage_key, url, description,
                                moderation, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(new_photo.user_id)
        .bind(&new_photo.storage_key)
        .bind(&new_photo.url)
        .bind(&new_photo.description)
        .bind(Json(&new_photo.moderation))
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Photo {
            id,
            user_id: new_photo.user_id,
            storage_key: new_photo.storage_key.clone(),
            url: new_photo.url.clone(),
            description: new_photo.description.clone(),
            moderation: new_photo.moderation.clone(),
            created_at,
        })
    }

    /// Find a photo by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Photo>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, storage_key, url, description, moderation, created_at
            FROM photos
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(map_photo_row))
    }

    /// Resolve a set of ids in one lookup, preserving the caller's request
    /// order. Unknown ids are silently dropped; duplicates collapse to the
    /// first occurrence.
    pub async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Photo>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, storage_key, url, description, moderation, created_at
            FROM photos
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id: HashMap<Uuid, Photo> = rows
            .into_iter()
            .map(map_photo_row)
            .map(|photo| (photo.id, photo))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// One gallery page, newest first, ties broken by id for determinism.
    /// The inner join filters out photos whose owner no longer resolves;
    /// cross-entity deletion is not atomic so such rows can exist.
    pub async fn list_page(&self, page: u32, limit: u32) -> Result<Vec<GalleryPhoto>> {
        let offset = (page as i64 - 1) * limit as i64;

        let rows = sqlx::query(
            r#"
            SELECT p.id, p.url, p.description, p.created_at,
                   u.first_name, u.last_name, u.avatar_url
            FROM photos p
            INNER JOIN users u ON u.id = p.user_id
            ORDER BY p.created_at DESC, p.id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let photos = rows
            .into_iter()
            .map(|row| GalleryPhoto {
                id: row.get("id"),
                url: row.get("url"),
                description: row.get("description"),
                created_at: row.get("created_at"),
                user: PhotoOwner::from_profile(
                    row.get("first_name"),
                    row.get("last_name"),
                    row.get("avatar_url"),
                ),
            })
            .collect();

        Ok(photos)
    }

    /// Total photos visible in the gallery, consistent with `list_page`'s
    /// owner filter
    pub async fn count_visible(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM photos p INNER JOIN users u ON u.id = p.user_id",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// All photos owned by one user, newest first
    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Photo>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, storage_key, url, description, moderation, created_at
            FROM photos
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(map_photo_row).collect())
    }

    /// Number of photos owned by one user
    pub async fn count_by_user(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM photos WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Delete a photo's metadata record
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM photos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn map_photo_row(row: PgRow) -> Photo {
    let moderation: Json<ModerationOutcome> = row.get("moderation");

    Photo {
        id: row.get("id"),
        user_id: row.get("user_id"),
        storage_key: row.get("storage_key"),
        url: row.get("url"),
        description: row.get("description"),
        moderation: moderation.0,
        created_at: row.get("created_at"),
    }
}
