//! API service routes

use std::time::Duration;

use axum::{
    Extension, Json, Router,
    extract::{Multipart, Path, Query, State},
    http::header,
    middleware,
    response::{IntoResponse, Response, sse::Sse},
    routing::{delete, get, post},
};
use bytes::Bytes;
use serde_json::json;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    archive::build_archive,
    deletion::{BatchOutcome, delete_photos, unauthorized_photo_ids},
    error::ApiError,
    hub::{GalleryEvent, UpdateStream},
    middleware::{AuthUser, auth_middleware},
    models::{PhotoCountResponse, SyncUserRequest, User, UserRoleResponse},
    models::photo::{
        GalleryListResponse, GalleryQuery, PhotoIdsRequest, Pagination, UploadResponse,
        UploadedPhoto, clamp_limit, clamp_page,
    },
    repositories::photo::NewPhoto,
    state::AppState,
    storage::{ObjectStore, S3ObjectStore},
};

/// Upper bound on one batch download; partial progress is discarded on expiry
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Filename offered for batch downloads
const ARCHIVE_FILENAME: &str = "event-photos.zip";

/// Per-user upload allowance, reported by the photo-count endpoint
const MAX_UPLOADS: i64 = 20;

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/upload", post(upload_photo))
        .route("/gallery/download", post(download_photos))
        .route("/gallery/delete-multiple", post(delete_multiple_photos))
        .route("/photos/:id", delete(delete_photo))
        .route("/users/sync", post(sync_user))
        .route("/users/me/photos", get(my_photos))
        .route("/users/me/photo-count", get(my_photo_count))
        .route("/users/me/role", get(my_role))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/gallery", get(list_gallery))
        .route("/gallery/updates", get(gallery_updates))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    common::database::health_check(&state.db_pool).await?;

    Ok(Json(json!({
        "status": "ok",
        "service": "snapwall-api"
    })))
}

/// Gallery listing with pagination; `count=true` short-circuits to the
/// pagination metadata only
pub async fn list_gallery(
    State(state): State<AppState>,
    Query(query): Query<GalleryQuery>,
) -> Result<Response, ApiError> {
    let page = clamp_page(query.page);
    let limit = clamp_limit(query.limit);

    let total = state.photo_repository.count_visible().await.map_err(|e| {
        error!("Failed to count gallery photos: {}", e);
        ApiError::Upstream(e.to_string())
    })?;

    let pagination = Pagination::new(total, page, limit);

    if query.count.unwrap_or(false) {
        return Ok(Json(json!({ "pagination": pagination })).into_response());
    }

    // A page past the end comes back empty with accurate totals
    let photos = state
        .photo_repository
        .list_page(page, limit)
        .await
        .map_err(|e| {
            error!("Failed to fetch gallery page: {}", e);
            ApiError::Upstream(e.to_string())
        })?;

    Ok(Json(GalleryListResponse { photos, pagination }).into_response())
}

/// Open a live update channel for the gallery. Frames carry one event
/// each; the channel is not resumable, clients reopen after transport
/// errors and refresh their visible pages on `new-photo`.
pub async fn gallery_updates(State(state): State<AppState>) -> Sse<UpdateStream> {
    Sse::new(state.hub.subscribe())
}

/// Upload a photo: moderation gate, then blob write, then metadata write,
/// then fan-out to open gallery sessions
pub async fn upload_photo(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, &principal).await?;

    let mut file_bytes: Option<Bytes> = None;
    let mut content_type: Option<String> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::BadRequest(format!("Invalid multipart payload: {}", e))
    })? {
        let name = field.name().map(str::to_string);

        match name.as_deref() {
            Some("file") => {
                content_type = field.content_type().map(|ct| ct.to_string());
                file_bytes = Some(field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read file field: {}", e))
                })?);
            }
            Some("description") => {
                let text = field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read description field: {}", e))
                })?;
                if !text.is_empty() {
                    description = Some(text);
                }
            }
            _ => {}
        }
    }

    let file_bytes =
        file_bytes.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;
    let content_type = content_type.unwrap_or_default();

    if !content_type.starts_with("image/") {
        return Err(ApiError::BadRequest(
            "Only image files are allowed".to_string(),
        ));
    }

    let moderation = state.moderation.classify(&file_bytes).await.map_err(|e| {
        error!("Moderation call failed: {}", e);
        ApiError::Upstream(e.to_string())
    })?;

    if !moderation.approved {
        let reason = moderation
            .rejection_reason
            .clone()
            .unwrap_or_else(|| "Image rejected".to_string());
        return Err(ApiError::BadRequest(reason));
    }

    // Blob first, metadata second: a photo row must never reference an
    // object that was not durably written
    let key = S3ObjectStore::object_key(user.id, &content_type);
    state
        .storage
        .put(&key, file_bytes.clone(), &content_type)
        .await
        .map_err(|e| {
            error!("Failed to store photo object: {}", e);
            ApiError::Upstream(e.to_string())
        })?;

    let url = state.storage.public_url(&key);
    let photo = state
        .photo_repository
        .create(&NewPhoto {
            user_id: user.id,
            storage_key: key,
            url,
            description,
            moderation,
        })
        .await
        .map_err(|e| {
            error!("Failed to persist photo metadata: {}", e);
            ApiError::Upstream(e.to_string())
        })?;

    info!("Photo {} uploaded by user {}", photo.id, user.id);

    // Fire-and-forget relative to this request
    state.hub.publish(&GalleryEvent::NewPhoto {
        photo_id: photo.id,
        timestamp: photo.created_at,
    });

    Ok(Json(UploadResponse {
        success: true,
        photo: UploadedPhoto {
            id: photo.id,
            url: photo.url.clone(),
            created_at: photo.created_at,
        },
    }))
}

/// Batch download: assemble the requested photos into one zip response
pub async fn download_photos(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthUser>,
    Json(payload): Json<PhotoIdsRequest>,
) -> Result<Response, ApiError> {
    current_user(&state, &principal).await?;

    if payload.photo_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "Invalid photo IDs provided".to_string(),
        ));
    }

    let photos = state
        .photo_repository
        .find_by_ids(&payload.photo_ids)
        .await
        .map_err(|e| {
            error!("Failed to resolve photos for download: {}", e);
            ApiError::Upstream(e.to_string())
        })?;

    info!(
        "Resolved {} of {} requested photos for download",
        photos.len(),
        payload.photo_ids.len()
    );

    if photos.is_empty() {
        return Err(ApiError::NotFound(
            "No photos found with the provided IDs".to_string(),
        ));
    }

    let archive = timeout(
        DOWNLOAD_TIMEOUT,
        build_archive(&state.storage, &payload.photo_ids, &photos),
    )
    .await
    .map_err(|_| {
        error!("Archive assembly timed out after {:?}", DOWNLOAD_TIMEOUT);
        ApiError::Upstream("download timed out".to_string())
    })?
    .map_err(|e| {
        error!("Archive assembly failed: {}", e);
        ApiError::Upstream(e.to_string())
    })?;

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", ARCHIVE_FILENAME),
        ),
        (header::CONTENT_LENGTH, archive.bytes.len().to_string()),
    ];

    Ok((headers, archive.bytes).into_response())
}

/// Batch delete with all-or-nothing authorization and per-item
/// success/failure accounting
pub async fn delete_multiple_photos(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthUser>,
    Json(payload): Json<PhotoIdsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.photo_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "Invalid photo IDs provided".to_string(),
        ));
    }

    let user = current_user(&state, &principal).await?;

    let photos = state
        .photo_repository
        .find_by_ids(&payload.photo_ids)
        .await
        .map_err(|e| {
            error!("Failed to resolve photos for deletion: {}", e);
            ApiError::Upstream(e.to_string())
        })?;

    if photos.is_empty() {
        return Err(ApiError::NotFound(
            "No photos found with the provided IDs".to_string(),
        ));
    }

    let unauthorized = unauthorized_photo_ids(&photos, &user);
    if !unauthorized.is_empty() {
        return Err(ApiError::Forbidden {
            message: "You don't have permission to delete some of these photos".to_string(),
            photo_ids: unauthorized,
        });
    }

    let results = delete_photos(&state.storage, &state.photo_repository, &photos).await;

    Ok(Json(BatchDeleteResponse {
        message: format!("Successfully deleted {} photos", results.success.len()),
        results,
    }))
}

/// Response for the batch delete endpoint
#[derive(serde::Serialize)]
pub struct BatchDeleteResponse {
    pub message: String,
    pub results: BatchOutcome,
}

/// Delete a single photo, owner or admin only
pub async fn delete_photo(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, &principal).await?;

    let photo = state
        .photo_repository
        .find_by_id(id)
        .await
        .map_err(|e| {
            error!("Failed to look up photo {}: {}", id, e);
            ApiError::Upstream(e.to_string())
        })?
        .ok_or_else(|| ApiError::NotFound("Photo not found".to_string()))?;

    if !user.is_admin() && photo.user_id != user.id {
        return Err(ApiError::Forbidden {
            message: "You don't have permission to delete this photo".to_string(),
            photo_ids: Vec::new(),
        });
    }

    // Best-effort blob removal; metadata removal proceeds regardless
    if let Err(e) = state.storage.delete(&photo.storage_key).await {
        warn!(
            "Failed to delete photo {} from object storage: {}",
            photo.id, e
        );
    }

    state.photo_repository.delete(photo.id).await.map_err(|e| {
        error!("Failed to delete photo {} metadata: {}", photo.id, e);
        ApiError::Upstream(e.to_string())
    })?;

    Ok(Json(json!({ "success": true })))
}

/// Idempotent upsert of the caller's user row from identity-provider
/// profile data
pub async fn sync_user(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthUser>,
    Json(payload): Json<SyncUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.email.is_empty() {
        return Err(ApiError::BadRequest("Email is required".to_string()));
    }

    let user = state
        .user_repository
        .upsert(&principal.external_id, &payload)
        .await
        .map_err(|e| {
            error!("Failed to sync user: {}", e);
            ApiError::Upstream(e.to_string())
        })?;

    Ok(Json(user))
}

/// The caller's own photos, newest first
pub async fn my_photos(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, &principal).await?;

    let photos = state
        .photo_repository
        .list_by_user(user.id)
        .await
        .map_err(|e| {
            error!("Failed to fetch user photos: {}", e);
            ApiError::Upstream(e.to_string())
        })?;

    Ok(Json(json!({ "photos": photos })))
}

/// The caller's photo count and remaining upload allowance
pub async fn my_photo_count(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, &principal).await?;

    let count = state
        .photo_repository
        .count_by_user(user.id)
        .await
        .map_err(|e| {
            error!("Failed to count user photos: {}", e);
            ApiError::Upstream(e.to_string())
        })?;

    Ok(Json(PhotoCountResponse {
        count,
        remaining_uploads: (MAX_UPLOADS - count).max(0),
        max_uploads: MAX_UPLOADS,
    }))
}

/// The caller's account role
pub async fn my_role(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, &principal).await?;

    Ok(Json(UserRoleResponse {
        user_id: user.id,
        role: user.role,
    }))
}

/// Resolve the authenticated principal to its user row
async fn current_user(state: &AppState, principal: &AuthUser) -> Result<User, ApiError> {
    state
        .user_repository
        .find_by_external_id(&principal.external_id)
        .await
        .map_err(|e| {
            error!("Failed to look up user: {}", e);
            ApiError::Upstream(e.to_string())
        })?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}
