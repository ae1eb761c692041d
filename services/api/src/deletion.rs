//! Batch photo deletion: authorization screening and two-phase removal
//! with per-item accounting

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::models::User;
use crate::models::photo::Photo;
use crate::repositories::photo::PhotoRepository;
use crate::storage::ObjectStore;

/// Per-item outcome of a batch delete. Both lists are always reported so
/// callers can render "deleted N, failed M".
#[derive(Debug, Default, Serialize)]
pub struct BatchOutcome {
    pub success: Vec<Uuid>,
    pub failed: Vec<FailedDelete>,
}

/// One photo that could not be deleted, with the error message
#[derive(Debug, Serialize)]
pub struct FailedDelete {
    pub id: Uuid,
    pub error: String,
}

/// Ids in `photos` the principal may not delete. Admins may delete any
/// photo; everyone else only their own. A non-empty result must fail the
/// whole batch before any deletion runs.
pub fn unauthorized_photo_ids(photos: &[Photo], user: &User) -> Vec<Uuid> {
    if user.is_admin() {
        return Vec::new();
    }

    photos
        .iter()
        .filter(|photo| photo.user_id != user.id)
        .map(|photo| photo.id)
        .collect()
}

/// Remove `photos` from blob storage and metadata, in request order.
///
/// Blob removal is best-effort: a failure there is logged and metadata
/// removal still proceeds, since an orphaned blob is less harmful than
/// metadata pointing at nothing. An id joins `success` only once its
/// metadata row is gone; an error on the metadata step records the id in
/// `failed` and the loop moves on to the next item.
pub async fn delete_photos<S: ObjectStore>(
    store: &S,
    repository: &PhotoRepository,
    photos: &[Photo],
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    for photo in photos {
        if let Err(e) = store.delete(&photo.storage_key).await {
            warn!(
                "Failed to delete photo {} from object storage: {}",
                photo.id, e
            );
        }

        match repository.delete(photo.id).await {
            Ok(_) => outcome.success.push(photo.id),
            Err(e) => {
                warn!("Failed to delete photo {} metadata: {}", photo.id, e);
                outcome.failed.push(FailedDelete {
                    id: photo.id,
                    error: e.to_string(),
                });
            }
        }
    }

    outcome
}
