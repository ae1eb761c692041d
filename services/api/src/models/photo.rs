//! Photo models and gallery pagination payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Largest page size a caller may request
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size used when the caller does not specify one
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// Stored photo record. A row exists only if its storage object was
/// durably written first; the reverse is not guaranteed, so readers must
/// tolerate a key whose object has been removed out-of-band.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub storage_key: String,
    pub url: String,
    pub description: Option<String>,
    pub moderation: ModerationOutcome,
    pub created_at: DateTime<Utc>,
}

/// Outcome of the moderation gate, stored alongside the photo
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationOutcome {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<ModerationLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

/// A single classifier label with its confidence (0-100)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationLabel {
    pub name: String,
    pub confidence: f32,
}

/// Gallery listing item: photo plus its owner's display form
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryPhoto {
    pub id: Uuid,
    pub url: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user: PhotoOwner,
}

/// Display form of a photo's owner
#[derive(Debug, Clone, Serialize)]
pub struct PhotoOwner {
    pub name: String,
    pub avatar: Option<String>,
}

impl PhotoOwner {
    /// Build the display form from profile name parts, falling back to
    /// "Anonymous" when no usable name is present
    pub fn from_profile(
        first_name: Option<String>,
        last_name: Option<String>,
        avatar: Option<String>,
    ) -> Self {
        let first = first_name.filter(|s| !s.is_empty());
        let last = last_name.filter(|s| !s.is_empty());

        let name = match (first, last) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first,
            _ => "Anonymous".to_string(),
        };

        Self { name, avatar }
    }
}

/// Query parameters for the gallery listing
#[derive(Debug, Clone, Deserialize)]
pub struct GalleryQuery {
    /// Page number (1-based)
    pub page: Option<u32>,
    /// Number of items per page
    pub limit: Option<u32>,
    /// Short-circuit to pagination metadata only
    pub count: Option<bool>,
}

/// Pagination metadata returned with every gallery page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub pages: i64,
    pub current_page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn new(total: i64, page: u32, limit: u32) -> Self {
        let pages = if total == 0 {
            0
        } else {
            (total + limit as i64 - 1) / limit as i64
        };

        Self {
            total,
            pages,
            current_page: page,
            limit,
        }
    }

    /// Whether another page may exist. Infinite-scroll consumers must check
    /// both conditions: under concurrent inserts a full page alone does not
    /// imply more content, and the page count alone can be stale.
    pub fn has_more(&self, fetched: usize) -> bool {
        fetched as u32 == self.limit && (self.current_page as i64) < self.pages
    }
}

/// Floor the caller-supplied page number at 1
pub fn clamp_page(page: Option<u32>) -> u32 {
    page.unwrap_or(1).max(1)
}

/// Clamp the caller-supplied page size to a sane maximum to bound response cost
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Response for the gallery listing
#[derive(Debug, Serialize)]
pub struct GalleryListResponse {
    pub photos: Vec<GalleryPhoto>,
    pub pagination: Pagination,
}

/// Batch request naming a set of photos
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoIdsRequest {
    pub photo_ids: Vec<Uuid>,
}

/// Response for a successful upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub photo: UploadedPhoto,
}

/// The subset of photo fields echoed back after an upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPhoto {
    pub id: Uuid,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rounds_page_count_up() {
        assert_eq!(Pagination::new(0, 1, 12).pages, 0);
        assert_eq!(Pagination::new(1, 1, 12).pages, 1);
        assert_eq!(Pagination::new(12, 1, 12).pages, 1);
        assert_eq!(Pagination::new(13, 1, 12).pages, 2);
        assert_eq!(Pagination::new(25, 3, 12).pages, 3);
    }

    #[test]
    fn clamps_page_and_limit() {
        assert_eq!(clamp_page(None), 1);
        assert_eq!(clamp_page(Some(0)), 1);
        assert_eq!(clamp_page(Some(7)), 7);

        assert_eq!(clamp_limit(None), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(1000)), MAX_PAGE_SIZE);
        assert_eq!(clamp_limit(Some(30)), 30);
    }

    #[test]
    fn has_more_requires_full_page_and_remaining_pages() {
        let pagination = Pagination::new(25, 1, 12);
        assert!(pagination.has_more(12));
        assert!(!pagination.has_more(11));

        let last_page = Pagination::new(24, 2, 12);
        assert!(!last_page.has_more(12));
    }

    #[test]
    fn owner_name_falls_back_to_anonymous() {
        let anonymous = PhotoOwner::from_profile(None, Some("Doe".to_string()), None);
        assert_eq!(anonymous.name, "Anonymous");

        let empty = PhotoOwner::from_profile(Some(String::new()), None, None);
        assert_eq!(empty.name, "Anonymous");

        let first_only = PhotoOwner::from_profile(Some("Jo".to_string()), None, None);
        assert_eq!(first_only.name, "Jo");

        let full = PhotoOwner::from_profile(
            Some("Jo".to_string()),
            Some("Doe".to_string()),
            Some("https://cdn.example/avatar.png".to_string()),
        );
        assert_eq!(full.name, "Jo Doe");
        assert!(full.avatar.is_some());
    }
}
