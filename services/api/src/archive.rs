//! Batch download assembly: fetches photo objects and packs them into a
//! single zip archive

use std::io::{Cursor, Write};

use anyhow::{Result, bail};
use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::models::photo::Photo;
use crate::storage::ObjectStore;

/// Photos fetched concurrently per window, bounding concurrent connections
/// to the blob store
const BATCH_SIZE: usize = 5;

/// Manifest entry enumerating requested photos that are absent from the
/// archive, so callers can tell which ids were dropped or skipped
const SKIPPED_MANIFEST: &str = "skipped.txt";

/// A fully assembled archive
pub struct Archive {
    pub bytes: Vec<u8>,
    pub entry_count: usize,
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(6))
}

/// Assemble a zip archive for `photos`, already resolved and in request
/// order. `requested` is the caller's original id list; ids that did not
/// resolve land in the skipped manifest alongside any mid-flight fetch
/// failures. Fails only when not a single entry could be written.
pub async fn build_archive<S: ObjectStore>(
    store: &S,
    requested: &[Uuid],
    photos: &[Photo],
) -> Result<Archive> {
    let mut skipped: Vec<Uuid> = requested
        .iter()
        .filter(|id| !photos.iter().any(|photo| photo.id == **id))
        .copied()
        .collect();

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut entry_count = 0usize;

    for window in photos.chunks(BATCH_SIZE) {
        let fetches = window.iter().map(|photo| async move {
            let body = store.get(&photo.storage_key).await?;
            body.into_bytes().await
        });

        for (photo, fetched) in window.iter().zip(join_all(fetches).await) {
            match fetched {
                Ok(bytes) => {
                    zip.start_file(entry_name(photo), entry_options())?;
                    zip.write_all(&bytes)?;
                    entry_count += 1;
                }
                Err(e) => {
                    warn!("Skipping photo {} in archive: {}", photo.id, e);
                    skipped.push(photo.id);
                }
            }
        }
    }

    if entry_count == 0 {
        bail!("all requested photos failed to fetch");
    }

    if !skipped.is_empty() {
        let manifest = skipped
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join("\n");

        zip.start_file(SKIPPED_MANIFEST, entry_options())?;
        zip.write_all(manifest.as_bytes())?;
    }

    let bytes = zip.finish()?.into_inner();
    info!(
        "Assembled archive with {} entries ({} bytes)",
        entry_count,
        bytes.len()
    );

    Ok(Archive { bytes, entry_count })
}

/// Archive entry name derived from the photo's timestamp and a sanitized
/// description slug, always disambiguated with the first 8 hex chars of
/// the photo id
pub fn entry_name(photo: &Photo) -> String {
    let timestamp = photo.created_at.format("%Y-%m-%d-%H-%M-%S");

    let short_id = photo.id.simple().to_string();
    let short_id = &short_id[..8];

    let extension = photo
        .storage_key
        .rsplit_once('.')
        .map(|(_, extension)| extension)
        .unwrap_or("jpg");

    let slug = photo
        .description
        .as_deref()
        .map(description_slug)
        .filter(|slug| !slug.is_empty());

    match slug {
        Some(slug) => format!("photo-{timestamp}-{slug}-{short_id}.{extension}"),
        None => format!("photo-{timestamp}-{short_id}.{extension}"),
    }
}

/// First 20 characters of the description, anything outside [A-Za-z0-9]
/// replaced with '_'
fn description_slug(description: &str) -> String {
    description
        .chars()
        .take(20)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use chrono::{DateTime, TimeZone, Utc};
    use zip::ZipArchive;

    use super::*;
    use crate::models::photo::ModerationOutcome;
    use crate::storage::testing::MemoryObjectStore;

    fn sample_photo(
        key: &str,
        description: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Photo {
        Photo {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            storage_key: key.to_string(),
            url: format!("https://cdn.test/{key}"),
            description: description.map(str::to_string),
            moderation: ModerationOutcome {
                approved: true,
                labels: Vec::new(),
                rejection_reason: None,
            },
            created_at,
        }
    }

    fn ts(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 18, hour, minute, second)
            .unwrap()
    }

    fn read_archive(archive: Archive) -> ZipArchive<Cursor<Vec<u8>>> {
        ZipArchive::new(Cursor::new(archive.bytes)).unwrap()
    }

    #[tokio::test]
    async fn packs_every_resolved_photo() {
        let store = MemoryObjectStore::new();
        let a = sample_photo("photos/u/a.jpg", Some("Opening night"), ts(9, 0, 0));
        let b = sample_photo("photos/u/b.png", None, ts(9, 0, 1));
        store.put_bytes(&a.storage_key, b"aaa");
        store.put_bytes(&b.storage_key, b"bbbb");

        let requested = [a.id, b.id];
        let archive = build_archive(&store, &requested, &[a.clone(), b.clone()])
            .await
            .unwrap();

        assert_eq!(archive.entry_count, 2);

        let mut zip = read_archive(archive);
        assert!(zip.by_name(&entry_name(&a)).is_ok());
        assert!(zip.by_name(&entry_name(&b)).is_ok());
        assert!(zip.by_name(SKIPPED_MANIFEST).is_err());
    }

    #[tokio::test]
    async fn unresolved_ids_land_in_the_manifest() {
        let store = MemoryObjectStore::new();
        let present = sample_photo("photos/u/a.jpg", None, ts(10, 0, 0));
        store.put_bytes(&present.storage_key, b"aaa");

        let missing = Uuid::new_v4();
        let requested = [present.id, missing];

        let archive = build_archive(&store, &requested, &[present])
            .await
            .unwrap();
        assert_eq!(archive.entry_count, 1);

        let mut zip = read_archive(archive);
        let mut manifest = String::new();
        zip.by_name(SKIPPED_MANIFEST)
            .unwrap()
            .read_to_string(&mut manifest)
            .unwrap();
        assert!(manifest.contains(&missing.to_string()));
    }

    #[tokio::test]
    async fn a_failed_fetch_skips_the_item_and_continues() {
        let store = MemoryObjectStore::new();
        let good = sample_photo("photos/u/a.jpg", None, ts(11, 0, 0));
        let bad = sample_photo("photos/u/b.jpg", None, ts(11, 0, 1));
        store.put_bytes(&good.storage_key, b"aaa");
        store.put_bytes(&bad.storage_key, b"bbb");
        store.fail_on(&bad.storage_key);

        let requested = [good.id, bad.id];
        let archive = build_archive(&store, &requested, &[good.clone(), bad.clone()])
            .await
            .unwrap();

        assert_eq!(archive.entry_count, 1);

        let mut zip = read_archive(archive);
        assert!(zip.by_name(&entry_name(&good)).is_ok());

        let mut manifest = String::new();
        zip.by_name(SKIPPED_MANIFEST)
            .unwrap()
            .read_to_string(&mut manifest)
            .unwrap();
        assert!(manifest.contains(&bad.id.to_string()));
    }

    #[tokio::test]
    async fn fails_when_no_entry_can_be_written() {
        let store = MemoryObjectStore::new();
        let photo = sample_photo("photos/u/a.jpg", None, ts(12, 0, 0));
        store.fail_on(&photo.storage_key);

        let requested = [photo.id];
        assert!(build_archive(&store, &requested, &[photo]).await.is_err());
    }

    #[test]
    fn entry_names_never_collide_for_distinct_timestamps() {
        let a = sample_photo("photos/u/a.jpg", Some("party"), ts(9, 30, 0));
        let b = sample_photo("photos/u/b.jpg", Some("party"), ts(9, 30, 1));

        assert_ne!(entry_name(&a), entry_name(&b));
    }

    #[test]
    fn entry_names_disambiguate_identical_metadata_by_id() {
        let a = sample_photo("photos/u/a.jpg", Some("party"), ts(9, 30, 0));
        let b = sample_photo("photos/u/b.jpg", Some("party"), ts(9, 30, 0));

        assert_ne!(entry_name(&a), entry_name(&b));
    }

    #[test]
    fn entry_name_sanitizes_and_truncates_the_description() {
        let photo = sample_photo(
            "photos/u/a.jpg",
            Some("Hello, World! This is a long description"),
            ts(14, 5, 6),
        );

        let name = entry_name(&photo);
        assert!(name.starts_with("photo-2025-04-18-14-05-06-Hello__World__This_i-"));
        assert!(name.ends_with(".jpg"));
    }

    #[test]
    fn entry_name_falls_back_to_the_id_without_metadata() {
        let photo = sample_photo("photos/u/raw", None, ts(8, 0, 0));
        let short_id = photo.id.simple().to_string();

        let name = entry_name(&photo);
        assert_eq!(
            name,
            format!("photo-2025-04-18-08-00-00-{}.jpg", &short_id[..8])
        );
    }
}
