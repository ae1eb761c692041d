//! Object storage access for photo blobs

use anyhow::Result;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

/// Key-addressed blob store holding the photo objects. Metadata lives
/// elsewhere; writes and deletes against the two stores are not atomic.
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()>;
    async fn get(&self, key: &str) -> Result<ObjectBody>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Body shapes a fetch can come back as. The collaborator does not
/// guarantee a uniform transport shape, so every fetch goes through
/// [`ObjectBody::into_bytes`] instead of being special-cased per call site.
pub enum ObjectBody {
    /// Chunked stream, as returned by the AWS SDK
    Streamed(ByteStream),
    /// Already-buffered contiguous bytes
    Buffered(Bytes),
    /// Lower-level async reader
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl ObjectBody {
    /// Normalize into one contiguous byte sequence
    pub async fn into_bytes(self) -> Result<Bytes> {
        match self {
            ObjectBody::Streamed(stream) => {
                let aggregated = stream.collect().await?;
                Ok(aggregated.into_bytes())
            }
            ObjectBody::Buffered(bytes) => Ok(bytes),
            ObjectBody::Reader(mut reader) => {
                let mut buffer = Vec::new();
                reader.read_to_end(&mut buffer).await?;
                Ok(Bytes::from(buffer))
            }
        }
    }
}

/// S3-backed object store
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    region: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String, region: String) -> Self {
        Self {
            client,
            bucket,
            region,
        }
    }

    /// Public https URL for a stored object
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        )
    }

    /// Storage key for a new upload, namespaced per user, with the
    /// extension taken from the MIME subtype
    pub fn object_key(user_id: Uuid, content_type: &str) -> String {
        let extension = content_type.split('/').nth(1).unwrap_or("jpg");
        format!("photos/{}/{}.{}", user_id, Uuid::new_v4(), extension)
    }
}

impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ObjectBody> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;

        Ok(ObjectBody::Streamed(response.body))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use anyhow::bail;

    use super::*;

    /// In-memory store for unit tests. `get` alternates body shapes so the
    /// normalization path sees more than one of them.
    #[derive(Default)]
    pub struct MemoryObjectStore {
        objects: Mutex<HashMap<String, Bytes>>,
        failing: Mutex<HashSet<String>>,
    }

    impl MemoryObjectStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put_bytes(&self, key: &str, bytes: &[u8]) {
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), Bytes::copy_from_slice(bytes));
        }

        /// Make subsequent `get`/`delete` calls for `key` fail
        pub fn fail_on(&self, key: &str) {
            self.failing.lock().unwrap().insert(key.to_string());
        }

        pub fn contains(&self, key: &str) -> bool {
            self.objects.lock().unwrap().contains_key(key)
        }
    }

    impl ObjectStore for MemoryObjectStore {
        async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<()> {
            self.objects.lock().unwrap().insert(key.to_string(), bytes);
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<ObjectBody> {
            if self.failing.lock().unwrap().contains(key) {
                bail!("simulated fetch failure for {}", key);
            }

            let Some(bytes) = self.objects.lock().unwrap().get(key).cloned() else {
                bail!("no such object: {}", key);
            };

            // Serve even-length bodies as readers, the rest buffered
            if bytes.len() % 2 == 0 {
                Ok(ObjectBody::Reader(Box::new(std::io::Cursor::new(
                    bytes.to_vec(),
                ))))
            } else {
                Ok(ObjectBody::Buffered(bytes))
            }
        }

        async fn delete(&self, key: &str) -> Result<()> {
            if self.failing.lock().unwrap().contains(key) {
                bail!("simulated delete failure for {}", key);
            }

            self.objects.lock().unwrap().remove(key);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryObjectStore;
    use super::*;

    #[tokio::test]
    async fn normalizes_buffered_bodies() {
        let body = ObjectBody::Buffered(Bytes::from_static(b"abc"));
        assert_eq!(body.into_bytes().await.unwrap().as_ref(), b"abc");
    }

    #[tokio::test]
    async fn normalizes_reader_bodies() {
        let body = ObjectBody::Reader(Box::new(std::io::Cursor::new(b"defg".to_vec())));
        assert_eq!(body.into_bytes().await.unwrap().as_ref(), b"defg");
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryObjectStore::new();
        store
            .put(
                "photos/a/b.jpg",
                Bytes::from_static(b"jpeg-bytes"),
                "image/jpeg",
            )
            .await
            .unwrap();

        let fetched = store.get("photos/a/b.jpg").await.unwrap();
        assert_eq!(fetched.into_bytes().await.unwrap().as_ref(), b"jpeg-bytes");

        store.delete("photos/a/b.jpg").await.unwrap();
        assert!(store.get("photos/a/b.jpg").await.is_err());
    }

    #[test]
    fn object_keys_are_namespaced_per_user() {
        let user_id = Uuid::new_v4();
        let key = S3ObjectStore::object_key(user_id, "image/png");

        assert!(key.starts_with(&format!("photos/{}/", user_id)));
        assert!(key.ends_with(".png"));
    }

    #[test]
    fn object_key_extension_falls_back_to_jpg() {
        let key = S3ObjectStore::object_key(Uuid::new_v4(), "image");
        assert!(key.ends_with(".jpg"));
    }
}
