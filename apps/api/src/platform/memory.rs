//! In-process backends for identity, blobs and key-value.
//!
//! Used when `PLATFORM=memory` and by tests. State lives for the life of the process.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::user::Identity;
use crate::platform::{
    glob_matches, Blob, BlobRef, BlobStore, Document, IdentityProvider, KeyValueStore, KvEntry,
    KvListing, PlatformError,
};

/// Prefix under which `upload` places new blobs.
pub const UPLOAD_ROOT: &str = "uploads/";

pub struct MemoryIdentity {
    user: Identity,
    signed_in: RwLock<bool>,
}

impl MemoryIdentity {
    pub fn new(user: Identity) -> Self {
        Self {
            user,
            signed_in: RwLock::new(false),
        }
    }

    /// An identity provider that already has a live session.
    pub fn signed_in(user: Identity) -> Self {
        Self {
            user,
            signed_in: RwLock::new(true),
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn is_signed_in(&self) -> Result<bool, PlatformError> {
        Ok(*self.signed_in.read().await)
    }

    async fn get_user(&self) -> Result<Identity, PlatformError> {
        if *self.signed_in.read().await {
            Ok(self.user.clone())
        } else {
            Err(PlatformError::NotSignedIn)
        }
    }

    async fn sign_in(&self) -> Result<(), PlatformError> {
        *self.signed_in.write().await = true;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), PlatformError> {
        *self.signed_in.write().await = false;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Blob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

fn blob_ref(path: &str, blob: &Blob) -> BlobRef {
    BlobRef {
        path: path.to_string(),
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        size: blob.bytes.len() as u64,
        content_type: blob.content_type.clone(),
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write(&self, path: &str, document: Document) -> Result<BlobRef, PlatformError> {
        let blob = Blob {
            content_type: Some(document.content_type),
            bytes: document.bytes,
        };
        let reference = blob_ref(path, &blob);
        self.blobs.write().await.insert(path.to_string(), blob);
        Ok(reference)
    }

    async fn read(&self, path: &str) -> Result<Blob, PlatformError> {
        self.blobs
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(path.to_string()))
    }

    async fn upload(&self, document: Document) -> Result<BlobRef, PlatformError> {
        let path = format!("{UPLOAD_ROOT}{}/{}", Uuid::new_v4(), document.name);
        self.write(&path, document).await
    }

    async fn delete(&self, path: &str) -> Result<(), PlatformError> {
        self.blobs
            .write()
            .await
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| PlatformError::NotFound(path.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobRef>, PlatformError> {
        Ok(self
            .blobs
            .read()
            .await
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, blob)| blob_ref(path, blob))
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryKeyValue {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValue {
    async fn get(&self, key: &str) -> Result<Option<String>, PlatformError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PlatformError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, PlatformError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn list(&self, pattern: &str, with_values: bool) -> Result<KvListing, PlatformError> {
        let entries = self.entries.read().await;
        let mut matched: Vec<(&String, &String)> = entries
            .iter()
            .filter(|(key, _)| glob_matches(pattern, key))
            .collect();
        matched.sort_by(|a, b| a.0.cmp(b.0));

        Ok(if with_values {
            KvListing::Entries(
                matched
                    .into_iter()
                    .map(|(key, value)| KvEntry {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            )
        } else {
            KvListing::Keys(matched.into_iter().map(|(key, _)| key.clone()).collect())
        })
    }

    async fn flush(&self) -> Result<(), PlatformError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// A fully in-memory platform with an inference backend that always fails.
/// Tests that need inference swap in their own.
#[cfg(test)]
pub fn test_platform() -> crate::platform::Platform {
    use std::sync::Arc;

    struct NoInference;

    #[async_trait]
    impl crate::platform::Inference for NoInference {
        async fn chat(
            &self,
            _request: crate::platform::ChatRequest,
        ) -> Result<crate::platform::ChatResponse, PlatformError> {
            Err(PlatformError::Inference("no inference in tests".to_string()))
        }

        async fn img2txt(
            &self,
            _media_type: &str,
            _image: bytes::Bytes,
        ) -> Result<String, PlatformError> {
            Err(PlatformError::Inference("no inference in tests".to_string()))
        }
    }

    crate::platform::Platform {
        identity: Arc::new(MemoryIdentity::new(Identity::new("u1", "tester"))),
        blobs: Arc::new(MemoryBlobStore::new()),
        ai: Arc::new(NoInference),
        kv: Arc::new(MemoryKeyValue::new()),
    }
}
