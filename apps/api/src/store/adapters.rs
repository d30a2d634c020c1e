//! Capability adapters — blob storage, inference and key-value bound to the
//! gated platform client.
//!
//! Every operation follows the same contract: before the gate opens it makes no
//! platform call and returns `CapabilityError::Unavailable`; a platform failure
//! is recorded as the store's last error and returned as
//! `CapabilityError::Failed`. Nothing is retried here.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::platform::{
    Attachment, Blob, BlobRef, ChatRequest, ChatResponse, Document, KvListing, Platform,
    PlatformError,
};
use crate::store::{Store, CAPABILITIES_NOT_READY};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("platform capabilities are not ready")]
    Unavailable,

    #[error("{0}")]
    Failed(String),
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

impl Store {
    async fn with_capability<T, F, Fut>(&self, operation: &str, call: F) -> CapabilityResult<T>
    where
        F: FnOnce(Arc<Platform>) -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        let Some(platform) = self.ready_platform() else {
            self.set_error(CAPABILITIES_NOT_READY);
            return Err(CapabilityError::Unavailable);
        };

        call(platform).await.map_err(|e| {
            let message = format!("{operation} failed: {e}");
            self.set_error(message.clone());
            CapabilityError::Failed(message)
        })
    }

    // ── Blob storage ──────────────────────────────────────────────────────

    #[allow(dead_code)]
    pub async fn fs_write(&self, path: &str, document: Document) -> CapabilityResult<BlobRef> {
        self.with_capability("fs.write", |p| async move { p.blobs.write(path, document).await })
            .await
    }

    pub async fn fs_read(&self, path: &str) -> CapabilityResult<Blob> {
        self.with_capability("fs.read", |p| async move { p.blobs.read(path).await })
            .await
    }

    pub async fn fs_upload(&self, document: Document) -> CapabilityResult<BlobRef> {
        self.with_capability("fs.upload", |p| async move { p.blobs.upload(document).await })
            .await
    }

    pub async fn fs_delete(&self, path: &str) -> CapabilityResult<()> {
        self.with_capability("fs.delete", |p| async move { p.blobs.delete(path).await })
            .await
    }

    pub async fn fs_list(&self, prefix: &str) -> CapabilityResult<Vec<BlobRef>> {
        self.with_capability("fs.list", |p| async move { p.blobs.list(prefix).await })
            .await
    }

    // ── Inference ─────────────────────────────────────────────────────────

    pub async fn ai_chat(&self, request: ChatRequest) -> CapabilityResult<ChatResponse> {
        self.with_capability("ai.chat", |p| async move { p.ai.chat(request).await })
            .await
    }

    /// Chat about a stored document: the file at `path` is attached to `message`.
    pub async fn ai_feedback(&self, path: &str, message: &str) -> CapabilityResult<ChatResponse> {
        self.ai_chat(ChatRequest {
            prompt: message.to_string(),
            attachment: Some(Attachment::StoredFile {
                path: path.to_string(),
            }),
            model: None,
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn ai_img2txt(&self, media_type: &str, image: Bytes) -> CapabilityResult<String> {
        self.with_capability("ai.img2txt", |p| async move {
            p.ai.img2txt(media_type, image).await
        })
        .await
    }

    // ── Key-value ─────────────────────────────────────────────────────────

    pub async fn kv_get(&self, key: &str) -> CapabilityResult<Option<String>> {
        self.with_capability("kv.get", |p| async move { p.kv.get(key).await })
            .await
    }

    pub async fn kv_set(&self, key: &str, value: &str) -> CapabilityResult<()> {
        self.with_capability("kv.set", |p| async move { p.kv.set(key, value).await })
            .await
    }

    #[allow(dead_code)]
    pub async fn kv_delete(&self, key: &str) -> CapabilityResult<bool> {
        self.with_capability("kv.delete", |p| async move { p.kv.delete(key).await })
            .await
    }

    /// Keys matching `pattern`.
    #[allow(dead_code)]
    pub async fn kv_list(&self, pattern: &str) -> CapabilityResult<Vec<String>> {
        let listing = self
            .with_capability("kv.list", |p| async move { p.kv.list(pattern, false).await })
            .await?;
        Ok(match listing {
            KvListing::Keys(keys) => keys,
            KvListing::Entries(entries) => entries.into_iter().map(|e| e.key).collect(),
        })
    }

    /// Keys and values matching `pattern`.
    pub async fn kv_list_with_values(&self, pattern: &str) -> CapabilityResult<KvListing> {
        self.with_capability("kv.list", |p| async move { p.kv.list(pattern, true).await })
            .await
    }

    pub async fn kv_flush(&self) -> CapabilityResult<()> {
        self.with_capability("kv.flush", |p| async move { p.kv.flush().await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::platform::memory::test_platform;
    use crate::platform::{KeyValueStore, PlatformSlot};
    use crate::store::tests::{assert_error_invariant, ready_store};

    /// Key-value store that counts calls and fails every one of them.
    #[derive(Default)]
    struct FailingKv {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeyValueStore for FailingKv {
        async fn get(&self, _key: &str) -> Result<Option<String>, PlatformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PlatformError::KeyValue("connection refused".to_string()))
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<(), PlatformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PlatformError::KeyValue("connection refused".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<bool, PlatformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PlatformError::KeyValue("connection refused".to_string()))
        }
        async fn list(
            &self,
            _pattern: &str,
            _with_values: bool,
        ) -> Result<KvListing, PlatformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PlatformError::KeyValue("connection refused".to_string()))
        }
        async fn flush(&self) -> Result<(), PlatformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PlatformError::KeyValue("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_operations_before_gate_opens_are_unavailable_and_call_nothing() {
        let kv = Arc::new(FailingKv::default());
        let mut platform = test_platform();
        platform.kv = kv.clone();
        let slot = Arc::new(PlatformSlot::new());
        slot.install(platform);
        // init() never ran, so capabilities are not ready even though the client exists.
        let store = Store::new(slot);

        assert_eq!(store.kv_get("k").await, Err(CapabilityError::Unavailable));
        assert_eq!(store.kv_set("k", "v").await, Err(CapabilityError::Unavailable));
        assert_eq!(kv.calls.load(Ordering::SeqCst), 0);

        let state = store.snapshot();
        assert_eq!(state.last_error.as_deref(), Some(CAPABILITIES_NOT_READY));
        assert_error_invariant(&state);
    }

    #[tokio::test]
    async fn test_platform_failure_is_recorded_not_swallowed() {
        let kv = Arc::new(FailingKv::default());
        let mut platform = test_platform();
        platform.kv = kv.clone();
        let store = ready_store(platform).await;

        let result = store.kv_set("record:1", "{}").await;

        match result {
            Err(CapabilityError::Failed(message)) => {
                assert!(message.starts_with("kv.set failed"));
                assert!(message.contains("connection refused"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(kv.calls.load(Ordering::SeqCst), 1, "no retries");
        let state = store.snapshot();
        assert!(state.last_error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_blob_round_trip_through_adapters() {
        let store = ready_store(test_platform()).await;

        let reference = store
            .fs_upload(Document::new(
                "cv.pdf",
                "application/pdf",
                Bytes::from_static(b"%PDF-1.7"),
            ))
            .await
            .unwrap();
        let blob = store.fs_read(&reference.path).await.unwrap();
        assert_eq!(blob.bytes, Bytes::from_static(b"%PDF-1.7"));

        assert_eq!(store.fs_list("uploads/").await.unwrap().len(), 1);
        store.fs_delete(&reference.path).await.unwrap();
        assert!(store.fs_list("uploads/").await.unwrap().is_empty());
        assert_eq!(store.snapshot().last_error, None);
    }

    #[tokio::test]
    async fn test_kv_list_defaults_to_keys() {
        let store = ready_store(test_platform()).await;
        store.kv_set("record:1", "a").await.unwrap();
        store.kv_set("record:2", "b").await.unwrap();
        store.kv_set("draft", "c").await.unwrap();

        assert_eq!(
            store.kv_list("record:*").await.unwrap(),
            vec!["record:1".to_string(), "record:2".to_string()]
        );
        match store.kv_list_with_values("record:*").await.unwrap() {
            KvListing::Entries(entries) => assert_eq!(entries.len(), 2),
            other => panic!("expected entries, got {other:?}"),
        }

        assert!(store.kv_delete("draft").await.unwrap());
        store.kv_flush().await.unwrap();
        assert_eq!(store.kv_get("record:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_inference_failure_is_reported() {
        let store = ready_store(test_platform()).await;

        let result = store.ai_feedback("uploads/x/cv.pdf", "review").await;

        assert!(matches!(result, Err(CapabilityError::Failed(m)) if m.starts_with("ai.chat failed")));
        assert!(matches!(
            store.ai_img2txt("image/png", Bytes::new()).await,
            Err(CapabilityError::Failed(_))
        ));
    }
}
