//! Platform client — the remote capabilities the rest of the app is built on.
//!
//! Four capability groups: identity, blob storage, AI inference, key-value.
//! Each is a trait object so hosted and in-process backends are interchangeable.
//! The client only counts as "present" once it has been installed into a
//! [`PlatformSlot`]; the capability gate polls the slot.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::user::Identity;

pub mod anthropic;
pub mod connect;
pub mod memory;
pub mod pg_identity;
pub mod redis_kv;
pub mod s3_blob;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("not signed in")]
    NotSignedIn,

    #[error("identity backend error: {0}")]
    Identity(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("key-value error: {0}")]
    KeyValue(String),

    #[error("inference error: {0}")]
    Inference(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Capability payloads
// ────────────────────────────────────────────────────────────────────────────

/// A raw file handed to the platform: an uploaded résumé or a rendered page.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl Document {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn is_pdf(&self) -> bool {
        self.content_type == "application/pdf" || self.name.to_ascii_lowercase().ends_with(".pdf")
    }
}

/// Reference to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
}

/// Blob contents as read back from storage.
#[derive(Debug, Clone)]
pub struct Blob {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
}

/// Result of a key-value listing: keys only (the default) or full entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum KvListing {
    Keys(Vec<String>),
    Entries(Vec<KvEntry>),
}

/// What a chat request attaches alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// A blob already in storage, resolved by the inference backend.
    StoredFile { path: String },
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    pub attachment: Option<Attachment>,
    pub model: Option<String>,
}

/// One element of a list-shaped inference response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default = "default_part_type")]
    pub part_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

fn default_part_type() -> String {
    "text".to_string()
}

/// The content of an inference response. Backends answer with either a bare
/// string or a list of parts whose first element carries the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("response content list is empty")]
    EmptyParts,

    #[error("first response part ({0}) carries no text")]
    FirstPartWithoutText(String),
}

impl MessageContent {
    /// Extracts the text payload. Only the first list element is consulted.
    pub fn extract_text(&self) -> Result<&str, ContentError> {
        match self {
            MessageContent::Text(text) => Ok(text.as_str()),
            MessageContent::Parts(parts) => {
                let first = parts.first().ok_or(ContentError::EmptyParts)?;
                first
                    .text
                    .as_deref()
                    .ok_or_else(|| ContentError::FirstPartWithoutText(first.part_type.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
}

// ────────────────────────────────────────────────────────────────────────────
// Capability traits
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn is_signed_in(&self) -> Result<bool, PlatformError>;
    async fn get_user(&self) -> Result<Identity, PlatformError>;
    async fn sign_in(&self) -> Result<(), PlatformError>;
    async fn sign_out(&self) -> Result<(), PlatformError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `document` at an explicit path, replacing anything already there.
    async fn write(&self, path: &str, document: Document) -> Result<BlobRef, PlatformError>;
    async fn read(&self, path: &str) -> Result<Blob, PlatformError>;
    /// Stores `document` under a fresh upload path chosen by the backend.
    async fn upload(&self, document: Document) -> Result<BlobRef, PlatformError>;
    async fn delete(&self, path: &str) -> Result<(), PlatformError>;
    /// Lists blobs whose path starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobRef>, PlatformError>;
}

#[async_trait]
pub trait Inference: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, PlatformError>;
    async fn img2txt(&self, media_type: &str, image: Bytes) -> Result<String, PlatformError>;
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PlatformError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), PlatformError>;
    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, PlatformError>;
    /// `pattern` is a glob where `*` matches any run of characters.
    async fn list(&self, pattern: &str, with_values: bool) -> Result<KvListing, PlatformError>;
    async fn flush(&self) -> Result<(), PlatformError>;
}

/// The assembled platform client.
#[derive(Clone)]
pub struct Platform {
    pub identity: Arc<dyn IdentityProvider>,
    pub blobs: Arc<dyn BlobStore>,
    pub ai: Arc<dyn Inference>,
    pub kv: Arc<dyn KeyValueStore>,
}

/// Where the capability gate looks for the platform client.
pub trait PlatformHost: Send + Sync {
    fn client(&self) -> Option<Arc<Platform>>;
}

/// A host whose client appears once something installs it.
#[derive(Default)]
pub struct PlatformSlot {
    client: RwLock<Option<Arc<Platform>>>,
}

impl PlatformSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, platform: Platform) {
        match self.client.write() {
            Ok(mut slot) => *slot = Some(Arc::new(platform)),
            Err(poisoned) => *poisoned.into_inner() = Some(Arc::new(platform)),
        }
    }
}

impl PlatformHost for PlatformSlot {
    fn client(&self) -> Option<Arc<Platform>> {
        match self.client.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Glob match supporting `*` only, the subset key-value patterns use.
pub fn glob_matches(pattern: &str, candidate: &str) -> bool {
    let mut segments = pattern.split('*');
    let first = segments.next().unwrap_or_default();
    let Some(mut rest) = candidate.strip_prefix(first) else {
        return false;
    };
    let segments: Vec<&str> = segments.collect();
    let Some((last, middle)) = segments.split_last() else {
        // No '*' in the pattern: exact match.
        return rest.is_empty();
    };
    for segment in middle {
        match rest.find(segment) {
            Some(idx) => rest = &rest[idx + segment.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
