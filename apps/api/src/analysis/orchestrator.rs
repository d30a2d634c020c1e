//! Analysis workflow — takes one résumé from upload to a persisted, reviewed record.
//!
//! Flow: upload résumé → render page one → upload image → persist draft →
//!       inference → extract & parse feedback → persist final record.
//!
//! Every stage waits for the previous one and the first failure ends the run.
//! Nothing is retried and completed stages are not rolled back: a failed run can
//! leave uploaded blobs and a draft record behind.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::models::{AnalysisRecord, AnalysisRequest, Feedback, RecordFeedback};
use crate::analysis::prompts::prepare_instructions;
use crate::analysis::renderer::{DocumentRenderer, RenderError};
use crate::llm_client::strip_json_fences;
use crate::platform::{ContentError, Document};
use crate::store::adapters::CapabilityError;
use crate::store::Store;

/// A failed run. `Display` is the status text shown to the user; the cause is
/// kept as the source for logs.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Error: Failed to upload file")]
    Upload(#[source] CapabilityError),

    #[error("Error: Failed to convert PDF to image")]
    Convert(#[source] RenderError),

    #[error("Error: Failed to upload image")]
    ImageUpload(#[source] CapabilityError),

    #[error("Error: Failed to prepare data")]
    Encode(#[source] serde_json::Error),

    #[error("Error: Failed to save analysis")]
    PersistDraft(#[source] CapabilityError),

    #[error("Error: Failed to analyze resume")]
    Inference(#[source] CapabilityError),

    #[error("Error: Failed to read analysis response")]
    Unreadable(#[source] ContentError),

    #[error("Error: Failed to parse analysis feedback")]
    Parse(#[source] serde_json::Error),

    #[error("Error: Failed to save feedback")]
    PersistFinal(#[source] CapabilityError),
}

pub const STATUS_IDLE: &str = "";
pub const STATUS_UPLOADING: &str = "Uploading the file...";
pub const STATUS_CONVERTING: &str = "Converting to image...";
pub const STATUS_UPLOADING_IMAGE: &str = "Uploading the image...";
pub const STATUS_PREPARING: &str = "Preparing data...";
pub const STATUS_ANALYZING: &str = "Analyzing...";
pub const STATUS_READING: &str = "Reading feedback...";
pub const STATUS_SAVING: &str = "Saving feedback...";
pub const STATUS_COMPLETE: &str = "Analysis complete";

pub struct AnalysisWorkflow {
    store: Arc<Store>,
    renderer: Arc<dyn DocumentRenderer>,
    status: watch::Sender<String>,
    #[cfg(test)]
    history: std::sync::Mutex<Vec<String>>,
}

impl AnalysisWorkflow {
    pub fn new(store: Arc<Store>, renderer: Arc<dyn DocumentRenderer>) -> Self {
        let (status, _) = watch::channel(STATUS_IDLE.to_string());
        Self {
            store,
            renderer,
            status,
            #[cfg(test)]
            history: std::sync::Mutex::default(),
        }
    }

    /// The most recent status text of any run.
    pub fn status(&self) -> String {
        self.status.borrow().clone()
    }

    fn set_status(&self, text: impl Into<String>) {
        let text = text.into();
        info!("Analysis status: {text}");
        #[cfg(test)]
        self.history.lock().unwrap().push(text.clone());
        self.status.send_replace(text);
    }

    fn abort(&self, error: AnalysisError) -> AnalysisError {
        match std::error::Error::source(&error) {
            Some(cause) => warn!("{error} ({cause})"),
            None => warn!("{error}"),
        }
        self.set_status(error.to_string());
        error
    }

    /// Runs every stage for `document`. Each call builds its own record, so
    /// concurrent runs never share one.
    pub async fn analyze(
        &self,
        request: AnalysisRequest,
        document: Document,
    ) -> Result<AnalysisRecord, AnalysisError> {
        // Stage 1: upload the original
        self.set_status(STATUS_UPLOADING);
        let resume = self
            .store
            .fs_upload(document.clone())
            .await
            .map_err(|e| self.abort(AnalysisError::Upload(e)))?;

        // Stage 2: render page one
        self.set_status(STATUS_CONVERTING);
        let image = self
            .renderer
            .render_first_page(&document)
            .await
            .map_err(|e| self.abort(AnalysisError::Convert(e)))?;

        // Stage 3: upload the image
        self.set_status(STATUS_UPLOADING_IMAGE);
        let image = self
            .store
            .fs_upload(image)
            .await
            .map_err(|e| self.abort(AnalysisError::ImageUpload(e)))?;

        // Stage 4: persist the draft so it survives a failed inference
        self.set_status(STATUS_PREPARING);
        let mut record = AnalysisRecord {
            id: Uuid::new_v4(),
            resume_path: resume.path,
            image_path: image.path,
            company_name: request.company_name,
            job_title: request.job_title,
            job_description: request.job_description,
            feedback: RecordFeedback::default(),
        };
        self.persist(&record, AnalysisError::PersistDraft)
            .await
            .map_err(|e| self.abort(e))?;

        // Stage 5: inference
        self.set_status(STATUS_ANALYZING);
        let instructions = prepare_instructions(&record.job_title, &record.job_description);
        let response = self
            .store
            .ai_feedback(&record.resume_path, &instructions)
            .await
            .map_err(|e| self.abort(AnalysisError::Inference(e)))?;

        // Stage 6: extract and parse
        self.set_status(STATUS_READING);
        let text = response
            .message
            .content
            .extract_text()
            .map_err(|e| self.abort(AnalysisError::Unreadable(e)))?;
        let feedback: Feedback = serde_json::from_str(strip_json_fences(text))
            .map_err(|e| self.abort(AnalysisError::Parse(e)))?;
        record.feedback = RecordFeedback::Complete(Box::new(feedback));

        // Stage 7: persist the final record under the same key
        self.set_status(STATUS_SAVING);
        self.persist(&record, AnalysisError::PersistFinal)
            .await
            .map_err(|e| self.abort(e))?;

        self.set_status(STATUS_COMPLETE);
        info!("Analysis {} stored for {}", record.id, record.company_name);
        Ok(record)
    }

    /// Writes `record` under its key; `stage_error` classifies a storage failure.
    async fn persist(
        &self,
        record: &AnalysisRecord,
        stage_error: fn(CapabilityError) -> AnalysisError,
    ) -> Result<(), AnalysisError> {
        let json = serde_json::to_string(record).map_err(AnalysisError::Encode)?;
        self.store
            .kv_set(&record.key(), &json)
            .await
            .map_err(stage_error)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::analysis::models::{record_key, sample_feedback};
    use crate::platform::memory::{test_platform, MemoryBlobStore, MemoryKeyValue};
    use crate::platform::{
        Attachment, ChatMessage, ChatRequest, ChatResponse, ContentPart, Inference,
        KeyValueStore, KvListing, MessageContent, Platform, PlatformError,
    };
    use crate::store::tests::ready_store;

    /// Key-value store that records every `set`.
    #[derive(Default)]
    struct RecordingKv {
        inner: MemoryKeyValue,
        sets: Mutex<Vec<(String, String)>>,
    }

    impl RecordingKv {
        fn sets(&self) -> Vec<(String, String)> {
            self.sets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl KeyValueStore for RecordingKv {
        async fn get(&self, key: &str) -> Result<Option<String>, PlatformError> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str) -> Result<(), PlatformError> {
            self.sets
                .lock()
                .unwrap()
                .push((key.to_string(), value.to_string()));
            self.inner.set(key, value).await
        }
        async fn delete(&self, key: &str) -> Result<bool, PlatformError> {
            self.inner.delete(key).await
        }
        async fn list(
            &self,
            pattern: &str,
            with_values: bool,
        ) -> Result<KvListing, PlatformError> {
            self.inner.list(pattern, with_values).await
        }
        async fn flush(&self) -> Result<(), PlatformError> {
            self.inner.flush().await
        }
    }

    /// Inference that answers every chat with fixed content and remembers the requests.
    struct ScriptedInference {
        content: MessageContent,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedInference {
        fn new(content: MessageContent) -> Self {
            Self {
                content,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Inference for ScriptedInference {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, PlatformError> {
            self.requests.lock().unwrap().push(request);
            Ok(ChatResponse {
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content: self.content.clone(),
                },
            })
        }

        async fn img2txt(&self, _media_type: &str, _image: Bytes) -> Result<String, PlatformError> {
            Ok(String::new())
        }
    }

    struct StaticRenderer;

    #[async_trait]
    impl DocumentRenderer for StaticRenderer {
        async fn render_first_page(&self, document: &Document) -> Result<Document, RenderError> {
            Ok(Document::new(
                crate::analysis::renderer::image_name(&document.name),
                "image/png",
                Bytes::from_static(b"\x89PNG"),
            ))
        }
    }

    struct BrokenRenderer;

    #[async_trait]
    impl DocumentRenderer for BrokenRenderer {
        async fn render_first_page(&self, _document: &Document) -> Result<Document, RenderError> {
            Err(RenderError::Empty)
        }
    }

    struct Harness {
        workflow: AnalysisWorkflow,
        kv: Arc<RecordingKv>,
        blobs: Arc<MemoryBlobStore>,
        ai: Arc<ScriptedInference>,
    }

    async fn harness(content: MessageContent, renderer: Arc<dyn DocumentRenderer>) -> Harness {
        let kv = Arc::new(RecordingKv::default());
        let blobs = Arc::new(MemoryBlobStore::new());
        let ai = Arc::new(ScriptedInference::new(content));
        let platform = Platform {
            kv: kv.clone(),
            blobs: blobs.clone(),
            ai: ai.clone(),
            ..test_platform()
        };
        let store = Arc::new(ready_store(platform).await);
        Harness {
            workflow: AnalysisWorkflow::new(store, renderer),
            kv,
            blobs,
            ai,
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            company_name: "Acme".to_string(),
            job_title: "Engineer".to_string(),
            job_description: "Build reliable Rust services.".to_string(),
        }
    }

    fn resume() -> Document {
        Document::new("cv.pdf", "application/pdf", Bytes::from_static(b"%PDF-1.7"))
    }

    fn feedback_json() -> String {
        serde_json::to_string(&sample_feedback()).unwrap()
    }

    #[tokio::test]
    async fn test_successful_run_persists_draft_then_final_under_one_key() {
        let text = feedback_json();
        let h = harness(MessageContent::Text(text.clone()), Arc::new(StaticRenderer)).await;

        let record = h.workflow.analyze(request(), resume()).await.unwrap();

        let sets = h.kv.sets();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].0, record_key(record.id));
        assert_eq!(sets[1].0, sets[0].0);

        let draft: serde_json::Value = serde_json::from_str(&sets[0].1).unwrap();
        assert_eq!(draft["feedback"], "");
        let last: serde_json::Value = serde_json::from_str(&sets[1].1).unwrap();
        let expected: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(last["feedback"], expected);

        assert_eq!(record.company_name, "Acme");
        assert!(record.resume_path.ends_with("/cv.pdf"));
        assert!(record.image_path.ends_with("/cv.png"));
        assert_eq!(h.blobs.len().await, 2);
        assert_eq!(h.workflow.status(), STATUS_COMPLETE);
    }

    #[tokio::test]
    async fn test_every_stage_publishes_its_status_in_order() {
        let h = harness(MessageContent::Text(feedback_json()), Arc::new(StaticRenderer)).await;

        h.workflow.analyze(request(), resume()).await.unwrap();

        assert_eq!(
            *h.workflow.history.lock().unwrap(),
            vec![
                STATUS_UPLOADING,
                STATUS_CONVERTING,
                STATUS_UPLOADING_IMAGE,
                STATUS_PREPARING,
                STATUS_ANALYZING,
                STATUS_READING,
                STATUS_SAVING,
                STATUS_COMPLETE,
            ]
        );
    }

    #[tokio::test]
    async fn test_parse_failure_is_reported_after_reading_status() {
        let h = harness(
            MessageContent::Text("not-json".to_string()),
            Arc::new(StaticRenderer),
        )
        .await;

        let err = h.workflow.analyze(request(), resume()).await.unwrap_err();

        let history = h.workflow.history.lock().unwrap().clone();
        let tail = &history[history.len() - 3..];
        assert_eq!(tail[0], STATUS_ANALYZING);
        assert_eq!(tail[1], STATUS_READING);
        assert_eq!(tail[2], err.to_string());
    }

    #[tokio::test]
    async fn test_inference_gets_stored_resume_and_composed_instructions() {
        let h = harness(MessageContent::Text(feedback_json()), Arc::new(StaticRenderer)).await;

        let record = h.workflow.analyze(request(), resume()).await.unwrap();

        let requests = h.ai.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].attachment,
            Some(Attachment::StoredFile {
                path: record.resume_path.clone()
            })
        );
        assert!(requests[0].prompt.contains("Job title: Engineer"));
    }

    #[tokio::test]
    async fn test_list_shaped_response_uses_first_part() {
        let content = MessageContent::Parts(vec![
            ContentPart {
                part_type: "text".to_string(),
                text: Some(format!("```json\n{}\n```", feedback_json())),
            },
            ContentPart {
                part_type: "text".to_string(),
                text: Some("ignored".to_string()),
            },
        ]);
        let h = harness(content, Arc::new(StaticRenderer)).await;

        let record = h.workflow.analyze(request(), resume()).await.unwrap();

        assert_eq!(
            record.feedback,
            RecordFeedback::Complete(Box::new(sample_feedback()))
        );
    }

    #[tokio::test]
    async fn test_unparsable_feedback_is_terminal_and_leaves_draft() {
        let content = MessageContent::Parts(vec![ContentPart {
            part_type: "text".to_string(),
            text: Some("not-json".to_string()),
        }]);
        let h = harness(content, Arc::new(StaticRenderer)).await;

        let err = h.workflow.analyze(request(), resume()).await.unwrap_err();

        assert!(matches!(err, AnalysisError::Parse(_)));
        assert_eq!(h.workflow.status(), err.to_string());
        let sets = h.kv.sets();
        assert_eq!(sets.len(), 1, "only the draft is written");
        let stored = h.kv.get(&sets[0].0).await.unwrap().unwrap();
        let stored: AnalysisRecord = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored.feedback, RecordFeedback::default());
    }

    #[tokio::test]
    async fn test_conversion_failure_stops_before_later_stages() {
        let h = harness(MessageContent::Text(feedback_json()), Arc::new(BrokenRenderer)).await;

        let err = h.workflow.analyze(request(), resume()).await.unwrap_err();

        assert!(matches!(err, AnalysisError::Convert(_)));
        assert_eq!(h.workflow.status(), "Error: Failed to convert PDF to image");
        assert_eq!(h.blobs.len().await, 1, "original upload is not rolled back");
        assert!(h.kv.sets().is_empty());
        assert!(h.ai.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_response_list_is_reported() {
        let h = harness(MessageContent::Parts(vec![]), Arc::new(StaticRenderer)).await;

        let err = h.workflow.analyze(request(), resume()).await.unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::Unreadable(ContentError::EmptyParts)
        ));
        assert_eq!(h.kv.sets().len(), 1);
    }

    #[tokio::test]
    async fn test_inference_failure_keeps_draft_recoverable() {
        let kv = Arc::new(RecordingKv::default());
        let platform = Platform {
            kv: kv.clone(),
            ..test_platform()
        };
        let store = Arc::new(ready_store(platform).await);
        let workflow = AnalysisWorkflow::new(store.clone(), Arc::new(StaticRenderer));

        let err = workflow.analyze(request(), resume()).await.unwrap_err();

        assert!(matches!(err, AnalysisError::Inference(_)));
        assert_eq!(workflow.status(), "Error: Failed to analyze resume");
        assert_eq!(kv.sets().len(), 1);
        assert!(store.snapshot().last_error.is_some());
    }

    #[tokio::test]
    async fn test_upload_before_capabilities_ready_fails_first_stage() {
        let slot = Arc::new(crate::platform::PlatformSlot::new());
        slot.install(test_platform());
        let store = Arc::new(Store::new(slot));
        let workflow = AnalysisWorkflow::new(store, Arc::new(StaticRenderer));

        let err = workflow.analyze(request(), resume()).await.unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::Upload(CapabilityError::Unavailable)
        ));
        assert_eq!(workflow.status(), "Error: Failed to upload file");
    }

    #[tokio::test]
    async fn test_concurrent_runs_create_distinct_records() {
        let h = harness(MessageContent::Text(feedback_json()), Arc::new(StaticRenderer)).await;

        let (a, b) = tokio::join!(
            h.workflow.analyze(request(), resume()),
            h.workflow.analyze(request(), resume())
        );

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.id, b.id);
        assert_eq!(h.kv.sets().len(), 4);
    }
}
