//! Inference capability on top of the Anthropic Messages API.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use tracing::debug;

use crate::llm_client::prompts::{REVIEW_SYSTEM, TRANSCRIBE_PROMPT, TRANSCRIBE_SYSTEM};
use crate::llm_client::{LlmClient, LlmResponse, RequestBlock, MODEL};
use crate::platform::{
    Attachment, BlobStore, ChatMessage, ChatRequest, ChatResponse, ContentPart, Inference,
    MessageContent, PlatformError,
};

/// How a stored attachment is handed to the model.
#[derive(Debug, PartialEq, Eq)]
enum AttachmentKind {
    /// Sent as extracted text.
    Pdf,
    /// Sent as a base64 image block with this media type.
    Image(String),
}

fn classify_attachment(path: &str, content_type: Option<&str>) -> Option<AttachmentKind> {
    let lower = path.to_ascii_lowercase();
    match content_type {
        Some("application/pdf") => return Some(AttachmentKind::Pdf),
        Some(ct) if ct.starts_with("image/") => return Some(AttachmentKind::Image(ct.to_string())),
        _ => {}
    }
    if lower.ends_with(".pdf") {
        Some(AttachmentKind::Pdf)
    } else if lower.ends_with(".png") {
        Some(AttachmentKind::Image("image/png".to_string()))
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        Some(AttachmentKind::Image("image/jpeg".to_string()))
    } else {
        None
    }
}

fn inference_error(e: impl std::fmt::Display) -> PlatformError {
    PlatformError::Inference(e.to_string())
}

fn into_chat_response(response: LlmResponse) -> ChatResponse {
    let parts = response
        .content
        .into_iter()
        .map(|block| ContentPart {
            part_type: block.block_type,
            text: block.text,
        })
        .collect();

    ChatResponse {
        message: ChatMessage {
            role: "assistant".to_string(),
            content: MessageContent::Parts(parts),
        },
    }
}

pub struct AnthropicInference {
    llm: LlmClient,
    blobs: Arc<dyn BlobStore>,
}

impl AnthropicInference {
    /// `blobs` resolves `Attachment::StoredFile` paths.
    pub fn new(llm: LlmClient, blobs: Arc<dyn BlobStore>) -> Self {
        Self { llm, blobs }
    }

    async fn attachment_block(&self, attachment: Attachment) -> Result<RequestBlock, PlatformError> {
        match attachment {
            Attachment::StoredFile { path } => {
                let blob = self.blobs.read(&path).await?;
                match classify_attachment(&path, blob.content_type.as_deref()) {
                    Some(AttachmentKind::Pdf) => {
                        let bytes = blob.bytes;
                        // pdf-extract is CPU-bound; keep it off the async workers.
                        let text = tokio::task::spawn_blocking(move || {
                            pdf_extract::extract_text_from_mem(&bytes)
                        })
                        .await
                        .map_err(inference_error)?
                        .map_err(|e| inference_error(format!("PDF text extraction failed: {e}")))?;
                        debug!("Extracted {} chars from {path}", text.len());
                        Ok(RequestBlock::text(format!(
                            "<document path=\"{path}\">\n{}\n</document>",
                            text.trim()
                        )))
                    }
                    Some(AttachmentKind::Image(media_type)) => Ok(RequestBlock::image_base64(
                        media_type,
                        BASE64.encode(&blob.bytes),
                    )),
                    None => Err(PlatformError::Inference(format!(
                        "unsupported attachment type for {path}"
                    ))),
                }
            }
        }
    }
}

#[async_trait]
impl Inference for AnthropicInference {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, PlatformError> {
        let mut blocks = Vec::with_capacity(2);
        if let Some(attachment) = request.attachment {
            blocks.push(self.attachment_block(attachment).await?);
        }
        blocks.push(RequestBlock::text(request.prompt));

        let model = request.model.as_deref().unwrap_or(MODEL);
        let response = self
            .llm
            .call(model, REVIEW_SYSTEM, &blocks)
            .await
            .map_err(inference_error)?;

        Ok(into_chat_response(response))
    }

    async fn img2txt(&self, media_type: &str, image: Bytes) -> Result<String, PlatformError> {
        let blocks = [
            RequestBlock::image_base64(media_type, BASE64.encode(&image)),
            RequestBlock::text(TRANSCRIBE_PROMPT),
        ];
        let response = self
            .llm
            .call(MODEL, TRANSCRIBE_SYSTEM, &blocks)
            .await
            .map_err(inference_error)?;

        response
            .text()
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Inference("model returned no text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::MemoryBlobStore;
    use crate::platform::Document;

    #[tokio::test]
    async fn test_stored_image_attachment_becomes_base64_block() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs
            .write(
                "uploads/a/page.png",
                Document::new("page.png", "image/png", Bytes::from_static(b"\x89PNG")),
            )
            .await
            .unwrap();
        let ai = AnthropicInference::new(LlmClient::new("test-key".to_string()), blobs);

        let block = ai
            .attachment_block(Attachment::StoredFile {
                path: "uploads/a/page.png".to_string(),
            })
            .await
            .unwrap();

        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["source"]["media_type"], "image/png");
        assert_eq!(json["source"]["data"], BASE64.encode(b"\x89PNG"));
    }

    #[test]
    fn test_classify_prefers_content_type() {
        assert_eq!(
            classify_attachment("uploads/x/resume", Some("application/pdf")),
            Some(AttachmentKind::Pdf)
        );
        assert_eq!(
            classify_attachment("uploads/x/resume.pdf", Some("image/png")),
            Some(AttachmentKind::Image("image/png".to_string()))
        );
    }

    #[test]
    fn test_classify_falls_back_to_extension() {
        assert_eq!(
            classify_attachment("uploads/x/Resume.PDF", None),
            Some(AttachmentKind::Pdf)
        );
        assert_eq!(
            classify_attachment("uploads/x/page.jpeg", Some("application/octet-stream")),
            Some(AttachmentKind::Image("image/jpeg".to_string()))
        );
        assert_eq!(classify_attachment("uploads/x/notes.txt", None), None);
    }

    #[test]
    fn test_llm_response_becomes_list_content() {
        let response: LlmResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"hello"}],"usage":{"input_tokens":1,"output_tokens":1}}"#,
        )
        .unwrap();
        let chat = into_chat_response(response);
        assert_eq!(chat.message.role, "assistant");
        assert_eq!(chat.message.content.extract_text().unwrap(), "hello");
    }
}
