use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key-value prefix under which analysis records are persisted.
pub const RECORD_KEY_PREFIX: &str = "record:";

pub fn record_key(id: Uuid) -> String {
    format!("{RECORD_KEY_PREFIX}{id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipKind {
    Good,
    Improve,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tip {
    #[serde(rename = "type")]
    pub kind: TipKind,
    pub tip: String,
    /// Present on every category except ATS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Out of 100.
    pub score: u32,
    pub tips: Vec<Tip>,
}

/// Structured review of a résumé against a job description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub overall_score: u32,
    #[serde(rename = "ATS")]
    pub ats: Category,
    pub tone_and_style: Category,
    pub content: Category,
    pub structure: Category,
    pub skills: Category,
}

/// A record's feedback: the empty string while the analysis is a draft,
/// the parsed payload once inference has completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordFeedback {
    Complete(Box<Feedback>),
    Pending(String),
}

impl Default for RecordFeedback {
    fn default() -> Self {
        RecordFeedback::Pending(String::new())
    }
}

impl RecordFeedback {
    pub fn is_complete(&self) -> bool {
        matches!(self, RecordFeedback::Complete(_))
    }
}

/// One analysed résumé, persisted as JSON under `record:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub resume_path: String,
    pub image_path: String,
    pub company_name: String,
    pub job_title: String,
    pub job_description: String,
    #[serde(default)]
    pub feedback: RecordFeedback,
}

impl AnalysisRecord {
    pub fn key(&self) -> String {
        record_key(self.id)
    }
}

/// Caller input for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub company_name: String,
    pub job_title: String,
    pub job_description: String,
}

#[cfg(test)]
pub(crate) fn sample_feedback() -> Feedback {
    let category = |score: u32| Category {
        score,
        tips: vec![Tip {
            kind: TipKind::Improve,
            tip: "Quantify outcomes".to_string(),
            explanation: Some("Numbers make impact concrete.".to_string()),
        }],
    };
    Feedback {
        overall_score: 72,
        ats: Category {
            score: 80,
            tips: vec![Tip {
                kind: TipKind::Good,
                tip: "Standard section headings".to_string(),
                explanation: None,
            }],
        },
        tone_and_style: category(70),
        content: category(65),
        structure: category(75),
        skills: category(60),
    }
}
