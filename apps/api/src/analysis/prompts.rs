// Prompt construction for résumé analysis.
// The response format mirrors `analysis::models::Feedback` field for field.

/// The JSON shape the model must answer with.
pub const FEEDBACK_RESPONSE_FORMAT: &str = r#"{
  "overallScore": number,            // max 100
  "ATS": {
    "score": number,                 // rate based on ATS suitability
    "tips": [
      { "type": "good" | "improve", "tip": string }   // 3-4 tips
    ]
  },
  "toneAndStyle": {
    "score": number,                 // max 100
    "tips": [
      { "type": "good" | "improve", "tip": string, "explanation": string }   // 3-4 tips
    ]
  },
  "content": {
    "score": number,
    "tips": [ { "type": "good" | "improve", "tip": string, "explanation": string } ]
  },
  "structure": {
    "score": number,
    "tips": [ { "type": "good" | "improve", "tip": string, "explanation": string } ]
  },
  "skills": {
    "score": number,
    "tips": [ { "type": "good" | "improve", "tip": string, "explanation": string } ]
  }
}"#;

/// Analysis instruction template. Replace `{job_title}`, `{job_description}`
/// and `{response_format}` before sending.
const INSTRUCTIONS_TEMPLATE: &str = r#"You are an expert in ATS (Applicant Tracking System) and résumé analysis.
Analyse and rate the attached résumé and suggest how to improve it.
The rating can be low if the résumé is weak. Be thorough and detailed.
Do not be afraid to point out mistakes or areas for improvement.
If there is a lot to improve, do not hesitate to give low scores.
If provided, take the job description into consideration.

Job title: {job_title}
Job description: {job_description}

Provide the feedback using the following format:
{response_format}

Return the analysis as a JSON object, without any other text and without backticks.
Do not include any other text or comments."#;

/// Builds the instruction sent with the stored résumé.
pub fn prepare_instructions(job_title: &str, job_description: &str) -> String {
    // Fixed format first; caller text may itself contain braces.
    INSTRUCTIONS_TEMPLATE
        .replace("{response_format}", FEEDBACK_RESPONSE_FORMAT)
        .replace("{job_description}", job_description.trim())
        .replace("{job_title}", job_title.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instructions_embed_job_and_format() {
        let prompt = prepare_instructions("  Engineer ", "Ship Rust services.");
        assert!(prompt.contains("Job title: Engineer\n"));
        assert!(prompt.contains("Job description: Ship Rust services."));
        assert!(prompt.contains("\"toneAndStyle\""));
        assert!(!prompt.contains("{job_title}"));
        assert!(!prompt.contains("{response_format}"));
    }
}
