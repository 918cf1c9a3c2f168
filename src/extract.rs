//! Fenced code block extraction from free-form model output

use crate::error::{Result, SqlGenError};
use tracing::warn;

const FENCE: &str = "```";

/// Text between the first ```` ```{code_type} ```` fence and the next ```` ``` ````,
/// trimmed. A missing closing fence takes the rest of the response.
pub fn extract_code_block(response: &str, code_type: &str) -> Result<String> {
    let opening = format!("{}{}", FENCE, code_type);
    let start = response
        .find(&opening)
        .map(|idx| idx + opening.len())
        .ok_or_else(|| {
            SqlGenError::Extraction(format!("No ```{} block in model response", code_type))
        })?;

    let body = &response[start..];
    let end = body.find(FENCE).unwrap_or(body.len());
    Ok(body[..end].trim().to_string())
}

/// Like [`extract_code_block`], but falls back to the whole trimmed response
/// when the model skipped the fence.
pub fn extract_code_block_or_raw(response: &str, code_type: &str) -> String {
    match extract_code_block(response, code_type) {
        Ok(code) => code,
        Err(_) => {
            warn!("Model response has no ```{} fence, using raw text", code_type);
            response.trim().to_string()
        }
    }
}
