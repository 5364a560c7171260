//! Wire shapes returned by `list_conversations` and `list_models`, and the
//! parsers that turn cached response bytes into them.

use serde::Deserialize;

/// One entry of `list_conversations`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationSummary {
    pub shelley_id: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_created_at: Option<String>,
    #[serde(default)]
    pub api_updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationListPayload {
    conversations: Vec<ConversationSummary>,
}

/// One entry of `list_models`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub ready: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelInfo>,
    #[serde(default)]
    pub default_model_id: Option<String>,
}

/// The backend's response to `start_conversation`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewConversation {
    pub shelley_id: String,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContinueResponse {
    shelley_id: String,
}

#[derive(Debug, Deserialize)]
struct WorkingResponse {
    working: bool,
}

/// Parses the `list_conversations` response body.
///
/// # Errors
///
/// Returns the `serde_json` error if `bytes` is not a valid
/// `{"conversations": [...]}` payload.
pub fn parse_conversation_list(bytes: &[u8]) -> Result<Vec<ConversationSummary>, serde_json::Error> {
    let payload: ConversationListPayload = serde_json::from_slice(bytes)?;
    Ok(payload.conversations)
}

/// Parses the `list_models` response body.
///
/// # Errors
///
/// Returns the `serde_json` error if `bytes` is not a valid `ModelList`.
pub fn parse_model_list(bytes: &[u8]) -> Result<ModelList, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Parses the `continue_conversation` response body, returning the new
/// `shelley_id`.
///
/// # Errors
///
/// Returns the `serde_json` error if `bytes` does not carry a `shelley_id`.
pub fn parse_continue_response(bytes: &[u8]) -> Result<String, serde_json::Error> {
    let payload: ContinueResponse = serde_json::from_slice(bytes)?;
    Ok(payload.shelley_id)
}

/// Parses the `working` response body.
///
/// # Errors
///
/// Returns the `serde_json` error if `bytes` does not carry a `working` flag.
pub fn parse_working_response(bytes: &[u8]) -> Result<bool, serde_json::Error> {
    let payload: WorkingResponse = serde_json::from_slice(bytes)?;
    Ok(payload.working)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn parses_conversation_list() {
        let body = br#"{"conversations": [{"shelley_id": "abc", "slug": "hello"}]}"#;
        let list = parse_conversation_list(body).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].shelley_id, "abc");
        assert_eq!(list[0].slug.as_deref(), Some("hello"));
        assert!(list[0].api_created_at.is_none());
    }

    #[test]
    fn parses_model_list_with_default() {
        let body =
            br#"{"models": [{"id": "m1", "display_name": "Model One", "ready": true}], "default_model_id": "m1"}"#;
        let list = parse_model_list(body).unwrap();
        assert_eq!(list.models.len(), 1);
        assert_eq!(list.default_model_id.as_deref(), Some("m1"));
        assert!(list.models[0].ready);
    }

    #[test]
    fn parses_working_flag() {
        assert!(parse_working_response(br#"{"working": true}"#).unwrap());
        assert!(!parse_working_response(br#"{"working": false}"#).unwrap());
    }
}
