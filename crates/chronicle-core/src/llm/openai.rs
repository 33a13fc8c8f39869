//! ============================================================================
//! OpenAI-compatible Collaborator - chat completions and embeddings over HTTP
//! ============================================================================
//! Works against any endpoint that speaks the OpenAI wire format
//! (OpenAI, x.ai, local gateways). Summaries and relevance verdicts are
//! chat completions; embeddings use the /embeddings route.
//! ============================================================================

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::{LlmCollaborator, RelevanceCandidate};
use crate::config::LlmSettings;
use crate::types::{ChronicleError, Result};

/// Default chat model used for summaries and judgments
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const JUDGE_SYSTEM_PROMPT: &str = "You decide whether memory snippets help answer a query. \
Reply with only a JSON object mapping every candidate id to true or false.";

/// HTTP collaborator for OpenAI-compatible APIs
pub struct OpenAiCollaborator {
    client: Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    embedding_model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct EmbeddingUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

fn failure(message: String) -> ChronicleError {
    ChronicleError::CollaboratorFailure(message)
}

impl OpenAiCollaborator {
    /// Create a collaborator against api.openai.com with default models
    pub fn new_openai(api_key: String) -> Self {
        Self::new_custom(
            api_key,
            OPENAI_BASE_URL.to_string(),
            DEFAULT_CHAT_MODEL.to_string(),
            DEFAULT_EMBEDDING_MODEL.to_string(),
        )
    }

    /// Create with custom base URL and models
    pub fn new_custom(
        api_key: String,
        base_url: String,
        chat_model: String,
        embedding_model: String,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_model,
            embedding_model,
        }
    }

    /// Build from configuration; fails when no API key is configured
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ChronicleError::Config("No LLM API key configured (OPENAI_API_KEY)".into()))?;

        Ok(Self::new_custom(
            api_key,
            settings.base_url.clone(),
            settings.chat_model.clone(),
            settings.embedding_model.clone(),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    async fn post_json<T: Serialize + ?Sized>(&self, route: &str, body: &T) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, route))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| failure(format!("Failed to send {} request: {}", route, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| failure(format!("Failed to read {} response body: {}", route, e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(failure(format!("{} API error ({}): {}", route, status, error.error.message)));
            }
            return Err(failure(format!("{} API error ({}): {}", route, status, body)));
        }

        Ok(body)
    }

    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: user_prompt },
            ],
            temperature: 0.2,
        };

        let body = self.post_json("chat/completions", &request).await?;
        parse_chat_response(&body)
    }
}

fn parse_chat_response(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| failure(format!("Failed to parse chat response: {} - body: {}", e, body)))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    if content.is_empty() {
        return Err(failure("Chat completion returned no content".into()));
    }
    Ok(content)
}

fn parse_embedding_response(body: &str) -> Result<Vec<f32>> {
    let response: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| failure(format!("Failed to parse embedding response: {} - body: {}", e, body)))?;

    if let Some(usage) = &response.usage {
        debug!("Embedding tokens used: {} (model: {})", usage.total_tokens, response.model);
    }

    let embedding = response
        .data
        .into_iter()
        .min_by_key(|d| d.index)
        .map(|d| d.embedding)
        .unwrap_or_default();

    if embedding.is_empty() {
        return Err(failure("No embedding returned".into()));
    }
    Ok(embedding)
}

/// Pull the verdict object out of a reply that may wrap it in prose or fences
fn parse_judgment(reply: &str) -> Result<HashMap<String, bool>> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &reply[s..=e],
        _ => return Err(failure(format!("Relevance reply contained no JSON object: {}", reply))),
    };

    serde_json::from_str(json)
        .map_err(|e| failure(format!("Failed to parse relevance verdicts: {} - reply: {}", e, reply)))
}

#[async_trait]
impl LlmCollaborator for OpenAiCollaborator {
    async fn summarize(&self, text: &str, instruction: &str) -> Result<String> {
        debug!("Summarizing {} chars with {}", text.len(), self.chat_model);
        self.chat(instruction, text).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: vec![text],
        };
        let body = self.post_json("embeddings", &request).await?;
        parse_embedding_response(&body)
    }

    async fn judge_relevance(
        &self,
        query: &str,
        candidates: &[RelevanceCandidate],
    ) -> Result<HashMap<String, bool>> {
        if candidates.is_empty() {
            return Ok(HashMap::new());
        }

        let mut prompt = format!("Query: {}\n\nCandidates:\n", query);
        for candidate in candidates {
            prompt.push_str(&format!("- {}: {}\n", candidate.id, candidate.summary));
        }

        debug!("Judging relevance of {} candidates", candidates.len());
        let reply = self.chat(JUDGE_SYSTEM_PROMPT, &prompt).await?;
        parse_judgment(&reply)
    }

    async fn complete_chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.chat(system_prompt, user_prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_creation() {
        let llm = OpenAiCollaborator::new_openai("test-key".to_string());
        assert_eq!(llm.base_url(), "https://api.openai.com/v1");
        assert_eq!(llm.chat_model(), DEFAULT_CHAT_MODEL);
        assert_eq!(llm.embedding_model(), DEFAULT_EMBEDDING_MODEL);
    }

    #[test]
    fn test_custom_base_url_trailing_slash() {
        let llm = OpenAiCollaborator::new_custom(
            "k".into(),
            "http://localhost:8080/v1/".into(),
            "m".into(),
            "e".into(),
        );
        assert_eq!(llm.base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn test_from_settings_requires_key() {
        let settings = LlmSettings::default();
        assert!(matches!(
            OpenAiCollaborator::from_settings(&settings),
            Err(ChronicleError::Config(_))
        ));
    }

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  Alice and Bob planned the launch. "}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "Alice and Bob planned the launch.");

        let empty = r#"{"choices":[]}"#;
        assert!(matches!(parse_chat_response(empty), Err(ChronicleError::CollaboratorFailure(_))));
    }

    #[test]
    fn test_parse_embedding_response_orders_by_index() {
        let body = r#"{"data":[{"embedding":[0.5,0.5],"index":1},{"embedding":[1.0,0.0],"index":0}],"model":"m","usage":null}"#;
        assert_eq!(parse_embedding_response(body).unwrap(), vec![1.0, 0.0]);

        let empty = r#"{"data":[],"model":"m","usage":null}"#;
        assert!(parse_embedding_response(empty).is_err());
    }

    #[test]
    fn test_parse_judgment_tolerates_prose() {
        let reply = "Sure:\n```json\n{\"c1\": true, \"c2\": false}\n```";
        let verdicts = parse_judgment(reply).unwrap();
        assert_eq!(verdicts.get("c1"), Some(&true));
        assert_eq!(verdicts.get("c2"), Some(&false));

        assert!(parse_judgment("no idea").is_err());
    }

    #[tokio::test]
    async fn test_judge_empty_candidates_skips_call() {
        let llm = OpenAiCollaborator::new_openai("test-key".to_string());
        let verdicts = llm.judge_relevance("anything", &[]).await.unwrap();
        assert!(verdicts.is_empty());
    }
}
