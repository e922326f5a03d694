// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AI assistant backed by the Gemini `generateContent` API.
//!
//! Handles:
//! - Trimming history so the first turn sent is user-authored
//! - One completion request per user message (no automatic retry)
//! - Replacing any API or network failure with a canned reply

use crate::config::Config;
use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Reply shown when the completion endpoint fails.
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I'm having trouble connecting right now. Please try again in a moment.";

const SYSTEM_PROMPT: &str = "You are the learning assistant for an enterprise training academy. \
    Help trainees understand course material, quizzes and platform features. \
    Keep answers short and practical.";

/// Author of a chat turn, as the completion API names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub parts: Vec<Part>,
}

impl ChatTurn {
    pub fn user(text: &str) -> Self {
        Self::with_role(ChatRole::User, text)
    }

    pub fn model(text: &str) -> Self {
        Self::with_role(ChatRole::Model, text)
    }

    fn with_role(role: ChatRole, text: &str) -> Self {
        Self {
            role,
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }

    /// All parts joined.
    pub fn text(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }
}

/// Drop leading model turns: the API requires history to start with a user turn.
pub fn trim_leading_model_turns(history: &[ChatTurn]) -> &[ChatTurn] {
    let start = history
        .iter()
        .position(|turn| turn.role == ChatRole::User)
        .unwrap_or(history.len());
    &history[start..]
}

// ─────────────────────────────────────────────────────────────────────────────
// GeminiClient - HTTP access to generateContent
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [ChatTurn],
    system_instruction: SystemInstruction<'a>,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: [PartRef<'a>; 1],
}

#[derive(Serialize)]
struct PartRef<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

/// Gemini API client.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Request one completion for `contents`.
    pub async fn generate(&self, api_key: &str, contents: &[ChatTurn]) -> Result<String, AppError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let request = GenerateContentRequest {
            contents,
            system_instruction: SystemInstruction {
                parts: [PartRef {
                    text: SYSTEM_PROMPT,
                }],
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::AssistantApi(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::AssistantApi(format!("HTTP {}: {}", status, body)));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AppError::AssistantApi(format!("JSON parse error: {}", e)))?;

        parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .find(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::AssistantApi("Empty completion".to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AssistantService - transcript handling around the client
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one assistant exchange.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub reply: ChatTurn,
    /// True when `reply` is the canned failure message
    pub fallback: bool,
}

/// Assistant chat service.
#[derive(Clone)]
pub struct AssistantService {
    client: GeminiClient,
    api_key: Option<String>,
}

impl AssistantService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: GeminiClient::new(&config.gemini_base_url, &config.gemini_model),
            api_key: config.gemini_api_key.clone(),
        }
    }

    /// Answer `prompt` given the visible `history`.
    ///
    /// A missing API key is an error; every other failure becomes the
    /// fallback reply.
    pub async fn reply(&self, history: &[ChatTurn], prompt: &str) -> Result<AssistantReply, AppError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AppError::BadRequest("Prompt is empty".to_string()));
        }

        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AppError::MissingCredential("GEMINI_API_KEY"))?;

        let trimmed = trim_leading_model_turns(history);
        if trimmed.len() != history.len() {
            tracing::debug!(
                dropped = history.len() - trimmed.len(),
                "Dropped leading model turns from history"
            );
        }

        let mut contents = trimmed.to_vec();
        contents.push(ChatTurn::user(prompt));

        match self.client.generate(api_key, &contents).await {
            Ok(text) => Ok(AssistantReply {
                reply: ChatTurn::model(&text),
                fallback: false,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Assistant completion failed, using fallback reply");
                Ok(AssistantReply {
                    reply: ChatTurn::model(FALLBACK_REPLY),
                    fallback: true,
                })
            }
        }
    }
}
