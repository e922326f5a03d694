// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Learning assistant endpoints.

use crate::error::{AppError, Result};
use crate::services::waveform::{self, DEFAULT_SEED};
use crate::services::ChatTurn;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const DEFAULT_BARS: usize = 32;
const MAX_BARS: usize = 128;
/// Bar heights are fractions of the widget height.
const MIN_BAR_HEIGHT: f64 = 0.15;
const MAX_BAR_HEIGHT: f64 = 1.0;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/assistant/chat", post(chat))
        .route("/api/assistant/waveform", get(get_waveform))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssistantChatRequest {
    /// Visible transcript so far; may start with the assistant's greeting
    #[serde(default)]
    #[validate(length(max = 100))]
    pub history: Vec<ChatTurn>,
    #[validate(length(min = 1, max = 4000))]
    pub message: String,
}

#[derive(Serialize)]
pub struct AssistantChatResponse {
    pub reply: ChatTurn,
    /// True when the completion failed and `reply` is the canned message
    pub fallback: bool,
    /// `history` plus the new user turn and the reply
    pub transcript: Vec<ChatTurn>,
}

/// One assistant exchange. Exactly one upstream attempt per call.
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AssistantChatRequest>,
) -> Result<Json<AssistantChatResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let outcome = state.assistant.reply(&body.history, &body.message).await?;

    let mut transcript = body.history;
    transcript.push(ChatTurn::user(body.message.trim()));
    transcript.push(outcome.reply.clone());

    Ok(Json(AssistantChatResponse {
        reply: outcome.reply,
        fallback: outcome.fallback,
        transcript,
    }))
}

#[derive(Deserialize)]
struct WaveformQuery {
    seed: Option<u32>,
    bars: Option<usize>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WaveformResponse {
    pub seed: u32,
    pub heights: Vec<f64>,
}

/// Deterministic decorative bar heights for the voice UI.
async fn get_waveform(Query(query): Query<WaveformQuery>) -> Json<WaveformResponse> {
    let seed = query.seed.unwrap_or(DEFAULT_SEED);
    let bars = query.bars.unwrap_or(DEFAULT_BARS).clamp(1, MAX_BARS);
    Json(WaveformResponse {
        seed,
        heights: waveform::bar_heights(seed, bars, MIN_BAR_HEIGHT, MAX_BAR_HEIGHT),
    })
}
