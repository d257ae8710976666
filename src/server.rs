// SynthNet HTTP Surface
// Copyright (c) 2026 Xing_The_Creator | SynthNet

use anyhow::Context;
use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::core::PromptOptions;
use crate::agent::health::HealthReport;
use crate::agent::instructions::Instruction;
use crate::agent::scribe::Transcription;
use crate::agent::voice::{RecognizerInfo, VoiceDescriptor};
use crate::error::VoiceApiError;
use crate::game::{GameIdentity, DEFAULT_GAME, DEFAULT_NPC};
use crate::state::AppState;

pub const SESSION_HEADER: &str = "x-session-id";
pub const API_KEY_HEADER: &str = "x-api-key";

// ─── Request shapes ─────────────────────────────────────────────────────────

/// `gameName` / `npcName` query pair. Omitted parameters take the defaults;
/// present-but-empty ones fail validation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcQuery {
    pub game_name: Option<String>,
    pub npc_name: Option<String>,
}

impl NpcQuery {
    fn identity(&self) -> Result<GameIdentity, HandlerError> {
        identity_from(self.game_name.as_deref(), self.npc_name.as_deref())
    }
}

fn identity_from(game: Option<&str>, npc: Option<&str>) -> Result<GameIdentity, HandlerError> {
    let game = game.unwrap_or(DEFAULT_GAME);
    let npc = npc.unwrap_or(DEFAULT_NPC);
    GameIdentity::new(game, npc).map_err(|e| HandlerError::Rejected {
        game_name: game.to_string(),
        npc_name: npc.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptQuery {
    pub game_name: Option<String>,
    pub npc_name: Option<String>,
    #[serde(default)]
    pub question: String,
    #[serde(default = "default_true")]
    pub scribe: bool,
    #[serde(default)]
    pub gpt: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerQuery {
    pub game_name: Option<String>,
    pub npc_name: Option<String>,
    #[serde(default)]
    pub question: String,
    #[serde(default = "default_true")]
    pub scribe: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceQuery {
    pub game_name: Option<String>,
    pub npc_name: Option<String>,
    pub name: Option<String>,
}

/// Wire form of a Transcription. `gameName` stays a string here so an unknown
/// or oddly cased game reaches identity validation instead of failing JSON
/// decoding.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptionBody {
    pub text: String,
    pub audio_file_path: Option<String>,
    pub audio_file_name: Option<String>,
    pub player: Option<String>,
    pub game_name: Option<String>,
    pub npc_name: Option<String>,
}

impl TranscriptionBody {
    /// Body fields win over the query pair, one field at a time.
    fn identity(&self, query: &NpcQuery) -> Result<GameIdentity, HandlerError> {
        identity_from(
            self.game_name.as_deref().or(query.game_name.as_deref()),
            self.npc_name.as_deref().or(query.npc_name.as_deref()),
        )
    }

    fn into_transcription(self, identity: &GameIdentity) -> Transcription {
        Transcription {
            text: self.text,
            audio_file_path: self.audio_file_path,
            audio_file_name: self.audio_file_name,
            player: self.player,
            game_name: Some(identity.game_name),
            npc_name: Some(identity.npc_name.clone()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiKeyQuery {
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFileInfo {
    #[serde(default)]
    pub file_path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClosed {
    pub session: String,
    pub closed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
    #[serde(flatten)]
    pub report: HealthReport,
    pub recent_activity: Vec<String>,
}

fn default_true() -> bool {
    true
}

// ─── Errors ─────────────────────────────────────────────────────────────────

pub enum HandlerError {
    /// Game/NPC pair failed validation; the pair is echoed back.
    Rejected {
        game_name: String,
        npc_name: String,
        reason: String,
    },
    Voice(VoiceApiError),
}

impl From<VoiceApiError> for HandlerError {
    fn from(err: VoiceApiError) -> Self {
        HandlerError::Voice(err)
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Rejected {
                game_name,
                npc_name,
                reason,
            } => {
                warn!("[SERVER] Rejected {}/{}: {}", game_name, npc_name, reason);
                let body = json!({
                    "gameName": game_name,
                    "npcName": npc_name,
                    "kind": "InvalidArgument",
                    "message": reason,
                    "retryable": false,
                });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            HandlerError::Voice(err) => err.into_response(),
        }
    }
}

type HandlerResult<T> = Result<Json<T>, HandlerError>;

fn session_key(headers: &HeaderMap, identity: &GameIdentity) -> String {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| identity.key())
}

// ─── Router ─────────────────────────────────────────────────────────────────

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/npc/init", post(init_npc))
        .route("/npc/instruction", get(get_instruction))
        .route("/npc/prompt", get(prompt_npc))
        .route("/npc/session", delete(close_session))
        .route("/audio/transcriptions", post(transcriptions))
        .route("/audio/create", post(create_audio))
        .route("/voice/synthesizer/list", get(list_voices))
        .route("/voice/synthesizer/info", post(select_voice))
        .route("/voice/recognizer/info", get(recognizer_info))
        .route("/player/prompt", get(player_prompt))
        .route("/log", post(log_transcription))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(state: AppState, bind: SocketAddr) -> anyhow::Result<()> {
    state.health.start();

    // Fetch the recognition model up front instead of inside the first request.
    let core = state.core.clone();
    tokio::spawn(async move {
        match core.services().recognizer.warm_up().await {
            Ok(()) => info!("[STT] Recognizer warmed up"),
            Err(e) => warn!("[STT] Recognizer warm-up failed: {}", e),
        }
    });

    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!("[SERVER] 🚀 SynthNet voice API listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("[SERVER] Ctrl-C received, shutting down");
        })
        .await
        .context("server terminated abnormally")?;

    state.health.stop();
    Ok(())
}

/// Accepts the key from `X-API-Key` or the `api_key` query parameter.
/// `/health` stays open.
async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(req).await;
    };
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let from_header = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    let from_query = Query::<ApiKeyQuery>::try_from_uri(req.uri())
        .map(|Query(q)| q.api_key)
        .unwrap_or_default();

    if from_header == Some(expected) || from_query.as_deref() == Some(expected) {
        next.run(req).await
    } else {
        warn!("[SERVER] Unauthorized request to {}", req.uri().path());
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "kind": "Unauthorized", "message": "missing or invalid API key", "retryable": false })),
        )
            .into_response()
    }
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.core.session_count(),
        report: state.health.report(),
        recent_activity: state.core.recent_activity(20),
    })
}

async fn init_npc(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NpcQuery>,
) -> HandlerResult<Instruction> {
    let identity = query.identity()?;
    let key = session_key(&headers, &identity);
    Ok(Json(state.core.init_npc(&key, identity).await?))
}

async fn get_instruction(
    State(state): State<AppState>,
    Query(query): Query<NpcQuery>,
) -> HandlerResult<Instruction> {
    let identity = query.identity()?;
    Ok(Json(state.core.get_instruction(&identity).await?))
}

async fn prompt_npc(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PromptQuery>,
) -> HandlerResult<Transcription> {
    let identity = identity_from(query.game_name.as_deref(), query.npc_name.as_deref())?;
    let key = session_key(&headers, &identity);
    let options = PromptOptions {
        question: query.question,
        scribe: query.scribe,
        gpt: query.gpt,
    };
    Ok(Json(state.core.prompt(&key, identity, options).await?))
}

async fn close_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NpcQuery>,
) -> HandlerResult<SessionClosed> {
    let identity = query.identity()?;
    let key = session_key(&headers, &identity);
    let closed = state.core.close_session(&key);
    Ok(Json(SessionClosed {
        session: key,
        closed,
    }))
}

async fn transcriptions(
    State(state): State<AppState>,
    Json(info): Json<AudioFileInfo>,
) -> HandlerResult<Transcription> {
    Ok(Json(state.core.transcribe(&info.file_path).await?))
}

async fn create_audio(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NpcQuery>,
    Json(body): Json<TranscriptionBody>,
) -> HandlerResult<Transcription> {
    let identity = body.identity(&query)?;
    let key = session_key(&headers, &identity);
    let script = body.into_transcription(&identity);
    Ok(Json(state.core.create_audio(&key, identity, script).await?))
}

async fn list_voices(State(state): State<AppState>) -> HandlerResult<Vec<VoiceDescriptor>> {
    Ok(Json(state.core.list_voices().await?))
}

async fn select_voice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<VoiceQuery>,
) -> HandlerResult<VoiceDescriptor> {
    let identity = identity_from(query.game_name.as_deref(), query.npc_name.as_deref())?;
    let key = session_key(&headers, &identity);
    let name = query.name.unwrap_or_default();
    Ok(Json(state.core.select_voice(&key, &name).await?))
}

async fn recognizer_info(State(state): State<AppState>) -> Json<RecognizerInfo> {
    Json(state.core.recognizer_info())
}

async fn player_prompt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PlayerQuery>,
) -> Result<String, HandlerError> {
    let identity = identity_from(query.game_name.as_deref(), query.npc_name.as_deref())?;
    let key = session_key(&headers, &identity);
    Ok(state
        .core
        .player_prompt(&key, &query.question, query.scribe)
        .await?)
}

async fn log_transcription(
    State(state): State<AppState>,
    Query(query): Query<NpcQuery>,
    Json(body): Json<TranscriptionBody>,
) -> Result<String, HandlerError> {
    let identity = body.identity(&query)?;
    let script = body.into_transcription(&identity);
    if script.text.trim().is_empty() {
        return Err(VoiceApiError::InvalidArgument("text is required".to_string()).into());
    }
    let path = state.core.log_conversation(&identity, &script).await?;
    Ok(path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_defaults_only_when_omitted() {
        let omitted = NpcQuery::default();
        let id = omitted.identity().ok().unwrap();
        assert_eq!(id.npc_name, DEFAULT_NPC);
        assert_eq!(id.game_name.as_str(), DEFAULT_GAME);

        let blank = NpcQuery {
            game_name: Some("Fallout4".into()),
            npc_name: Some(String::new()),
        };
        assert!(matches!(blank.identity(), Err(HandlerError::Rejected { .. })));
    }

    #[test]
    fn test_session_key_prefers_header() {
        let id = GameIdentity::new("Fallout4", "Piper").unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(session_key(&headers, &id), "Fallout4/Piper");
        headers.insert(SESSION_HEADER, "player-two".parse().unwrap());
        assert_eq!(session_key(&headers, &id), "player-two");
    }

    #[test]
    fn test_body_identity_overrides_query_per_field() {
        let query = NpcQuery {
            game_name: Some("GreenHell".into()),
            npc_name: Some("Jake".into()),
        };
        let body: TranscriptionBody =
            serde_json::from_str(r#"{"text":"hi","gameName":"fallout4"}"#).unwrap();
        let id = body.identity(&query).ok().unwrap();
        assert_eq!(id.game_name.as_str(), "Fallout4");
        assert_eq!(id.npc_name, "Jake");

        let body: TranscriptionBody =
            serde_json::from_str(r#"{"text":"hi","gameName":"Skyrim","npcName":"Lydia"}"#).unwrap();
        match body.identity(&NpcQuery::default()) {
            Err(HandlerError::Rejected {
                game_name,
                npc_name,
                ..
            }) => {
                assert_eq!(game_name, "Skyrim");
                assert_eq!(npc_name, "Lydia");
            }
            _ => panic!("expected rejection"),
        }
    }
}
