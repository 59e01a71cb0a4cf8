use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use trivia_core::{Answer, RoundPhase, RoundState};
use uuid::Uuid;

pub mod client;
pub mod config;
pub mod telemetry;

use client::{OpenAiClient, TriviaClient};
use config::Config;

pub const SESSION_COOKIE: &str = "trivia_sid";

type SessionSlot = Arc<Mutex<Option<RoundState>>>;

struct SessionEntry {
    round: SessionSlot,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    client: Arc<dyn TriviaClient>,
    session_ttl: Duration,
}

impl AppState {
    pub fn new(client: Arc<dyn TriviaClient>, session_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            client,
            session_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(OpenAiClient::from_config(config)),
            config.session_ttl,
        )
    }

    async fn session(&self, requested: Option<String>) -> (String, SessionSlot) {
        let now = Instant::now();
        let ttl = self.session_ttl;
        let mut sessions = self.sessions.write().await;

        let before = sessions.len();
        // A session with a request in flight holds an extra handle on its slot.
        sessions.retain(|_, entry| {
            Arc::strong_count(&entry.round) > 1 || now.duration_since(entry.last_seen) < ttl
        });
        let expired = before - sessions.len();
        if expired > 0 {
            debug!(expired, "swept idle sessions");
        }

        if let Some(id) = requested {
            if let Some(entry) = sessions.get_mut(&id) {
                entry.last_seen = now;
                return (id, entry.round.clone());
            }
        }

        let id = Uuid::new_v4().to_string();
        let round: SessionSlot = Arc::new(Mutex::new(None));
        sessions.insert(
            id.clone(),
            SessionEntry {
                round: round.clone(),
                last_seen: now,
            },
        );
        info!(session = %id, "session created");
        (id, round)
    }

    async fn reset(&self, id: &str) {
        if self.sessions.write().await.remove(id).is_some() {
            info!(session = %id, "session reset");
        }
    }

    async fn touch(&self, id: &str) {
        if let Some(entry) = self.sessions.write().await.get_mut(id) {
            entry.last_seen = Instant::now();
        }
    }
}

fn session_cookie_header(id: &str, max_age: u64) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}")
}

pub async fn start_new_round<R: Rng + ?Sized>(
    client: &dyn TriviaClient,
    state: &mut RoundState,
    rng: &mut R,
) {
    let raw = match client.request_completion(&state.conversation_history).await {
        Ok(raw) => raw,
        Err(err) => {
            error!(error = %err, "trivia completion failed");
            err.to_string()
        }
    };

    let outcome = state.advance(&raw, rng);
    if let Some(reason) = &outcome.fallback {
        warn!(%reason, "showing fallback question");
    }
    info!(history_len = outcome.history_len, "new trivia round");
}

pub fn submit_answer(state: &mut RoundState, claimed_correct: bool) {
    state.submit(claimed_correct);
    info!(
        correct = claimed_correct,
        score = state.player_score,
        "answer submitted"
    );
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/trivia-game", get(trivia_game))
        .route("/submit-answer", get(submit))
        .with_state(state)
}

#[derive(Serialize)]
struct LandingView {
    message: &'static str,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TriviaView {
    pub player_score: u32,
    pub is_revealed: bool,
    pub answer_correct: bool,
    pub phase: RoundPhase,
    pub trivia_question: Option<String>,
    pub trivia_answers: Vec<Answer>,
}

impl From<&RoundState> for TriviaView {
    fn from(state: &RoundState) -> Self {
        let (trivia_question, trivia_answers) = match &state.current_question {
            Some(q) => (Some(q.trivia_question.clone()), q.trivia_answers.to_vec()),
            None => (None, Vec::new()),
        };
        Self {
            player_score: state.player_score,
            is_revealed: state.is_revealed,
            answer_correct: state.answer_correct,
            phase: state.phase(),
            trivia_question,
            trivia_answers,
        }
    }
}

#[derive(Deserialize)]
struct RoundParams {
    seed: Option<String>,
}

#[derive(Deserialize)]
struct SubmitParams {
    is_correct: Option<String>,
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

async fn landing(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(id) = session_cookie(&headers) {
        state.reset(&id).await;
    }
    debug!("landing page");

    (
        [(header::SET_COOKIE, session_cookie_header("", 0))],
        Json(LandingView { message: "Welcome" }),
    )
}

async fn trivia_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RoundParams>,
) -> Response {
    let (session_id, slot) = state.session(session_cookie(&headers)).await;
    // An unparsable seed falls back to entropy rather than rejecting the request.
    let mut rng = params
        .seed
        .as_deref()
        .and_then(|seed| seed.trim().parse().ok())
        .map(ChaCha8Rng::seed_from_u64)
        .unwrap_or_else(ChaCha8Rng::from_entropy);

    let view = {
        let mut guard = slot.lock().await;
        let round = RoundState::initialize(&mut *guard);
        start_new_round(state.client.as_ref(), round, &mut rng).await;
        TriviaView::from(&*round)
    };

    state.touch(&session_id).await;

    (
        [(
            header::SET_COOKIE,
            session_cookie_header(&session_id, state.session_ttl.as_secs()),
        )],
        Json(view),
    )
        .into_response()
}

async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SubmitParams>,
) -> Response {
    let (session_id, slot) = state.session(session_cookie(&headers)).await;
    let claimed_correct = params.is_correct.as_deref() == Some("true");

    let view = {
        let mut guard = slot.lock().await;
        let round = RoundState::initialize(&mut *guard);
        submit_answer(round, claimed_correct);
        TriviaView::from(&*round)
    };

    state.touch(&session_id).await;

    (
        [(
            header::SET_COOKIE,
            session_cookie_header(&session_id, state.session_ttl.as_secs()),
        )],
        Json(view),
    )
        .into_response()
}
