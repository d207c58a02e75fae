use std::{collections::HashMap, sync::Arc};
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{sse::{Event, KeepAlive, Sse}, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::{
    auth::Credentials,
    config::GameCfg,
    events::RunEvent,
    play::PlayError,
    providers::CompletionProvider,
    rate_limit::SimpleRateLimiter,
    runner::{GenerationRunner, RunError},
    seeds::{self, SeedCategory, SeedSet, EXTENDED_SEED_COUNT, STANDARD_SEED_COUNT},
    session::{GameForm, RunSummary, SessionState, SessionView},
};

struct SessionSlot {
    state: SessionState,
    running: bool,
}

type Sessions = Arc<Mutex<HashMap<Uuid, SessionSlot>>>;

#[derive(Clone)]
pub struct AppState {
    defaults: GameCfg,
    credentials: Arc<Credentials>,
    runner: Arc<GenerationRunner>,
    sessions: Sessions,
    events_tx: broadcast::Sender<RunEvent>,
}

impl AppState {
    pub fn new(
        defaults: GameCfg,
        credentials: Credentials,
        provider: Arc<dyn CompletionProvider>,
        limiter: Option<Arc<SimpleRateLimiter>>,
    ) -> Self {
        let (tx, _rx) = broadcast::channel::<RunEvent>(256);
        let mut runner = GenerationRunner::new(provider).with_events(tx.clone());
        if let Some(l) = limiter {
            runner = runner.with_limiter(l);
        }
        Self {
            defaults,
            credentials: Arc::new(credentials),
            runner: Arc::new(runner),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            events_tx: tx,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/defaults", get(get_defaults))
        .route("/api/seed-categories", get(list_categories))
        .route("/api/seeds", post(make_seeds))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/preview", post(preview))
        .route("/api/sessions/{id}/run", post(run_standard))
        .route("/api/sessions/{id}/run-extended", post(run_extended))
        .route("/api/sessions/{id}/events", get(run_events))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(bind: String, state: AppState) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "seedgame API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct DefaultsResp {
    #[serde(flatten)]
    form: GameForm,
    standard_count: usize,
    extended_count: usize,
}

async fn get_defaults(State(st): State<AppState>) -> Json<DefaultsResp> {
    Json(DefaultsResp {
        form: GameForm::from(&st.defaults),
        standard_count: STANDARD_SEED_COUNT,
        extended_count: EXTENDED_SEED_COUNT,
    })
}

#[derive(Serialize)]
struct CategoryItem { id: SeedCategory, label: &'static str }

async fn list_categories() -> Json<Vec<CategoryItem>> {
    Json(SeedCategory::ALL.iter().map(|c| CategoryItem { id: *c, label: c.label() }).collect())
}

#[derive(Deserialize)]
struct SeedsReq {
    category: SeedCategory,
    seed: i64,
    #[serde(default)]
    count: Option<usize>,
}

async fn make_seeds(Json(req): Json<SeedsReq>) -> Json<SeedSet> {
    let count = req.count.unwrap_or(STANDARD_SEED_COUNT).min(EXTENDED_SEED_COUNT);
    Json(seeds::generate(req.category, req.seed, count))
}

#[derive(Serialize)]
struct CreateSessionResp { session_id: Uuid }

async fn create_session(State(st): State<AppState>) -> (StatusCode, Json<CreateSessionResp>) {
    let id = Uuid::new_v4();
    st.sessions.lock().insert(id, SessionSlot { state: SessionState::new(), running: false });
    tracing::info!(session = %id, "session created");
    (StatusCode::CREATED, Json(CreateSessionResp { session_id: id }))
}

async fn get_session(State(st): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<SessionView>, ApiErr> {
    let sessions = st.sessions.lock();
    let slot = sessions.get(&id).ok_or_else(|| ApiErr::session_not_found(id))?;
    Ok(Json(SessionView::from(&slot.state)))
}

#[derive(Serialize)]
struct PreviewResp {
    combined_prompt: String,
    seeds: Vec<String>,
    score_reset: bool,
    score: usize,
}

async fn preview(
    State(st): State<AppState>,
    Path(id): Path<Uuid>,
    Json(form): Json<GameForm>,
) -> Result<Json<PreviewResp>, ApiErr> {
    let seeds = form.seeds(STANDARD_SEED_COUNT);
    let combined_prompt = form.template().preview(&seeds);
    let mut sessions = st.sessions.lock();
    let slot = sessions.get_mut(&id).ok_or_else(|| ApiErr::session_not_found(id))?;
    let score_reset = slot.state.observe_prompt(&combined_prompt);
    Ok(Json(PreviewResp {
        combined_prompt,
        seeds: seeds.tokens,
        score_reset,
        score: slot.state.score(),
    }))
}

#[derive(Deserialize)]
struct RunReq {
    #[serde(flatten)]
    form: GameForm,
    #[serde(default)]
    api_key: String,
}

#[derive(Serialize)]
struct RunResp {
    #[serde(flatten)]
    summary: RunSummary,
    extended_unlocked: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RunKind { Standard, Extended }

/// Clears the session's `running` flag even if the request future is dropped.
struct RunningGuard { sessions: Sessions, id: Uuid }

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.sessions.lock().get_mut(&self.id) {
            slot.running = false;
        }
    }
}

async fn run_standard(
    State(st): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RunReq>,
) -> Result<Json<RunResp>, ApiErr> {
    run_game(st, id, req, RunKind::Standard).await
}

async fn run_extended(
    State(st): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RunReq>,
) -> Result<Json<RunResp>, ApiErr> {
    run_game(st, id, req, RunKind::Extended).await
}

async fn run_game(st: AppState, id: Uuid, req: RunReq, kind: RunKind) -> Result<Json<RunResp>, ApiErr> {
    let combined = req.form.combined_prompt();
    let credential = st.credentials.resolve(&req.api_key);

    // Check and claim the session without holding the lock across the run.
    let (_running, credential) = {
        let mut sessions = st.sessions.lock();
        let slot = sessions.get_mut(&id).ok_or_else(|| ApiErr::session_not_found(id))?;
        slot.state.observe_prompt(&combined);
        if slot.running {
            return Err(ApiErr::run_already_active(id));
        }
        if kind == RunKind::Extended && !slot.state.extended_unlocked() {
            return Err(ApiErr::extended_locked(slot.state.score()));
        }
        let credential = credential?;
        slot.running = true;
        (RunningGuard { sessions: st.sessions.clone(), id }, credential)
    };

    let count = match kind {
        RunKind::Standard => STANDARD_SEED_COUNT,
        RunKind::Extended => EXTENDED_SEED_COUNT,
    };
    let seeds = req.form.seeds(count);
    let outputs = st.runner
        .run(&id.to_string(), &req.form.template(), &seeds, &credential)
        .await?;

    let mut sessions = st.sessions.lock();
    let slot = sessions.get_mut(&id).ok_or_else(|| ApiErr::session_not_found(id))?;
    // The form changed while this run was in flight; its results no longer apply.
    if slot.state.last_prompt() != combined {
        tracing::warn!(session = %id, "prompt changed during run, results not recorded");
        return Ok(Json(RunResp {
            summary: RunSummary::new(outputs),
            extended_unlocked: slot.state.extended_unlocked(),
        }));
    }
    let summary = match kind {
        RunKind::Standard => slot.state.record_run(&combined, outputs).clone(),
        RunKind::Extended => slot.state.record_extended_run(outputs).clone(),
    };
    Ok(Json(RunResp { summary, extended_unlocked: slot.state.extended_unlocked() }))
}

async fn run_events(
    State(st): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl futures_util::Stream<Item = Result<Event, axum::Error>>>, ApiErr> {
    if !st.sessions.lock().contains_key(&id) {
        return Err(ApiErr::session_not_found(id));
    }
    let rx = st.events_tx.subscribe();
    let run_id = id.to_string();

    let stream = BroadcastStream::new(rx)
        .filter_map(|msg| async move { msg.ok() })
        .filter(move |evt: &RunEvent| futures_util::future::ready(evt.run_id() == run_id))
        .map(|evt| Event::default().event("message").json_data(&evt));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug)]
struct ApiErr {
    status: StatusCode,
    code: String,
    message: String,
    suggestion: Option<String>,
}

impl ApiErr {
    fn session_not_found(id: Uuid) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "session_not_found".to_string(),
            message: format!("No such session: {}", id),
            suggestion: Some("Create a session with POST /api/sessions".to_string()),
        }
    }

    fn run_already_active(id: Uuid) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "run_already_active".to_string(),
            message: format!("A run is already in progress for session {}", id),
            suggestion: Some("Wait for the current run to complete.".to_string()),
        }
    }

    fn extended_locked(score: usize) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "extended_locked".to_string(),
            message: PlayError::ExtendedLocked { score }.to_string(),
            suggestion: Some("Get every standard output to be unique first.".to_string()),
        }
    }
}

impl From<RunError> for ApiErr {
    fn from(e: RunError) -> Self {
        match e {
            RunError::MissingCredential => Self {
                status: StatusCode::BAD_REQUEST,
                code: "missing_credential".to_string(),
                message: e.to_string(),
                suggestion: None,
            },
            RunError::Generation { .. } => Self {
                status: StatusCode::BAD_GATEWAY,
                code: "generation_failed".to_string(),
                message: e.to_string(),
                suggestion: Some("Check the API key, or use the shared password.".to_string()),
            },
        }
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> axum::response::Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            code: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            suggestion: Option<String>,
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code,
                suggestion: self.suggestion,
            }),
        )
            .into_response()
    }
}
