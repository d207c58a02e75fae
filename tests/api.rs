//! HTTP API tests driven through the router with in-process providers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

use seedgame::api::{self, AppState};
use seedgame::auth::Credentials;
use seedgame::config::GameCfg;
use seedgame::providers::{CompletionFuture, CompletionProvider, ProviderError};

/// Returns the prompt it was given and remembers which key was used.
#[derive(Default)]
struct Echo {
    keys: Mutex<Vec<String>>,
}

impl CompletionProvider for Echo {
    fn complete<'a>(&'a self, prompt: &'a str, api_key: &'a str) -> CompletionFuture<'a> {
        Box::pin(async move {
            self.keys.lock().push(api_key.to_string());
            Ok(prompt.to_string())
        })
    }

    fn name(&self) -> &'static str { "echo" }
}

struct Rejecting;

impl CompletionProvider for Rejecting {
    fn complete<'a>(&'a self, _prompt: &'a str, _api_key: &'a str) -> CompletionFuture<'a> {
        Box::pin(async move { Err(ProviderError::Unauthorized) })
    }

    fn name(&self) -> &'static str { "rejecting" }
}

/// Echoes like `Echo`, but the first call parks until `release` fires.
struct Gated {
    hold: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl Gated {
    fn new() -> Self {
        Self { hold: AtomicBool::new(true), entered: Notify::new(), release: Notify::new() }
    }
}

impl CompletionProvider for Gated {
    fn complete<'a>(&'a self, prompt: &'a str, _api_key: &'a str) -> CompletionFuture<'a> {
        Box::pin(async move {
            if self.hold.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(prompt.to_string())
        })
    }

    fn name(&self) -> &'static str { "gated" }
}

fn credentials() -> Credentials {
    Credentials {
        default_api_key: Some("sk-owner".into()),
        shared_password: Some("letmein".into()),
        shared_password_hash: None,
    }
}

fn app_with(provider: Arc<dyn CompletionProvider>) -> axum::Router {
    api::router(AppState::new(GameCfg::default(), credentials(), provider, None))
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

async fn new_session(app: &axum::Router) -> String {
    let (status, body) = send(app, "POST", "/api/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    body["session_id"].as_str().unwrap().to_string()
}

fn form(category: &str) -> Value {
    json!({
        "prompt": "Generate one baby name",
        "prefix": "Your mood is: ",
        "category": category,
        "seed": 42,
    })
}

fn run_body(category: &str, api_key: &str) -> Value {
    let mut b = form(category);
    b["api_key"] = json!(api_key);
    b
}

#[tokio::test]
async fn defaults_match_the_form() {
    let app = app_with(Arc::new(Echo::default()));
    let (status, body) = send(&app, "GET", "/api/defaults", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seed"], 42);
    assert_eq!(body["prompt"], "Generate one baby name");
    assert_eq!(body["prefix"], "Your mood is: ");
    assert_eq!(body["category"], "word");
    assert_eq!(body["standard_count"], 10);
    assert_eq!(body["extended_count"], 100);
}

#[tokio::test]
async fn lists_five_categories() {
    let app = app_with(Arc::new(Echo::default()));
    let (_, body) = send(&app, "GET", "/api/seed-categories", None).await;
    let labels: Vec<&str> = body.as_array().unwrap().iter().map(|c| c["label"].as_str().unwrap()).collect();
    assert_eq!(
        labels,
        ["Random Word", "Random Strings", "Control (No Seed)", "Random Number (Small)", "Random Number (Large)"]
    );
}

#[tokio::test]
async fn seeds_are_reproducible_and_capped() {
    let app = app_with(Arc::new(Echo::default()));
    let req = json!({"category": "word", "seed": 42});
    let (_, a) = send(&app, "POST", "/api/seeds", Some(req.clone())).await;
    let (_, b) = send(&app, "POST", "/api/seeds", Some(req)).await;
    assert_eq!(a["tokens"], b["tokens"]);
    assert_eq!(a["tokens"].as_array().unwrap().len(), 10);

    let (_, big) = send(&app, "POST", "/api/seeds", Some(json!({"category": "small_number", "seed": 1, "count": 5000}))).await;
    assert_eq!(big["tokens"].as_array().unwrap().len(), 100);
}

#[tokio::test]
async fn unknown_session_is_404() {
    let app = app_with(Arc::new(Echo::default()));
    let (status, body) = send(&app, "GET", "/api/sessions/6f1d2c1e-8d5e-4a8b-9f0e-1c2d3e4f5a6b", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "session_not_found");
}

#[tokio::test]
async fn preview_shows_first_seed() {
    let app = app_with(Arc::new(Echo::default()));
    let id = new_session(&app).await;
    let (status, body) = send(&app, "POST", &format!("/api/sessions/{id}/preview"), Some(form("small_number"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["combined_prompt"], "Your mood is:  0\n\nGenerate one baby name");
    assert_eq!(body["seeds"].as_array().unwrap().len(), 10);
    assert_eq!(body["score_reset"], false);
}

#[tokio::test]
async fn missing_key_is_rejected_before_any_call() {
    let echo = Arc::new(Echo::default());
    let app = app_with(echo.clone());
    let id = new_session(&app).await;

    let (status, body) = send(&app, "POST", &format!("/api/sessions/{id}/run"), Some(run_body("word", ""))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_credential");
    assert_eq!(body["error"], "Please enter your OpenAI API Key");
    assert!(echo.keys.lock().is_empty());
}

#[tokio::test]
async fn provider_failure_is_one_generic_error() {
    let app = app_with(Arc::new(Rejecting));
    let id = new_session(&app).await;

    let (status, body) = send(&app, "POST", &format!("/api/sessions/{id}/run"), Some(run_body("word", "sk-bad"))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "generation_failed");
    assert_eq!(body["error"], "Error: Invalid API key (probably)");
    assert!(body.get("outputs").is_none());

    let (_, session) = send(&app, "GET", &format!("/api/sessions/{id}"), None).await;
    assert_eq!(session["score"], 0);
    assert!(session["last_run"].is_null());
}

#[tokio::test]
async fn perfect_score_unlocks_extended_run() {
    let app = app_with(Arc::new(Echo::default()));
    let id = new_session(&app).await;

    let (status, body) = send(&app, "POST", &format!("/api/sessions/{id}/run"), Some(run_body("small_number", "sk-me"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 10);
    assert_eq!(body["out_of"], 10);
    assert_eq!(body["extended_unlocked"], true);
    let outputs = body["outputs"].as_array().unwrap();
    for (i, out) in outputs.iter().enumerate() {
        assert_eq!(out.as_str().unwrap(), format!("Your mood is:  {i}\n\nGenerate one baby name"));
    }

    let (status, body) = send(&app, "POST", &format!("/api/sessions/{id}/run-extended"), Some(run_body("small_number", "sk-me"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["out_of"], 100);
    assert_eq!(body["score"], 100);
    assert_eq!(body["extended_unlocked"], true);

    let (_, session) = send(&app, "GET", &format!("/api/sessions/{id}"), None).await;
    assert_eq!(session["score"], 10);
    assert_eq!(session["extended_run"]["out_of"], 100);
}

#[tokio::test]
async fn extended_run_is_locked_below_ten() {
    let echo = Arc::new(Echo::default());
    let app = app_with(echo.clone());
    let id = new_session(&app).await;

    let (_, body) = send(&app, "POST", &format!("/api/sessions/{id}/run"), Some(run_body("control", "sk-me"))).await;
    assert_eq!(body["score"], 1);
    assert_eq!(body["extended_unlocked"], false);
    let calls_before = echo.keys.lock().len();

    let (status, body) = send(&app, "POST", &format!("/api/sessions/{id}/run-extended"), Some(run_body("control", "sk-me"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "extended_locked");
    assert_eq!(echo.keys.lock().len(), calls_before);
}

#[tokio::test]
async fn changing_the_prompt_resets_the_score() {
    let app = app_with(Arc::new(Echo::default()));
    let id = new_session(&app).await;
    send(&app, "POST", &format!("/api/sessions/{id}/run"), Some(run_body("small_number", "sk-me"))).await;

    let mut changed = form("small_number");
    changed["prefix"] = json!("Your favourite colour is:");
    let (_, body) = send(&app, "POST", &format!("/api/sessions/{id}/preview"), Some(changed.clone())).await;
    assert_eq!(body["score_reset"], true);
    assert_eq!(body["score"], 0);

    changed["api_key"] = json!("sk-me");
    let (status, _) = send(&app, "POST", &format!("/api/sessions/{id}/run-extended"), Some(changed)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn rerunning_with_new_seed_invalidates_unlock() {
    let app = app_with(Arc::new(Echo::default()));
    let id = new_session(&app).await;
    send(&app, "POST", &format!("/api/sessions/{id}/run"), Some(run_body("small_number", "sk-me"))).await;

    let mut other = run_body("large_number", "sk-me");
    other["seed"] = json!(7);
    let (status, body) = send(&app, "POST", &format!("/api/sessions/{id}/run-extended"), Some(other)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "extended_locked");
}

#[tokio::test]
async fn shared_password_uses_owner_key() {
    let echo = Arc::new(Echo::default());
    let app = app_with(echo.clone());
    let id = new_session(&app).await;

    let (status, _) = send(&app, "POST", &format!("/api/sessions/{id}/run"), Some(run_body("word", "letmein"))).await;
    assert_eq!(status, StatusCode::OK);
    let keys = echo.keys.lock();
    assert_eq!(keys.len(), 10);
    assert!(keys.iter().all(|k| k == "sk-owner"));
}

#[tokio::test]
async fn second_run_in_same_session_is_rejected() {
    let gate = Arc::new(Gated::new());
    let app = app_with(gate.clone());
    let id = new_session(&app).await;
    let uri = format!("/api/sessions/{id}/run");

    let first = tokio::spawn({
        let app = app.clone();
        let uri = uri.clone();
        async move { send(&app, "POST", &uri, Some(run_body("small_number", "sk-me"))).await }
    });
    gate.entered.notified().await;

    let (status, body) = send(&app, "POST", &uri, Some(run_body("small_number", "sk-me"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "run_already_active");

    gate.release.notify_one();
    let (status, body) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 10);

    let (status, _) = send(&app, "POST", &uri, Some(run_body("small_number", "sk-me"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn run_finishing_after_prompt_change_is_not_recorded() {
    let gate = Arc::new(Gated::new());
    let app = app_with(gate.clone());
    let id = new_session(&app).await;

    let run = tokio::spawn({
        let app = app.clone();
        let uri = format!("/api/sessions/{id}/run");
        async move { send(&app, "POST", &uri, Some(run_body("small_number", "sk-me"))).await }
    });
    gate.entered.notified().await;

    let mut changed = form("small_number");
    changed["prefix"] = json!("Your favourite colour is:");
    let (_, preview) = send(&app, "POST", &format!("/api/sessions/{id}/preview"), Some(changed)).await;

    gate.release.notify_one();
    let (status, body) = run.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 10);
    assert_eq!(body["extended_unlocked"], false);

    let (_, session) = send(&app, "GET", &format!("/api/sessions/{id}"), None).await;
    assert_eq!(session["score"], 0);
    assert_eq!(session["last_prompt"], preview["combined_prompt"]);
    assert!(session["last_run"].is_null());
    assert_eq!(session["extended_unlocked"], false);
}

#[tokio::test]
async fn events_stream_reports_progress_for_its_session() {
    let app = app_with(Arc::new(Echo::default()));
    let id = new_session(&app).await;
    let other = new_session(&app).await;

    let req = Request::builder().uri(format!("/api/sessions/{id}/events")).body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"].to_str().unwrap().starts_with("text/event-stream"));
    let mut stream = resp.into_body();

    send(&app, "POST", &format!("/api/sessions/{other}/run"), Some(run_body("control", "sk-me"))).await;
    send(&app, "POST", &format!("/api/sessions/{id}/run"), Some(run_body("small_number", "sk-me"))).await;

    let mut text = String::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !text.contains("\"type\":\"finished\"") {
            let frame = stream.frame().await.unwrap().unwrap();
            if let Ok(data) = frame.into_data() {
                text.push_str(std::str::from_utf8(&data).unwrap());
            }
        }
    })
    .await
    .unwrap();

    let events: Vec<Value> = text
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();
    assert_eq!(events.len(), 12);
    assert!(events.iter().all(|e| e["run_id"] == id.as_str()));
    assert_eq!(events[0]["type"], "started");
    assert_eq!(events[0]["total"], 10);
    for (i, e) in events[1..11].iter().enumerate() {
        assert_eq!(e["type"], "progress");
        assert_eq!(e["done"], i + 1);
    }
    assert_eq!(events[11]["type"], "finished");
    assert_eq!(events[11]["score"], 10);
}
