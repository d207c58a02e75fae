use std::{future::Future, pin::Pin};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("credential rejected by provider")]
    Unauthorized,
    #[error("rate limited by provider")]
    RateLimited,
    #[error("http error: {0}")]
    Http(String),
    #[error("fatal provider error: {0}")]
    Fatal(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Fatal(format!("decode error: {e}"))
        } else {
            ProviderError::Http(e.to_string())
        }
    }
}

pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>>;

/// A text-completion backend. Implementations must sample deterministically.
pub trait CompletionProvider: Send + Sync {
    fn complete<'a>(&'a self, prompt: &'a str, api_key: &'a str) -> CompletionFuture<'a>;
    fn name(&self) -> &'static str;
}

/// Offline stand-in that behaves like a temperature-0 model: the same prompt
/// always gets the same answer.
pub struct MockProvider;

const MOCK_NAMES: &[&str] = &[
    "Olivia", "Liam", "Emma", "Noah", "Amelia", "Oliver", "Ava", "Elijah", "Sophia", "Lucas",
    "Isabella", "Levi", "Mia", "Mateo", "Luna", "Ezra", "Harper", "Asher", "Evelyn", "James",
];

impl MockProvider {
    fn answer(prompt: &str) -> String {
        let digest = Sha256::digest(prompt.as_bytes());
        let idx = u16::from_be_bytes([digest[0], digest[1]]) as usize % MOCK_NAMES.len();
        MOCK_NAMES[idx].to_string()
    }
}

impl CompletionProvider for MockProvider {
    fn complete<'a>(&'a self, prompt: &'a str, _api_key: &'a str) -> CompletionFuture<'a> {
        Box::pin(async move { Ok(Self::answer(prompt)) })
    }

    fn name(&self) -> &'static str { "mock" }
}

pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAIProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str { &self.model }
}

#[derive(Serialize)] struct ChatReq<'a> { model: &'a str, messages: Vec<Msg<'a>>, temperature: f32 }
#[derive(Serialize)] struct Msg<'a> { role: &'a str, content: &'a str }
#[derive(Deserialize)] struct ChatResp { choices: Vec<Choice> }
#[derive(Deserialize)] struct Choice { message: MsgOwned }
#[derive(Deserialize)] struct MsgOwned { #[allow(unused)] role: String, content: Option<String> }

impl CompletionProvider for OpenAIProvider {
    fn complete<'a>(&'a self, prompt: &'a str, api_key: &'a str) -> CompletionFuture<'a> {
        Box::pin(async move {
            let req = ChatReq {
                model: &self.model,
                messages: vec![Msg { role: "user", content: prompt }],
                temperature: 0.0,
            };
            let resp = self.client.post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(api_key)
                .json(&req)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                return Err(match status.as_u16() {
                    401 | 403 => ProviderError::Unauthorized,
                    429 => ProviderError::RateLimited,
                    _ => ProviderError::Http(format!("status {status}")),
                });
            }

            let body = resp.json::<ChatResp>().await?;
            body.choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| ProviderError::Fatal("no content in response".into()))
        })
    }

    fn name(&self) -> &'static str { "openai" }
}
