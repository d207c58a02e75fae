//! LLM seed game: put a reproducible seed token into a temperature-0 prompt
//! and count how many distinct completions come back.

pub mod api;
pub mod auth;
pub mod config;
pub mod events;
pub mod play;
pub mod prompts;
pub mod providers;
pub mod rate_limit;
pub mod runner;
pub mod score;
pub mod seeds;
pub mod session;
mod wordlist;

use std::sync::Arc;

use config::{AppCfg, ProviderKind};
use providers::{CompletionProvider, MockProvider, OpenAIProvider};
use rate_limit::SimpleRateLimiter;

pub fn build_provider(cfg: &AppCfg) -> Arc<dyn CompletionProvider> {
    match cfg.provider.kind {
        ProviderKind::OpenAI => Arc::new(OpenAIProvider::new(&cfg.provider.base_url, &cfg.provider.model)),
        ProviderKind::Mock => Arc::new(MockProvider),
    }
}

pub fn build_limiter(cfg: &AppCfg) -> Option<Arc<SimpleRateLimiter>> {
    cfg.provider.rate_per_min.map(|n| Arc::new(SimpleRateLimiter::per_minute(n)))
}
