use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    events::RunEvent,
    prompts::PromptTemplate,
    providers::{CompletionProvider, ProviderError},
    rate_limit::SimpleRateLimiter,
    score::score,
    seeds::SeedSet,
};

/// User-facing text for any failed generation.
pub const GENERATION_FAILED_MSG: &str = "Error: Invalid API key (probably)";

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Please enter your OpenAI API Key")]
    MissingCredential,
    #[error("Error: Invalid API key (probably)")]
    Generation {
        index: usize,
        #[source]
        source: ProviderError,
    },
}

/// One output per seed, index-aligned.
pub type OutputSequence = Vec<String>;

pub struct GenerationRunner {
    provider: Arc<dyn CompletionProvider>,
    limiter: Option<Arc<SimpleRateLimiter>>,
    events: Option<broadcast::Sender<RunEvent>>,
}

impl GenerationRunner {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider, limiter: None, events: None }
    }

    pub fn with_limiter(mut self, limiter: Arc<SimpleRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_events(mut self, tx: broadcast::Sender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn provider_name(&self) -> &'static str { self.provider.name() }

    /// Calls the provider once per seed, in order. The first failure aborts
    /// the run; nothing produced before it is returned.
    pub async fn run(
        &self,
        run_id: &str,
        template: &PromptTemplate,
        seeds: &SeedSet,
        credential: &str,
    ) -> Result<OutputSequence, RunError> {
        let total = seeds.len();
        info!(run_id, provider = self.provider.name(), category = ?seeds.category, total, "generation started");
        self.emit(RunEvent::Started { run_id: run_id.to_string(), total });

        let mut outputs = Vec::with_capacity(total);
        for (index, token) in seeds.iter().enumerate() {
            if let Some(limiter) = &self.limiter {
                limiter.wait().await;
            }
            let prompt = template.render(token);
            match self.provider.complete(&prompt, credential).await {
                Ok(text) => {
                    debug!(run_id, index, "completion received");
                    outputs.push(text);
                    self.emit(RunEvent::Progress { run_id: run_id.to_string(), done: index + 1, total });
                }
                Err(source) => {
                    warn!(run_id, index, error = %source, "generation aborted");
                    let err = RunError::Generation { index, source };
                    self.emit(RunEvent::Failed { run_id: run_id.to_string(), error: err.to_string() });
                    return Err(err);
                }
            }
        }

        let score = score(&outputs);
        info!(run_id, score, total, "generation finished");
        self.emit(RunEvent::Finished { run_id: run_id.to_string(), score });
        Ok(outputs)
    }

    fn emit(&self, evt: RunEvent) {
        if let Some(tx) = &self.events {
            // no subscribers is fine
            let _ = tx.send(evt);
        }
    }
}
