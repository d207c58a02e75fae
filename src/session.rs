use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GameCfg;
use crate::prompts::PromptTemplate;
use crate::score::score;
use crate::seeds::{SeedCategory, SeedGenerator, SeedSet, EXTENDED_SEED_COUNT, STANDARD_SEED_COUNT};

/// What the player has typed into the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameForm {
    pub prompt: String,
    pub prefix: String,
    pub category: SeedCategory,
    pub seed: i64,
}

impl From<&GameCfg> for GameForm {
    fn from(cfg: &GameCfg) -> Self {
        Self {
            prompt: cfg.prompt.clone(),
            prefix: cfg.prefix.clone(),
            category: cfg.category,
            seed: cfg.seed,
        }
    }
}

impl GameForm {
    pub fn template(&self) -> PromptTemplate {
        PromptTemplate::new(self.prefix.clone(), self.prompt.clone())
    }

    pub fn seeds(&self, count: usize) -> SeedSet {
        SeedGenerator::new(self.seed).generate(self.category, count)
    }

    /// The standard set's first prompt; any change to the form changes this.
    pub fn combined_prompt(&self) -> String {
        self.template().preview(&self.seeds(STANDARD_SEED_COUNT))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub score: usize,
    pub out_of: usize,
    pub outputs: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn new(outputs: Vec<String>) -> Self {
        Self {
            score: score(&outputs),
            out_of: outputs.len(),
            outputs,
            finished_at: Utc::now(),
        }
    }
}

/// Per-player state. Mutated only through `observe_prompt`, `record_run`
/// and `record_extended_run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    score: usize,
    last_prompt: String,
    last_run: Option<RunSummary>,
    extended_run: Option<RunSummary>,
    created_at: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            score: 0,
            last_prompt: String::new(),
            last_run: None,
            extended_run: None,
            created_at: Utc::now(),
        }
    }
}

impl SessionState {
    pub fn new() -> Self { Self::default() }

    pub fn score(&self) -> usize { self.score }
    pub fn last_prompt(&self) -> &str { &self.last_prompt }
    pub fn last_run(&self) -> Option<&RunSummary> { self.last_run.as_ref() }
    pub fn extended_run(&self) -> Option<&RunSummary> { self.extended_run.as_ref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Stores the current combined prompt. A different prompt invalidates the
    /// score. Returns whether a nonzero score was discarded.
    pub fn observe_prompt(&mut self, combined: &str) -> bool {
        if self.last_prompt == combined {
            return false;
        }
        let reset = self.score != 0;
        self.last_prompt = combined.to_string();
        self.score = 0;
        self.last_run = None;
        self.extended_run = None;
        reset
    }

    pub fn record_run(&mut self, combined: &str, outputs: Vec<String>) -> &RunSummary {
        self.observe_prompt(combined);
        let summary = self.last_run.insert(RunSummary::new(outputs));
        self.score = summary.score;
        summary
    }

    /// Extended results are kept apart so they never relock the extended run.
    pub fn record_extended_run(&mut self, outputs: Vec<String>) -> &RunSummary {
        self.extended_run.insert(RunSummary::new(outputs))
    }

    pub fn extended_unlocked(&self) -> bool {
        self.score == STANDARD_SEED_COUNT
    }
}

/// Serializable snapshot for the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub score: usize,
    pub out_of: usize,
    pub last_prompt: String,
    pub extended_unlocked: bool,
    pub extended_count: usize,
    pub last_run: Option<RunSummary>,
    pub extended_run: Option<RunSummary>,
    pub created_at: DateTime<Utc>,
}

impl From<&SessionState> for SessionView {
    fn from(s: &SessionState) -> Self {
        Self {
            score: s.score,
            out_of: STANDARD_SEED_COUNT,
            last_prompt: s.last_prompt.clone(),
            extended_unlocked: s.extended_unlocked(),
            extended_count: EXTENDED_SEED_COUNT,
            last_run: s.last_run.clone(),
            extended_run: s.extended_run.clone(),
            created_at: s.created_at,
        }
    }
}
