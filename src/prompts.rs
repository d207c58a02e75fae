use serde::{Deserialize, Serialize};

use crate::seeds::SeedSet;

/// The three user-controlled slots of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
	pub prefix: String,
	pub prompt: String,
}

impl PromptTemplate {
	pub fn new(prefix: impl Into<String>, prompt: impl Into<String>) -> Self {
		Self { prefix: prefix.into(), prompt: prompt.into() }
	}

	pub fn render(&self, seed_token: &str) -> String {
		format(&self.prefix, &self.prompt, seed_token)
	}

	/// Renders with the first seed of the set, which is what a preview shows.
	pub fn preview(&self, seeds: &SeedSet) -> String {
		self.render(seeds.first().unwrap_or_default())
	}
}

/// `"{prefix} {seed}\n\n{prompt}"`. The template is fixed.
pub fn format(prefix: &str, prompt: &str, seed_token: &str) -> String {
	format!("{prefix} {seed_token}\n\n{prompt}")
}
