use thiserror::Error;
use tracing::info;

use crate::{
    runner::{GenerationRunner, RunError},
    seeds::{EXTENDED_SEED_COUNT, STANDARD_SEED_COUNT},
    session::{GameForm, SessionState},
};

#[derive(Debug, Error)]
pub enum PlayError {
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("The 100-seed run unlocks at a score of 10/10 (current score: {score})")]
    ExtendedLocked { score: usize },
}

/// A single pass through the game outside the HTTP API. The standard set
/// always runs first; the extended set only follows a perfect score.
pub async fn play(
    runner: &GenerationRunner,
    run_id: &str,
    form: &GameForm,
    credential: &str,
    extended: bool,
) -> Result<SessionState, PlayError> {
    let template = form.template();
    let mut session = SessionState::new();

    let outputs = runner.run(run_id, &template, &form.seeds(STANDARD_SEED_COUNT), credential).await?;
    session.record_run(&form.combined_prompt(), outputs);

    if extended {
        if !session.extended_unlocked() {
            info!(run_id, score = session.score(), "extended run locked");
            return Err(PlayError::ExtendedLocked { score: session.score() });
        }
        let outputs = runner.run(run_id, &template, &form.seeds(EXTENDED_SEED_COUNT), credential).await?;
        session.record_extended_run(outputs);
    }
    Ok(session)
}
