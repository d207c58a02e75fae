use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use seedgame::{
    api::{self, AppState},
    auth::{self, Credentials},
    build_limiter, build_provider,
    config::AppCfg,
    events::RunEvent,
    play::play,
    runner::GenerationRunner,
    seeds::{SeedCategory, SeedSet, EXTENDED_SEED_COUNT, STANDARD_SEED_COUNT},
    session::{GameForm, RunSummary},
};

#[derive(Parser)]
#[command(name = "seedgame", version)]
#[command(about = "Play the LLM seed game: vary a seed in a temperature-0 prompt and count unique outputs")]
struct Cli {
    /// YAML config file (defaults to ./seedgame.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print the seed tokens for a category
    Seeds {
        #[arg(long, value_enum)]
        category: Option<SeedCategory>,
        #[arg(long, allow_negative_numbers = true)]
        seed: Option<i64>,
        #[arg(long, default_value_t = STANDARD_SEED_COUNT)]
        count: usize,
    },
    /// Show the combined prompt for the first seed
    Preview(FormArgs),
    /// Run the prompt once per seed and print the score
    Run {
        #[command(flatten)]
        form: FormArgs,
        /// API key, or the shared password
        #[arg(long, env = "SEEDGAME_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Follow a 10/10 standard run with the 100-seed run
        #[arg(long)]
        extended: bool,
    },
    /// Print an argon2 hash for `shared_password_hash`
    HashPassword { password: String },
}

#[derive(Args)]
struct FormArgs {
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    prefix: Option<String>,
    #[arg(long, value_enum)]
    category: Option<SeedCategory>,
    #[arg(long, allow_negative_numbers = true)]
    seed: Option<i64>,
}

impl FormArgs {
    fn into_form(self, cfg: &AppCfg) -> GameForm {
        let mut form = GameForm::from(&cfg.game);
        if let Some(p) = self.prompt { form.prompt = p; }
        if let Some(p) = self.prefix { form.prefix = p; }
        if let Some(c) = self.category { form.category = c; }
        if let Some(s) = self.seed { form.seed = s; }
        form
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = AppCfg::load(cli.config.as_deref()).await?;

    match cli.command {
        Command::Serve { bind } => {
            let credentials = Credentials::load(&cfg.credentials_file, &cfg.provider.api_key_env).await?;
            let state = AppState::new(cfg.game.clone(), credentials, build_provider(&cfg), build_limiter(&cfg));
            api::serve(bind.unwrap_or_else(|| cfg.bind.clone()), state).await
        }
        Command::Seeds { category, seed, count } => {
            let set = seedgame::seeds::generate(
                category.unwrap_or(cfg.game.category),
                seed.unwrap_or(cfg.game.seed),
                count,
            );
            println!("{}", serde_json::to_string_pretty(&set)?);
            Ok(())
        }
        Command::Preview(args) => {
            let form = args.into_form(&cfg);
            println!("Combined Prompt:\n{}", form.combined_prompt());
            Ok(())
        }
        Command::Run { form, api_key, extended } => {
            let form = form.into_form(&cfg);
            run_cli(&cfg, form, api_key.unwrap_or_default(), extended).await
        }
        Command::HashPassword { password } => {
            println!("{}", auth::hash_password(&password)?);
            Ok(())
        }
    }
}

async fn run_cli(cfg: &AppCfg, form: GameForm, api_key: String, extended: bool) -> Result<()> {
    let credentials = Credentials::load(&cfg.credentials_file, &cfg.provider.api_key_env).await?;
    let credential = match credentials.resolve(&api_key) {
        Ok(c) => c,
        Err(e) => anyhow::bail!("{e}"),
    };

    let (tx, mut rx) = broadcast::channel::<RunEvent>(EXTENDED_SEED_COUNT + STANDARD_SEED_COUNT + 8);
    let mut runner = GenerationRunner::new(build_provider(cfg)).with_events(tx);
    if let Some(l) = build_limiter(cfg) {
        runner = runner.with_limiter(l);
    }

    let bar = ProgressBar::new(STANDARD_SEED_COUNT as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} Generating... [{bar:30}] {pos}/{len}")
            .context("progress template")?,
    );
    // Runs until the runner (and with it the sender) is dropped.
    let bar_task = {
        let bar = bar.clone();
        tokio::spawn(async move {
            while let Ok(evt) = rx.recv().await {
                match evt {
                    RunEvent::Started { total, .. } => {
                        bar.set_length(total as u64);
                        bar.set_position(0);
                    }
                    RunEvent::Progress { done, .. } => bar.set_position(done as u64),
                    RunEvent::Finished { .. } => {}
                    RunEvent::Failed { .. } => break,
                }
            }
        })
    };

    let run_id = format!("cli-{}", chrono::Utc::now().timestamp());
    let result = play(&runner, &run_id, &form, &credential, extended).await;
    drop(runner);
    bar_task.await.ok();
    bar.finish_and_clear();

    let session = match result {
        Ok(s) => s,
        Err(e) => anyhow::bail!("{e}"),
    };
    println!("Generated successfully!");
    if let Some(run) = session.last_run() {
        print_run(&form.seeds(STANDARD_SEED_COUNT), run);
    }
    if let Some(run) = session.extended_run() {
        print_run(&form.seeds(EXTENDED_SEED_COUNT), run);
    }
    Ok(())
}

fn print_run(seeds: &SeedSet, run: &RunSummary) {
    println!("Your score: {} out of {}", run.score, run.out_of);
    println!("Output:");
    for (token, out) in seeds.iter().zip(&run.outputs) {
        println!("  [{token}] {out}");
    }
}
