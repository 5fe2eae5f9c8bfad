//! voxrun CLI
//!
//! Demo on running offline inference with the correct prompt format on audio
//! language models.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use voxrun::runner::{self, RunArgs};

#[derive(Parser, Debug)]
#[command(
    name = "voxrun",
    version,
    about = "Demo on using llama.cpp for offline inference with audio language models"
)]
struct Args {
    /// Model family to run
    #[arg(short = 'm', long, default_value = "ultravox")]
    model_type: String,

    /// Number of prompts to run
    #[arg(long, default_value_t = 1)]
    num_prompts: usize,

    /// Number of audio items per prompt (0, 1 or 2)
    #[arg(long, default_value_t = 1)]
    num_audios: usize,

    /// Seed forwarded to the engine sampler
    #[arg(long)]
    seed: Option<u32>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let run_args = RunArgs {
        model_type: args.model_type,
        num_prompts: args.num_prompts,
        num_audios: args.num_audios,
        seed: args.seed,
    };

    if let Err(e) = runner::run(run_args).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
