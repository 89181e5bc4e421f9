use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use arena_lens::pipeline::{PROBE_IMAGE_URL, PROBE_PROMPT};
use arena_lens::{logging, run_search, Config, ConsoleSink, Error, Pipeline, SearchRequest};

/// Environment variable holding the inference token.
const TOKEN_ENV: &str = "ARENA_LENS_HF_TOKEN";

/// Search Are.na for images that look like a keyword.
#[derive(Parser)]
#[command(name = "arena-lens", version)]
#[command(about = "Keyword image search over Are.na channels, filtered by CLIP similarity", long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    ARENA_LENS_HF_TOKEN   Inference API token (overrides clip.api_token)\n    ARENA_LENS_LOG        Log level (trace, debug, info, warn, error)\n\nConfig file location: $XDG_CONFIG_HOME/arena-lens/config.toml")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Inference API token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Also log to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find images matching a keyword
    Search {
        keyword: String,

        /// Minimum CLIP score (0-1]
        #[arg(short, long)]
        threshold: Option<f32>,

        #[arg(long)]
        max_channels: Option<usize>,

        #[arg(long)]
        max_blocks: Option<usize>,

        /// Threads used to fetch and score one channel's images
        #[arg(short, long)]
        parallelism: Option<usize>,

        /// Write matched images to this directory
        #[arg(short, long)]
        save_dir: Option<PathBuf>,
    },
    /// Score a known reference image to check the CLIP endpoint
    Probe {
        #[arg(long, default_value = PROBE_IMAGE_URL)]
        url: String,

        #[arg(long, default_value = PROBE_PROMPT)]
        prompt: String,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _ = logging::init(Some(Config::config_dir().join("logs")), cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "arena-lens failed");
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let config = match cli.config {
        Some(ref path) => Config::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load()?,
    };

    let token = config.resolve_api_token(cli.token.as_deref(), std::env::var(TOKEN_ENV).ok());
    if token.is_none() && !matches!(cli.command, Commands::Config) {
        tracing::warn!("No inference token configured; requests are sent unauthenticated");
    }

    match cli.command {
        Commands::Search {
            keyword,
            threshold,
            max_channels,
            max_blocks,
            parallelism,
            save_dir,
        } => {
            let mut request = SearchRequest::from_defaults(&keyword, &config.search);
            if let Some(threshold) = threshold {
                request.threshold = threshold;
            }
            if let Some(max_channels) = max_channels {
                request.max_channels = max_channels;
            }
            if let Some(max_blocks) = max_blocks {
                request.max_blocks_per_channel = max_blocks;
            }
            if let Some(parallelism) = parallelism {
                request.parallelism = parallelism;
            }

            let pipeline = Pipeline::from_config(&config, token.as_deref());
            let mut sink = ConsoleSink::new(std::io::stdout().lock()).with_save_dir(save_dir);

            match run_search(&pipeline, &request, &mut sink) {
                Ok(outcome) => {
                    tracing::info!(?outcome, "Search finished");
                    Ok(ExitCode::SUCCESS)
                }
                // Already reported through the sink.
                Err(Error::InvalidRequest(_)) | Err(Error::Search(_)) => Ok(ExitCode::FAILURE),
                Err(e) => Err(e.into()),
            }
        }
        Commands::Probe { url, prompt } => {
            let pipeline = Pipeline::from_config(&config, token.as_deref());
            let report = pipeline
                .probe(&url, &prompt)
                .with_context(|| format!("failed to fetch test image {}", url))?;

            for warning in &report.warnings {
                println!("warning: {}", warning);
            }
            if let Some(caption) = &report.caption {
                println!("{}", caption);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            println!("# {}", config_path.display());
            print!("{}", toml::to_string_pretty(&config.redacted())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
