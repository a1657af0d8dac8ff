mod api_types;
mod classify;
mod config;
mod embed;
mod error;
mod ingest;
mod models;
mod narrative_tree;
mod oracle;
mod orchestrator;
mod out_models;
mod post_graph;
mod prompts;
mod ranking;
mod render;
mod similarity;
mod similarity_graph;
mod text;
mod viz_export;

use anyhow::Result;
use clap::Parser;
use orchestrator::run_pipeline;
use std::path::PathBuf;
use tracing::{debug, info};

/// Narrative Graphs - cross-platform narrative propagation analysis
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Platform corpus as NAME=PATH to a JSON post file; give exactly three, in order
    #[arg(short, long = "platform", value_parser = parse_platform, required = true)]
    platforms: Vec<(String, PathBuf)>,

    /// Output directory for generated files (default: "out")
    #[arg(short, long, default_value = "out")]
    output_dir: String,

    /// Path to config file (overrides NARRATIVE_CONFIG environment variable)
    #[arg(short, long)]
    config: Option<String>,
}

fn parse_platform(s: &str) -> std::result::Result<(String, PathBuf), String> {
    let (name, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got {:?}", s))?;
    let name = name.trim();
    if name.is_empty() || path.trim().is_empty() {
        return Err(format!("expected NAME=PATH, got {:?}", s));
    }
    Ok((name.to_string(), PathBuf::from(path.trim())))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();

    info!("Starting narrative_graphs");

    let args = Args::parse();

    let cfg_path = config::resolve_config_path(args.config.as_deref());
    debug!("Using config file: {}", cfg_path.display());

    // Friendlier error if missing
    if !cfg_path.exists() {
        return Err(anyhow::anyhow!(
            "config not found at {}\n\
             Use --config to specify a config file, or set {} environment variable.\n\
             Example {}:\n{}",
            cfg_path.display(),
            config::CONFIG_ENV,
            config::DEFAULT_CONFIG_FILE,
            config::EXAMPLE_CONFIG
        ));
    }

    let cfg = config::Config::load(&cfg_path)?;
    debug!(
        "Config loaded - model={}, embedding_model={}, threshold={}",
        cfg.model, cfg.embedding.model, cfg.analysis.similarity_threshold
    );

    run_pipeline(&cfg, &args.platforms, &args.output_dir).await
}
