mod browser;
mod classifier;
mod config;
mod db;
mod export;
mod extract;
mod input;
mod pipeline;
mod record;
mod validity;
mod vectorize;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::extract::StrategyKind;
use crate::record::NormInput;

#[derive(Parser)]
#[command(
    name = "norma_scraper",
    about = "Legal-norm ingestion and vectorization pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape one or more norm URLs
    Scrape {
        /// Source URLs to ingest
        #[arg(required = true)]
        urls: Vec<String>,
        /// Force a strategy: api, rendered, leychile (default: auto)
        #[arg(short, long)]
        strategy: Option<String>,
    },
    /// Ingest norms from a CSV metadata feed
    Import {
        /// CSV file with at least a url_publica column
        input: PathBuf,
        /// Force a strategy: api, rendered, leychile (default: auto)
        #[arg(short, long)]
        strategy: Option<String>,
    },
    /// Attach embeddings to stored norms that lack one
    Vectorize {
        /// Records per batch
        #[arg(short = 'n', long)]
        batch_size: Option<usize>,
    },
    /// Show store statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(if e.use_stderr() { 1 } else { 0 });
    });
    let mut cfg = Config::from_env();

    let result = match cli.command {
        Commands::Scrape { urls, strategy } => {
            let inputs: Vec<NormInput> = urls.iter().map(|u| NormInput::from_url(u)).collect();
            scrape(&cfg, inputs, strategy).await
        }
        Commands::Import { input, strategy } => {
            let inputs = input::read_norms_csv(&input)?;
            if inputs.is_empty() {
                println!("No usable rows in {}.", input.display());
                return Ok(());
            }
            println!("Loaded {} norms from {}", inputs.len(), input.display());
            scrape(&cfg, inputs, strategy).await
        }
        Commands::Vectorize { batch_size } => {
            if let Some(n) = batch_size {
                cfg.batch_size = n;
            }
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;

            let api_key = cfg
                .embed_api_key
                .clone()
                .context("GEMINI_API_KEY environment variable must be set")?;
            let embedder = vectorize::GeminiEmbedder::new(
                api_key,
                cfg.embed_endpoint.clone(),
                cfg.embed_model.clone(),
                cfg.vector_dim,
            )?;

            let report = vectorize::run(&conn, &embedder, &cfg).await?;
            println!(
                "Embedded {} records in {} batches ({} left pending).",
                report.embedded, report.batches, report.skipped
            );
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Total:    {}", s.total);
            println!("Ok:       {}", s.ok);
            println!("Errors:   {}", s.errors);
            println!("Embedded: {}", s.embedded);
            println!("Pending:  {}", s.pending);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn scrape(
    cfg: &Config,
    inputs: Vec<NormInput>,
    strategy: Option<String>,
) -> anyhow::Result<()> {
    let requested = match strategy.as_deref() {
        None => None,
        Some(name) => Some(StrategyKind::parse(name).with_context(|| {
            format!("unknown strategy '{}' (expected api, rendered, or leychile)", name)
        })?),
    };

    let conn = db::connect(&cfg.db_path)?;
    db::init_schema(&conn)?;

    println!("Processing {} norms...", inputs.len());
    let outcomes = pipeline::run_scrape(&conn, cfg, &inputs, requested).await?;

    let label = strategy.as_deref().unwrap_or("auto");
    export::write_results(&cfg.results_dir, label, &outcomes)?;
    pipeline::ScrapeCounts::tally(&outcomes).print();
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
