//! # docharvest CLI (`harvest`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest run <queries...>` | Search, download, extract and deduplicate |
//! | `harvest dedupe -o DIR` | Deduplicate an existing `texts/` directory |
//! | `harvest status -o DIR` | Show what a previous run recorded |
//!
//! ## Exit status
//!
//! `0` success, `2` finished with failed items, `1` fatal error.
//!
//! ## Examples
//!
//! ```bash
//! harvest run passport --max-pages 20
//! harvest --config harvest.toml run "birth certificate" visa -o out/
//! harvest run -o out/ --text-only
//! RUST_LOG=docharvest=debug harvest run passport --concurrency 8
//! ```

use clap::{Parser, Subcommand};
use docharvest::config::{self, Config};
use docharvest::dedupe::dedupe_dir;
use docharvest::extract::PdfExtractor;
use docharvest::fetch::HttpFetcher;
use docharvest::layout::{default_output_dir, OutputLayout};
use docharvest::logging::init_logging;
use docharvest::pipeline::{run_pipeline, RunOptions};
use docharvest::progress::ProgressMode;
use docharvest::search::HttpSearchSource;
use docharvest::status::collect_status;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const EXIT_FAILURES: u8 = 2;

/// Resumable document harvesting with near-duplicate removal.
#[derive(Parser)]
#[command(name = "harvest", version)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    /// Progress output on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for one or more search queries.
    Run {
        /// Search terms. Each is searched and downloaded in turn.
        queries: Vec<String>,

        /// Output directory. Derived from the queries when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        max_pages: Option<u64>,

        /// Accepted for compatibility; sessions are established externally.
        #[arg(long)]
        headless: bool,

        /// Skip search and download; process files already on disk.
        #[arg(long)]
        text_only: bool,

        #[arg(long)]
        no_dedupe: bool,

        #[arg(long)]
        dedupe_threshold: Option<f64>,

        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Deduplicate the `texts/` directory of a previous run.
    Dedupe {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long)]
        dedupe_threshold: Option<f64>,
    },
    /// Show the manifest and fingerprint counts of a previous run.
    Status {
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight downloads");
            token.cancel();
        }
    });
}

fn apply_overrides(
    mut cfg: Config,
    max_pages: Option<u64>,
    threshold: Option<f64>,
    concurrency: Option<usize>,
) -> anyhow::Result<Config> {
    if let Some(n) = max_pages {
        cfg.search.max_pages = n;
    }
    if let Some(t) = threshold {
        cfg.dedupe.threshold = t;
    }
    if let Some(c) = concurrency {
        cfg.fetch.concurrency = c;
    }
    cfg.validate()?;
    Ok(cfg)
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let cfg = config::load_config(cli.config.as_deref())?;
    let progress_mode = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Run {
            queries,
            output,
            max_pages,
            headless,
            text_only,
            no_dedupe,
            dedupe_threshold,
            concurrency,
        } => {
            let cfg = apply_overrides(cfg, max_pages, dedupe_threshold, concurrency)?;
            let output = output
                .or_else(|| cfg.output.dir.clone())
                .unwrap_or_else(|| default_output_dir(&queries));
            info!(
                queries = ?queries,
                output = %output.display(),
                headless,
                concurrency = cfg.fetch.concurrency,
                max_pages = cfg.search.max_pages,
                "starting run"
            );

            let source = HttpSearchSource::new(&cfg.search)?;
            let fetcher = Arc::new(HttpFetcher::new(&cfg.fetch, &cfg.search)?);
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let options = RunOptions {
                queries,
                output,
                text_only,
                dedupe: !no_dedupe,
            };
            let summary = run_pipeline(
                &cfg,
                &options,
                &source,
                fetcher,
                Arc::new(PdfExtractor),
                &cancel,
                Arc::from(progress_mode.reporter()),
            )
            .await?;
            summary.print(&mut std::io::stdout().lock())?;
            Ok(summary.has_failures())
        }
        Commands::Dedupe {
            output,
            dedupe_threshold,
        } => {
            let cfg = apply_overrides(cfg, None, dedupe_threshold, None)?;
            let layout = OutputLayout::new(output);
            if !layout.text_dir().is_dir() {
                anyhow::bail!("no texts directory in {}", layout.root().display());
            }
            let reporter = progress_mode.reporter();
            let report = dedupe_dir(&layout, cfg.dedup_params(), reporter.as_ref())?;
            println!(
                "{} texts, {} unique, {} duplicates moved to {}",
                report.total,
                report.unique,
                report.removed,
                layout.removed_dir().display()
            );
            Ok(false)
        }
        Commands::Status { output } => {
            let layout = OutputLayout::new(output);
            let status = collect_status(&layout, cfg.fetch.min_bytes)?;
            status.print(&mut std::io::stdout().lock())?;
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match run(cli).await {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::from(EXIT_FAILURES),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
