use std::{
    io::{BufRead as _, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser, Debug)]
#[command(name = "artstamp", version)]
struct Cli {
    /// Directory of base artwork.
    #[arg(long, default_value = "art")]
    art: PathBuf,

    /// Directory holding one subdirectory of footers per group.
    #[arg(long, default_value = "footers")]
    footers: PathBuf,

    /// Where the finished archives are written.
    #[arg(long, default_value = "out")]
    out: PathBuf,

    /// Scratch area for per-group composites (overrides the config file).
    #[arg(long)]
    work: Option<PathBuf>,

    /// JSON pipeline configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum composites running at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Worker threads (defaults to the concurrency limit).
    #[arg(long)]
    threads: Option<usize>,

    /// One archive per footer directory or per footer file.
    #[arg(long, value_enum)]
    grouping: Option<GroupingChoice>,

    /// Do not wait for Enter before starting or exiting.
    #[arg(long, short = 'y')]
    yes: bool,

    /// Log every composite.
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GroupingChoice {
    PerGroup,
    PerFooter,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = build_config(&cli)?;

    for dir in [&cli.art, &cli.footers, &cli.out] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create directory '{}'", dir.display()))?;
    }

    if !cli.yes {
        wait_for_enter("Press Enter to start processing...")?;
    }

    let pipeline = artstamp::Pipeline::new(cfg)?;
    tracing::debug!(config = ?pipeline.config(), "starting run");
    let report = pipeline.run(&cli.art, &cli.footers, &cli.out)?;

    println!("Processing complete. Elapsed: {:?}", report.elapsed);
    println!(
        "  groups: {} processed, {} skipped",
        report.groups_processed, report.groups_skipped
    );
    println!(
        "  composites: {} dispatched, {} failed",
        report.tasks_dispatched, report.tasks_failed
    );
    for archive in &report.archives {
        println!("  wrote {}", archive.display());
    }

    if !cli.yes {
        wait_for_enter("Press Enter to exit...")?;
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_config(cli: &Cli) -> anyhow::Result<artstamp::PipelineConfig> {
    let mut cfg = match &cli.config {
        Some(path) => load_config(path)?,
        None => artstamp::PipelineConfig::default(),
    };
    if let Some(work) = &cli.work {
        cfg.work_root = work.clone();
    }
    if let Some(n) = cli.concurrency {
        cfg.concurrency = n;
    }
    if cli.threads.is_some() {
        cfg.threads = cli.threads;
    }
    if let Some(g) = cli.grouping {
        cfg.grouping = match g {
            GroupingChoice::PerGroup => artstamp::Grouping::PerGroup,
            GroupingChoice::PerFooter => artstamp::Grouping::PerFooter,
        };
    }
    cfg.validate()?;
    Ok(cfg)
}

fn load_config(path: &Path) -> anyhow::Result<artstamp::PipelineConfig> {
    artstamp::PipelineConfig::from_json_file(path)
        .with_context(|| format!("load config '{}'", path.display()))
}

fn wait_for_enter(prompt: &str) -> anyhow::Result<()> {
    println!("{prompt}");
    std::io::stdout().flush().context("flush stdout")?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read from stdin")?;
    Ok(())
}
