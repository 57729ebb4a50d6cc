use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use cpu_benchmarks::config::{Config, Source, Target};
use cpu_benchmarks::extract::{Extractor, SelectorConfig};
use cpu_benchmarks::report::{self, OutputFormat};
use cpu_benchmarks::website_backends::cpubenchmark::build_client;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SCRAPE_FAILED: &str = "couldn't scrape any benchmark data";

/// Compare any number of CPUs using cpubenchmark.net scores
#[derive(Parser, Debug)]
#[command(name = "cpubench", version)]
struct Args {
    /// cpubenchmark.net cpu ids (the `id=` in cpu.php?id=...), defaults to a built-in list
    ids: Vec<String>,

    /// Scrape chart listing page(s) instead of individual cpu pages. The first
    /// one has to succeed, the rest are best effort.
    #[arg(long = "listing", value_name = "URL", conflicts_with = "ids")]
    listings: Vec<String>,

    /// Output format, `text` or `csv`
    #[arg(short, long, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Only show the best N
    #[arg(short = 'n', long)]
    top: Option<usize>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Extra attempts for failed requests (403s are never retried)
    #[arg(long)]
    retries: Option<u32>,

    /// Max requests in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// csv file scraped records are cached in
    #[arg(long, value_name = "PATH")]
    cache: Option<PathBuf>,

    /// Don't read or write the record cache
    #[arg(long, conflicts_with = "cache")]
    no_cache: bool,

    /// JSON file with replacement selector patterns
    #[arg(long, value_name = "PATH")]
    selectors: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config::from_env();
        if !self.listings.is_empty() {
            config.source = Source::Listing(self.listings.clone());
        } else if !self.ids.is_empty() {
            config.source = Source::Pages(self.ids.iter().map(Target::new).collect());
        }
        if let Some(secs) = self.timeout {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = self.retries {
            config.retry.max_retries = retries;
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrent_requests = concurrency;
        }
        if self.no_cache {
            config.cache = None;
        } else if let Some(path) = &self.cache {
            config.cache = Some(path.clone());
        }
        config
    }
}

fn setup(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup(args.verbose);

    let config = args.config();
    let extractor = match &args.selectors {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("couldn't read {}", path.display()))?;
            Extractor::new(&SelectorConfig::from_json(&json)?)?
        }
        None => Extractor::default(),
    };
    let http = build_client(&config)?;

    let comparison = cpu_benchmarks::compare(&http, &config, &extractor)
        .await
        .context(SCRAPE_FAILED)?;

    for failure in &comparison.fetch_failures {
        warn!(url = %failure.url(), "skipped: {}", failure);
    }
    for failure in &comparison.parse_failures {
        warn!(url = %failure.url, position = ?failure.position, "skipped: {}", failure.error);
    }
    info!(
        records = comparison.records.len(),
        pages = comparison.pages_fetched,
        "done"
    );

    let ranked = comparison.ranked(args.top);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    report::render(&ranked, args.format, &mut out)?;
    out.flush()?;
    Ok(())
}
