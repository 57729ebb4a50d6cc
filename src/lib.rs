/// Record cache kept between runs
pub mod cache;
pub mod config;
pub mod error;
/// Turning cpubenchmark.net html into processor records
pub mod extract;
pub mod processor;
/// Ranking and printing of processor records
pub mod report;
/// The fetching side of the website(s) we scrape
pub mod website_backends;

#[cfg(test)]
mod test_server;

use std::collections::{HashMap, HashSet};

use futures::stream::{self, StreamExt};
/// `reqwest`'s async http client re-exported
pub use reqwest::Client as HttpClient;
use time::{Date, OffsetDateTime};
use tracing::{error, info, warn};

pub use error::{Error, FetchError, ParseError, Result};

use cache::{is_fresh, load_cache, save_cache};
use config::{Config, Source, Target};
use extract::Extractor;
use processor::ProcessorRecord;
use website_backends::cpubenchmark::fetch_page;

/// An entry we fetched but couldn't turn into a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub url: String,
    /// Row on a listing page, `None` for a detail page
    pub position: Option<usize>,
    pub error: ParseError,
}

/// The outcome of one run. `records` are in the order they were encountered,
/// failures that didn't stop the run are kept alongside.
#[derive(Debug, Default)]
pub struct Comparison {
    pub records: Vec<ProcessorRecord>,
    pub fetch_failures: Vec<FetchError>,
    pub parse_failures: Vec<ParseFailure>,
    /// How many pages were actually downloaded, cache hits don't count
    pub pages_fetched: usize,
}

impl Comparison {
    /// Records best first, cut down to the first `top` when given
    pub fn ranked(&self, top: Option<usize>) -> Vec<ProcessorRecord> {
        let mut ranked = report::rank_records(self.records.clone());
        if let Some(top) = top {
            ranked.truncate(top);
        }
        ranked
    }
}

/// Fetches and parses everything `config` asks for.
///
/// Individual pages and entries are allowed to fail, the run itself only
/// fails when no page could be retrieved at all, or when the primary listing
/// page couldn't be retrieved.
pub async fn compare(
    http: &HttpClient,
    config: &Config,
    extractor: &Extractor,
) -> Result<Comparison> {
    let today = OffsetDateTime::now_utc().date();
    match &config.source {
        Source::Pages(targets) => compare_pages(http, config, extractor, targets, today).await,
        Source::Listing(urls) => compare_listing(http, config, extractor, urls, today).await,
    }
}

enum PageOutcome<'a> {
    Cached(ProcessorRecord),
    Fetched {
        target: &'a Target,
        url: String,
        page: std::result::Result<String, FetchError>,
    },
}

async fn compare_pages(
    http: &HttpClient,
    config: &Config,
    extractor: &Extractor,
    targets: &[Target],
    today: Date,
) -> Result<Comparison> {
    let mut cache = match &config.cache {
        Some(path) => load_cache(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring unreadable record cache");
            HashMap::new()
        }),
        None => HashMap::new(),
    };

    let outcomes: Vec<PageOutcome> = stream::iter(targets)
        .map(|target| {
            let cached = cache
                .get(&target.id)
                .filter(|r| is_fresh(r, today, config.refresh_after))
                .cloned();
            async move {
                match cached {
                    Some(record) => PageOutcome::Cached(record),
                    None => {
                        let url = config.cpu_page_url(&target.id);
                        let page = fetch_page(http, &url, &config.retry).await;
                        PageOutcome::Fetched { target, url, page }
                    }
                }
            }
        })
        .buffered(config.max_concurrent_requests.max(1))
        .collect()
        .await;

    let mut comparison = Comparison::default();
    for outcome in outcomes {
        match outcome {
            PageOutcome::Cached(record) => {
                info!(name = %record.name, "skipping update, cached record is fresh");
                comparison.records.push(record);
            }
            PageOutcome::Fetched {
                target,
                url,
                page: Ok(html),
            } => {
                comparison.pages_fetched += 1;
                match extractor.extract_cpu_page(&html) {
                    Ok(mut record) => {
                        check_name(target, &record);
                        record.id = Some(target.id.clone());
                        record.link = Some(url);
                        record.updated = Some(today);
                        comparison.records.push(record);
                    }
                    Err(error) => {
                        error!(%url, %error, "couldn't parse cpu page");
                        comparison.parse_failures.push(ParseFailure {
                            url,
                            position: None,
                            error,
                        });
                    }
                }
            }
            PageOutcome::Fetched {
                target,
                page: Err(e),
                ..
            } => {
                error!(error = %e, "couldn't fetch cpu page");
                comparison.fetch_failures.push(e);
                if let Some(stale) = cache.get(&target.id) {
                    warn!(name = %stale.name, "falling back to stale cached record");
                    comparison.records.push(stale.clone());
                }
            }
        }
    }

    if comparison.records.is_empty()
        && comparison.pages_fetched == 0
        && !comparison.fetch_failures.is_empty()
    {
        return Err(Error::NoPagesFetched(comparison.fetch_failures));
    }

    if let Some(path) = config.cache.as_ref().filter(|_| comparison.pages_fetched > 0) {
        let seen: HashSet<&str> = comparison
            .records
            .iter()
            .filter_map(|r| r.id.as_deref())
            .collect();
        let mut others: Vec<_> = cache
            .drain()
            .filter(|(id, _)| !seen.contains(id.as_str()))
            .map(|(_, r)| r)
            .collect();
        others.sort_by(|a, b| a.id.cmp(&b.id));
        let to_save: Vec<_> = comparison.records.iter().cloned().chain(others).collect();
        if let Err(e) = save_cache(path, &to_save) {
            warn!(path = %path.display(), error = %e, "couldn't save record cache");
        }
    }

    Ok(comparison)
}

fn check_name(target: &Target, record: &ProcessorRecord) {
    if let Some(expected) = &target.name {
        if !expected.trim().eq_ignore_ascii_case(record.name.trim()) {
            warn!(
                id = %target.id,
                %expected,
                found = %record.name,
                "cpu id doesn't match the expected name"
            );
        }
    }
}

async fn compare_listing(
    http: &HttpClient,
    config: &Config,
    extractor: &Extractor,
    urls: &[String],
    today: Date,
) -> Result<Comparison> {
    let pages: Vec<_> = stream::iter(urls)
        .map(|url| async move { (url, fetch_page(http, url, &config.retry).await) })
        .buffered(config.max_concurrent_requests.max(1))
        .collect()
        .await;

    let mut comparison = Comparison::default();
    let mut seen_ids = HashSet::new();
    for (i, (url, page)) in pages.into_iter().enumerate() {
        let html = match page {
            Ok(html) => html,
            // the first page is the one the user asked for, the rest are extras
            Err(e) if i == 0 => return Err(e.into()),
            Err(e) => {
                error!(error = %e, "couldn't fetch listing page, continuing without it");
                comparison.fetch_failures.push(e);
                continue;
            }
        };
        comparison.pages_fetched += 1;

        let extraction = extractor.extract_listing(&html);
        info!(
            %url,
            records = extraction.records.len(),
            skipped = extraction.errors.len(),
            "parsed listing page"
        );
        comparison
            .parse_failures
            .extend(extraction.errors.into_iter().map(|e| ParseFailure {
                url: url.clone(),
                position: Some(e.position),
                error: e.error,
            }));
        for mut record in extraction.records {
            if let Some(id) = &record.id {
                if !seen_ids.insert(id.clone()) {
                    continue;
                }
                record.link = Some(config.cpu_page_url(id));
            }
            record.updated = Some(today);
            comparison.records.push(record);
        }
    }
    Ok(comparison)
}
