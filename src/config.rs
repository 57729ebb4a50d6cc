use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const CPU_PAGE_BASE: &str = "https://www.cpubenchmark.net/cpu.php?id=";

/// A desktop browser UA, the site answers the default reqwest one with a 403
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// The cpus compared when none are given on the command line
pub const DEFAULT_TARGETS: &[(&str, &str)] = &[
    ("1850", "Intel Core i5-3337U"),
    ("828", "Intel Core i5-3570K"),
    ("3447", "Intel Core i5-8365U"),
    ("3560", "Intel Core i3-1005G1"),
    ("3877", "Intel Core i3-1115G4"),
    ("3725", "AMD Ryzen 5 4600U"),
    ("3708", "AMD Ryzen 5 4600H"),
    ("4141", "AMD Ryzen 5 5500U"),
];

/// A cpu detail page to scrape. `name` is what we expect the page to say, a
/// mismatch usually means the id was mistyped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub name: Option<String>,
}

impl Target {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// One detail page per cpu
    Pages(Vec<Target>),
    /// Chart listing pages, the first one is required, the rest are best effort
    Listing(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled on every following one
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(1 << attempt.min(16))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: Source,
    /// Prefix a cpu id is appended to
    pub link_base: String,
    pub timeout: Duration,
    pub user_agent: String,
    /// Explicit proxy, reqwest picks up `HTTPS_PROXY` on its own otherwise
    pub proxy: Option<String>,
    /// Whether proxies from the environment apply when `proxy` is unset
    pub system_proxy: bool,
    pub retry: RetryPolicy,
    pub max_concurrent_requests: usize,
    /// csv file previously scraped records are kept in
    pub cache: Option<PathBuf>,
    /// Cached records younger than this aren't fetched again
    pub refresh_after: time::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: Source::Pages(
                DEFAULT_TARGETS
                    .iter()
                    .map(|(id, name)| Target::named(*id, *name))
                    .collect(),
            ),
            link_base: CPU_PAGE_BASE.to_string(),
            timeout: Duration::from_secs(20),
            user_agent: BROWSER_USER_AGENT.to_string(),
            proxy: None,
            system_proxy: true,
            retry: RetryPolicy::default(),
            max_concurrent_requests: 4,
            cache: Some(PathBuf::from("processors.csv")),
            refresh_after: time::Duration::days(7),
        }
    }
}

impl Config {
    /// Defaults overridden by `CPUBENCH_TIMEOUT_SECS`, `CPUBENCH_USER_AGENT`
    /// and `CPUBENCH_PROXY`
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(secs) = var("CPUBENCH_TIMEOUT_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeout = Duration::from_secs(secs),
                _ => warn!(value = %secs, "ignoring invalid CPUBENCH_TIMEOUT_SECS"),
            }
        }
        if let Some(ua) = var("CPUBENCH_USER_AGENT").filter(|ua| !ua.trim().is_empty()) {
            self.user_agent = ua;
        }
        if let Some(proxy) = var("CPUBENCH_PROXY").filter(|p| !p.trim().is_empty()) {
            self.proxy = Some(proxy);
        }
        self
    }

    pub fn cpu_page_url(&self, id: &str) -> String {
        format!("{}{}", self.link_base, id)
    }
}
