use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};

use crate::config::{Config, RetryPolicy};
use crate::error::{Error, FetchError, Result};
use crate::HttpClient;
use tracing::{debug, info, warn};

/// Builds the client every request goes through, with the timeout and the
/// browser-like headers from `config`.
pub fn build_client(config: &Config) -> Result<HttpClient> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    let mut builder = HttpClient::builder()
        .timeout(config.timeout)
        .user_agent(config.user_agent.as_str())
        .default_headers(headers);
    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(Error::ClientBuildError)?);
    } else if !config.system_proxy {
        builder = builder.no_proxy();
    }
    builder.build().map_err(Error::ClientBuildError)
}

/// GETs `url` and returns the body, retrying transient failures as allowed by
/// `retry`. A 403 means we've been blocked and is returned straight away.
pub async fn fetch_page(
    http: &HttpClient,
    url: &str,
    retry: &RetryPolicy,
) -> std::result::Result<String, FetchError> {
    let mut attempt = 0;
    loop {
        match fetch_once(http, url).await {
            Ok(page) => return Ok(page),
            Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                let delay = retry.delay(attempt);
                warn!(%url, error = %e, ?delay, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn fetch_once(http: &HttpClient, url: &str) -> std::result::Result<String, FetchError> {
    let transport = |source| FetchError::Transport {
        url: url.to_string(),
        source,
    };

    info!(%url, "Sent cpubenchmark web request");
    let response = http.get(url).send().await.map_err(transport)?;
    let status = response.status();
    info!(%url, %status, "Got response");
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }
    let page = response.text().await.map_err(transport)?;
    debug!(len = page.len(), "Size of html");
    Ok(page)
}
