use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tracing::{debug, warn};

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36";

/// What to fetch and how to tell the page finished loading.
#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub url: &'a str,
    /// Needs a JS-rendering fetch.
    pub rendered: bool,
    pub marker: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub content: String,
    pub latency_ms: i64,
    /// False when the marker never showed up; the content is kept for diagnostics.
    pub marker_found: bool,
}

pub trait PageSource {
    fn fetch(&self, request: &PageRequest<'_>) -> impl Future<Output = Result<FetchedPage>> + Send;
}

pub struct Fetcher {
    spider: Option<Spider>,
    http: reqwest::Client,
    timeout: Duration,
}

impl Fetcher {
    /// Rendered fetches need `SPIDER_API_KEY`; plain fetches work without it.
    pub fn from_env(timeout: Duration) -> Result<Self> {
        let spider = match std::env::var("SPIDER_API_KEY") {
            Ok(key) if !key.is_empty() => Some(
                Spider::new(Some(key)).map_err(|e| anyhow!("Failed to create Spider client: {}", e))?,
            ),
            _ => None,
        };
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { spider, http, timeout })
    }

    async fn fetch_once(&self, request: &PageRequest<'_>) -> Result<String> {
        if request.rendered {
            let spider = self
                .spider
                .as_ref()
                .ok_or_else(|| anyhow!("SPIDER_API_KEY environment variable must be set"))?;
            match tokio::time::timeout(self.timeout, scrape_rendered(spider, request.url)).await {
                Ok(result) => result,
                Err(_) => bail!("timeout after {}s", self.timeout.as_secs()),
            }
        } else {
            let resp = self.http.get(request.url).send().await?.error_for_status()?;
            Ok(resp.text().await?)
        }
    }
}

impl PageSource for Fetcher {
    async fn fetch(&self, request: &PageRequest<'_>) -> Result<FetchedPage> {
        let start = Instant::now();
        for attempt in 0..=MAX_RETRIES {
            let outcome = self.fetch_once(request).await;
            let last = attempt == MAX_RETRIES;
            let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));

            match outcome {
                Ok(content) => {
                    let marker_found = request.marker.map_or(true, |m| content.contains(m));
                    if marker_found || last {
                        if !marker_found {
                            warn!(url = request.url, marker = ?request.marker, "marker still missing, keeping last content");
                        }
                        debug!(url = request.url, bytes = content.len(), attempt, "fetched");
                        return Ok(FetchedPage {
                            url: request.url.to_string(),
                            content,
                            latency_ms: start.elapsed().as_millis() as i64,
                            marker_found,
                        });
                    }
                    warn!(
                        "Marker {:?} missing on {} (attempt {}/{}), retrying in {:.1}s",
                        request.marker,
                        request.url,
                        attempt + 1,
                        MAX_RETRIES,
                        backoff.as_secs_f64()
                    );
                }
                Err(e) if !last && is_transient(&e) => {
                    warn!(
                        "Fetch failed on {} (attempt {}/{}): {}, backing off {:.1}s",
                        request.url,
                        attempt + 1,
                        MAX_RETRIES,
                        e,
                        backoff.as_secs_f64()
                    );
                }
                Err(e) => return Err(e.context(format!("fetch {}", request.url))),
            }
            tokio::time::sleep(backoff).await;
        }
        bail!("fetch {}: retries exhausted", request.url)
    }
}

fn is_transient(err: &anyhow::Error) -> bool {
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        return e.is_timeout()
            || e.is_connect()
            || e.status().is_some_and(|s| s.as_u16() == 429 || s.is_server_error());
    }
    let msg = err.to_string();
    ["timeout", "429", "rate", "500", "502", "503", "504"]
        .iter()
        .any(|needle| msg.contains(needle))
}

async fn scrape_rendered(spider: &Spider, url: &str) -> Result<String> {
    let params = RequestParams {
        return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
        ..Default::default()
    };

    let response = spider
        .scrape_url(url, Some(params), "application/json")
        .await
        .map_err(|e| anyhow!("Spider scrape failed: {}", e))?;

    let parsed: serde_json::Value = match response.as_str() {
        Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
        None => response,
    };

    let first = parsed.as_array().and_then(|arr| arr.first());
    if let Some(status) = first.and_then(|obj| obj.get("status")).and_then(|s| s.as_i64()) {
        if status >= 400 {
            bail!("upstream status {}", status);
        }
    }

    first
        .and_then(|obj| obj.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("No content in spider response"))
}
