/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Paginated collection fetches with bounded per-page retry.
//!
//! A fetch issues one logical request against a collection path, follows the
//! envelope's `next_url` cursor until it comes back empty, and hands every
//! page body to a caller-supplied handler. The fetcher never owns the data it
//! fetches; callers accumulate what the handler gives them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use reqwest::blocking::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_MAX_PAGES: usize = 500;
const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(250);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchError {
    InvalidUrl(String),
    Transport(String),
    HttpStatus(u16),
    Decode(String),
    PageLimit(usize),
    Cancelled,
    Handler(String),
}

impl FetchError {
    /// Whether retrying the same page could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Decode(_) | FetchError::Handler(_) => true,
            FetchError::HttpStatus(status) => *status == 429 || (500..600).contains(status),
            FetchError::InvalidUrl(_) | FetchError::PageLimit(_) | FetchError::Cancelled => false,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::InvalidUrl(detail) => write!(f, "invalid request url: {detail}"),
            FetchError::Transport(detail) => write!(f, "transport error: {detail}"),
            FetchError::HttpStatus(status) => write!(f, "unexpected http status {status}"),
            FetchError::Decode(detail) => write!(f, "malformed response body: {detail}"),
            FetchError::PageLimit(limit) => {
                write!(f, "pagination did not terminate within {limit} pages")
            }
            FetchError::Cancelled => write!(f, "fetch cancelled"),
            FetchError::Handler(detail) => write!(f, "page handler failed: {detail}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// One GET against the remote API, returning the raw response body.
pub trait ApiTransport: Send + Sync {
    fn get(&self, path: &str) -> Result<Vec<u8>, FetchError>;
}

impl<F> ApiTransport for F
where
    F: Fn(&str) -> Result<Vec<u8>, FetchError> + Send + Sync,
{
    fn get(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        self(path)
    }
}

/// Blocking HTTP transport. Paths (including `next_url` cursors) are joined
/// onto the configured endpoint.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    access_token: Option<String>,
}

impl HttpTransport {
    pub fn new(
        endpoint: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let endpoint =
            Url::parse(endpoint).map_err(|err| FetchError::InvalidUrl(format!("{endpoint}: {err}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            access_token: access_token.filter(|token| !token.is_empty()),
        })
    }

    fn resolve(&self, path: &str) -> Result<Url, FetchError> {
        self.endpoint
            .join(path)
            .map_err(|err| FetchError::InvalidUrl(format!("{path}: {err}")))
    }
}

impl ApiTransport for HttpTransport {
    fn get(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.resolve(path)?;
        let mut request = self.client.get(url);
        if let Some(token) = self.access_token.as_deref() {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        response
            .bytes()
            .map(|body| body.to_vec())
            .map_err(|err| FetchError::Transport(err.to_string()))
    }
}

/// Attempts per page and the exponential delay between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Retries back to back, for tests and local transports.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delays before the second, third, ... attempt. Yields
    /// `max_attempts - 1` values.
    fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay.max(self.min_delay))
            .with_factor(2.0)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .build()
    }
}

/// What a completed fetch saw. Totals come from the first page's envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub pages: usize,
    pub retries: usize,
    pub total_results: Option<u64>,
    pub total_pages: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PageHeader {
    #[serde(default)]
    total_results: Option<u64>,
    #[serde(default)]
    total_pages: Option<u64>,
    #[serde(default)]
    next_url: Option<String>,
}

impl PageHeader {
    fn next_path(self) -> Option<String> {
        self.next_url.filter(|next| !next.is_empty())
    }
}

#[derive(Clone)]
pub struct PagedFetcher {
    transport: Arc<dyn ApiTransport>,
    retry: RetryPolicy,
    max_pages: usize,
    cancel: Option<CancellationToken>,
}

impl fmt::Debug for PagedFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedFetcher")
            .field("retry", &self.retry)
            .field("max_pages", &self.max_pages)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl PagedFetcher {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            max_pages: DEFAULT_MAX_PAGES,
            cancel: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// A zero ceiling is raised to one page.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Checked between pages and after every retry delay.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Fetches `start_path` and every page its cursor chain points at,
    /// calling `handler` once per page in order. Any page that still fails
    /// after its retries aborts the whole fetch.
    pub fn fetch_paged<H>(&self, start_path: &str, mut handler: H) -> Result<FetchReport, FetchError>
    where
        H: FnMut(&[u8]) -> Result<(), FetchError>,
    {
        let mut report = FetchReport::default();
        let mut path = start_path.to_string();
        loop {
            if report.pages >= self.max_pages {
                return Err(FetchError::PageLimit(self.max_pages));
            }
            self.check_cancelled()?;
            let header = self.fetch_page(&path, &mut handler, &mut report)?;
            report.pages += 1;
            if report.pages == 1 {
                report.total_results = header.total_results;
                report.total_pages = header.total_pages;
            }
            match header.next_path() {
                Some(next) => {
                    log::debug!("{start_path}: following cursor to {next}");
                    path = next;
                }
                None => return Ok(report),
            }
        }
    }

    /// Single request, single handler call; `next_url` is ignored.
    pub fn fetch_single<H>(&self, path: &str, mut handler: H) -> Result<FetchReport, FetchError>
    where
        H: FnMut(&[u8]) -> Result<(), FetchError>,
    {
        self.check_cancelled()?;
        let mut report = FetchReport::default();
        let header = self.fetch_page(path, &mut handler, &mut report)?;
        report.pages = 1;
        report.total_results = header.total_results;
        report.total_pages = header.total_pages;
        Ok(report)
    }

    fn fetch_page<H>(
        &self,
        path: &str,
        handler: &mut H,
        report: &mut FetchReport,
    ) -> Result<PageHeader, FetchError>
    where
        H: FnMut(&[u8]) -> Result<(), FetchError>,
    {
        let mut delays = self.retry.delays();
        let mut attempt = 1_usize;
        loop {
            let err = match self.attempt_page(path, handler) {
                Ok(header) => return Ok(header),
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err),
            };
            let Some(delay) = delays.next() else {
                log::debug!("{path}: giving up after {attempt} attempts: {err}");
                return Err(err);
            };
            log::debug!("{path}: attempt {attempt} failed ({err}), retrying in {delay:?}");
            report.retries += 1;
            attempt += 1;
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            self.check_cancelled()?;
        }
    }

    fn attempt_page<H>(&self, path: &str, handler: &mut H) -> Result<PageHeader, FetchError>
    where
        H: FnMut(&[u8]) -> Result<(), FetchError>,
    {
        let body = self.transport.get(path)?;
        let header: PageHeader =
            serde_json::from_slice(&body).map_err(|err| FetchError::Decode(err.to_string()))?;
        handler(&body)?;
        Ok(header)
    }

    fn check_cancelled(&self) -> Result<(), FetchError> {
        if self
            .cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(FetchError::Cancelled);
        }
        Ok(())
    }
}
