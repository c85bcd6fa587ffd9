//! Retrieving item bytes: the HTTP [`Fetcher`] and the bounded worker pool.
//!
//! # Retry strategy
//!
//! - HTTP 408, 425, 429, 5xx → transient, retried with exponential backoff
//! - any other non-2xx (404, 401, 403, …) → permanent, fails immediately
//! - network errors and timeouts → transient
//! - a body of `min_bytes` or fewer → transient ("tiny response"), checked
//!   in [`fetch_with_retry`] for every [`Fetcher`] before anything is written
//!
//! # Pool
//!
//! `concurrency` workers pull jobs from a shared queue, so at most that many
//! fetches are ever in flight. Workers never touch shared bookkeeping: each
//! writes its file atomically and reports a [`FetchEvent`] over a channel to
//! the single consumer in [`download`](crate::download).

use async_trait::async_trait;
use docharvest_core::error::FetchError;
use docharvest_core::models::RemoteItem;
use docharvest_core::source::Fetcher;
use rand::Rng;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::atomic::write_atomic;
use crate::config::{FetchConfig, SearchConfig};

/// Map a response status to the error it represents, if any.
pub fn classify_status(status: reqwest::StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }
    let code = status.as_u16();
    let reason = format!("HTTP {}", code);
    if matches!(code, 408 | 425 | 429) || status.is_server_error() {
        Err(FetchError::Transient(reason))
    } else {
        Err(FetchError::Permanent(reason))
    }
}

fn classify_reqwest_error(err: &reqwest::Error) -> FetchError {
    if err.is_builder() {
        FetchError::Permanent(format!("invalid request: {}", err))
    } else if err.is_timeout() {
        FetchError::Transient("timeout".to_string())
    } else {
        FetchError::Transient(err.to_string())
    }
}

/// [`Fetcher`] that GETs `item.url` with an optional session cookie.
pub struct HttpFetcher {
    client: reqwest::Client,
    cookie: Option<String>,
}

impl HttpFetcher {
    pub fn new(fetch: &FetchConfig, search: &SearchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(fetch.timeout_secs))
            .user_agent(search.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            cookie: search.cookie.clone(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, item: &RemoteItem) -> Result<Vec<u8>, FetchError> {
        let mut req = self.client.get(&item.url);
        if let Some(cookie) = &self.cookie {
            req = req.header("Cookie", cookie);
        }
        let response = req.send().await.map_err(|e| classify_reqwest_error(&e))?;
        classify_status(response.status())?;
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        Ok(body.to_vec())
    }
}

/// Attempt budget and backoff schedule for one item.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
    /// Bodies of this many bytes or fewer are a transient failure.
    pub min_bytes: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
            jitter: true,
            min_bytes: config.min_bytes,
        }
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let mut delay = self.base.saturating_mul(1 << exp).min(self.max);
        if self.jitter && !delay.is_zero() {
            let extra = rand::thread_rng().gen_range(Duration::ZERO..=delay / 2);
            delay = (delay + extra).min(self.max);
        }
        delay
    }
}

/// One unit of work: fetch `item` and store it at `path`.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub item: RemoteItem,
    pub path: PathBuf,
}

/// Final result of a job. `Ok` carries the number of bytes written.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub result: Result<u64, FetchError>,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub enum FetchEvent {
    Started { id: String },
    Finished { id: String, outcome: FetchOutcome },
}

/// Fetch with retries, then write the body atomically.
///
/// A body no larger than `policy.min_bytes` counts as a transient failure
/// and is never written. Cancellation is honored between attempts, never
/// in the middle of one.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    job: &FetchJob,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> FetchOutcome {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let err = match fetcher.fetch(&job.item).await {
            Ok(bytes) if bytes.len() as u64 <= policy.min_bytes => {
                FetchError::Transient(format!("tiny response ({} bytes)", bytes.len()))
            }
            Ok(bytes) => {
                let result = match write_atomic(&job.path, &bytes).await {
                    Ok(()) => Ok(bytes.len() as u64),
                    Err(e) => Err(FetchError::Permanent(format!("write failed: {:#}", e))),
                };
                return FetchOutcome { result, attempts };
            }
            Err(e) => e,
        };

        if !err.is_transient() || attempts >= policy.max_attempts {
            return FetchOutcome {
                result: Err(err),
                attempts,
            };
        }

        let delay = policy.delay(attempts);
        debug!(item_id = %job.item.id, attempt = attempts, reason = err.reason(), ?delay, "retrying");
        tokio::select! {
            _ = cancel.cancelled() => {
                return FetchOutcome {
                    result: Err(FetchError::Permanent("cancelled".to_string())),
                    attempts,
                };
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// A fixed set of workers draining one job queue.
pub struct FetchPool {
    workers: Vec<JoinHandle<()>>,
}

impl FetchPool {
    /// Start `concurrency` workers over `jobs`. Events are sent on `events`;
    /// the channel closes once every worker has exited.
    pub fn spawn(
        jobs: Vec<FetchJob>,
        fetcher: Arc<dyn Fetcher>,
        policy: RetryPolicy,
        concurrency: usize,
        cancel: CancellationToken,
        events: mpsc::Sender<FetchEvent>,
    ) -> Self {
        let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
        let workers = (0..concurrency.max(1))
            .map(|worker| {
                let queue = Arc::clone(&queue);
                let fetcher = Arc::clone(&fetcher);
                let cancel = cancel.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let Some(job) = queue.lock().await.pop_front() else {
                            break;
                        };
                        let id = job.item.id.clone();
                        if events.send(FetchEvent::Started { id: id.clone() }).await.is_err() {
                            break;
                        }
                        let outcome = fetch_with_retry(fetcher.as_ref(), &job, policy, &cancel).await;
                        if let Err(e) = &outcome.result {
                            warn!(worker, item_id = %id, attempts = outcome.attempts, reason = e.reason(), "fetch failed");
                        }
                        if events.send(FetchEvent::Finished { id, outcome }).await.is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        Self { workers }
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "fetch worker panicked");
            }
        }
    }
}
