//! Bounded polling for "server is up" and "server is down".
//!
//! A poll probes once immediately and then once per interval until the
//! expected state is seen or the attempt budget runs out. The interval never
//! grows; the bound is a number of attempts, not a deadline.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Per-request timeout for HTTP probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Checks whether something answers at a URL.
#[async_trait]
pub trait Probe: Send + Sync {
    /// `true` if the endpoint produced any response at all.
    async fn probe(&self, url: &str) -> bool;
}

/// Probes with a plain HTTP `GET`. Any HTTP response, error statuses
/// included, counts as up; only a failed request counts as down.
#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => {
                tracing::debug!(url, status = %response.status(), "Probe answered");
                true
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "Probe failed");
                false
            }
        }
    }
}

/// State of one poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollAttempt {
    /// Probes still allowed
    pub remaining: u32,
    /// Probes issued so far
    pub issued: u32,
    /// Pause between probes
    pub interval: Duration,
}

impl PollAttempt {
    /// A budget of `max_attempts` probes; zero is treated as one.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            remaining: max_attempts.max(1),
            issued: 0,
            interval,
        }
    }

    fn record(&mut self) {
        self.remaining -= 1;
        self.issued += 1;
    }

    /// Whether the budget is used up
    pub fn exhausted(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Up,
    Down,
}

/// Waits for an endpoint to start or stop answering.
///
/// # Examples
///
/// ```no_run
/// use fox::poller::ReadinessPoller;
/// use std::time::Duration;
///
/// # async fn demo() -> fox::Result<()> {
/// let poller = ReadinessPoller::http()?;
/// let probes = poller
///     .wait_until_up("http://localhost:8080", 5, Duration::from_secs(2))
///     .await?;
/// println!("Server answered after {} probes", probes);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ReadinessPoller {
    probe: Arc<dyn Probe>,
}

impl ReadinessPoller {
    pub fn new(probe: Arc<dyn Probe>) -> Self {
        Self { probe }
    }

    /// Poller using [`HttpProbe`].
    pub fn http() -> Result<Self> {
        Ok(Self::new(Arc::new(HttpProbe::new()?)))
    }

    /// Resolves with the number of probes issued once `url` answers.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] after `max_attempts` probes without an answer.
    #[tracing::instrument(skip(self))]
    pub async fn wait_until_up(
        &self,
        url: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<u32> {
        self.poll(url, Expect::Up, PollAttempt::new(max_attempts, interval))
            .await
    }

    /// Resolves with the number of probes issued once `url` stops answering.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if `url` still answers after `max_attempts` probes.
    #[tracing::instrument(skip(self))]
    pub async fn wait_until_down(
        &self,
        url: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<u32> {
        self.poll(url, Expect::Down, PollAttempt::new(max_attempts, interval))
            .await
    }

    async fn poll(&self, url: &str, expect: Expect, mut attempt: PollAttempt) -> Result<u32> {
        loop {
            let answered = self.probe.probe(url).await;
            attempt.record();

            if answered == (expect == Expect::Up) {
                tracing::info!(
                    url,
                    probes = attempt.issued,
                    ?expect,
                    "Server reached expected state"
                );
                return Ok(attempt.issued);
            }

            if attempt.exhausted() {
                tracing::warn!(url, probes = attempt.issued, ?expect, "Gave up polling");
                return Err(Error::Timeout(match expect {
                    Expect::Up => format!("server at {} never came up", url),
                    Expect::Down => format!("server at {} never went down", url),
                }));
            }

            tokio::time::sleep(attempt.interval).await;
        }
    }
}
