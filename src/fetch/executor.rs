use crate::config::SiteConfig;
use crate::fetch::{FetchError, FetchRequest, FetchResult, RenderMode, RetryPolicy, Transport};
use crate::politeness::PolitenessGate;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Resolves fetch requests into [`FetchResult`]s
///
/// Every attempt first waits on the politeness gate. Transient failures are
/// retried under the [`RetryPolicy`]; cancellation abandons the backoff or
/// the in-flight request.
#[derive(Clone)]
pub struct FetchExecutor {
    gate: Arc<PolitenessGate>,
    policy: RetryPolicy,
    static_transport: Arc<dyn Transport>,
    dynamic_transport: Option<Arc<dyn Transport>>,
    cancel: CancellationToken,
}

impl FetchExecutor {
    pub fn new(
        gate: Arc<PolitenessGate>,
        policy: RetryPolicy,
        static_transport: Arc<dyn Transport>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            gate,
            policy,
            static_transport,
            dynamic_transport: None,
            cancel,
        }
    }

    /// Attaches a launched render engine for dynamic requests
    pub fn with_dynamic(mut self, transport: Arc<dyn Transport>) -> Self {
        self.dynamic_transport = Some(transport);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn gate(&self) -> &Arc<PolitenessGate> {
        &self.gate
    }

    /// Executes a request for `site`, retrying transient failures
    pub async fn execute(&self, site: &SiteConfig, mut request: FetchRequest) -> FetchResult {
        let transport = match request.mode {
            RenderMode::Static => self.static_transport.clone(),
            RenderMode::Dynamic => match &self.dynamic_transport {
                Some(transport) => transport.clone(),
                None => {
                    return FetchResult::PermanentFailure {
                        reason: FetchError::RenderEngine(
                            "dynamic render engine not launched".to_string(),
                        ),
                    }
                }
            },
        };

        loop {
            request.attempt += 1;
            let attempt = request.attempt;

            let permit = match self.gate.acquire(site).await {
                Ok(permit) => permit,
                Err(_) => {
                    return FetchResult::PermanentFailure {
                        reason: FetchError::Cancelled,
                    }
                }
            };

            debug!(site = %site.name, url = %request.url, attempt, "Fetching");

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return FetchResult::PermanentFailure { reason: FetchError::Cancelled };
                }
                outcome = transport.fetch(&request.url) => outcome,
            };
            drop(permit);

            let error = match outcome {
                Ok(page) => {
                    return FetchResult::Success {
                        body: page.body,
                        content_type: page.content_type,
                        status: page.status,
                        fetched_at: Utc::now(),
                        final_url: page.final_url,
                    }
                }
                Err(error) => error,
            };

            if !self.policy.is_retryable(&error) {
                debug!(site = %site.name, url = %request.url, attempt, error = %error, "Permanent fetch failure");
                return FetchResult::PermanentFailure { reason: error };
            }

            if !self.policy.should_retry(&error, attempt) {
                warn!(
                    site = %site.name,
                    url = %request.url,
                    attempts = attempt,
                    error = %error,
                    "Fetch exhausted retries"
                );
                return FetchResult::TransientFailure {
                    reason: error,
                    attempts: attempt,
                };
            }

            let delay = self.policy.delay_for(attempt, &error);
            warn!(
                site = %site.name,
                url = %request.url,
                attempt,
                max = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Fetch attempt failed; backing off"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return FetchResult::PermanentFailure { reason: FetchError::Cancelled };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchedPage;
    use crate::robots::{RobotsFetch, RobotsSource};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use url::Url;

    struct NoRobots;

    #[async_trait]
    impl RobotsSource for NoRobots {
        async fn fetch_robots(&self, _robots_url: &Url) -> RobotsFetch {
            RobotsFetch::Missing
        }
    }

    /// Replays scripted outcomes, repeating the last one
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<(), FetchError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<(), FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut outcomes = self.outcomes.lock().unwrap();
                if outcomes.len() > 1 {
                    outcomes.pop_front().unwrap()
                } else {
                    outcomes.front().cloned().unwrap()
                }
            };
            next.map(|_| FetchedPage {
                body: b"<html></html>".to_vec(),
                content_type: Some("text/html".to_string()),
                status: 200,
                final_url: url.clone(),
            })
        }
    }

    fn site() -> SiteConfig {
        SiteConfig {
            name: "siteA".to_string(),
            url: Url::parse("https://example.com/").unwrap(),
            seeds: Vec::new(),
            mode: RenderMode::Static,
            page_limit: 10,
            min_delay: Duration::ZERO,
            max_concurrent_requests: 1,
            extractor: None,
            follow_links: true,
            render_wait: Duration::ZERO,
            extra: toml::Table::new(),
        }
    }

    fn executor(transport: Arc<Scripted>, cancel: CancellationToken) -> FetchExecutor {
        let gate = Arc::new(PolitenessGate::new(Arc::new(NoRobots), "TestBot", cancel.clone()));
        let policy = RetryPolicy {
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        FetchExecutor::new(gate, policy, transport, cancel)
    }

    fn request() -> FetchRequest {
        FetchRequest::new(Url::parse("https://example.com/page").unwrap(), RenderMode::Static)
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_makes_one_attempt() {
        let transport = Scripted::new(vec![Err(FetchError::ClientError { status: 404 })]);
        let executor = executor(transport.clone(), CancellationToken::new());

        let result = executor.execute(&site(), request()).await;

        assert!(matches!(
            result,
            FetchResult::PermanentFailure {
                reason: FetchError::ClientError { status: 404 }
            }
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_exhaust_attempts() {
        let transport = Scripted::new(vec![Err(FetchError::ServerError { status: 503 })]);
        let executor = executor(transport.clone(), CancellationToken::new());

        let result = executor.execute(&site(), request()).await;

        match result {
            FetchResult::TransientFailure { reason, attempts } => {
                assert_eq!(reason, FetchError::ServerError { status: 503 });
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let transport = Scripted::new(vec![Err(FetchError::Timeout), Ok(())]);
        let executor = executor(transport.clone(), CancellationToken::new());

        let start = tokio::time::Instant::now();
        let result = executor.execute(&site(), request()).await;

        assert!(result.is_success());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert!(tokio::time::Instant::now() - start >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_waits_retry_after() {
        let transport = Scripted::new(vec![
            Err(FetchError::RateLimited {
                status: 429,
                retry_after: Some(Duration::from_secs(5)),
            }),
            Ok(()),
        ]);
        let executor = executor(transport.clone(), CancellationToken::new());

        let start = tokio::time::Instant::now();
        let result = executor.execute(&site(), request()).await;

        assert!(result.is_success());
        assert!(tokio::time::Instant::now() - start >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dynamic_without_engine_is_permanent() {
        let transport = Scripted::new(vec![Ok(())]);
        let executor = executor(transport.clone(), CancellationToken::new());
        let request = FetchRequest::new(
            Url::parse("https://example.com/app").unwrap(),
            RenderMode::Dynamic,
        );

        let result = executor.execute(&site(), request).await;

        assert!(matches!(
            result,
            FetchResult::PermanentFailure {
                reason: FetchError::RenderEngine(_)
            }
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dynamic_timeouts_are_retried() {
        let static_transport = Scripted::new(vec![Ok(())]);
        let browser = Scripted::new(vec![
            Err(FetchError::Timeout),
            Err(FetchError::Connection("net::ERR_CONNECTION_RESET".to_string())),
            Ok(()),
        ]);
        let executor =
            executor(static_transport.clone(), CancellationToken::new()).with_dynamic(browser.clone());
        let request = FetchRequest::new(
            Url::parse("https://example.com/app").unwrap(),
            RenderMode::Dynamic,
        );

        let result = executor.execute(&site(), request).await;

        assert!(result.is_success());
        assert_eq!(browser.calls.load(Ordering::SeqCst), 3);
        assert_eq!(static_transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let transport = Scripted::new(vec![Err(FetchError::Timeout)]);
        let cancel = CancellationToken::new();
        let executor = executor(transport.clone(), cancel.clone());

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = executor.execute(&site(), request()).await;

        assert!(matches!(
            result,
            FetchResult::PermanentFailure {
                reason: FetchError::Cancelled
            }
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
