use crate::config::{FetchConfig, SessionBackendKind};
use crate::fetch::detection::BlockDetector;
use crate::fetch::error::FetchError;
use crate::fetch::http::{DirectStrategy, ProxyStrategy};
use crate::fetch::session::{CookieSessionBackend, SessionPool, SessionStrategy};
use crate::fetch::strategy::{Attempt, FetchStrategy, StrategyKind};
use crate::health::HealthTracker;
use crate::pacing::{OutcomeKind, PacingController};
use crate::shutdown::Shutdown;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of [`FetchChain::fetch`]
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Page HTML, `None` when every strategy was exhausted or the fetch was cancelled
    pub html: Option<String>,
    pub strategy_used: Option<StrategyKind>,
    pub elapsed: Duration,
    /// Requests sent across all strategies
    pub attempts: u32,
    pub last_failure: Option<FetchError>,
    /// Shutdown was requested before any attempt succeeded
    pub cancelled: bool,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.html.is_some()
    }
}

/// Delay before in-place retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(30);
    base.saturating_mul(2u32.saturating_pow(exponent)).min(max)
}

/// Running totals of one fetch across strategies
#[derive(Default)]
struct Tally {
    attempts: u32,
    last_failure: Option<FetchError>,
}

enum Step {
    Fetched(String),
    Exhausted,
    Cancelled,
}

/// Ordered fallback chain of fetch strategies
///
/// Every attempt is paced, classified and reported to both the pacing
/// controller and the health tracker. `fetch` never fails; exhaustion is
/// reported through an empty [`FetchResult`].
pub struct FetchChain {
    strategies: Vec<Box<dyn FetchStrategy>>,
    pacing: Arc<PacingController>,
    health: Arc<HealthTracker>,
    shutdown: Shutdown,
    detector: BlockDetector,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl FetchChain {
    pub fn new(
        pacing: Arc<PacingController>,
        health: Arc<HealthTracker>,
        shutdown: Shutdown,
        detector: BlockDetector,
    ) -> Self {
        Self {
            strategies: Vec::new(),
            pacing,
            health,
            shutdown,
            detector,
            backoff_base: Duration::from_millis(1000),
            backoff_max: Duration::from_secs(30),
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn FetchStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Builds the chain described by the configuration:
    /// session (if a backend is set) → proxy (if proxies are set) → direct
    pub fn from_config(
        config: &FetchConfig,
        pacing: Arc<PacingController>,
        health: Arc<HealthTracker>,
        shutdown: Shutdown,
    ) -> Result<Self, reqwest::Error> {
        let mut chain = Self::new(
            Arc::clone(&pacing),
            Arc::clone(&health),
            shutdown,
            BlockDetector::from_config(config),
        )
        .with_backoff(
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        );

        match config.session_backend {
            SessionBackendKind::None => {}
            SessionBackendKind::Cookie => {
                let backend = CookieSessionBackend::new(config.clone(), pacing, Arc::clone(&health));
                let pool = SessionPool::new(Arc::new(backend));
                chain = chain.with_strategy(Box::new(SessionStrategy::new(
                    pool,
                    config.session_attempts,
                )));
            }
        }

        if !config.proxies.is_empty() {
            chain = chain.with_strategy(Box::new(ProxyStrategy::from_config(config, health)?));
        }

        Ok(chain.with_strategy(Box::new(DirectStrategy::from_config(config)?)))
    }

    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Fetches `url`, falling through the strategies until one returns usable HTML
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let start = Instant::now();
        let mut tally = Tally::default();

        for strategy in &self.strategies {
            let kind = strategy.kind();
            let step = self.run_strategy(strategy.as_ref(), url, &mut tally).await;
            strategy.finish(url).await;

            match step {
                Step::Fetched(html) => {
                    tracing::debug!(
                        "Fetched {} via {} in {} attempt(s)",
                        url,
                        kind,
                        tally.attempts
                    );
                    return FetchResult {
                        html: Some(html),
                        strategy_used: Some(kind),
                        elapsed: start.elapsed(),
                        attempts: tally.attempts,
                        last_failure: tally.last_failure,
                        cancelled: false,
                    };
                }
                Step::Cancelled => return cancelled(start, tally.attempts, tally.last_failure),
                Step::Exhausted => tracing::debug!("{} strategy exhausted for {}", kind, url),
            }
        }

        tracing::warn!(
            "All fetch strategies exhausted for {} after {} attempt(s): {}",
            url,
            tally.attempts,
            tally
                .last_failure
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no strategies".to_string())
        );

        FetchResult {
            html: None,
            strategy_used: None,
            elapsed: start.elapsed(),
            attempts: tally.attempts,
            last_failure: tally.last_failure,
            cancelled: false,
        }
    }

    /// Bounded in-place retries of one strategy
    async fn run_strategy(&self, strategy: &dyn FetchStrategy, url: &str, tally: &mut Tally) -> Step {
        let kind = strategy.kind();
        let max_attempts = strategy.max_attempts();

        for attempt_no in 1..=max_attempts {
            if !self.paced().await {
                return Step::Cancelled;
            }

            tally.attempts += 1;
            let Attempt { identity, result } = strategy.attempt(url).await;
            let result = result.and_then(|page| self.detector.classify(page));

            let err = match result {
                Ok(html) => {
                    self.pacing.record(OutcomeKind::Ok);
                    self.health.record_result(&identity, true, false);
                    tracing::trace!("{} served {} via {}", identity, url, kind);
                    return Step::Fetched(html);
                }
                Err(err) => err,
            };

            self.report_failure(&identity, &err);
            tracing::debug!(
                "{} attempt {}/{} for {} failed: {}",
                kind,
                attempt_no,
                max_attempts,
                url,
                err
            );

            let retryable = err.is_retryable();
            tally.last_failure = Some(err);
            if !retryable {
                break;
            }
            if attempt_no < max_attempts {
                let delay = backoff_delay(self.backoff_base, self.backoff_max, attempt_no);
                if !self.sleep_unless_shutdown(delay).await {
                    return Step::Cancelled;
                }
            }
        }

        Step::Exhausted
    }

    fn report_failure(&self, identity: &str, err: &FetchError) {
        match err {
            FetchError::SessionUnavailable(_) => return,
            FetchError::Blocked { reason } => {
                tracing::warn!("Blocked response via {}: {}", identity, reason);
            }
            FetchError::RateLimited { status } => {
                tracing::warn!("Rate limited (HTTP {}) via {}", status, identity);
            }
            FetchError::Transport(_) | FetchError::Http { .. } => {}
        }

        match err.outcome() {
            Some(kind) => self.pacing.record(kind),
            None => self.pacing.record_transport_failure(),
        }
        self.health
            .record_result(identity, false, err.is_detection());
    }

    /// Waits for the pacing delay; false if shutdown was requested first
    async fn paced(&self) -> bool {
        if self.shutdown.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = self.pacing.wait() => !self.shutdown.is_triggered(),
            _ = self.shutdown.triggered() => false,
        }
    }

    async fn sleep_unless_shutdown(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.triggered() => false,
        }
    }

    /// Rotates identities that crossed a health threshold
    ///
    /// Called once before each unit is fetched.
    pub async fn refresh_identities(&self) {
        if let Some(next) = self.health.rotate_if_needed() {
            tracing::info!("Now using proxy {}", next);
        }
        for strategy in &self.strategies {
            strategy.refresh(&self.health).await;
        }
    }

    /// Closes pooled sessions
    pub async fn close(&self) {
        for strategy in &self.strategies {
            strategy.close().await;
        }
    }
}

fn cancelled(start: Instant, attempts: u32, last_failure: Option<FetchError>) -> FetchResult {
    FetchResult {
        html: None,
        strategy_used: None,
        elapsed: start.elapsed(),
        attempts,
        last_failure,
        cancelled: true,
    }
}
