//! Stateful sessions and the per-worker session pool
//!
//! A session is a long-lived client that keeps cookies and any origin state
//! between requests. The pool hands out exclusive leases, so concurrent
//! workers never share a session, and creates sessions lazily up to the
//! number of workers that ask at the same time. A URL keeps its lease for
//! all of its in-place retries.

use crate::config::FetchConfig;
use crate::fetch::error::FetchError;
use crate::fetch::http::{build_http_client, fetch_page};
use crate::fetch::strategy::{Attempt, FetchStrategy, RawPage, StrategyKind};
use crate::health::HealthTracker;
use crate::pacing::{OutcomeKind, PacingController};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

/// A stateful fetch capability
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Identity reported to the health tracker (`session-N`)
    fn identity(&self) -> &str;

    async fn get_html(&self, url: &str) -> Result<RawPage, FetchError>;

    async fn close(&self);
}

/// Creates sessions on demand
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn open(&self, id: usize) -> Result<Arc<dyn BrowserSession>, FetchError>;
}

/// Session backend that gives every session its own cookie jar
///
/// Before the first page on an origin, the session requests the origin root
/// so that any cookies the site sets on landing are in place. That request
/// waits on the pacing controller and reports its outcome to pacing and
/// health like any other.
pub struct CookieSessionBackend {
    config: FetchConfig,
    pacing: Arc<PacingController>,
    health: Arc<HealthTracker>,
}

impl CookieSessionBackend {
    pub fn new(config: FetchConfig, pacing: Arc<PacingController>, health: Arc<HealthTracker>) -> Self {
        Self {
            config,
            pacing,
            health,
        }
    }
}

#[async_trait]
impl SessionBackend for CookieSessionBackend {
    async fn open(&self, id: usize) -> Result<Arc<dyn BrowserSession>, FetchError> {
        let client = build_http_client(&self.config, None)
            .map_err(|e| FetchError::SessionUnavailable(e.to_string()))?;
        Ok(Arc::new(CookieSession {
            identity: format!("session-{}", id),
            client: Mutex::new(Some(client)),
            warmed: Mutex::new(HashSet::new()),
            pacing: Arc::clone(&self.pacing),
            health: Arc::clone(&self.health),
        }))
    }
}

struct CookieSession {
    identity: String,
    /// `None` once the session is closed
    client: Mutex<Option<Client>>,
    warmed: Mutex<HashSet<String>>,
    pacing: Arc<PacingController>,
    health: Arc<HealthTracker>,
}

impl CookieSession {
    fn client(&self) -> Result<Client, FetchError> {
        self.client
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| FetchError::SessionUnavailable(format!("{} is closed", self.identity)))
    }

    /// Paced request to the origin root; failures only cost the cookies
    async fn warm_up(&self, client: &Client, root: &str) {
        tracing::debug!("{} warming up on {}", self.identity, root);
        self.pacing.wait().await;

        let outcome = match fetch_page(client, root).await {
            Ok(page) if page.status == 429 => Some(OutcomeKind::RateLimited),
            Ok(page) if (200..300).contains(&page.status) => Some(OutcomeKind::Ok),
            Ok(page) => {
                tracing::debug!("{} warm-up got HTTP {}", self.identity, page.status);
                None
            }
            Err(e) => {
                tracing::debug!("{} warm-up failed: {}", self.identity, e);
                None
            }
        };

        match outcome {
            Some(kind) => self.pacing.record(kind),
            None => self.pacing.record_transport_failure(),
        }
        self.health
            .record_result(&self.identity, outcome == Some(OutcomeKind::Ok), false);
    }

    /// Returns the origin root if it has not been visited yet
    fn needs_warm_up(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let origin = parsed.origin().ascii_serialization();
        let mut warmed = self.warmed.lock().unwrap_or_else(|e| e.into_inner());
        if warmed.insert(origin.clone()) {
            Some(format!("{}/", origin))
        } else {
            None
        }
    }
}

#[async_trait]
impl BrowserSession for CookieSession {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn get_html(&self, url: &str) -> Result<RawPage, FetchError> {
        let client = self.client()?;
        if let Some(root) = self.needs_warm_up(url) {
            if root != url {
                self.warm_up(&client, &root).await;
            }
        }
        fetch_page(&client, url).await
    }

    /// Drops the client and its cookie jar; later requests fail
    async fn close(&self) {
        tracing::debug!("Closing {}", self.identity);
        self.client.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// Pool of idle sessions
pub struct SessionPool {
    backend: Arc<dyn SessionBackend>,
    idle: Mutex<Vec<Arc<dyn BrowserSession>>>,
    next_id: AtomicUsize,
    closed: AtomicBool,
}

impl SessionPool {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            idle: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    fn idle(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn BrowserSession>>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Leases an idle session or opens a new one
    pub async fn acquire(self: &Arc<Self>) -> Result<SessionLease, FetchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FetchError::SessionUnavailable("session pool closed".to_string()));
        }

        let reused = self.idle().pop();
        let session = match reused {
            Some(session) => session,
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let session = self.backend.open(id).await?;
                tracing::debug!("Opened {}", session.identity());
                session
            }
        };

        Ok(SessionLease {
            session: Some(session),
            pool: Arc::clone(self),
        })
    }

    /// Closes idle sessions whose identity matches `predicate`
    ///
    /// Returns the identities that were retired. Leased sessions are left
    /// alone.
    pub async fn retire_where<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let retired: Vec<Arc<dyn BrowserSession>> = {
            let mut idle = self.idle();
            let (retire, keep): (Vec<_>, Vec<_>) =
                idle.drain(..).partition(|s| predicate(s.identity()));
            *idle = keep;
            retire
        };

        let mut identities = Vec::with_capacity(retired.len());
        for session in retired {
            session.close().await;
            identities.push(session.identity().to_string());
        }
        identities
    }

    /// Closes every idle session and refuses new leases
    pub async fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let sessions: Vec<_> = self.idle().drain(..).collect();
        for session in sessions {
            session.close().await;
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle().len()
    }

    fn release(&self, session: Arc<dyn BrowserSession>) {
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!("Dropping {} returned after close", session.identity());
            return;
        }
        self.idle().push(session);
    }
}

/// Exclusive use of one session; returned to the pool on drop
pub struct SessionLease {
    session: Option<Arc<dyn BrowserSession>>,
    pool: Arc<SessionPool>,
}

impl Deref for SessionLease {
    type Target = dyn BrowserSession;

    fn deref(&self) -> &Self::Target {
        match &self.session {
            Some(session) => session.as_ref(),
            None => unreachable!("session is only taken in drop"),
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}

/// First link of the chain: a leased stateful session
///
/// The first attempt on a URL takes a lease, later attempts on the same URL
/// reuse it, and [`FetchStrategy::finish`] returns it to the pool.
pub struct SessionStrategy {
    pool: Arc<SessionPool>,
    attempts: u32,
    leases: Mutex<HashMap<String, Arc<SessionLease>>>,
}

impl SessionStrategy {
    pub fn new(pool: Arc<SessionPool>, attempts: u32) -> Self {
        Self {
            pool,
            attempts,
            leases: Mutex::new(HashMap::new()),
        }
    }

    fn leases(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<SessionLease>>> {
        self.leases.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn lease_for(&self, url: &str) -> Result<Arc<SessionLease>, FetchError> {
        let held = self.leases().get(url).cloned();
        if let Some(lease) = held {
            return Ok(lease);
        }
        let lease = Arc::new(self.pool.acquire().await?);
        self.leases().insert(url.to_string(), Arc::clone(&lease));
        Ok(lease)
    }
}

#[async_trait]
impl FetchStrategy for SessionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Session
    }

    fn max_attempts(&self) -> u32 {
        self.attempts
    }

    async fn attempt(&self, url: &str) -> Attempt {
        match self.lease_for(url).await {
            Ok(lease) => Attempt {
                identity: lease.identity().to_string(),
                result: lease.get_html(url).await,
            },
            Err(e) => Attempt {
                identity: "session".to_string(),
                result: Err(e),
            },
        }
    }

    async fn refresh(&self, health: &HealthTracker) {
        let retired = self.pool.retire_where(|id| health.should_rotate(id)).await;
        for identity in retired {
            tracing::warn!("Retired {} after repeated failures", identity);
            health.forget(&identity);
        }
    }

    async fn finish(&self, url: &str) {
        self.leases().remove(url);
    }

    async fn close(&self) {
        self.leases().clear();
        self.pool.close_all().await;
    }
}
