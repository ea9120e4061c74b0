use crate::fetch::error::FetchError;
use crate::health::HealthTracker;
use async_trait::async_trait;

/// Which link of the fetch chain produced a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Session,
    Proxy,
    Direct,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Session => "session",
            StrategyKind::Proxy => "proxy",
            StrategyKind::Direct => "direct",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An unclassified response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub status: u16,
    pub body: String,
}

/// One request made by a strategy, tagged with the egress identity it used
#[derive(Debug)]
pub struct Attempt {
    pub identity: String,
    pub result: Result<RawPage, FetchError>,
}

/// One link of the fetch chain
///
/// Implementations send a single request per [`attempt`](FetchStrategy::attempt)
/// call. Pacing, retries, classification and health reporting are the
/// chain's job.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// How many attempts the chain makes before falling through
    fn max_attempts(&self) -> u32;

    async fn attempt(&self, url: &str) -> Attempt;

    /// Called once the chain is done with `url` on this strategy, whatever
    /// the outcome
    async fn finish(&self, _url: &str) {}

    /// Called once before each unit is fetched so the strategy can drop identities
    /// the tracker wants rotated
    async fn refresh(&self, _health: &HealthTracker) {}

    /// Releases pooled resources
    async fn close(&self) {}
}
