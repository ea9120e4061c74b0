use crate::config::HealthConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Identity reported for requests sent without a proxy or session
pub const DIRECT_IDENTITY: &str = "direct";

/// Counters for one egress identity within its current session window
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyHealth {
    pub identity: String,
    pub total: u32,
    pub failed: u32,
    pub detections: u32,
    pub last_used: Option<DateTime<Utc>>,
}

impl ProxyHealth {
    fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            total: 0,
            failed: 0,
            detections: 0,
            last_used: None,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }

    fn reset_window(&mut self) {
        self.total = 0;
        self.failed = 0;
        self.detections = 0;
    }
}

#[derive(Debug)]
struct HealthState {
    current: usize,
    rotations: u64,
    identities: HashMap<String, ProxyHealth>,
}

/// Per-run health tracker shared by the fetch strategies
///
/// `rotation` is the ordered list of proxy identities the proxy strategy
/// cycles through. Identities outside that list (`direct`, `session-N`) are
/// tracked too but never become the current identity.
#[derive(Debug)]
pub struct HealthTracker {
    config: HealthConfig,
    rotation: Vec<String>,
    state: Mutex<HealthState>,
}

impl HealthTracker {
    pub fn new(config: HealthConfig, rotation: Vec<String>) -> Self {
        Self {
            config,
            rotation,
            state: Mutex::new(HealthState {
                current: 0,
                rotations: 0,
                identities: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HealthState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The proxy identity currently in use, if any proxies are configured
    pub fn current_identity(&self) -> Option<String> {
        if self.rotation.is_empty() {
            return None;
        }
        let state = self.lock();
        self.rotation.get(state.current).cloned()
    }

    pub fn record_result(&self, identity: &str, success: bool, detected: bool) {
        let mut state = self.lock();
        let health = state
            .identities
            .entry(identity.to_string())
            .or_insert_with(|| ProxyHealth::new(identity));

        health.total += 1;
        if !success {
            health.failed += 1;
        }
        if detected {
            health.detections += 1;
        }
        health.last_used = Some(Utc::now());
    }

    /// Whether `identity` crossed a rotation threshold in its current window
    pub fn should_rotate(&self, identity: &str) -> bool {
        let state = self.lock();
        match state.identities.get(identity) {
            Some(health) => self.crossed_threshold(health),
            None => false,
        }
    }

    fn crossed_threshold(&self, health: &ProxyHealth) -> bool {
        if health.detections > self.config.max_detections {
            return true;
        }
        health.total >= self.config.min_samples
            && health.failure_rate() > self.config.failure_rate_threshold
    }

    /// Advances to the next proxy in round-robin order
    ///
    /// The identity being left has its window counters reset so it starts
    /// clean when its turn comes again.
    pub fn rotate(&self) -> Option<String> {
        if self.rotation.is_empty() {
            return None;
        }
        let mut state = self.lock();
        Some(self.advance(&mut state))
    }

    /// Rotates the current proxy if it crossed a threshold
    ///
    /// The check and the rotation happen under one lock, so concurrent
    /// callers rotate a burned proxy once. Returns the new identity when a
    /// rotation happened.
    pub fn rotate_if_needed(&self) -> Option<String> {
        if self.rotation.is_empty() {
            return None;
        }
        let mut state = self.lock();
        let current = &self.rotation[state.current];
        let burned = state
            .identities
            .get(current)
            .is_some_and(|health| self.crossed_threshold(health));
        burned.then(|| self.advance(&mut state))
    }

    fn advance(&self, state: &mut HealthState) -> String {
        let leaving = self.rotation[state.current].clone();
        if let Some(health) = state.identities.get_mut(&leaving) {
            health.reset_window();
        }
        state.current = (state.current + 1) % self.rotation.len();
        state.rotations += 1;
        let next = self.rotation[state.current].clone();
        tracing::warn!("Rotating proxy {} -> {}", leaving, next);
        next
    }

    /// Drops all counters for an identity that no longer exists
    pub fn forget(&self, identity: &str) {
        self.lock().identities.remove(identity);
    }

    /// Current counters of every identity seen so far, sorted by identity
    pub fn snapshot(&self) -> Vec<ProxyHealth> {
        let state = self.lock();
        let mut all: Vec<ProxyHealth> = state.identities.values().cloned().collect();
        all.sort_by(|a, b| a.identity.cmp(&b.identity));
        all
    }

    pub fn rotations(&self) -> u64 {
        self.lock().rotations
    }
}
