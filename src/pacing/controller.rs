use crate::config::PacingConfig;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Smoothing factor for the success-rate estimate
const EWMA_ALPHA: f64 = 0.1;

/// Window for counting recent non-ok outcomes in the settle delay
const RECENT_ERROR_WINDOW: Duration = Duration::from_secs(60);

/// Rate-limited and blocked events tolerated in the window before backing off
const TOLERATED_EVENTS: usize = 1;

/// Classification of one request outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Ok,
    RateLimited,
    Blocked,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Ok => "ok",
            OutcomeKind::RateLimited => "rate_limited",
            OutcomeKind::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A timestamped outcome kept inside the sliding window
#[derive(Debug, Clone, Copy)]
pub struct OutcomeEvent {
    pub at: Instant,
    pub kind: OutcomeKind,
}

/// Number of each outcome kind currently in the window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub ok: usize,
    pub rate_limited: usize,
    pub blocked: usize,
}

#[derive(Debug)]
struct PacingState {
    events: VecDeque<OutcomeEvent>,
    success_rate: f64,
    recent_failures: VecDeque<Instant>,
}

impl PacingState {
    fn evict(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.events.front() {
            if now.saturating_duration_since(front.at) > window {
                self.events.pop_front();
            } else {
                break;
            }
        }
        while let Some(&front) = self.recent_failures.front() {
            if now.saturating_duration_since(front) > RECENT_ERROR_WINDOW {
                self.recent_failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn update_success(&mut self, success: bool, now: Instant) {
        let sample = if success { 1.0 } else { 0.0 };
        self.success_rate = EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * self.success_rate;
        if !success {
            self.recent_failures.push_back(now);
        }
    }

    fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for event in &self.events {
            match event.kind {
                OutcomeKind::Ok => counts.ok += 1,
                OutcomeKind::RateLimited => counts.rate_limited += 1,
                OutcomeKind::Blocked => counts.blocked += 1,
            }
        }
        counts
    }
}

/// Shared pacing state for one run
///
/// The window lives behind a `std::sync::Mutex` that is only held to record
/// an event or compute a delay; sleeping happens after the lock is released.
#[derive(Debug)]
pub struct PacingController {
    config: PacingConfig,
    window: Duration,
    state: Mutex<PacingState>,
}

impl PacingController {
    pub fn new(config: PacingConfig) -> Self {
        let window = Duration::from_secs(config.window_secs);
        Self {
            config,
            window,
            state: Mutex::new(PacingState {
                events: VecDeque::new(),
                success_rate: 1.0,
                recent_failures: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PacingState> {
        // A poisoned lock only means another thread panicked mid-update; the
        // counters are still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records the outcome of a request that produced a response
    pub fn record(&self, kind: OutcomeKind) {
        self.record_at(kind, Instant::now());
    }

    pub fn record_at(&self, kind: OutcomeKind, at: Instant) {
        let mut state = self.lock();
        state.events.push_back(OutcomeEvent { at, kind });
        state.update_success(kind == OutcomeKind::Ok, at);
        state.evict(at, self.window);
    }

    /// Records a failure that produced no response (timeout, reset)
    ///
    /// Lowers the success estimate without adding a window event.
    pub fn record_transport_failure(&self) {
        let now = Instant::now();
        let mut state = self.lock();
        state.update_success(false, now);
        state.evict(now, self.window);
    }

    /// Current target rate in requests per minute
    pub fn target_rpm(&self) -> f64 {
        self.target_rpm_at(Instant::now())
    }

    pub fn target_rpm_at(&self, now: Instant) -> f64 {
        let mut state = self.lock();
        state.evict(now, self.window);
        let counts = state.counts();
        if counts.rate_limited <= TOLERATED_EVENTS && counts.blocked <= TOLERATED_EVENTS {
            self.config.max_rpm
        } else {
            self.config.base_rpm
        }
    }

    /// Outcome counts currently inside the window
    pub fn counts(&self) -> OutcomeCounts {
        let now = Instant::now();
        let mut state = self.lock();
        state.evict(now, self.window);
        state.counts()
    }

    /// Lower (inclusive) and upper (exclusive) bounds of the next delay
    pub fn delay_bounds(&self) -> (Duration, Duration) {
        let base = Duration::from_secs_f64(60.0 / self.target_rpm());
        (
            base + Duration::from_millis(self.config.jitter_min_ms),
            base + Duration::from_millis(self.config.jitter_max_ms),
        )
    }

    /// Delay to observe before the next request
    pub fn next_delay(&self) -> Duration {
        let base = Duration::from_secs_f64(60.0 / self.target_rpm());
        let (min, max) = (self.config.jitter_min_ms, self.config.jitter_max_ms);
        let jitter = if min < max {
            rand::rng().random_range(min..max)
        } else {
            min
        };
        base + Duration::from_millis(jitter)
    }

    /// Sleeps for [`next_delay`](Self::next_delay)
    pub async fn wait(&self) {
        let delay = self.next_delay();
        tracing::trace!("Pacing wait {:?}", delay);
        tokio::time::sleep(delay).await;
    }

    /// Pause a worker takes between units, derived from recent health
    pub fn settle_delay(&self) -> Duration {
        let now = Instant::now();
        let (rate, errors) = {
            let mut state = self.lock();
            state.evict(now, self.window);
            (state.success_rate, state.recent_failures.len())
        };
        settle_delay_for(rate, errors)
    }

    /// Exponentially weighted success rate, starting at 1.0
    pub fn success_estimate(&self) -> f64 {
        self.lock().success_rate
    }
}

/// Settle delay for a success estimate and a count of recent errors
///
/// * any recent error, or success below 92%: 2.0 to 3.5 s by severity
/// * success at or above 99%: sub-second
/// * otherwise linear between 0.8 and 2.0 s
pub fn settle_delay_for(success_rate: f64, recent_errors: usize) -> Duration {
    let rate = success_rate.clamp(0.0, 1.0);
    let secs = if recent_errors > 0 || rate < 0.92 {
        let by_errors = recent_errors as f64 / 5.0;
        let by_rate = (0.92 - rate) / 0.92;
        let severity = by_errors.max(by_rate).clamp(0.0, 1.0);
        2.0 + 1.5 * severity
    } else if rate >= 0.99 {
        0.3 + (1.0 - rate) * 50.0
    } else {
        0.8 + 1.2 * (0.99 - rate) / 0.07
    };
    Duration::from_secs_f64(secs)
}
