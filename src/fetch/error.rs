use crate::pacing::OutcomeKind;
use thiserror::Error;

/// Why a response was classified as a block page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Body shorter than the configured minimum
    TooShort { len: usize, min: usize },
    /// Body contains a block marker (matched case-insensitively)
    Marker(String),
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::TooShort { len, min } => {
                write!(f, "body too short ({} < {} bytes)", len, min)
            }
            BlockReason::Marker(marker) => write!(f, "body contains '{}'", marker),
        }
    }
}

/// Failure of a single fetch attempt
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// No response: timeout, connection reset, DNS failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx status that is neither a rate limit nor a block page
    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("Rate limited (HTTP {status})")]
    RateLimited { status: u16 },

    /// Anti-bot page: CAPTCHA, access denied, or a suspiciously short body
    #[error("Blocked: {reason}")]
    Blocked { reason: BlockReason },

    /// The strategy could not provide a session or client at all
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),
}

impl FetchError {
    /// Pacing window event for this failure, if it produced a response that
    /// says something about how the target perceives us
    pub fn outcome(&self) -> Option<OutcomeKind> {
        match self {
            FetchError::RateLimited { .. } => Some(OutcomeKind::RateLimited),
            FetchError::Blocked { .. } => Some(OutcomeKind::Blocked),
            FetchError::Transport(_)
            | FetchError::Http { .. }
            | FetchError::SessionUnavailable(_) => None,
        }
    }

    /// Whether this failure counts as a detection against the identity used
    pub fn is_detection(&self) -> bool {
        matches!(self, FetchError::Blocked { .. })
    }

    /// Whether retrying with the same strategy can help
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::SessionUnavailable(_))
    }
}
