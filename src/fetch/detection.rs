//! Response classification: rate limits, block pages and HTTP errors

use crate::config::FetchConfig;
use crate::fetch::error::{BlockReason, FetchError};
use crate::fetch::strategy::RawPage;

const TOO_MANY_REQUESTS: u16 = 429;

/// Heuristic block-page detector
#[derive(Debug, Clone)]
pub struct BlockDetector {
    min_body_length: usize,
    markers: Vec<String>,
}

impl BlockDetector {
    pub fn new(min_body_length: usize, markers: &[String]) -> Self {
        Self {
            min_body_length,
            markers: markers.iter().map(|m| m.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.min_body_length, &config.block_markers)
    }

    /// Returns why `body` looks like a block page, if it does
    pub fn check(&self, body: &str) -> Option<BlockReason> {
        let len = body.trim().len();
        if len < self.min_body_length {
            return Some(BlockReason::TooShort {
                len,
                min: self.min_body_length,
            });
        }
        self.find_marker(body)
    }

    fn find_marker(&self, body: &str) -> Option<BlockReason> {
        let lowered = body.to_lowercase();
        self.markers
            .iter()
            .find(|marker| lowered.contains(marker.as_str()))
            .map(|marker| BlockReason::Marker(marker.clone()))
    }

    /// Classifies a raw response into usable HTML or a typed failure
    ///
    /// Error pages are short by nature, so the length heuristic only
    /// applies to 2xx bodies.
    ///
    /// # Classification
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | HTTP 429 | `RateLimited` |
    /// | Non-2xx with a block marker in the body | `Blocked` |
    /// | Other non-2xx | `Http` |
    /// | 2xx that is too short or carries a marker | `Blocked` |
    /// | Other 2xx | HTML |
    pub fn classify(&self, page: RawPage) -> Result<String, FetchError> {
        if page.status == TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                status: page.status,
            });
        }

        if !(200..300).contains(&page.status) {
            return Err(match self.find_marker(&page.body) {
                Some(reason) => FetchError::Blocked { reason },
                None => FetchError::Http {
                    status: page.status,
                },
            });
        }

        if let Some(reason) = self.check(&page.body) {
            return Err(FetchError::Blocked { reason });
        }

        Ok(page.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> BlockDetector {
        BlockDetector::new(20, &["CAPTCHA".to_string(), "access denied".to_string()])
    }

    fn page(status: u16, body: &str) -> RawPage {
        RawPage {
            status,
            body: body.to_string(),
        }
    }

    const GOOD: &str = "<html><body><table><tr><td>ok</td></tr></table></body></html>";

    #[test]
    fn test_good_page_passes() {
        assert_eq!(detector().classify(page(200, GOOD)).unwrap(), GOOD);
    }

    #[test]
    fn test_short_body_is_blocked() {
        let err = detector().classify(page(200, "<html></html>")).unwrap_err();
        assert!(matches!(
            err,
            FetchError::Blocked {
                reason: BlockReason::TooShort { min: 20, .. }
            }
        ));
    }

    #[test]
    fn test_marker_is_case_insensitive() {
        let body = "<html><body>Please complete the captcha to continue</body></html>";
        let err = detector().classify(page(200, body)).unwrap_err();
        assert_eq!(
            err,
            FetchError::Blocked {
                reason: BlockReason::Marker("captcha".to_string())
            }
        );
    }

    #[test]
    fn test_error_status_with_block_body() {
        let body = "<html><body><h1>Access Denied</h1> reference #18</body></html>";
        let err = detector().classify(page(403, body)).unwrap_err();
        assert!(err.is_detection());
    }

    #[test]
    fn test_rate_limit_wins() {
        let err = detector().classify(page(429, "slow down")).unwrap_err();
        assert_eq!(err, FetchError::RateLimited { status: 429 });
    }

    #[test]
    fn test_plain_http_error() {
        let err = detector().classify(page(503, GOOD)).unwrap_err();
        assert_eq!(err, FetchError::Http { status: 503 });
    }

    #[test]
    fn test_short_error_page_is_http_error() {
        let detector = BlockDetector::from_config(&FetchConfig::default());

        let err = detector
            .classify(page(404, "<h1>404 Not Found</h1>"))
            .unwrap_err();
        assert_eq!(err, FetchError::Http { status: 404 });
        assert!(!err.is_detection());

        let bad_gateway = "<html><head><title>502 Bad Gateway</title></head>\
            <body><center><h1>502 Bad Gateway</h1></center></body></html>";
        let err = detector.classify(page(502, bad_gateway)).unwrap_err();
        assert_eq!(err, FetchError::Http { status: 502 });
    }
}
