//! Plain and proxy-rotated HTTP strategies built on reqwest

use crate::config::FetchConfig;
use crate::fetch::error::FetchError;
use crate::fetch::strategy::{Attempt, FetchStrategy, RawPage, StrategyKind};
use crate::health::{HealthTracker, DIRECT_IDENTITY};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};
use reqwest::{Client, Proxy};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Builds an HTTP client that presents itself like a desktop browser
///
/// # Arguments
///
/// * `config` - Fetch configuration (user agent, timeout)
/// * `proxy` - Optional proxy URL all traffic is routed through
///
/// # Returns
///
/// * `Ok(Client)` - Client with a persistent cookie jar
/// * `Err(reqwest::Error)` - Failed to build client or parse the proxy URL
pub fn build_http_client(config: &FetchConfig, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    let mut builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
        .cookie_store(true)
        .gzip(true)
        .brotli(true);

    builder = match proxy {
        Some(proxy_url) => builder.proxy(Proxy::all(proxy_url)?),
        // Direct means direct: ignore HTTP_PROXY and friends
        None => builder.no_proxy(),
    };

    builder.build()
}

/// Sends a GET request and returns the status and body without judging them
pub async fn fetch_page(client: &Client, url: &str) -> Result<RawPage, FetchError> {
    let response = client.get(url).send().await.map_err(transport_error)?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(transport_error)?;
    Ok(RawPage { status, body })
}

fn transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Transport("Request timeout".to_string())
    } else if e.is_connect() {
        FetchError::Transport(format!("Connection failed: {}", e))
    } else {
        FetchError::Transport(e.to_string())
    }
}

/// Last link of the chain: no proxy, no session
pub struct DirectStrategy {
    client: Client,
    attempts: u32,
}

impl DirectStrategy {
    pub fn new(client: Client, attempts: u32) -> Self {
        Self { client, attempts }
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config, None)?, config.direct_attempts))
    }
}

#[async_trait]
impl FetchStrategy for DirectStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    fn max_attempts(&self) -> u32 {
        self.attempts
    }

    async fn attempt(&self, url: &str) -> Attempt {
        Attempt {
            identity: DIRECT_IDENTITY.to_string(),
            result: fetch_page(&self.client, url).await,
        }
    }
}

/// Routes each request through the health tracker's current proxy
pub struct ProxyStrategy {
    clients: HashMap<String, Client>,
    health: Arc<HealthTracker>,
    attempts: u32,
}

impl ProxyStrategy {
    pub fn from_config(config: &FetchConfig, health: Arc<HealthTracker>) -> Result<Self, reqwest::Error> {
        let mut clients = HashMap::new();
        for proxy in &config.proxies {
            clients.insert(proxy.clone(), build_http_client(config, Some(proxy))?);
        }
        Ok(Self {
            clients,
            health,
            attempts: config.proxy_attempts,
        })
    }
}

#[async_trait]
impl FetchStrategy for ProxyStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Proxy
    }

    fn max_attempts(&self) -> u32 {
        self.attempts
    }

    async fn attempt(&self, url: &str) -> Attempt {
        let client = self
            .health
            .current_identity()
            .and_then(|identity| self.clients.get(&identity).map(|c| (identity, c)));

        match client {
            Some((identity, client)) => Attempt {
                result: fetch_page(client, url).await,
                identity,
            },
            None => Attempt {
                identity: "proxy".to_string(),
                result: Err(FetchError::SessionUnavailable(
                    "no proxy client for the current identity".to_string(),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let config = FetchConfig::default();
        assert!(build_http_client(&config, None).is_ok());
        assert!(build_http_client(&config, Some("http://127.0.0.1:8080")).is_ok());
    }

    #[tokio::test]
    async fn test_transport_failure_is_typed() {
        let config = FetchConfig {
            timeout_secs: 1,
            ..FetchConfig::default()
        };
        let strategy = DirectStrategy::from_config(&config).unwrap();
        // Port 9 (discard) is closed on test machines
        let attempt = strategy.attempt("http://127.0.0.1:9/").await;
        assert_eq!(attempt.identity, DIRECT_IDENTITY);
        assert!(matches!(attempt.result, Err(FetchError::Transport(_))));
    }

    #[tokio::test]
    async fn test_proxy_strategy_without_clients_is_unavailable() {
        let config = FetchConfig::default();
        let health = Arc::new(HealthTracker::new(Default::default(), Vec::new()));
        let strategy = ProxyStrategy::from_config(&config, health).unwrap();
        let attempt = strategy.attempt("http://127.0.0.1:9/").await;
        assert!(matches!(
            attempt.result,
            Err(FetchError::SessionUnavailable(_))
        ));
    }
}
