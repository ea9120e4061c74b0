use crate::config::types::{
    Config, CrawlConfig, ExtractConfig, FetchConfig, HealthConfig, MergeConfig, PacingConfig,
    RootEntry, TargetConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Upper bound on concurrent workers; more than a handful invites detection
const MAX_WORKERS: usize = 16;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_target_config(&config.target)?;
    validate_crawl_config(&config.crawl)?;
    validate_pacing_config(&config.pacing)?;
    validate_fetch_config(&config.fetch)?;
    validate_health_config(&config.health)?;
    validate_merge_config(&config.merge)?;
    validate_roots(&config.roots)?;
    if let Some(extract) = &config.extract {
        validate_extract_config(extract)?;
    }
    Ok(())
}

/// Validates target file layout settings
fn validate_target_config(config: &TargetConfig) -> Result<(), ConfigError> {
    validate_file_stem("target.name", &config.name)?;
    validate_file_stem("target.canonical", &config.canonical)?;
    if let Some(aggregate) = &config.aggregate {
        validate_file_stem("target.aggregate", aggregate)?;
    }

    if config.output_dir.is_empty() {
        return Err(ConfigError::Validation(
            "target.output-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates worker pool settings
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "crawl.workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    Ok(())
}

/// Validates pacing limits
fn validate_pacing_config(config: &PacingConfig) -> Result<(), ConfigError> {
    if config.window_secs == 0 {
        return Err(ConfigError::Validation(
            "pacing.window-secs must be >= 1".to_string(),
        ));
    }

    if !(config.base_rpm > 0.0) || !config.base_rpm.is_finite() {
        return Err(ConfigError::Validation(format!(
            "pacing.base-rpm must be a positive number, got {}",
            config.base_rpm
        )));
    }

    if !config.max_rpm.is_finite() || config.max_rpm < config.base_rpm {
        return Err(ConfigError::Validation(format!(
            "pacing.max-rpm ({}) must be >= pacing.base-rpm ({})",
            config.max_rpm, config.base_rpm
        )));
    }

    if config.jitter_min_ms > config.jitter_max_ms {
        return Err(ConfigError::Validation(format!(
            "pacing.jitter-min-ms ({}) must be <= pacing.jitter-max-ms ({})",
            config.jitter_min_ms, config.jitter_max_ms
        )));
    }

    Ok(())
}

/// Validates fetch chain settings
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "fetch.timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.direct_attempts == 0 {
        return Err(ConfigError::Validation(
            "fetch.direct-attempts must be >= 1".to_string(),
        ));
    }

    if config.backoff_base_ms > config.backoff_max_ms {
        return Err(ConfigError::Validation(format!(
            "fetch.backoff-base-ms ({}) must be <= fetch.backoff-max-ms ({})",
            config.backoff_base_ms, config.backoff_max_ms
        )));
    }

    if config.block_markers.iter().any(|m| m.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "fetch.block-markers cannot contain empty markers".to_string(),
        ));
    }

    for proxy in &config.proxies {
        let url = Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Proxy '{}' must use http or https",
                proxy
            )));
        }
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "fetch.user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates rotation thresholds
fn validate_health_config(config: &HealthConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&config.failure_rate_threshold) {
        return Err(ConfigError::Validation(format!(
            "health.failure-rate-threshold must be between 0 and 1, got {}",
            config.failure_rate_threshold
        )));
    }

    if config.min_samples == 0 {
        return Err(ConfigError::Validation(
            "health.min-samples must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates merge policy settings
fn validate_merge_config(config: &MergeConfig) -> Result<(), ConfigError> {
    if config.identity_fields.is_empty() {
        return Err(ConfigError::Validation(
            "merge.identity-fields must name at least one field".to_string(),
        ));
    }

    if config.identity_fields.iter().any(|f| f.trim().is_empty())
        || config.sticky_fields.iter().any(|f| f.trim().is_empty())
    {
        return Err(ConfigError::Validation(
            "merge field names cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates root units: unique ids and absolute http(s) URLs
fn validate_roots(roots: &[RootEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for root in roots {
        if root.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Root id cannot be empty".to_string(),
            ));
        }

        if !seen.insert(root.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate root id '{}'",
                root.id
            )));
        }

        let url = Url::parse(&root.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid root URL '{}': {}", root.url, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Root URL '{}' must use http or https",
                root.url
            )));
        }
    }

    Ok(())
}

/// Validates selector extractor rules
fn validate_extract_config(config: &ExtractConfig) -> Result<(), ConfigError> {
    if config.record_selector.trim().is_empty() {
        return Err(ConfigError::Validation(
            "extract.record-selector cannot be empty".to_string(),
        ));
    }

    if config.fields.is_empty() {
        return Err(ConfigError::Validation(
            "extract.fields must define at least one field".to_string(),
        ));
    }

    Ok(())
}

/// Validates a name used as a file or directory stem
fn validate_file_stem(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", key)));
    }

    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        || value.starts_with('.')
    {
        return Err(ConfigError::Validation(format!(
            "{} must contain only alphanumeric characters, '-', '_' or '.', got '{}'",
            key, value
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(id: &str, url: &str) -> RootEntry {
        RootEntry {
            id: id.to_string(),
            url: url.to_string(),
            kind: crate::state::UnitKind::Collection,
        }
    }

    #[test]
    fn test_validate_file_stem() {
        assert!(validate_file_stem("k", "players").is_ok());
        assert!(validate_file_stem("k", "players_2024.v2").is_ok());

        assert!(validate_file_stem("k", "").is_err());
        assert!(validate_file_stem("k", "../escape").is_err());
        assert!(validate_file_stem("k", ".hidden").is_err());
        assert!(validate_file_stem("k", "a/b").is_err());
    }

    #[test]
    fn test_validate_roots() {
        assert!(validate_roots(&[root("a", "https://example.com/a")]).is_ok());
        assert!(validate_roots(&[]).is_ok());

        assert!(validate_roots(&[root("", "https://example.com/a")]).is_err());
        assert!(validate_roots(&[root("a", "ftp://example.com/a")]).is_err());
        assert!(validate_roots(&[root("a", "not a url")]).is_err());
        assert!(validate_roots(&[
            root("a", "https://example.com/a"),
            root("a", "https://example.com/b"),
        ])
        .is_err());
    }

    #[test]
    fn test_validate_pacing() {
        assert!(validate_pacing_config(&PacingConfig::default()).is_ok());

        let inverted = PacingConfig {
            max_rpm: 10.0,
            base_rpm: 20.0,
            ..PacingConfig::default()
        };
        assert!(validate_pacing_config(&inverted).is_err());

        let zero = PacingConfig {
            base_rpm: 0.0,
            ..PacingConfig::default()
        };
        assert!(validate_pacing_config(&zero).is_err());

        let jitter = PacingConfig {
            jitter_min_ms: 500,
            jitter_max_ms: 100,
            ..PacingConfig::default()
        };
        assert!(validate_pacing_config(&jitter).is_err());
    }

    #[test]
    fn test_validate_health() {
        assert!(validate_health_config(&HealthConfig::default()).is_ok());

        let out_of_range = HealthConfig {
            failure_rate_threshold: 1.5,
            ..HealthConfig::default()
        };
        assert!(validate_health_config(&out_of_range).is_err());
    }

    #[test]
    fn test_validate_proxies() {
        let ok = FetchConfig {
            proxies: vec!["http://127.0.0.1:8080".to_string()],
            ..FetchConfig::default()
        };
        assert!(validate_fetch_config(&ok).is_ok());

        let bad = FetchConfig {
            proxies: vec!["ftp://127.0.0.1:21".to_string()],
            ..FetchConfig::default()
        };
        assert!(validate_fetch_config(&bad).is_err());
    }
}
