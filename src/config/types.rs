use crate::consolidate::FieldPolicy;
use crate::state::UnitKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub health: HealthConfig,
    pub merge: MergeConfig,
    #[serde(default)]
    pub roots: Vec<RootEntry>,
    #[serde(default)]
    pub extract: Option<ExtractConfig>,
}

/// Where a crawl target keeps its files
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetConfig {
    /// Target name, used as the directory under `output-dir`
    pub name: String,

    /// Parent directory of all targets
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Canonical dataset file stem (`<canonical>.json`)
    pub canonical: String,

    /// Partial aggregate file stem (`temp/<aggregate>_partial.json`); defaults to `canonical`
    #[serde(default)]
    pub aggregate: Option<String>,

    /// Copy the previous canonical file to a timestamped backup before replacing it
    #[serde(default = "default_true")]
    pub backup_canonical: bool,

    /// Clear the checkpoint after a complete run has been consolidated
    #[serde(default = "default_true")]
    pub clear_checkpoint_on_success: bool,
}

impl TargetConfig {
    pub fn target_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir).join(&self.name)
    }

    pub fn aggregate_name(&self) -> &str {
        self.aggregate.as_deref().unwrap_or(&self.canonical)
    }
}

/// Worker pool behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Number of sibling units processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pause a worker between units for the adaptive settle delay
    #[serde(default = "default_true")]
    pub settle_between_units: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            settle_between_units: true,
        }
    }
}

/// Adaptive pacing limits
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PacingConfig {
    /// Sliding window for outcome events (seconds)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests per minute while the target is healthy
    #[serde(default = "default_max_rpm")]
    pub max_rpm: f64,

    /// Requests per minute after repeated rate limiting or blocking
    #[serde(default = "default_base_rpm")]
    pub base_rpm: f64,

    /// Lower bound of the per-request jitter (milliseconds)
    #[serde(default = "default_jitter_min_ms")]
    pub jitter_min_ms: u64,

    /// Upper bound (exclusive) of the per-request jitter (milliseconds)
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_rpm: default_max_rpm(),
            base_rpm: default_base_rpm(),
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
        }
    }
}

/// Which stateful session capability backs the first fetch strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackendKind {
    /// No session strategy; the chain starts at the proxy/direct strategies
    #[default]
    None,
    /// Per-worker HTTP session with its own cookie jar and origin warm-up
    Cookie,
}

/// Fetch chain configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub session_backend: SessionBackendKind,

    #[serde(default = "default_session_attempts")]
    pub session_attempts: u32,

    #[serde(default = "default_http_attempts")]
    pub proxy_attempts: u32,

    #[serde(default = "default_http_attempts")]
    pub direct_attempts: u32,

    /// First in-place retry delay; doubles per attempt (milliseconds)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Cap on the in-place retry delay (milliseconds)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Bodies shorter than this are treated as block pages
    #[serde(default = "default_min_body_length")]
    pub min_body_length: usize,

    /// Case-insensitive substrings that mark a block or CAPTCHA page
    #[serde(default = "default_block_markers")]
    pub block_markers: Vec<String>,

    /// Proxy URLs for the proxy-rotated strategy, in rotation order
    #[serde(default)]
    pub proxies: Vec<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            session_backend: SessionBackendKind::None,
            session_attempts: default_session_attempts(),
            proxy_attempts: default_http_attempts(),
            direct_attempts: default_http_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            min_body_length: default_min_body_length(),
            block_markers: default_block_markers(),
            proxies: Vec::new(),
            user_agent: default_user_agent(),
        }
    }
}

/// Rotation thresholds for proxies and sessions
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HealthConfig {
    /// Rotate when the failure rate in the session window exceeds this
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,

    /// Rotate when detections in the session window exceed this
    #[serde(default = "default_max_detections")]
    pub max_detections: u32,

    /// Attempts required before the failure rate is considered
    #[serde(default = "default_min_samples")]
    pub min_samples: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: default_failure_rate_threshold(),
            max_detections: default_max_detections(),
            min_samples: default_min_samples(),
        }
    }
}

/// How records are identified and merged into the canonical dataset
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MergeConfig {
    /// Record fields that together form the identity key
    pub identity_fields: Vec<String>,

    /// Fields whose existing non-blank value survives a blank incoming value
    #[serde(default)]
    pub sticky_fields: Vec<String>,

    /// Policy for fields not listed in `sticky-fields`
    #[serde(default)]
    pub default_policy: FieldPolicy,
}

/// A top-level unit to crawl
#[derive(Debug, Clone, Deserialize)]
pub struct RootEntry {
    pub id: String,
    pub url: String,
    #[serde(default = "default_root_kind")]
    pub kind: UnitKind,
}

/// Rules for the built-in CSS selector extractor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtractConfig {
    /// Links on collection pages that lead to group units
    #[serde(default)]
    pub collection_links: Option<String>,

    /// Links on group pages that lead to item units
    #[serde(default)]
    pub group_links: Option<String>,

    /// Elements on item pages that each yield one record
    pub record_selector: String,

    /// Record field name → selector evaluated inside each record element
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// If set, each record gets the unit id under this field name
    #[serde(default)]
    pub unit_field: Option<String>,
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    3
}

fn default_window_secs() -> u64 {
    300
}

fn default_max_rpm() -> f64 {
    40.0
}

fn default_base_rpm() -> f64 {
    20.0
}

fn default_jitter_min_ms() -> u64 {
    400
}

fn default_jitter_max_ms() -> u64 {
    1200
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_session_attempts() -> u32 {
    3
}

fn default_http_attempts() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_min_body_length() -> usize {
    512
}

pub(crate) fn default_block_markers() -> Vec<String> {
    [
        "captcha",
        "access denied",
        "attention required",
        "cf-chl",
        "are you a robot",
        "unusual traffic",
        "verify you are human",
        "request blocked",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}

fn default_failure_rate_threshold() -> f64 {
    0.6
}

fn default_max_detections() -> u32 {
    5
}

fn default_min_samples() -> u32 {
    5
}

fn default_root_kind() -> UnitKind {
    UnitKind::Collection
}
