//! Proxy and session health tracking
//!
//! Counts successes, failures and detections per egress identity and advises
//! when an identity should be rotated out.

mod tracker;

pub use tracker::{HealthTracker, ProxyHealth, DIRECT_IDENTITY};
