use std::time::Duration;

/// Default per-call HTTP timeout for outbound LLM requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables shared by the executor and the invocation client.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Fixed timeout applied to every outbound chat-completion call.
    pub request_timeout: Duration,
    /// Optional `(min_ms, max_ms)` randomized sleep before each call, to
    /// avoid bursting a provider's rate limit. Disabled by default.
    pub jitter_ms: Option<(u64, u64)>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            jitter_ms: None,
        }
    }
}

impl ServiceConfig {
    /// Build from environment, falling back to defaults.
    ///
    /// `PROMPTWORKS_TIMEOUT_SECS` overrides the HTTP timeout;
    /// `PROMPTWORKS_JITTER_MS` takes `min,max` (e.g. `200,800`) or a single
    /// upper bound.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(raw) = std::env::var("PROMPTWORKS_TIMEOUT_SECS") {
            if let Ok(secs) = raw.trim().parse::<u64>() {
                if secs > 0 {
                    cfg.request_timeout = Duration::from_secs(secs);
                }
            }
        }
        if let Ok(raw) = std::env::var("PROMPTWORKS_JITTER_MS") {
            cfg.jitter_ms = parse_jitter(&raw);
        }
        cfg
    }
}

fn parse_jitter(raw: &str) -> Option<(u64, u64)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (lo, hi) = match raw.split_once(',') {
        Some((lo, hi)) => (lo.trim().parse().ok()?, hi.trim().parse().ok()?),
        None => (0, raw.parse().ok()?),
    };
    if hi == 0 || lo > hi {
        return None;
    }
    Some((lo, hi))
}
