use std::time::Duration;

pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;
pub const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 30;
pub const JOIN_TIMEOUT_MIN_SECS: u64 = 5;
pub const JOIN_TIMEOUT_MAX_SECS: u64 = 300;

/// Engine tunables with hard-coded fallbacks.
///
/// The branch-join timeout is always clamped to
/// [`JOIN_TIMEOUT_MIN_SECS`, `JOIN_TIMEOUT_MAX_SECS`] no matter where the
/// value came from.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub worker_pool_size: usize,
    pub join_timeout: Duration,
    pub event_capacity: usize,
    pub environment: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            join_timeout: Duration::from_secs(DEFAULT_JOIN_TIMEOUT_SECS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            environment: None,
        }
    }
}

impl EngineSettings {
    /// Read overrides from `RELAY_WORKER_POOL_SIZE`,
    /// `RELAY_JOIN_TIMEOUT_SECS`, `RELAY_EVENT_BUFFER`, and
    /// `RELAY_ENVIRONMENT`. An unreadable value logs a warning and keeps the
    /// fallback.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(size) = read_env::<usize>("RELAY_WORKER_POOL_SIZE") {
            settings.worker_pool_size = size.max(1);
        }
        if let Some(secs) = read_env::<u64>("RELAY_JOIN_TIMEOUT_SECS") {
            settings.join_timeout = Duration::from_secs(clamp_join_timeout(secs));
        }
        if let Some(capacity) = read_env::<usize>("RELAY_EVENT_BUFFER") {
            settings.event_capacity = capacity.max(1);
        }
        settings.environment = std::env::var("RELAY_ENVIRONMENT").ok();
        settings
    }

    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size.max(1);
        self
    }

    pub fn with_join_timeout_secs(mut self, secs: u64) -> Self {
        self.join_timeout = Duration::from_secs(clamp_join_timeout(secs));
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }
}

/// Clamp a configured join timeout into the safe range, logging when the
/// requested value had to be adjusted
pub fn clamp_join_timeout(secs: u64) -> u64 {
    let clamped = secs.clamp(JOIN_TIMEOUT_MIN_SECS, JOIN_TIMEOUT_MAX_SECS);
    if clamped != secs {
        tracing::warn!(
            requested = secs,
            effective = clamped,
            min = JOIN_TIMEOUT_MIN_SECS,
            max = JOIN_TIMEOUT_MAX_SECS,
            "join timeout outside safe range, clamped"
        );
    }
    clamped
}

fn read_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "unreadable setting, using fallback");
            None
        }
    }
}
