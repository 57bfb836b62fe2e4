use relayruntime::{
    clamp_join_timeout, EngineSettings, DEFAULT_JOIN_TIMEOUT_SECS, DEFAULT_WORKER_POOL_SIZE,
    JOIN_TIMEOUT_MAX_SECS, JOIN_TIMEOUT_MIN_SECS,
};
use std::time::Duration;

#[test]
fn defaults_match_the_documented_fallbacks() {
    let settings = EngineSettings::default();
    assert_eq!(settings.worker_pool_size, DEFAULT_WORKER_POOL_SIZE);
    assert_eq!(
        settings.join_timeout,
        Duration::from_secs(DEFAULT_JOIN_TIMEOUT_SECS)
    );
}

#[test]
fn join_timeout_is_clamped_to_the_safe_range() {
    assert_eq!(clamp_join_timeout(1), JOIN_TIMEOUT_MIN_SECS);
    assert_eq!(clamp_join_timeout(30), 30);
    assert_eq!(clamp_join_timeout(10_000), JOIN_TIMEOUT_MAX_SECS);

    let settings = EngineSettings::default().with_join_timeout_secs(2);
    assert_eq!(
        settings.join_timeout,
        Duration::from_secs(JOIN_TIMEOUT_MIN_SECS)
    );
    let settings = EngineSettings::default().with_join_timeout_secs(999);
    assert_eq!(
        settings.join_timeout,
        Duration::from_secs(JOIN_TIMEOUT_MAX_SECS)
    );
}

#[test]
fn worker_pool_size_never_drops_to_zero() {
    let settings = EngineSettings::default().with_worker_pool_size(0);
    assert_eq!(settings.worker_pool_size, 1);
}
