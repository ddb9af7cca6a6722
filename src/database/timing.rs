use std::future::Future;
use std::time::Instant;

use crate::config;

/// Run a query future and warn when it exceeds the configured slow-query threshold
pub async fn timed<T, F>(label: &'static str, fut: F) -> T
where
    F: Future<Output = T>,
{
    let settings = &config::config().database;
    if !settings.enable_slow_query_warning {
        return fut.await;
    }

    let started = Instant::now();
    let out = fut.await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if elapsed_ms >= settings.slow_query_threshold_ms {
        tracing::warn!(query = label, elapsed_ms, "slow query");
    } else {
        tracing::trace!(query = label, elapsed_ms, "query finished");
    }
    out
}
