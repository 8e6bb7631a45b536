use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{Engine, now_ms};
use crate::model::Ms;

/// One sweep over expired reset codes. Returns how many were purged.
pub async fn reap_once(engine: &Engine, now: Ms) -> usize {
    let mut purged = 0;
    for code in engine.collect_expired_reset_codes(now) {
        match engine.purge_reset_code(&code, now).await {
            Ok(true) => purged += 1,
            Ok(false) => {}
            Err(e) => warn!("reaper could not purge reset code: {e}"),
        }
    }
    if purged > 0 {
        metrics::counter!(crate::observability::RESET_CODES_REAPED_TOTAL).increment(purged as u64);
        info!("reaped {purged} expired reset codes");
    }
    purged
}

/// Background task that periodically purges expired reset codes.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        reap_once(&engine, now_ms()).await;
    }
}

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = engine.appends_since_compact().await;
        if appends < threshold {
            debug!("compactor: {appends} appends since last compaction, below {threshold}");
            continue;
        }
        match engine.compact_wal().await {
            Ok(n) => info!("compacted WAL: {appends} appends folded into {n} events"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}
