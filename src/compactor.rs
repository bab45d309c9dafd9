use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::{Engine, EngineError};

/// Compact the WAL when at least `threshold` events were appended since the
/// last compaction. Returns whether a compaction ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appends = engine.wal_appends_since_compact().await;
    if appends == 0 || appends < threshold {
        return Ok(false);
    }
    engine.compact_wal().await?;
    info!("compacted WAL after {appends} appends");
    Ok(true)
}

/// Background task that checks the WAL for compaction once a minute.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&engine, threshold).await {
            warn!("WAL compaction failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::clock::ManualClock;
    use crate::model::*;
    use crate::wal::Wal;
    use std::path::PathBuf;

    const NOW: Ms = 1_894_698_000_000;
    const H: Ms = 3_600_000;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roombook_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn engine(path: PathBuf) -> Engine {
        let catalog = StaticCatalog::new([Room {
            id: "R1".into(),
            name: "Ada Lovelace".into(),
        }])
        .unwrap();
        Engine::open(path, Arc::new(catalog), Arc::new(ManualClock::new(NOW))).unwrap()
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = engine(path.clone());

        for i in 0..3 {
            let start = (NOW + i * 24 * H).to_string();
            let end = (NOW + i * 24 * H + H).to_string();
            let r = engine.create("R1", "U1", &start, &end).await.unwrap();
            engine.cancel(r.id, "U1").await.unwrap();
        }
        assert!(!compact_if_needed(&engine, 10).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 6);

        assert!(compact_if_needed(&engine, 6).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        assert!(Wal::replay(&path).unwrap().is_empty());

        // Nothing appended since, so a zero threshold is still a no-op.
        assert!(!compact_if_needed(&engine, 0).await.unwrap());
    }

    #[tokio::test]
    async fn ephemeral_engine_never_compacts() {
        let engine = Engine::ephemeral(
            Arc::new(StaticCatalog::default()),
            Arc::new(ManualClock::new(NOW)),
        );
        assert!(!compact_if_needed(&engine, 0).await.unwrap());
    }
}
