//! # Engine Lifecycle
//!
//! Idle → Running → Idle, driven through the public API:
//!
//! 1. Start is idempotent and never spawns a second set of loops
//! 2. Stop is idempotent and joins every loop it spawned
//! 3. Nothing is produced once `stop()` has returned

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{fast_config, node, wait_until};
    use hc_consensus::{ConsensusEngine, EngineConfig, EngineError, HybridConsensusApi};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_repeated_start_keeps_one_set_of_loops() {
        let n = node(fast_config(), 1);
        for _ in 0..5 {
            n.engine.start().await.unwrap();
        }
        let status = n.engine.info().await;
        assert!(status.running);
        assert_eq!(status.production_tasks, 2);

        n.engine.stop().await.unwrap();
        assert_eq!(n.engine.info().await.production_tasks, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_start_calls_spawn_once() {
        let n = node(fast_config(), 1);
        let engine = Arc::new(n.engine);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move { engine.start().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(engine.info().await.production_tasks, 2);
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_on_idle_engine_succeeds() {
        let n = node(fast_config(), 1);
        n.engine.stop().await.unwrap();
        let status = n.engine.info().await;
        assert!(!status.running);
        assert_eq!(status.last_sub_block_height, 0);
        assert_eq!(status.last_block_height, 0);
    }

    #[tokio::test]
    async fn test_start_reports_missing_collaborators() {
        let engine = ConsensusEngine::new(EngineConfig::default()).unwrap();
        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, EngineError::NotInitialized { .. }));
        assert!(err.to_string().contains("consensus not initialised"));
        assert!(!engine.info().await.running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_heights_frozen_after_stop() {
        let n = node(fast_config(), 1);
        n.pool.submit(b"warmup".to_vec());
        n.engine.start().await.unwrap();

        let ledger = n.ledger.clone();
        assert!(wait_until(Duration::from_secs(2), || !ledger.sub_blocks().is_empty()).await);
        n.engine.stop().await.unwrap();

        let stopped = n.engine.info().await;
        for i in 0..20u8 {
            n.pool.submit(vec![i]);
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        let later = n.engine.info().await;
        assert_eq!(later.last_sub_block_height, stopped.last_sub_block_height);
        assert_eq!(later.last_block_height, stopped.last_block_height);
        assert_eq!(n.pool.len(), 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_continues_from_committed_heights() {
        let n = node(fast_config(), 1);
        let ledger = n.ledger.clone();

        n.pool.submit(b"first".to_vec());
        n.engine.start().await.unwrap();
        assert!(wait_until(Duration::from_secs(2), || ledger.sub_blocks().len() == 1).await);
        n.engine.stop().await.unwrap();

        n.pool.submit(b"second".to_vec());
        n.engine.start().await.unwrap();
        assert!(wait_until(Duration::from_secs(2), || ledger.sub_blocks().len() == 2).await);
        n.engine.stop().await.unwrap();

        let heights: Vec<u64> = ledger.sub_blocks().iter().map(|s| s.header.height).collect();
        assert_eq!(heights, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_engine_behind_trait_object() {
        let n = node(fast_config(), 1);
        let api: Arc<dyn HybridConsensusApi> = Arc::new(n.engine);
        api.start().await.unwrap();
        assert!(api.info().await.running);
        api.stop().await.unwrap();
        assert!(!api.info().await.running);
    }
}
