//! # Collaborator Failures
//!
//! A failed cycle is reported on the event channel and in `info()`, and the
//! loop carries on. Transactions picked for a sub-block that never committed
//! are retried on the next tick.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{
        fast_config, next_event, node, node_with_ledger, wait_until, HangingLedger,
    };
    use hc_consensus::adapters::InMemoryLedger;
    use hc_consensus::{EngineConfig, EngineEvent, LoopKind};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn is_failure(event: &EngineEvent) -> bool {
        matches!(event, EngineEvent::CycleFailed { .. })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ledger_outage_is_reported_then_recovered() {
        let n = node(fast_config(), 1);
        let mut events = n.engine.subscribe();
        let ledger = n.ledger.clone();

        n.pool.submit(b"before".to_vec());
        n.engine.start().await.unwrap();
        assert!(wait_until(Duration::from_secs(2), || ledger.sub_blocks().len() == 1).await);

        ledger.set_unavailable(true);
        n.pool.submit(b"during".to_vec());
        let failure = next_event(&mut events, Duration::from_secs(2), is_failure).await;
        match failure {
            Some(EngineEvent::CycleFailed {
                error, recoverable, ..
            }) => {
                assert!(recoverable, "outage should be recoverable: {error}");
            }
            other => panic!("no failure reported: {other:?}"),
        }

        let status = n.engine.info().await;
        assert!(status.running);
        assert!(status.last_error.is_some());
        assert!(status.metrics.cycles_failed >= 1);
        assert_eq!(status.last_sub_block_height, 1);

        ledger.set_unavailable(false);
        assert!(
            wait_until(Duration::from_secs(3), || {
                ledger
                    .sub_blocks()
                    .iter()
                    .any(|s| s.transactions.contains(&b"during".to_vec()))
            })
            .await
        );
        n.engine.stop().await.unwrap();
        assert!(n.pool.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_ledger_times_out_and_keeps_transactions() {
        let config = EngineConfig {
            collaborator_timeout_ms: 50,
            ..fast_config()
        };
        let inner = Arc::new(InMemoryLedger::new());
        let hanging = Arc::new(HangingLedger::new(inner.clone()));
        let n = node_with_ledger(config, 1, hanging.clone(), inner.clone());
        let mut events = n.engine.subscribe();

        n.pool.submit(b"slow".to_vec());
        n.engine.start().await.unwrap();

        let failure = next_event(&mut events, Duration::from_secs(2), is_failure).await;
        match failure {
            Some(EngineEvent::CycleFailed {
                loop_kind,
                error,
                recoverable,
            }) => {
                assert_eq!(loop_kind, LoopKind::SubBlock);
                assert!(error.contains("did not respond within 50ms"), "{error}");
                assert!(recoverable);
            }
            other => panic!("no timeout reported: {other:?}"),
        }
        assert!(inner.sub_blocks().is_empty());

        hanging.hang.store(false, Ordering::SeqCst);
        assert!(wait_until(Duration::from_secs(2), || inner.sub_blocks().len() == 1).await);
        n.engine.stop().await.unwrap();

        assert_eq!(inner.sub_blocks()[0].transactions, vec![b"slow".to_vec()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_is_bounded_by_a_stuck_commit() {
        let config = EngineConfig {
            collaborator_timeout_ms: 30_000,
            stop_timeout_ms: 100,
            ..fast_config()
        };
        let inner = Arc::new(InMemoryLedger::new());
        let hanging = Arc::new(HangingLedger::new(inner.clone()));
        let n = node_with_ledger(config, 1, hanging, inner.clone());

        n.pool.submit(b"stuck".to_vec());
        n.engine.start().await.unwrap();
        // First tick lands in the hanging append
        tokio::time::sleep(Duration::from_millis(80)).await;

        let began = Instant::now();
        n.engine.stop().await.unwrap();
        assert!(began.elapsed() < Duration::from_secs(2));

        let status = n.engine.info().await;
        assert!(!status.running);
        assert_eq!(status.production_tasks, 0);
        assert!(inner.sub_blocks().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_stop_aborts_remaining_loops() {
        let config = EngineConfig {
            collaborator_timeout_ms: 30_000,
            stop_timeout_ms: 30_000,
            ..fast_config()
        };
        let inner = Arc::new(InMemoryLedger::new());
        let hanging = Arc::new(HangingLedger::new(inner.clone()));
        let n = node_with_ledger(config, 1, hanging, inner.clone());

        n.pool.submit(b"stuck".to_vec());
        n.engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        // The caller gives up while the sub-block loop is stuck in its append
        let joined = tokio::time::timeout(Duration::from_millis(50), n.engine.stop()).await;
        assert!(joined.is_err());

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut status = n.engine.info().await;
        while status.production_tasks > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
            status = n.engine.info().await;
        }
        assert_eq!(status.production_tasks, 0);
        assert!(!status.running);
        assert!(inner.sub_blocks().is_empty());

        // Nothing left to join
        n.engine.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unstaked_authority_fails_selection() {
        let n = node(fast_config(), 0);
        let mut events = n.engine.subscribe();
        n.pool.submit(b"orphan".to_vec());
        n.engine.start().await.unwrap();

        let failure = next_event(&mut events, Duration::from_secs(2), is_failure).await;
        n.engine.stop().await.unwrap();

        match failure {
            Some(EngineEvent::CycleFailed {
                error, recoverable, ..
            }) => {
                assert!(error.contains("no staked validators"), "{error}");
                assert!(!recoverable);
            }
            other => panic!("no failure reported: {other:?}"),
        }
        assert!(n.ledger.sub_blocks().is_empty());
    }
}
