//! # Production Flow
//!
//! Transactions → PoH sub-blocks → sealed blocks → ledger, with the engine
//! running its own loops:
//!
//! 1. **Low threshold**: blocks sealed by stake selection
//! 2. **High threshold**: blocks sealed by proof of work
//! 3. **Full pending queue**: boundary closes before the block interval
//! 4. **Demand past PoH dominance**: miners and proposers keep sequencing

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{fast_config, next_event, node, wait_until};
    use hc_consensus::domain::difficulty::initial_target;
    use hc_consensus::domain::hashing::{meets_target, pow_hash};
    use hc_consensus::domain::{poh, sub_blocks_root};
    use hc_consensus::{
        Announcement, BlockHeader, EngineConfig, EngineEvent, Mechanism, RewardConfig, Seal,
        WeightConfig,
    };
    use primitive_types::U256;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stake_sealed_blocks_link_and_verify() {
        let n = node(fast_config(), 1);
        let mut events = n.engine.subscribe();
        for i in 0..6u8 {
            n.pool.submit(vec![i; 8]);
        }
        n.engine.start().await.unwrap();

        let finalized = next_event(&mut events, Duration::from_secs(3), |e| {
            matches!(e, EngineEvent::BlockFinalized { .. })
        })
        .await;
        n.engine.stop().await.unwrap();

        match finalized {
            Some(EngineEvent::BlockFinalized {
                height, mechanism, ..
            }) => {
                assert_eq!(height, 1);
                assert_eq!(mechanism, Mechanism::ProofOfStake);
            }
            other => panic!("no block finalized: {other:?}"),
        }

        let blocks = n.ledger.blocks();
        let sub_blocks = n.ledger.sub_blocks();
        assert!(!blocks.is_empty());
        assert!(sub_blocks.iter().all(poh::verify));
        for pair in sub_blocks.windows(2) {
            assert_eq!(pair[1].header.prev_poh_hash, pair[0].header.poh_hash);
        }

        let mut prev = [0u8; 32];
        for block in &blocks {
            assert_eq!(block.header.prev_hash, prev);
            assert!(matches!(block.header.seal, Seal::Stake { .. }));
            assert_eq!(block.header.sub_blocks_root, sub_blocks_root(&block.sub_headers));
            prev = block.header.hash();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rewards_cover_the_block_subsidy() {
        let n = node(fast_config(), 1);
        n.pool.submit(b"paid".to_vec());
        n.engine.start().await.unwrap();

        let ledger = n.ledger.clone();
        assert!(wait_until(Duration::from_secs(3), || !ledger.blocks().is_empty()).await);
        n.engine.stop().await.unwrap();

        let block = &n.ledger.blocks()[0];
        let split = &block.rewards;
        let paid = split.proposer.1
            + split.validators.iter().fold(U256::zero(), |acc, (_, v)| acc + *v)
            + split.treasury.1;
        assert_eq!(split.total, RewardConfig::default().reward_at(1));
        assert_eq!(paid, split.total);
        assert_eq!(split.proposer.0, block.header.proposer);
        assert_eq!(split.validators.len(), 1);
        assert_eq!(split.validators[0].0, block.sub_headers[0].validator);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_work_sealed_block_under_stake_pressure() {
        // Stake pushes the threshold into the PoW band while a heavy gamma
        // keeps PoH dominant for sub-blocks.
        let config = EngineConfig {
            weights: WeightConfig::new(1.0, 1.0, 10.0, 100.0, 100.0),
            ..fast_config()
        };
        let n = node(config, 35);
        n.pool.submit(b"mined".to_vec());
        n.engine.start().await.unwrap();

        let ledger = n.ledger.clone();
        assert!(wait_until(Duration::from_secs(5), || !ledger.blocks().is_empty()).await);
        n.engine.stop().await.unwrap();

        let block = &n.ledger.blocks()[0];
        assert_eq!(block.header.mechanism, Mechanism::ProofOfWork);
        let Seal::Work {
            nonce,
            pow_hash: hash,
            target,
        } = &block.header.seal
        else {
            panic!("expected work seal, got {:?}", block.header.seal);
        };
        assert_eq!(*target, initial_target(252));

        let bytes = BlockHeader::sealing_bytes(
            block.header.height,
            block.header.timestamp_ms,
            &block.header.prev_hash,
            &block.header.proposer,
            &block.header.sub_blocks_root,
        );
        assert_eq!(pow_hash(&bytes, *nonce), *hash);
        assert!(meets_target(hash, *target));
        assert!(block.threshold >= 0.66);

        let status = n.engine.info().await;
        assert_eq!(status.mode, Some(Mechanism::ProofOfWork));
        assert!(status.metrics.blocks_pow >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_pending_queue_closes_boundary_early() {
        let config = EngineConfig {
            block_interval_ms: 60_000,
            max_sub_blocks_per_block: 2,
            max_tx_per_sub_block: 1,
            ..fast_config()
        };
        let n = node(config, 1);
        for i in 0..4u8 {
            n.pool.submit(vec![i]);
        }
        n.engine.start().await.unwrap();

        let ledger = n.ledger.clone();
        assert!(wait_until(Duration::from_secs(3), || !ledger.blocks().is_empty()).await);
        n.engine.stop().await.unwrap();

        let first = &n.ledger.blocks()[0];
        assert_eq!(first.sub_headers.len(), 2);
        assert_eq!(first.sub_headers[0].height, 1);
        assert_eq!(first.sub_headers[1].height, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_saturated_demand_still_drains_pool() {
        let config = EngineConfig {
            max_tx_per_sub_block: 50,
            ..fast_config()
        };
        let n = node(config, 1);
        // Four times the demand cap: PoW outweighs PoH on every early tick
        for i in 0..400u32 {
            n.pool.submit(i.to_le_bytes().to_vec());
        }
        n.engine.start().await.unwrap();

        let pool = n.pool.clone();
        let ledger = n.ledger.clone();
        assert!(
            wait_until(Duration::from_secs(5), || pool.is_empty()
                && ledger.sub_blocks().len() == 8
                && ledger.blocks().iter().map(|b| b.sub_headers.len()).sum::<usize>() == 8)
            .await
        );
        n.engine.stop().await.unwrap();

        let status = n.engine.info().await;
        assert_eq!(status.last_sub_block_height, 8);
        assert!(status.last_block_height >= 1);
        assert!(status.metrics.sub_blocks_handed_off >= 1);
        assert_eq!(status.metrics.transactions_included, 400);
        assert!(n.ledger.sub_blocks().iter().all(poh::verify));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_announcements_follow_commits() {
        let n = node(fast_config(), 1);
        n.pool.submit(b"gossip".to_vec());
        n.engine.start().await.unwrap();

        let broadcaster = n.broadcaster.clone();
        assert!(
            wait_until(Duration::from_secs(3), || broadcaster
                .announcements()
                .iter()
                .any(|a| matches!(a, Announcement::Block(_))))
            .await
        );
        n.engine.stop().await.unwrap();

        let sent = n.broadcaster.announcements();
        let sub_heights: Vec<u64> = sent
            .iter()
            .filter_map(|a| match a {
                Announcement::SubBlock(h) => Some(h.height),
                _ => None,
            })
            .collect();
        let committed: Vec<u64> = n.ledger.sub_blocks().iter().map(|s| s.header.height).collect();
        assert_eq!(sub_heights, committed);
        assert!(sent.iter().any(|a| matches!(a, Announcement::Block(h) if h.height == 1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_quiet_pool_produces_nothing() {
        let n = node(fast_config(), 1);
        n.engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        n.engine.stop().await.unwrap();

        assert!(n.ledger.sub_blocks().is_empty());
        assert!(n.ledger.blocks().is_empty());
        let status = n.engine.info().await;
        assert_eq!(status.last_sub_block_height, 0);
        assert_eq!(status.metrics.cycles_failed, 0);
    }
}
