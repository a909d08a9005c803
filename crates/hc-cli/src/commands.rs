//! Command handlers behind the `hc` subcommands

use anyhow::{Context, Result};
use hc_consensus::adapters::{InMemoryLedger, InMemoryTxPool, StaticAuthority};
use hc_consensus::{Address, ConsensusEngine, EngineConfig, EngineEvent, WeightConfig, Weights};
use rand::Rng;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Validators registered by the demo node
const DEMO_VALIDATORS: u8 = 4;
const DEMO_STAKE: u64 = 25_000;

/// Load the engine configuration from `path`, or from `HC_*` variables
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<EngineConfig>(&raw)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => EngineConfig::from_env(),
    };
    config.validate().context("invalid engine configuration")?;
    Ok(config)
}

/// Write `cfg` under the `weights` key of the JSON file at `path`, keeping
/// every other key untouched. A missing file is created.
pub fn persist_weight_config(path: &Path, cfg: &WeightConfig) -> Result<()> {
    let mut doc = if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str::<serde_json::Value>(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?
    } else {
        serde_json::json!({})
    };

    let obj = doc
        .as_object_mut()
        .with_context(|| format!("config {} is not a JSON object", path.display()))?;
    obj.insert("weights".to_string(), serde_json::to_value(cfg)?);

    let rendered = serde_json::to_string_pretty(&doc)?;
    fs::write(path, rendered + "\n")
        .with_context(|| format!("failed to write config {}", path.display()))?;
    Ok(())
}

pub fn format_weights(w: &Weights) -> String {
    format!(
        "PoW: {:.2}%, PoS: {:.2}%, PoH: {:.2}%",
        w.pow * 100.0,
        w.pos * 100.0,
        w.poh * 100.0
    )
}

pub fn format_threshold(threshold: f64) -> String {
    format!("threshold: {threshold:.4}")
}

/// Engine wired to in-memory collaborators
pub fn demo_engine(config: EngineConfig) -> Result<(ConsensusEngine, Arc<InMemoryTxPool>)> {
    let pool = Arc::new(InMemoryTxPool::new());
    let validators: Vec<(Address, u64)> = (1..=DEMO_VALIDATORS)
        .map(|i| ([i; 20], DEMO_STAKE))
        .collect();

    let engine = ConsensusEngine::new(config)
        .context("failed to create consensus engine")?
        .with_ledger(Arc::new(InMemoryLedger::new()))
        .with_pool(pool.clone())
        .with_authority(Arc::new(StaticAuthority::new(validators)));
    Ok((engine, pool))
}

/// Run the demo node until ctrl-c or `run_for` elapses
pub async fn run_node(config: EngineConfig, run_for: Option<Duration>) -> Result<()> {
    let tick = config.sub_block_interval();
    let burst = config.max_tx_per_sub_block.max(1);
    let (engine, pool) = demo_engine(config)?;
    let mut events = engine.subscribe();

    engine.start().await.context("failed to start consensus")?;
    println!("consensus started");

    let feeder = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick);
        loop {
            ticker.tick().await;
            let count = rand::thread_rng().gen_range(0..=burst);
            for _ in 0..count {
                let tx: [u8; 32] = rand::thread_rng().gen();
                pool.submit(tx.to_vec());
            }
        }
    });

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::BlockFinalized {
                    height,
                    mechanism,
                    sub_blocks,
                }) => {
                    println!("block {height} sealed by {mechanism} ({sub_blocks} sub-blocks)");
                }
                Ok(EngineEvent::CycleFailed {
                    loop_kind, error, ..
                }) => {
                    eprintln!("cycle failed ({loop_kind:?}): {error}");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "[hc] event printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    match run_for {
        Some(limit) => {
            tokio::select! {
                _ = tokio::time::sleep(limit) => info!("[hc] run time elapsed"),
                res = tokio::signal::ctrl_c() => {
                    res.context("failed to listen for ctrl-c")?;
                    info!("[hc] ctrl-c received");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            info!("[hc] ctrl-c received");
        }
    }

    feeder.abort();
    engine.stop().await.context("failed to stop consensus")?;
    printer.abort();

    let status = engine.info().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    println!("consensus stopped");
    Ok(())
}

/// Each `hc` process owns its engine, so a separate `stop` has nothing to
/// cancel; a running `start` is stopped with Ctrl-C
pub fn stop() -> &'static str {
    "consensus not running"
}

pub async fn info(config: EngineConfig) -> Result<String> {
    let (engine, _) = demo_engine(config)?;
    let status = engine.info().await;
    Ok(serde_json::to_string_pretty(&status)?)
}
