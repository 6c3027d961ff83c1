//! Independent chains on separate threads.
//!
//! Graph nodes are `Rc`-based and never cross threads: every chain builds its
//! own model inside its thread from a shared factory. Only snapshots and
//! summaries travel back, through a bounded channel and the join handles.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::bounded;

use super::chain::{ChainSummary, Mcmc};
use super::moves::Move;
use crate::config::McmcConfig;
use crate::error::{PhyloError, PhyloResult};
use crate::model::Model;
use crate::snapshot::MonitorSnapshot;

/// Builds the model and moves of chain `index`.
pub trait ChainFactory: Fn(usize) -> PhyloResult<(Model, Vec<Box<dyn Move>>)> + Send + Sync + 'static {}

impl<F> ChainFactory for F where F: Fn(usize) -> PhyloResult<(Model, Vec<Box<dyn Move>>)> + Send + Sync + 'static {}

/// Runs `config.chains` chains concurrently and hands every snapshot to
/// `on_sample` on the calling thread as it arrives.
///
/// Chain `i` is seeded with `config.chain_seed(i)`. Summaries are returned in
/// chain order.
///
/// # Errors
///
/// Returns the first chain error in chain order, `ModelError::InvalidConfig`
/// for an invalid config, or `PhyloError::Internal` if a thread cannot be
/// spawned or panics.
pub fn run_independent_chains<F>(
    config: &McmcConfig,
    factory: F,
    mut on_sample: impl FnMut(MonitorSnapshot),
) -> PhyloResult<Vec<ChainSummary>>
where
    F: ChainFactory,
{
    config.validate()?;
    let factory = Arc::new(factory);
    let (tx, rx) = bounded::<MonitorSnapshot>(config.channel_capacity);

    let mut handles: Vec<JoinHandle<PhyloResult<ChainSummary>>> = Vec::with_capacity(config.chains);
    for index in 0..config.chains {
        let factory = Arc::clone(&factory);
        let tx = tx.clone();
        let chain_config = McmcConfig {
            seed: config.chain_seed(index),
            chains: 1,
            ..*config
        };
        let handle = thread::Builder::new()
            .name(format!("phylodag-chain-{index}"))
            .spawn(move || {
                let (model, moves) = (*factory)(index)?;
                let mut chain = Mcmc::new(model, moves, chain_config)?.with_chain_index(index);
                chain.run(|snapshot| {
                    // The receiver only goes away once every chain is done.
                    let _ = tx.send(snapshot);
                })
            })
            .map_err(|e| PhyloError::internal(format!("failed to spawn chain {index}: {e}")))?;
        handles.push(handle);
    }
    drop(tx);

    for snapshot in rx {
        on_sample(snapshot);
    }

    let mut summaries = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        let summary = handle
            .join()
            .map_err(|_| PhyloError::internal(format!("chain {index} panicked")))??;
        summaries.push(summary);
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{erase, ConstantNode, StochasticNode, TypedDagNode};
    use crate::distributions::Normal;
    use crate::error::ModelError;
    use crate::mcmc::SlideMove;

    fn factory(index: usize) -> PhyloResult<(Model, Vec<Box<dyn Move>>)> {
        #[allow(clippy::cast_precision_loss)]
        let start = index as f64;
        let x = StochasticNode::<f64>::with_value(
            "x",
            Box::new(Normal::new(ConstantNode::new("mean", 0.0), ConstantNode::new("sd", 1.0))),
            start,
        );
        let handle: TypedDagNode<f64> = x.clone();
        let model = Model::new(&[erase(&handle)])?;
        let moves: Vec<Box<dyn Move>> = vec![Box::new(SlideMove::new(x, 1.0)?)];
        Ok((model, moves))
    }

    #[test]
    fn every_chain_reports_its_samples() {
        let config = McmcConfig {
            generations: 200,
            sample_every: 50,
            seed: Some(1),
            chains: 3,
            channel_capacity: 2,
        };
        let mut per_chain = [0usize; 3];
        let summaries = run_independent_chains(&config, factory, |snapshot| {
            if let Some(chain) = snapshot.chain {
                per_chain[chain] += 1;
            }
        })
        .unwrap();
        assert_eq!(summaries.len(), 3);
        assert_eq!(per_chain, [5, 5, 5]);
        for (index, summary) in summaries.iter().enumerate() {
            assert_eq!(summary.chain, Some(index));
            assert_eq!(summary.generations, 200);
        }
    }

    #[test]
    fn chain_errors_are_returned() {
        let config = McmcConfig {
            generations: 10,
            chains: 2,
            ..McmcConfig::default()
        };
        let failing = |index: usize| -> PhyloResult<(Model, Vec<Box<dyn Move>>)> {
            if index == 1 {
                Err(ModelError::InvalidConfig {
                    reason: "no model".to_string(),
                }
                .into())
            } else {
                factory(index)
            }
        };
        let err = run_independent_chains(&config, failing, |_| {}).unwrap_err();
        assert!(err.is_input());
    }
}
