/// Funding input selection.
///
/// Selection is greedy: inputs are taken in the order the strategy picks
/// until the running total strictly exceeds the amount required for the
/// number of inputs taken so far. Strategies only decide that order.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Amount, FundingInput};
use crate::error::{AnchorError, Result};

pub trait SelectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Arrange `pool` in the order inputs should be taken.
    fn order(&self, pool: &mut [FundingInput]);
}

/// Smallest value first; ties broken by outpoint. Deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallestFirst;

impl SelectionStrategy for SmallestFirst {
    fn name(&self) -> &'static str {
        "smallest-first"
    }

    fn order(&self, pool: &mut [FundingInput]) {
        pool.sort_by(|a, b| {
            a.value
                .cmp(&b.value)
                .then_with(|| a.txid.cmp(&b.txid))
                .then_with(|| a.vout.cmp(&b.vout))
        });
    }
}

/// Random order, which makes it harder to link issuing transactions
/// through their inputs. A seed makes the order reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct Shuffled {
    seed: Option<u64>,
}

impl Shuffled {
    pub fn new() -> Self {
        Self { seed: None }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }
}

impl SelectionStrategy for Shuffled {
    fn name(&self) -> &'static str {
        "shuffled"
    }

    fn order(&self, pool: &mut [FundingInput]) {
        match self.seed {
            Some(seed) => pool.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => pool.shuffle(&mut rand::thread_rng()),
        }
    }
}

/// Strategy names accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    #[default]
    SmallestFirst,
    Shuffled,
}

impl SelectionKind {
    pub fn strategy(self) -> Box<dyn SelectionStrategy> {
        match self {
            SelectionKind::SmallestFirst => Box::new(SmallestFirst),
            SelectionKind::Shuffled => Box::new(Shuffled::new()),
        }
    }
}

/// Pick inputs from `pool` until their total exceeds `required(n)`, where
/// `n` is the number of inputs picked so far.
pub fn select_inputs(
    strategy: &dyn SelectionStrategy,
    mut pool: Vec<FundingInput>,
    address: &str,
    required: impl Fn(usize) -> Amount,
) -> Result<Vec<FundingInput>> {
    let available: Amount = pool.iter().map(|i| Amount::from(i.value)).sum();
    strategy.order(&mut pool);

    let mut selected = Vec::new();
    let mut total: Amount = 0;
    for input in pool {
        total += Amount::from(input.value);
        selected.push(input);
        if total > required(selected.len()) {
            debug!(
                strategy = strategy.name(),
                inputs = selected.len(),
                total,
                "Selected funding inputs"
            );
            return Ok(selected);
        }
    }

    Err(AnchorError::InsufficientFunds {
        address: address.to_string(),
        required: required(selected.len().max(1)),
        available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::funding_input;

    #[test]
    fn test_smallest_first_is_deterministic() {
        let pool = vec![funding_input(1, 500), funding_input(2, 100), funding_input(3, 300)];
        let picked = select_inputs(&SmallestFirst, pool, "addr", |_| 350).unwrap();
        let values: Vec<u64> = picked.iter().map(|i| i.value).collect();
        assert_eq!(values, vec![100, 300]);
    }

    #[test]
    fn test_total_must_strictly_exceed_requirement() {
        let pool = vec![funding_input(1, 100), funding_input(2, 100)];
        let picked = select_inputs(&SmallestFirst, pool, "addr", |_| 100).unwrap();
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_requirement_grows_with_inputs() {
        // Each extra input costs 60; 3 inputs of 100 only cover 2 of them.
        let pool = vec![funding_input(1, 100), funding_input(2, 100), funding_input(3, 100)];
        let picked = select_inputs(&SmallestFirst, pool, "addr", |n| 60 * n as Amount + 100).unwrap();
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_insufficient_pool() {
        let pool = vec![funding_input(1, 10), funding_input(2, 20)];
        let err = select_inputs(&SmallestFirst, pool, "addr", |_| 1_000).unwrap_err();
        match err {
            AnchorError::InsufficientFunds { available, required, address } => {
                assert_eq!(available, 30);
                assert_eq!(required, 1_000);
                assert_eq!(address, "addr");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_pool() {
        let err = select_inputs(&SmallestFirst, vec![], "addr", |_| 1).unwrap_err();
        assert!(matches!(err, AnchorError::InsufficientFunds { available: 0, .. }));
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let pool: Vec<FundingInput> = (1..=8).map(|i| funding_input(i, 100 * i as u64)).collect();
        let mut a = pool.clone();
        let mut b = pool.clone();
        Shuffled::with_seed(7).order(&mut a);
        Shuffled::with_seed(7).order(&mut b);
        assert_eq!(a, b);

        let mut sorted = a.clone();
        SmallestFirst.order(&mut sorted);
        assert_eq!(sorted, pool);
    }
}
