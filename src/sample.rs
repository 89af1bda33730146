//! Single-pass sampling of k items from a stream of unknown length.
//!
//! Both samplers keep O(k) state for the duration of one run and emit
//! their selection once the input is exhausted.

use crate::channel::{Input, Output};
use crate::error::Result;
use crate::filter::Filter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha1::{Digest, Sha1};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Uniform reservoir sampling (Algorithm R).
///
/// Every run builds its own random source: from `seed` when one is given,
/// otherwise from OS entropy. No generator is shared between runs.
pub struct Sample {
    k: usize,
    seed: Option<u64>,
}

/// Pick `k` items uniformly at random. The selection differs between runs.
pub fn sample(k: usize) -> Sample {
    Sample { k, seed: None }
}

/// Pick `k` items uniformly at random, using a generator seeded with
/// `seed` so the selection is reproducible.
pub fn sample_with_seed(k: usize, seed: u64) -> Sample {
    Sample {
        k,
        seed: Some(seed),
    }
}

impl Sample {
    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

impl Filter for Sample {
    fn run(&self, input: &Input, output: &Output) -> Result<()> {
        if self.k == 0 {
            return Ok(());
        }

        let mut rng = self.rng();
        let mut reservoir: Vec<String> = Vec::new();
        for (i, s) in (1u64..).zip(input) {
            if reservoir.len() < self.k {
                reservoir.push(s);
            } else if rng.random::<f64>() < self.k as f64 / i as f64 {
                let slot = rng.random_range(0..self.k);
                reservoir[slot] = s;
            }
        }

        for s in reservoir {
            output.send(s)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "sample"
    }
}

/// An item ranked by the SHA-1 of its position and value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ScoredItem {
    score: [u8; 20],
    value: String,
}

impl ScoredItem {
    /// `index` is the 1-based position of `value` in the input.
    fn new(index: u64, value: String) -> Self {
        let digest = Sha1::digest(format!("{index} {value}").as_bytes());
        let mut score = [0u8; 20];
        score.copy_from_slice(&digest);
        Self { score, value }
    }
}

/// Deterministic hash-ranked sampling.
///
/// Keeps the `k` items whose `(position, value)` hashes are largest. The
/// same `k` and the same input sequence always select the same items, in
/// the same order (ascending hash).
pub struct HashSample {
    k: usize,
}

/// Pick `k` pseudo-random items deterministically.
pub fn hash_sample(k: usize) -> HashSample {
    HashSample { k }
}

impl Filter for HashSample {
    fn run(&self, input: &Input, output: &Output) -> Result<()> {
        // Min-heap of the k largest scores seen so far.
        let mut heap: BinaryHeap<Reverse<ScoredItem>> = BinaryHeap::new();
        for (i, s) in (1u64..).zip(input) {
            heap.push(Reverse(ScoredItem::new(i, s)));
            if heap.len() > self.k {
                heap.pop();
            }
        }

        while let Some(Reverse(item)) = heap.pop() {
            output.send(item.value)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "hash_sample"
    }
}
