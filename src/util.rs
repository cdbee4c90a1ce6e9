use std::ops::Range;

use num::Integer;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::comm::Key;

/// Generate the unsorted shard of one worker. The same `seed`, `rank` and `len` always produce the
/// same data, and different ranks draw from different streams.
///
/// # Parameters
/// - `seed` seed of the whole run
/// - `rank` rank of the worker owning the shard
/// - `len` number of elements to generate
/// - `range` half-open value range, must not be empty
pub fn generate_shard(seed: u64, rank: usize, len: usize, range: Range<Key>) -> Vec<Key> {
    let mut rng = StdRng::seed_from_u64(seed ^ (rank as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
    let uniform = Uniform::from(range);

    let mut data = Vec::with_capacity(len);
    for _ in 0..len {
        data.push(rng.sample(uniform));
    }
    data
}

/// Exclusive prefix sums of `counts`, followed by the total. Entry `r` is the offset of rank `r`'s
/// run in a buffer grouped by rank, entry `counts.len()` is the length of that buffer.
pub fn displacements(counts: &[u64]) -> Vec<u64> {
    let mut displs: Vec<u64> = counts
        .iter()
        .scan(0, |acc, i| {
            let tmp = *acc;
            *acc += *i;
            Some(tmp)
        })
        .collect();
    displs.push(counts.iter().sum());
    displs
}

/// Split `total` items into `parts` runs whose lengths differ by at most one, handing the remainder
/// to the first runs.
pub fn split_evenly(total: u64, parts: usize) -> Vec<u64> {
    let (base, remainder) = total.div_rem(&(parts as u64));
    let mut counts = vec![base; parts];
    counts[0..remainder as usize]
        .iter_mut()
        .for_each(|x| *x += 1);
    counts
}
