use num::Integer;

use crate::comm::Key;

/// Sort `shard` in place and return its `parts + 1` quantile breakpoints at fractions
/// `0, 1/parts, ..., 1`.
pub fn sample_shard(shard: &mut [Key], parts: usize) -> Vec<f64> {
    shard.sort_unstable();
    quantiles(shard, parts)
}

/// Quantiles of a sorted slice with linear interpolation between neighbouring elements.
///
/// For fraction `k / parts` the fractional index is `k * (len - 1) / parts`. Its integer part and
/// remainder are computed exactly in integers; only the final interpolation is done in floating
/// point. An empty slice yields `parts + 1` zeros.
pub fn quantiles(sorted: &[Key], parts: usize) -> Vec<f64> {
    debug_assert!(sorted.windows(2).all(|w| w[0] <= w[1]), "shard is not sorted");

    if sorted.is_empty() {
        return vec![0.0; parts + 1];
    }
    if parts == 0 {
        return vec![sorted[0] as f64];
    }

    let last = sorted.len() - 1;
    (0..=parts)
        .map(|k| {
            let (lo, rem) = (k * last).div_rem(&parts);
            let below = sorted[lo] as f64;
            if rem == 0 {
                below
            } else {
                let above = sorted[lo + 1] as f64;
                below + (above - below) * (rem as f64 / parts as f64)
            }
        })
        .collect()
}
