use log::debug;

use crate::comm::{Communicator, Key};
use crate::error::{CommError, Result, SortError};
use crate::util::displacements;

fn segment_sizes(comm: &dyn Communicator, segment: &[Key]) -> Result<Vec<u64>> {
    let mut sizes = vec![0u64; comm.size()];
    comm.all_gather_counts_into(&[segment.len() as u64], &mut sizes)?;
    Ok(sizes)
}

/// Gather every segment, in rank order, onto `collector`. Returns the whole sorted sequence on the
/// collector and `None` everywhere else.
pub fn collect_segments(
    comm: &dyn Communicator,
    segment: &[Key],
    collector: usize,
) -> Result<Option<Vec<Key>>> {
    if collector >= comm.size() {
        return Err(CommError::InvalidRoot {
            root: collector,
            size: comm.size(),
        }
        .into());
    }

    let sizes = segment_sizes(comm, segment)?;
    let total = displacements(&sizes)[comm.size()] as usize;

    if comm.rank() == collector {
        let mut sequence = vec![0 as Key; total];
        comm.gather_varcount_into(collector, segment, &mut sequence, &sizes)?;
        debug!("rank {} collected {} keys", collector, total);
        Ok(Some(sequence))
    } else {
        comm.gather_varcount_into(collector, segment, &mut [], &sizes)?;
        Ok(None)
    }
}

/// Check, on every worker, that the segments form one sorted sequence of `expected_total` elements:
/// each segment is sorted, the last element of every non-empty segment is not greater than the
/// first element of the next non-empty one, and no element was lost or duplicated.
pub fn verify_segments(
    comm: &dyn Communicator,
    segment: &[Key],
    expected_total: u64,
) -> Result<()> {
    let size = comm.size();
    let sorted = segment.windows(2).all(|w| w[0] <= w[1]);

    let mut summaries = vec![0u64; 2 * size];
    comm.all_gather_counts_into(&[segment.len() as u64, sorted as u64], &mut summaries)?;
    let lens: Vec<u64> = summaries.chunks(2).map(|s| s[0]).collect();

    let ends: Vec<Key> = match (segment.first(), segment.last()) {
        (Some(&first), Some(&last)) => vec![first, last],
        _ => Vec::new(),
    };
    let end_counts: Vec<u64> = lens.iter().map(|&l| if l > 0 { 2 } else { 0 }).collect();
    let mut all_ends = vec![0 as Key; end_counts.iter().sum::<u64>() as usize];
    comm.all_gather_varcount_into(&ends, &mut all_ends, &end_counts)?;

    if let Some(rank) = summaries.chunks(2).position(|s| s[1] == 0) {
        return Err(SortError::Verification(format!(
            "segment of rank {} is not sorted",
            rank
        )));
    }

    let total: u64 = lens.iter().sum();
    if total != expected_total {
        return Err(SortError::Verification(format!(
            "expected {} elements in total, segments hold {}",
            expected_total, total
        )));
    }

    // all_ends only holds non-empty segments, as (first, last) pairs in rank order
    for pair in all_ends.chunks(2).collect::<Vec<_>>().windows(2) {
        if pair[0][1] > pair[1][0] {
            return Err(SortError::Verification(format!(
                "segment ending in {} is followed by a segment starting at {}",
                pair[0][1], pair[1][0]
            )));
        }
    }
    Ok(())
}
