use log::{debug, warn};

use crate::comm::{Communicator, Key};
use crate::error::{Result, SortError};
use crate::util::{displacements, split_evenly};

/// Value range owned by one rank. Half-open `[low, high)` unless `closed`, in which case
/// `[low, high]`. Only the last rank's interval is closed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub low: f64,
    pub high: f64,
    pub closed: bool,
}

impl Interval {
    pub fn contains(&self, x: f64) -> bool {
        if self.closed {
            self.low <= x && x <= self.high
        } else {
            self.low <= x && x < self.high
        }
    }

    pub fn is_empty(&self) -> bool {
        if self.closed {
            self.low > self.high
        } else {
            self.low >= self.high
        }
    }
}

/// One interval per rank, in rank order. Consecutive intervals share their boundary, so the table
/// has no gaps and covers everything from the smallest to the largest gathered breakpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryTable {
    intervals: Vec<Interval>,
}

impl BoundaryTable {
    /// Build the table for `parts` ranks from the `parts * (parts + 1)` gathered breakpoints.
    ///
    /// The breakpoints are sorted (with a total order, so equal input gives identical output no
    /// matter in which order it was gathered) and cut into `parts` groups of `parts + 1`. Rank `r`
    /// ends at the last breakpoint of group `r`; the first rank starts at the global minimum and the
    /// last rank ends at the global maximum.
    ///
    /// Fails with [`SortError::SkewedDistribution`] if any but the last interval comes out empty.
    pub fn from_quantiles(gathered: &[f64], parts: usize) -> Result<Self> {
        if parts == 0 {
            return Err(SortError::Configuration(
                "cannot partition for an empty group".to_string(),
            ));
        }
        if gathered.len() != parts * (parts + 1) {
            return Err(SortError::Configuration(format!(
                "expected {} breakpoints for {} ranks, got {}",
                parts * (parts + 1),
                parts,
                gathered.len()
            )));
        }

        let mut global = gathered.to_vec();
        global.sort_unstable_by(f64::total_cmp);

        let group = parts + 1;
        let mut intervals = Vec::with_capacity(parts);
        let mut low = global[0];
        for r in 0..parts {
            let last = r == parts - 1;
            let high = if last {
                global[global.len() - 1]
            } else {
                global[r * group + parts]
            };
            intervals.push(Interval {
                low,
                high,
                closed: last,
            });
            low = high;
        }

        let table = BoundaryTable { intervals };
        if let Some((rank, interval)) = table
            .intervals
            .iter()
            .enumerate()
            .find(|(_, interval)| interval.is_empty())
        {
            return Err(SortError::SkewedDistribution {
                rank,
                low: interval.low,
                high: interval.high,
            });
        }
        Ok(table)
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn parts(&self) -> usize {
        self.intervals.len()
    }

    /// Exclusive upper bound of rank `r`'s interval (inclusive for the last rank).
    pub fn upper(&self, r: usize) -> f64 {
        self.intervals[r].high
    }

    /// Rank whose interval holds `key`. Keys outside the table go to the nearest end.
    pub fn destination(&self, key: Key) -> usize {
        let x = key as f64;
        self.intervals[..self.parts() - 1].partition_point(|interval| interval.high <= x)
    }
}

/// Equal-count partitioning: the globally sorted data is cut into `size` runs of (nearly) equal
/// length and this worker knows the global position of each of its own elements. Ties are ordered
/// by value, then source rank, then local index.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualCountSplit {
    positions: Vec<u64>,
    run_ends: Vec<u64>,
}

impl EqualCountSplit {
    /// Global position of every local element, non-decreasing.
    pub fn positions(&self) -> &[u64] {
        &self.positions
    }

    /// Exclusive end position of each rank's run.
    pub fn run_ends(&self) -> &[u64] {
        &self.run_ends
    }

    pub fn parts(&self) -> usize {
        self.run_ends.len()
    }

    /// Rank whose run contains global position `position`.
    pub fn destination(&self, position: u64) -> usize {
        self.run_ends[..self.parts() - 1].partition_point(|&end| end <= position)
    }
}

/// How the group decided to distribute the data.
#[derive(Debug, Clone, PartialEq)]
pub enum Partitioning {
    ByValue(BoundaryTable),
    EqualCount(EqualCountSplit),
}

/// All-gather every worker's quantile vector. Block `r` of the result is rank `r`'s vector.
pub fn gather_quantiles(comm: &dyn Communicator, local: &[f64]) -> Result<Vec<f64>> {
    let mut gathered = vec![0f64; local.len() * comm.size()];
    comm.all_gather_into(local, &mut gathered)?;
    Ok(gathered)
}

/// Gather the quantiles of all workers and resolve the boundary table. Identical on every worker.
pub fn resolve_boundaries(comm: &dyn Communicator, local: &[f64]) -> Result<BoundaryTable> {
    let gathered = gather_quantiles(comm, local)?;
    BoundaryTable::from_quantiles(&gathered, comm.size())
}

/// Compute the equal-count split from an all-gathered copy of every sorted shard.
pub fn equal_count_split(comm: &dyn Communicator, sorted: &[Key]) -> Result<EqualCountSplit> {
    let size = comm.size();
    let rank = comm.rank();

    let mut lens = vec![0u64; size];
    comm.all_gather_counts_into(&[sorted.len() as u64], &mut lens)?;
    let displs = displacements(&lens);
    let total = displs[size];

    let mut all = vec![0 as Key; total as usize];
    comm.all_gather_varcount_into(sorted, &mut all, &lens)?;

    let shards: Vec<&[Key]> = (0..size)
        .map(|s| &all[displs[s] as usize..displs[s + 1] as usize])
        .collect();

    let positions = sorted
        .iter()
        .enumerate()
        .map(|(i, &key)| {
            let before: usize = shards
                .iter()
                .enumerate()
                .filter(|&(s, _)| s != rank)
                .map(|(s, shard)| {
                    if s < rank {
                        shard.partition_point(|&other| other <= key)
                    } else {
                        shard.partition_point(|&other| other < key)
                    }
                })
                .sum();
            (before + i) as u64
        })
        .collect();

    let run_ends = displacements(&split_evenly(total, size))[1..].to_vec();
    debug!("rank {} equal-count run ends {:?}", rank, run_ends);

    Ok(EqualCountSplit {
        positions,
        run_ends,
    })
}

/// The boundary agreement phase: resolve the value table, or fall back to the equal-count split if
/// the breakpoints collapsed. Every worker sees the same table, so every worker takes the same
/// branch and issues the same collectives.
pub fn agree_partitioning(
    comm: &dyn Communicator,
    sorted: &[Key],
    local_quantiles: &[f64],
) -> Result<Partitioning> {
    match resolve_boundaries(comm, local_quantiles) {
        Ok(table) => {
            debug!("rank {} boundaries {:?}", comm.rank(), table.intervals());
            Ok(Partitioning::ByValue(table))
        }
        Err(SortError::SkewedDistribution { rank, low, high }) => {
            if comm.rank() == 0 {
                warn!(
                    "interval of rank {} collapsed to [{}, {}), partitioning by position instead",
                    rank, low, high
                );
            }
            Ok(Partitioning::EqualCount(equal_count_split(comm, sorted)?))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalGroup;

    fn table(gathered: &[f64], parts: usize) -> BoundaryTable {
        BoundaryTable::from_quantiles(gathered, parts).unwrap()
    }

    #[test]
    fn test_single_part_spans_min_max() {
        let t = table(&[3.0, 9.0], 1);
        assert_eq!(
            &[Interval {
                low: 3.0,
                high: 9.0,
                closed: true
            }],
            t.intervals()
        );
        assert_eq!(0, t.destination(3));
        assert_eq!(0, t.destination(9));
    }

    #[test]
    fn test_intervals_tile_the_range() {
        assert!(matches!(
            BoundaryTable::from_quantiles(&[0.0, 1.0, 2.0], 3),
            Err(SortError::Configuration(_))
        ));

        let gathered = [0.0, 3.0, 4.0, 7.0, 8.0, 11.0, 1.0, 2.0, 5.0, 6.0, 9.0, 10.0];
        let t = table(&gathered, 3);
        let iv = t.intervals();
        assert_eq!(0.0, iv[0].low);
        assert_eq!(11.0, iv[2].high);
        for r in 1..3 {
            assert_eq!(iv[r - 1].high, iv[r].low);
        }
        assert!(!iv[0].closed && !iv[1].closed && iv[2].closed);
    }

    #[test]
    fn test_destination_respects_closure() {
        let gathered: Vec<f64> = (0..12).map(|x| x as f64).collect();
        let t = table(&gathered, 3);
        // groups [0..=3], [4..=7], [8..=11] -> [0, 3), [3, 7), [7, 11]
        assert_eq!(0, t.destination(0));
        assert_eq!(0, t.destination(2));
        assert_eq!(1, t.destination(3));
        assert_eq!(1, t.destination(6));
        assert_eq!(2, t.destination(7));
        assert_eq!(2, t.destination(11));
        for key in 0..12 {
            let r = t.destination(key);
            assert!(t.intervals()[r].contains(key as f64));
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let gathered = [0.5, 9.25, 3.0, 1.0, 7.5, 2.0, 4.75, 8.0, 6.0, 5.5, 0.25, 10.0];
        let mut reversed = gathered;
        reversed.reverse();

        let a = table(&gathered, 3);
        let b = table(&reversed, 3);
        for (x, y) in a.intervals().iter().zip(b.intervals()) {
            assert_eq!(x.low.to_bits(), y.low.to_bits());
            assert_eq!(x.high.to_bits(), y.high.to_bits());
        }
    }

    #[test]
    fn test_collapsed_breakpoints_are_reported() {
        let gathered = [4.0; 12];
        assert!(matches!(
            BoundaryTable::from_quantiles(&gathered, 3),
            Err(SortError::SkewedDistribution { rank: 0, .. })
        ));
    }

    #[test]
    fn test_equal_count_split_orders_ties_by_rank() {
        let group = LocalGroup::new(2).unwrap();
        let splits = group
            .run(|comm| {
                let shard: Vec<Key> = vec![5, 5, 5];
                equal_count_split(&comm, &shard).unwrap()
            })
            .unwrap();

        assert_eq!(&[0, 1, 2], splits[0].positions());
        assert_eq!(&[3, 4, 5], splits[1].positions());
        assert_eq!(&[3, 6], splits[0].run_ends());
        assert_eq!(splits[0].run_ends(), splits[1].run_ends());
        assert_eq!(0, splits[0].destination(2));
        assert_eq!(1, splits[0].destination(3));
    }

    #[test]
    fn test_equal_count_split_interleaves_values() {
        let group = LocalGroup::new(2).unwrap();
        let splits = group
            .run(|comm| {
                let shard: Vec<Key> = if comm.rank() == 0 {
                    vec![1, 2, 2, 9]
                } else {
                    vec![0, 2, 3, 3]
                };
                equal_count_split(&comm, &shard).unwrap()
            })
            .unwrap();

        // global order: 0(r1) 1(r0) 2(r0) 2(r0) 2(r1) 3(r1) 3(r1) 9(r0)
        assert_eq!(&[1, 2, 3, 7], splits[0].positions());
        assert_eq!(&[0, 4, 5, 6], splits[1].positions());
    }

    #[test]
    fn test_agreement_falls_back_on_duplicates() {
        let group = LocalGroup::new(3).unwrap();
        let parts = group
            .run(|comm| {
                let shard: Vec<Key> = vec![42; 4];
                let q = crate::sampler::quantiles(&shard, comm.size());
                agree_partitioning(&comm, &shard, &q).unwrap()
            })
            .unwrap();

        for p in &parts {
            assert!(matches!(p, Partitioning::EqualCount(_)));
        }
    }
}
