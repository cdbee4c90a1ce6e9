use std::time::{Duration, Instant};

use log::{debug, info};

pub mod assemble;
pub mod boundary;
pub mod comm;
pub mod config;
pub mod error;
pub mod exchange;
pub mod router;
pub mod sampler;
pub mod util;

pub use assemble::{collect_segments, verify_segments};
pub use boundary::{BoundaryTable, Interval, Partitioning};
pub use comm::{Communicator, Key, LocalGroup, ThreadComm};
pub use config::Config;
pub use error::{CommError, Result, SortError};

use boundary::agree_partitioning;
use config::check_preconditions;
use exchange::{finish_segment, redistribute};
use router::route;
use sampler::sample_shard;
use util::generate_shard;

/// Wall-clock time spent in each phase of one worker's run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseTimings {
    pub local_sort: Duration,
    pub boundary: Duration,
    pub route: Duration,
    pub exchange: Duration,
    pub final_sort: Duration,
    pub collect: Duration,
}

impl PhaseTimings {
    pub fn total(&self) -> Duration {
        self.local_sort
            + self.boundary
            + self.route
            + self.exchange
            + self.final_sort
            + self.collect
    }
}

/// Result of the distributed sort on one worker.
#[derive(Debug, Clone)]
pub struct SortOutcome {
    /// This worker's sorted part of the data. Segments of lower ranks hold smaller or equal values.
    pub segment: Vec<Key>,
    /// Whether the boundaries collapsed and the data was split by position instead of by value.
    pub equal_count: bool,
    pub timings: PhaseTimings,
}

/// Sort a set of integers of which each worker holds one part. After the call every worker holds a
/// sorted segment, and the segments concatenated in rank order are the sorted input.
///
/// Every worker of the group must call this together.
///
/// # Parameters
/// - `comm` communicator of the group
/// - `shard` data local to this worker; consumed, its elements end up on whichever worker owns
///   their value range
pub fn p_bucket_sort(comm: &dyn Communicator, shard: Vec<Key>) -> Result<Vec<Key>> {
    Ok(p_bucket_sort_timed(comm, shard)?.segment)
}

/// [`p_bucket_sort`], also reporting phase timings and which partitioning was used.
pub fn p_bucket_sort_timed(comm: &dyn Communicator, mut shard: Vec<Key>) -> Result<SortOutcome> {
    let rank = comm.rank();
    let mut timings = PhaseTimings::default();

    // local sort and sampling
    let start = Instant::now();
    let quantiles = sample_shard(&mut shard, comm.size());
    timings.local_sort = start.elapsed();
    debug!("rank {} quantiles {:?}", rank, quantiles);

    // boundary agreement
    let start = Instant::now();
    let partitioning = agree_partitioning(comm, &shard, &quantiles)?;
    timings.boundary = start.elapsed();
    let equal_count = matches!(partitioning, Partitioning::EqualCount(_));

    let start = Instant::now();
    let routing = route(&shard, &partitioning);
    timings.route = start.elapsed();

    // count exchange and payload exchange
    let start = Instant::now();
    let received = redistribute(comm, shard, &routing)?;
    timings.exchange = start.elapsed();

    let start = Instant::now();
    let segment = finish_segment(received);
    timings.final_sort = start.elapsed();

    debug!("rank {} holds {} keys", rank, segment.len());
    Ok(SortOutcome {
        segment,
        equal_count,
        timings,
    })
}

/// What one worker reports after [`run_worker`].
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub rank: usize,
    pub segment: Vec<Key>,
    /// The whole sorted sequence, on the collector only.
    pub collected: Option<Vec<Key>>,
    pub equal_count: bool,
    pub timings: PhaseTimings,
}

/// One worker's full run: check preconditions, generate its shard from the seed, sort, and then
/// optionally verify and collect the result as configured.
///
/// A precondition failure is reported before any collective is issued, identically on every worker.
pub fn run_worker(comm: &dyn Communicator, config: &Config) -> Result<WorkerReport> {
    let size = comm.size();
    let rank = comm.rank();
    config.validate(size)?;

    let shard = generate_shard(config.seed, rank, config.shard_len(size), config.value_range());
    let outcome = p_bucket_sort_timed(comm, shard)?;
    let mut timings = outcome.timings;

    if config.verify {
        verify_segments(comm, &outcome.segment, config.count)?;
    }

    let collected = if config.no_print {
        None
    } else {
        let start = Instant::now();
        let collected = collect_segments(comm, &outcome.segment, config.collector)?;
        timings.collect = start.elapsed();
        collected
    };

    if rank == config.collector {
        info!(
            "rank {} sorted {} of {} keys in {} ms (sort {} ms, boundaries {} ms, exchange {} ms)",
            rank,
            outcome.segment.len(),
            config.count,
            timings.total().as_millis(),
            timings.local_sort.as_millis(),
            timings.boundary.as_millis(),
            timings.exchange.as_millis(),
        );
    }

    Ok(WorkerReport {
        rank,
        segment: outcome.segment,
        collected,
        equal_count: outcome.equal_count,
        timings,
    })
}

/// Sort `shards.len()` shards on an in-process group, one thread per shard, and return the segments
/// in rank order.
pub fn local_bucket_sort(shards: Vec<Vec<Key>>) -> Result<Vec<Vec<Key>>> {
    check_preconditions(shards.iter().map(|s| s.len() as u64).sum(), shards.len())?;
    let group = LocalGroup::new(shards.len())?;
    group
        .run_with(shards, |comm, shard| p_bucket_sort(&comm, shard))?
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_sort() {
        // a sanity check with a single participant, the exchange is skipped entirely
        let data = vec![6, 30, 574, 16, 2342, 53, 5, 4935, 3, 4];
        let result = local_bucket_sort(vec![data]).unwrap();
        let expected = vec![3, 4, 5, 6, 16, 30, 53, 574, 2342, 4935];

        assert_eq!(1, result.len());
        assert_eq!(expected, result[0]);
    }

    #[test]
    fn test_twelve_elements_on_three_workers() {
        let shards = vec![vec![5, 3, 8, 1], vec![9, 2, 7, 4], vec![6, 0, 11, 10]];
        let segments = local_bucket_sort(shards).unwrap();
        let flat: Vec<Key> = segments.concat();
        assert_eq!((0..12).collect::<Vec<Key>>(), flat);
    }

    #[test]
    fn test_uneven_shards_are_rejected() {
        let shards = vec![vec![1, 2], vec![3, 4], vec![5, 6, 7, 8]];
        assert!(matches!(
            local_bucket_sort(shards),
            Err(SortError::Configuration(_))
        ));
    }

    #[test]
    fn test_run_worker_collects_on_collector() {
        let config = Config {
            collector: 1,
            verify: true,
            ..Config::new(40, 4, 3)
        };
        let group = LocalGroup::new(4).unwrap();
        let reports = group
            .run(|comm| run_worker(&comm, &config).unwrap())
            .unwrap();

        for report in &reports {
            assert_eq!(report.rank == 1, report.collected.is_some());
        }
        let collected = reports[1].collected.clone().unwrap();
        assert_eq!(40, collected.len());
        assert!(collected.windows(2).all(|w| w[0] <= w[1]));
        let segments: Vec<Key> = reports.iter().flat_map(|r| r.segment.clone()).collect();
        assert_eq!(collected, segments);
    }

    #[test]
    fn test_run_worker_rejects_bad_group_before_sorting() {
        let config = Config::new(10, 3, 0);
        let group = LocalGroup::new(3).unwrap();
        let results = group.run(|comm| run_worker(&comm, &config).err()).unwrap();
        for err in results {
            assert!(matches!(err, Some(SortError::Configuration(_))));
        }
    }
}
