use crate::boundary::{BoundaryTable, EqualCountSplit, Partitioning};
use crate::comm::Key;
use crate::util::displacements;

/// Per-destination run lengths of a sorted shard, and where each run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routing {
    send_counts: Vec<u64>,
    displs: Vec<u64>,
}

impl Routing {
    fn from_counts(send_counts: Vec<u64>) -> Self {
        let displs = displacements(&send_counts);
        Routing {
            send_counts,
            displs,
        }
    }

    /// Number of elements bound for each rank.
    pub fn send_counts(&self) -> &[u64] {
        &self.send_counts
    }

    /// Elements routed anywhere. Equals the shard length.
    pub fn total(&self) -> u64 {
        self.displs[self.send_counts.len()]
    }

    /// The run of `sorted` bound for rank `dest`.
    pub fn run<'a>(&self, sorted: &'a [Key], dest: usize) -> &'a [Key] {
        &sorted[self.displs[dest] as usize..self.displs[dest + 1] as usize]
    }
}

/// Assign every element of the sorted shard to its destination rank.
pub fn route(sorted: &[Key], partitioning: &Partitioning) -> Routing {
    let counts = match partitioning {
        Partitioning::ByValue(table) => counts_by_value(sorted, table),
        Partitioning::EqualCount(split) => counts_by_position(split),
    };
    debug_assert_eq!(counts.iter().sum::<u64>(), sorted.len() as u64);
    Routing::from_counts(counts)
}

fn counts_by_value(sorted: &[Key], table: &BoundaryTable) -> Vec<u64> {
    let parts = table.parts();
    let mut counts = vec![0u64; parts];
    let Some(&first) = sorted.first() else {
        return counts;
    };

    let mut dest = table.destination(first);
    for &key in sorted {
        let x = key as f64;
        while dest < parts - 1 && table.upper(dest) <= x {
            dest += 1;
        }
        counts[dest] += 1;
    }
    counts
}

fn counts_by_position(split: &EqualCountSplit) -> Vec<u64> {
    let parts = split.parts();
    let ends = split.run_ends();
    let mut counts = vec![0u64; parts];
    let Some(&first) = split.positions().first() else {
        return counts;
    };

    let mut dest = split.destination(first);
    for &position in split.positions() {
        while dest < parts - 1 && ends[dest] <= position {
            dest += 1;
        }
        counts[dest] += 1;
    }
    counts
}
