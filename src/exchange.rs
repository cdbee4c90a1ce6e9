use log::debug;

use crate::comm::{Communicator, Key};
use crate::error::Result;
use crate::router::Routing;
use crate::util::displacements;

/// Count exchange. Entry `s` of the result is the number of elements rank `s` will send here.
pub fn exchange_counts(comm: &dyn Communicator, send_counts: &[u64]) -> Result<Vec<u64>> {
    let mut recv_counts = vec![0u64; comm.size()];
    comm.all_to_all_into(send_counts, &mut recv_counts)?;
    Ok(recv_counts)
}

/// Payload exchange. The sorted shard already holds the runs back to back in destination order,
/// so it is sent as is. The result is grouped by source rank and not yet sorted.
pub fn exchange_payload(
    comm: &dyn Communicator,
    sorted: &[Key],
    routing: &Routing,
    recv_counts: &[u64],
) -> Result<Vec<Key>> {
    let recv_displs = displacements(recv_counts);
    let mut recv_buffer = vec![0 as Key; recv_displs[comm.size()] as usize];
    comm.all_to_all_varcount_into(sorted, routing.send_counts(), &mut recv_buffer, recv_counts)?;
    Ok(recv_buffer)
}

/// Both exchange phases. Takes the shard by value: once the runs are handed to the transport the
/// sender keeps nothing of them. A group of one has nobody to exchange with and keeps its shard.
pub fn redistribute(
    comm: &dyn Communicator,
    sorted: Vec<Key>,
    routing: &Routing,
) -> Result<Vec<Key>> {
    if comm.size() == 1 {
        return Ok(sorted);
    }

    let recv_counts = exchange_counts(comm, routing.send_counts())?;
    debug!(
        "rank {} sends {:?}, receives {:?}",
        comm.rank(),
        routing.send_counts(),
        recv_counts
    );
    exchange_payload(comm, &sorted, routing, &recv_counts)
}

/// Final local sort. The received elements all belong to this rank's interval, so the sorted buffer
/// is the segment.
pub fn finish_segment(mut received: Vec<Key>) -> Vec<Key> {
    received.sort_unstable();
    received
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{BoundaryTable, Partitioning};
    use crate::comm::LocalGroup;
    use crate::router::route;

    #[test]
    fn test_counts_are_conserved() {
        let group = LocalGroup::new(3).unwrap();
        let results = group
            .run(|comm| {
                let send: Vec<u64> = (0..3).map(|d| (comm.rank() * 3 + d) as u64).collect();
                (send.clone(), exchange_counts(&comm, &send).unwrap())
            })
            .unwrap();

        let sent: u64 = results.iter().flat_map(|(s, _)| s).sum();
        let received: u64 = results.iter().flat_map(|(_, r)| r).sum();
        assert_eq!(sent, received);
        for (rank, (_, recv)) in results.iter().enumerate() {
            for (src, &count) in recv.iter().enumerate() {
                assert_eq!(results[src].0[rank], count);
            }
        }
    }

    #[test]
    fn test_redistribute_then_sort() {
        let gathered: Vec<f64> = (0..6).map(|x| x as f64 * 2.0).collect();
        let table = BoundaryTable::from_quantiles(&gathered, 2).unwrap();
        let partitioning = Partitioning::ByValue(table);

        let group = LocalGroup::new(2).unwrap();
        let segments = group
            .run(|comm| {
                let shard: Vec<Key> = if comm.rank() == 0 {
                    vec![0, 3, 7, 10]
                } else {
                    vec![1, 4, 5, 9]
                };
                let routing = route(&shard, &partitioning);
                let received = redistribute(&comm, shard, &routing).unwrap();
                finish_segment(received)
            })
            .unwrap();

        // table: [0, 4), [4, 10]
        assert_eq!(vec![0, 1, 3], segments[0]);
        assert_eq!(vec![4, 5, 7, 9, 10], segments[1]);
    }

    #[test]
    fn test_single_worker_keeps_its_shard() {
        let group = LocalGroup::new(1).unwrap();
        let segments = group
            .run(|comm| {
                let shard: Vec<Key> = vec![1, 2, 3];
                let table = BoundaryTable::from_quantiles(&[1.0, 3.0], 1).unwrap();
                let routing = route(&shard, &Partitioning::ByValue(table));
                redistribute(&comm, shard, &routing).unwrap()
            })
            .unwrap();

        assert_eq!(vec![1, 2, 3], segments[0]);
    }
}
