use mpi::datatype::{Partition, PartitionMut};
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as MpiCommunicator, CommunicatorCollectives, Root};
use mpi::{Count, Rank};

use super::{check_len, Communicator, Key};
use crate::error::CommError;
use crate::util::displacements;

/// Group backed by an MPI communicator. MPI reports collective failures by aborting the job, so the
/// only errors returned here are local ones: bad buffer sizes and counts that overflow MPI's `int`.
pub struct MpiComm {
    world: SimpleCommunicator,
}

impl MpiComm {
    /// Wrap a communicator, usually `universe.world()` of an initialized MPI universe.
    pub fn new(world: SimpleCommunicator) -> Self {
        MpiComm { world }
    }
}

/// Convert counts and their displacements to MPI's count type.
fn mpi_counts(op: &'static str, counts: &[u64]) -> Result<(Vec<Count>, Vec<Count>), CommError> {
    let convert =
        |c: u64| Count::try_from(c).map_err(|_| CommError::CountOverflow { op, count: c });
    let displs = displacements(counts);
    let mpi_counts = counts.iter().map(|&c| convert(c)).collect::<Result<Vec<_>, _>>()?;
    let mpi_displs = displs[..counts.len()]
        .iter()
        .map(|&d| convert(d))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((mpi_counts, mpi_displs))
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn all_gather_into(&self, send: &[f64], recv: &mut [f64]) -> Result<(), CommError> {
        check_len("all_gather", recv, send.len() * self.size())?;
        self.world.all_gather_into(send, recv);
        Ok(())
    }

    fn all_gather_counts_into(&self, send: &[u64], recv: &mut [u64]) -> Result<(), CommError> {
        check_len("all_gather_counts", recv, send.len() * self.size())?;
        self.world.all_gather_into(send, recv);
        Ok(())
    }

    fn all_to_all_into(&self, send: &[u64], recv: &mut [u64]) -> Result<(), CommError> {
        check_len("all_to_all", recv, send.len())?;
        self.world.all_to_all_into(send, recv);
        Ok(())
    }

    fn all_to_all_varcount_into(
        &self,
        send: &[Key],
        send_counts: &[u64],
        recv: &mut [Key],
        recv_counts: &[u64],
    ) -> Result<(), CommError> {
        const OP: &str = "all_to_all_varcount";
        check_len(OP, send_counts, self.size())?;
        check_len(OP, recv_counts, self.size())?;
        check_len(OP, send, send_counts.iter().sum::<u64>() as usize)?;
        check_len(OP, recv, recv_counts.iter().sum::<u64>() as usize)?;

        let (counts, displs) = mpi_counts(OP, send_counts)?;
        let (recv_counts, recv_displs) = mpi_counts(OP, recv_counts)?;
        let partition = Partition::new(send, &counts[..], &displs[..]);
        let mut recv_partition = PartitionMut::new(recv, &recv_counts[..], &recv_displs[..]);
        self.world.all_to_all_varcount_into(&partition, &mut recv_partition);
        Ok(())
    }

    fn all_gather_varcount_into(
        &self,
        send: &[Key],
        recv: &mut [Key],
        counts: &[u64],
    ) -> Result<(), CommError> {
        const OP: &str = "all_gather_varcount";
        check_len(OP, counts, self.size())?;
        check_len(OP, recv, counts.iter().sum::<u64>() as usize)?;

        let (counts, displs) = mpi_counts(OP, counts)?;
        let mut partition = PartitionMut::new(recv, &counts[..], &displs[..]);
        self.world.all_gather_varcount_into(send, &mut partition);
        Ok(())
    }

    fn gather_varcount_into(
        &self,
        root: usize,
        send: &[Key],
        recv: &mut [Key],
        counts: &[u64],
    ) -> Result<(), CommError> {
        const OP: &str = "gather_varcount";
        if root >= self.size() {
            return Err(CommError::InvalidRoot {
                root,
                size: self.size(),
            });
        }
        check_len(OP, counts, self.size())?;
        let root_process = self.world.process_at_rank(root as Rank);

        if self.rank() == root {
            check_len(OP, recv, counts.iter().sum::<u64>() as usize)?;
            let (counts, displs) = mpi_counts(OP, counts)?;
            let mut partition = PartitionMut::new(recv, &counts[..], &displs[..]);
            root_process.gather_varcount_into_root(send, &mut partition);
        } else {
            root_process.gather_varcount_into(send);
        }
        Ok(())
    }

    fn abort(&self, code: i32) -> ! {
        log::error!("rank {} aborting MPI job with code {}", self.rank(), code);
        self.world.abort(code)
    }
}
