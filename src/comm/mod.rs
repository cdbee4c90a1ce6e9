mod local;
#[cfg(feature = "mpi")]
mod mpi_comm;

pub use local::{LocalGroup, ThreadComm};
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

use crate::error::CommError;

/// Element type being sorted.
pub type Key = i64;

/// Rank, group size and the collectives the sort is built from. Every method is a collective: all
/// workers of the group must call the same methods in the same order.
pub trait Communicator {
    /// Rank of this worker, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of workers in the group.
    fn size(&self) -> usize;

    /// Symmetric all-gather of equally sized blocks. `recv` must hold `size() * send.len()`
    /// values; block `r` receives rank `r`'s contribution.
    fn all_gather_into(&self, send: &[f64], recv: &mut [f64]) -> Result<(), CommError>;

    /// [`Communicator::all_gather_into`] for counts.
    fn all_gather_counts_into(&self, send: &[u64], recv: &mut [u64]) -> Result<(), CommError>;

    /// Symmetric all-to-all: `send` and `recv` are split into `size()` equal blocks, block `r` of
    /// `send` goes to rank `r` and block `r` of `recv` comes from rank `r`.
    fn all_to_all_into(&self, send: &[u64], recv: &mut [u64]) -> Result<(), CommError>;

    /// Personalized all-to-all with per-peer sizes. `send` holds the runs for every destination
    /// back to back, `send_counts[r]` of them for rank `r`. `recv` is filled with `recv_counts[r]`
    /// elements from each rank `r`, grouped by source rank in rank order.
    fn all_to_all_varcount_into(
        &self,
        send: &[Key],
        send_counts: &[u64],
        recv: &mut [Key],
        recv_counts: &[u64],
    ) -> Result<(), CommError>;

    /// Variable-size all-gather: every worker receives `counts[r]` elements from each rank `r`.
    fn all_gather_varcount_into(
        &self,
        send: &[Key],
        recv: &mut [Key],
        counts: &[u64],
    ) -> Result<(), CommError>;

    /// Variable-size gather onto `root`. Only the root's `recv` is written and it must hold
    /// `counts.iter().sum()` elements; other ranks may pass an empty slice.
    fn gather_varcount_into(
        &self,
        root: usize,
        send: &[Key],
        recv: &mut [Key],
        counts: &[u64],
    ) -> Result<(), CommError>;

    /// Terminate every worker of the group with the given exit code.
    fn abort(&self, code: i32) -> !;
}

/// Checks that `buf` has exactly `expected` elements.
pub(crate) fn check_len<T>(op: &'static str, buf: &[T], expected: usize) -> Result<(), CommError> {
    if buf.len() != expected {
        return Err(CommError::BufferSize {
            op,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}
