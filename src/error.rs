use thiserror::Error;

/// Failures of the collective layer. None of these are recoverable: a collective that fails on one
/// worker leaves the rest of the group blocked or out of step, so the only response is an abort.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommError {
    /// A peer's channel closed before its message for this collective arrived.
    #[error("rank {rank} lost its connection to rank {peer} during {op}")]
    PeerDisconnected {
        rank: usize,
        peer: usize,
        op: &'static str,
    },

    /// Two workers invoked different collectives (or the same collective out of order).
    #[error("rank {rank} expected {expected} #{seq} from rank {peer}, got {got} #{got_seq}")]
    Mismatch {
        rank: usize,
        peer: usize,
        expected: &'static str,
        seq: u64,
        got: &'static str,
        got_seq: u64,
    },

    /// A buffer handed to a collective does not have the length the operation requires.
    #[error("{op}: buffer holds {actual} elements, expected {expected}")]
    BufferSize {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A message count does not fit into the count type of the transport.
    #[error("{op}: count {count} exceeds the transport's count range")]
    CountOverflow { op: &'static str, count: u64 },

    /// A worker thread panicked, taking its end of every channel with it.
    #[error("worker {rank} panicked")]
    WorkerPanicked { rank: usize },

    /// Rank passed to a rooted collective is outside the group.
    #[error("rank {root} is not a member of a group of {size}")]
    InvalidRoot { root: usize, size: usize },
}

/// Errors of the bucket sort protocol.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SortError {
    /// The run cannot start: empty group, or a group size that does not divide the element count.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The gathered breakpoints collapsed so that some partition interval is empty. Never escapes
    /// the driver, which answers it with the equal-count partitioning.
    #[error("skewed distribution: interval {rank} is empty ([{low}, {high}))")]
    SkewedDistribution { rank: usize, low: f64, high: f64 },

    #[error("communication error: {0}")]
    Communication(#[from] CommError),

    /// The assembled result violates an ordering or conservation law.
    #[error("verification failed: {0}")]
    Verification(String),
}

impl SortError {
    /// Process exit code used when this error aborts the group.
    pub fn exit_code(&self) -> i32 {
        match self {
            SortError::Configuration(_) => 2,
            SortError::SkewedDistribution { .. } => 3,
            SortError::Communication(_) => 4,
            SortError::Verification(_) => 5,
        }
    }
}

pub type Result<T> = std::result::Result<T, SortError>;
