use std::cell::Cell;
use std::sync::Mutex;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error};

use super::{check_len, Communicator, Key};
use crate::error::{CommError, SortError};
use crate::util::displacements;

/// Held by the first worker that aborts; later aborters block on it until the process is gone.
static ABORTING: Mutex<()> = Mutex::new(());

enum Payload {
    Floats(Vec<f64>),
    Counts(Vec<u64>),
    Keys(Vec<Key>),
}

struct Envelope {
    op: &'static str,
    seq: u64,
    payload: Payload,
}

/// One rank's endpoint of a [`LocalGroup`].
pub struct ThreadComm {
    rank: usize,
    size: usize,
    /// `outboxes[dst]`
    outboxes: Vec<Sender<Envelope>>,
    /// `inboxes[src]`
    inboxes: Vec<Receiver<Envelope>>,
    seq: Cell<u64>,
}

/// A group of `size` in-process workers.
pub struct LocalGroup {
    endpoints: Vec<ThreadComm>,
}

impl LocalGroup {
    pub fn new(size: usize) -> Result<Self, SortError> {
        if size == 0 {
            return Err(SortError::Configuration(
                "a group needs at least one worker".to_string(),
            ));
        }

        let mut outboxes: Vec<Vec<Sender<Envelope>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut inboxes: Vec<Vec<Receiver<Envelope>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        for src in 0..size {
            for dst in 0..size {
                let (tx, rx) = unbounded();
                outboxes[src].push(tx);
                inboxes[dst].push(rx);
            }
        }

        let endpoints = outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| ThreadComm {
                rank,
                size,
                outboxes,
                inboxes,
                seq: Cell::new(0),
            })
            .collect();

        Ok(LocalGroup { endpoints })
    }

    pub fn size(&self) -> usize {
        self.endpoints.len()
    }

    /// Hands out the endpoints, ordered by rank, for callers that spawn their own threads.
    pub fn into_endpoints(self) -> Vec<ThreadComm> {
        self.endpoints
    }

    /// Runs `worker` once per rank, each on its own thread, and returns the results in rank order.
    ///
    /// A panicking worker drops its channels, so its peers fail their next collective with
    /// [`CommError::PeerDisconnected`] rather than blocking forever.
    pub fn run<F, R>(self, worker: F) -> Result<Vec<R>, CommError>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        let inputs = vec![(); self.size()];
        self.run_with(inputs, |comm, ()| worker(comm))
    }

    /// Like [`LocalGroup::run`], moving `inputs[r]` into rank `r`'s worker.
    pub fn run_with<I, F, R>(self, inputs: Vec<I>, worker: F) -> Result<Vec<R>, CommError>
    where
        I: Send,
        F: Fn(ThreadComm, I) -> R + Sync,
        R: Send,
    {
        check_len("run_with", &inputs, self.size())?;
        let worker = &worker;
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .endpoints
                .into_iter()
                .zip(inputs)
                .map(|(comm, input)| {
                    debug!("spawning rank {}", comm.rank);
                    scope.spawn(move || worker(comm, input))
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle
                        .join()
                        .map_err(|_| CommError::WorkerPanicked { rank })
                })
                .collect()
        })
    }
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Floats(_) => "floats",
            Payload::Counts(_) => "counts",
            Payload::Keys(_) => "keys",
        }
    }
}

impl ThreadComm {
    fn begin(&self) -> u64 {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        seq
    }

    fn post(
        &self,
        op: &'static str,
        seq: u64,
        dst: usize,
        payload: Payload,
    ) -> Result<(), CommError> {
        self.outboxes[dst]
            .send(Envelope { op, seq, payload })
            .map_err(|_| CommError::PeerDisconnected {
                rank: self.rank,
                peer: dst,
                op,
            })
    }

    fn take(&self, op: &'static str, seq: u64, src: usize) -> Result<Payload, CommError> {
        let envelope = self.inboxes[src]
            .recv()
            .map_err(|_| CommError::PeerDisconnected {
                rank: self.rank,
                peer: src,
                op,
            })?;

        if envelope.op != op || envelope.seq != seq {
            return Err(CommError::Mismatch {
                rank: self.rank,
                peer: src,
                expected: op,
                seq,
                got: envelope.op,
                got_seq: envelope.seq,
            });
        }
        Ok(envelope.payload)
    }

    fn wrong_payload(&self, op: &'static str, seq: u64, src: usize, got: &Payload) -> CommError {
        CommError::Mismatch {
            rank: self.rank,
            peer: src,
            expected: op,
            seq,
            got: got.kind(),
            got_seq: seq,
        }
    }

    fn take_floats(&self, op: &'static str, seq: u64, src: usize) -> Result<Vec<f64>, CommError> {
        match self.take(op, seq, src)? {
            Payload::Floats(v) => Ok(v),
            other => Err(self.wrong_payload(op, seq, src, &other)),
        }
    }

    fn take_counts(&self, op: &'static str, seq: u64, src: usize) -> Result<Vec<u64>, CommError> {
        match self.take(op, seq, src)? {
            Payload::Counts(v) => Ok(v),
            other => Err(self.wrong_payload(op, seq, src, &other)),
        }
    }

    fn take_keys(&self, op: &'static str, seq: u64, src: usize) -> Result<Vec<Key>, CommError> {
        match self.take(op, seq, src)? {
            Payload::Keys(v) => Ok(v),
            other => Err(self.wrong_payload(op, seq, src, &other)),
        }
    }

    /// Copies `block` into `recv[offset..offset + expected]`, rejecting blocks of the wrong length.
    fn place<T: Copy>(
        op: &'static str,
        recv: &mut [T],
        offset: usize,
        expected: usize,
        block: &[T],
    ) -> Result<(), CommError> {
        check_len(op, block, expected)?;
        recv[offset..offset + expected].copy_from_slice(block);
        Ok(())
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_gather_into(&self, send: &[f64], recv: &mut [f64]) -> Result<(), CommError> {
        const OP: &str = "all_gather";
        check_len(OP, recv, send.len() * self.size)?;
        let seq = self.begin();

        for dst in 0..self.size {
            self.post(OP, seq, dst, Payload::Floats(send.to_vec()))?;
        }
        for src in 0..self.size {
            let block = self.take_floats(OP, seq, src)?;
            Self::place(OP, recv, src * send.len(), send.len(), &block)?;
        }
        Ok(())
    }

    fn all_gather_counts_into(&self, send: &[u64], recv: &mut [u64]) -> Result<(), CommError> {
        const OP: &str = "all_gather_counts";
        check_len(OP, recv, send.len() * self.size)?;
        let seq = self.begin();

        for dst in 0..self.size {
            self.post(OP, seq, dst, Payload::Counts(send.to_vec()))?;
        }
        for src in 0..self.size {
            let block = self.take_counts(OP, seq, src)?;
            Self::place(OP, recv, src * send.len(), send.len(), &block)?;
        }
        Ok(())
    }

    fn all_to_all_into(&self, send: &[u64], recv: &mut [u64]) -> Result<(), CommError> {
        const OP: &str = "all_to_all";
        check_len(OP, recv, send.len())?;
        if send.len() % self.size != 0 {
            return Err(CommError::BufferSize {
                op: OP,
                expected: send.len() - send.len() % self.size,
                actual: send.len(),
            });
        }
        let block = send.len() / self.size;
        let seq = self.begin();

        for dst in 0..self.size {
            let chunk = &send[dst * block..(dst + 1) * block];
            self.post(OP, seq, dst, Payload::Counts(chunk.to_vec()))?;
        }
        for src in 0..self.size {
            let chunk = self.take_counts(OP, seq, src)?;
            Self::place(OP, recv, src * block, block, &chunk)?;
        }
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
        check_len(OP, send_counts, self.size)?;
        check_len(OP, recv_counts, self.size)?;
        let send_displs = displacements(send_counts);
        let recv_displs = displacements(recv_counts);
        check_len(OP, send, send_displs[self.size] as usize)?;
        check_len(OP, recv, recv_displs[self.size] as usize)?;
        let seq = self.begin();

        for dst in 0..self.size {
            let run = &send[send_displs[dst] as usize..send_displs[dst + 1] as usize];
            self.post(OP, seq, dst, Payload::Keys(run.to_vec()))?;
        }
        for src in 0..self.size {
            let run = self.take_keys(OP, seq, src)?;
            Self::place(
                OP,
                recv,
                recv_displs[src] as usize,
                recv_counts[src] as usize,
                &run,
            )?;
        }
        debug!(
            "rank {} exchanged {} keys out, {} keys in",
            self.rank,
            send.len(),
            recv.len()
        );
        Ok(())
    }

    fn all_gather_varcount_into(
        &self,
        send: &[Key],
        recv: &mut [Key],
        counts: &[u64],
    ) -> Result<(), CommError> {
        const OP: &str = "all_gather_varcount";
        check_len(OP, counts, self.size)?;
        let displs = displacements(counts);
        check_len(OP, recv, displs[self.size] as usize)?;
        let seq = self.begin();

        for dst in 0..self.size {
            self.post(OP, seq, dst, Payload::Keys(send.to_vec()))?;
        }
        for src in 0..self.size {
            let block = self.take_keys(OP, seq, src)?;
            Self::place(OP, recv, displs[src] as usize, counts[src] as usize, &block)?;
        }
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
        if root >= self.size {
            return Err(CommError::InvalidRoot {
                root,
                size: self.size,
            });
        }
        check_len(OP, counts, self.size)?;
        let seq = self.begin();

        self.post(OP, seq, root, Payload::Keys(send.to_vec()))?;
        if self.rank != root {
            return Ok(());
        }

        let displs = displacements(counts);
        check_len(OP, recv, displs[self.size] as usize)?;
        for src in 0..self.size {
            let block = self.take_keys(OP, seq, src)?;
            Self::place(OP, recv, displs[src] as usize, counts[src] as usize, &block)?;
        }
        Ok(())
    }

    fn abort(&self, code: i32) -> ! {
        let _guard = ABORTING.lock();
        error!("rank {} aborting the group with code {}", self.rank, code);
        std::process::exit(code)
    }
}
