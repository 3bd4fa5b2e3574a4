//! In-process backend: every rank is an OS thread.
//!
//! Ranks share one mailbox keyed by `(src, dst, tag)`. Each key holds a FIFO
//! queue, which gives the same non-overtaking guarantee MPI gives for a
//! fixed (source, tag) pair. Sends are eager: `isend` deposits the payload
//! and never blocks. Receives block inside `wait_all` until a matching
//! payload is queued.
//!
//! Ranks must not run on a bounded pool (e.g. rayon): a rank blocked in a
//! receive would starve the rank that is supposed to send to it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Barrier};

use parking_lot::{Condvar, Mutex};

use super::{Comm, RecvRequest, SendRequest};

type Key = (usize, usize, u16); // (src, dst, tag)

struct Shared {
    size: usize,
    mailbox: Mutex<HashMap<Key, VecDeque<Vec<f64>>>>,
    arrived: Condvar,
    barrier: Barrier,
}

/// A group of `size` thread-ranks sharing one mailbox.
#[derive(Clone)]
pub struct ThreadUniverse {
    shared: Arc<Shared>,
}

impl ThreadUniverse {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "a universe needs at least one rank");
        Self {
            shared: Arc::new(Shared {
                size,
                mailbox: Mutex::new(HashMap::new()),
                arrived: Condvar::new(),
                barrier: Barrier::new(size),
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// The communicator of `rank`. Each rank must be driven by its own thread.
    pub fn comm(&self, rank: usize) -> ThreadComm {
        assert!(rank < self.shared.size, "rank {rank} out of range");
        ThreadComm { rank, shared: Arc::clone(&self.shared) }
    }

    /// Run `f` once per rank, each on its own scoped thread, and return the
    /// results in rank order. A panic on any rank is re-raised here.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(&ThreadComm) -> R + Sync,
    {
        let universe = Self::new(size);
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..size)
                .map(|rank| {
                    let comm = universe.comm(rank);
                    let f = &f;
                    s.spawn(move || f(&comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }
}

#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.shared.size)
            .finish()
    }
}

impl ThreadComm {
    fn take(&self, key: Key) -> Vec<f64> {
        let mut mailbox = self.shared.mailbox.lock();
        loop {
            if let Some(data) = mailbox.get_mut(&key).and_then(VecDeque::pop_front) {
                return data;
            }
            self.shared.arrived.wait(&mut mailbox);
        }
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[f64]) -> SendRequest {
        let key = (self.rank, peer, tag);
        self.shared.mailbox.lock().entry(key).or_default().push_back(buf.to_vec());
        self.shared.arrived.notify_all();
        SendRequest { peer, tag, payload: Vec::new() }
    }

    fn irecv(&self, peer: usize, tag: u16, len: usize) -> RecvRequest {
        RecvRequest { peer, tag, len }
    }

    fn wait_all(&self, sends: Vec<SendRequest>, recvs: Vec<RecvRequest>) -> Vec<Vec<f64>> {
        // Sends completed when they were posted.
        drop(sends);
        recvs
            .into_iter()
            .map(|r| {
                let mut data = self.take((r.peer, self.rank, r.tag));
                data.truncate(r.len);
                data
            })
            .collect()
    }
}
