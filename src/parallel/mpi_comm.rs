//! MPI-based communication backend.
//!
//! This module provides an implementation of the `Comm` trait on top of the MPI
//! (Message Passing Interface) world communicator, one process per rank. It is
//! only available when the `mpi` feature is enabled.
//!
//! # Usage
//!
//! - `MpiComm::new` initializes MPI and keeps the universe alive for as long as
//!   the communicator exists (dropping it finalizes MPI).
//! - Point-to-point requests are recorded by `isend`/`irecv` and all of them are
//!   posted as immediate operations inside a single request scope by `wait_all`,
//!   which returns only after every send and receive of the round completed.
//! - Barrier, gather, broadcast and all-reduce use the native MPI collectives.
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "mpi")] {
//! use distbench::parallel::{Comm, MpiComm};
//! let comm = MpiComm::new().unwrap();
//! println!("Rank: {} / {}", comm.rank(), comm.size());
//! comm.barrier();
//! # }
//! ```

use mpi::collective::SystemOperation;
use mpi::request::WaitGuard;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Tag;

use super::{Comm, RecvRequest, SendRequest};
use crate::error::DistError;

/// MPI communicator wrapper for distributed runs.
pub struct MpiComm {
    /// Keeps MPI initialized; finalized on drop.
    _universe: mpi::environment::Universe,
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
}

impl MpiComm {
    /// Initializes MPI and constructs a new `MpiComm` instance.
    ///
    /// Fails if MPI was already initialized in this process.
    pub fn new() -> Result<Self, DistError> {
        let universe = mpi::initialize()
            .ok_or_else(|| DistError::Communication("MPI is already initialized".into()))?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Ok(MpiComm { _universe: universe, world, rank, size })
    }
}

// SAFETY: MPI is initialized with the single threading level and every
// `MpiComm` is driven from the thread that created it. The bounds only let
// the harness hold it as `&dyn Comm`.
unsafe impl Sync for MpiComm {}
unsafe impl Send for MpiComm {}

impl Comm for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.world.barrier();
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[f64]) -> SendRequest {
        SendRequest { peer, tag, payload: buf.to_vec() }
    }

    fn irecv(&self, peer: usize, tag: u16, len: usize) -> RecvRequest {
        RecvRequest { peer, tag, len }
    }

    fn wait_all(&self, sends: Vec<SendRequest>, recvs: Vec<RecvRequest>) -> Vec<Vec<f64>> {
        let mut inbox: Vec<Vec<f64>> = recvs.iter().map(|r| vec![0.0; r.len]).collect();
        mpi::request::scope(|scope| {
            let mut guards = Vec::with_capacity(sends.len() + recvs.len());
            for s in &sends {
                let req = self
                    .world
                    .process_at_rank(s.peer as i32)
                    .immediate_send_with_tag(scope, &s.payload[..], s.tag as Tag);
                guards.push(WaitGuard::from(req));
            }
            for (r, buf) in recvs.iter().zip(inbox.iter_mut()) {
                let req = self
                    .world
                    .process_at_rank(r.peer as i32)
                    .immediate_receive_into_with_tag(scope, &mut buf[..], r.tag as Tag);
                guards.push(WaitGuard::from(req));
            }
            // Dropping the guards waits for every request of the round.
            drop(guards);
        });
        inbox
    }

    fn gather(&self, local: &[f64], root: usize) -> Option<Vec<f64>> {
        let root_process = self.world.process_at_rank(root as i32);
        if self.rank == root {
            let mut recvbuf = vec![0.0; local.len() * self.size];
            root_process.gather_into_root(local, &mut recvbuf[..]);
            Some(recvbuf)
        } else {
            root_process.gather_into(local);
            None
        }
    }

    fn broadcast(&self, buf: &mut [f64], root: usize) {
        self.world.process_at_rank(root as i32).broadcast_into(buf);
    }

    fn all_reduce_sum(&self, buf: &mut [f64]) {
        let local = buf.to_vec();
        self.world.all_reduce_into(&local[..], buf, SystemOperation::sum());
    }
}
