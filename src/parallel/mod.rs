//! Message-passing layer shared by every distributed component.
//!
//! The `Comm` trait exposes the minimum an SPMD program needs: identity
//! (`rank`/`size`), a global `barrier`, and non-blocking point-to-point
//! transfers that are posted first and completed together by `wait_all`.
//! Collectives (gather, broadcast, all-reduce, group all-gather) have default
//! implementations built from point-to-point rounds, so a backend only has to
//! provide transport. Backends may override them with native collectives.
//!
//! Messages between one (source, destination, tag) triple are delivered in
//! posting order. A receive whose matching send is never posted blocks forever:
//! there is no timeout anywhere in this layer.

pub mod thread_comm;
pub use thread_comm::{ThreadComm, ThreadUniverse};

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

/// Tags at or above this value are reserved for the built-in collectives.
pub const RESERVED_TAG_BASE: u16 = 0xF000;
pub(crate) const TAG_GATHER: u16 = RESERVED_TAG_BASE;
pub(crate) const TAG_BROADCAST: u16 = RESERVED_TAG_BASE + 1;
pub(crate) const TAG_ALL_GATHER: u16 = RESERVED_TAG_BASE + 2;

/// A posted, not yet completed send.
#[derive(Debug)]
pub struct SendRequest {
    pub(crate) peer: usize,
    pub(crate) tag: u16,
    /// Payload still owned by the request. Backends that deliver eagerly at
    /// post time leave this empty.
    pub(crate) payload: Vec<f64>,
}

/// A posted, not yet completed receive of `len` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvRequest {
    pub(crate) peer: usize,
    pub(crate) tag: u16,
    pub(crate) len: usize,
}

impl RecvRequest {
    pub fn peer(&self) -> usize {
        self.peer
    }
    pub fn tag(&self) -> u16 {
        self.tag
    }
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub trait Comm: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    /// Blocks until every rank of the communicator has entered the barrier.
    fn barrier(&self);

    /// Post a non-blocking send of `buf` to `peer`.
    fn isend(&self, peer: usize, tag: u16, buf: &[f64]) -> SendRequest;
    /// Post a non-blocking receive of `len` values from `peer`.
    fn irecv(&self, peer: usize, tag: u16, len: usize) -> RecvRequest;
    /// Complete every posted request. Returns the received payloads in the
    /// order the receives were posted.
    fn wait_all(&self, sends: Vec<SendRequest>, recvs: Vec<RecvRequest>) -> Vec<Vec<f64>>;

    fn send(&self, peer: usize, tag: u16, buf: &[f64]) {
        let req = self.isend(peer, tag, buf);
        self.wait_all(vec![req], Vec::new());
    }

    fn recv(&self, peer: usize, tag: u16, len: usize) -> Vec<f64> {
        let req = self.irecv(peer, tag, len);
        self.wait_all(Vec::new(), vec![req]).pop().unwrap_or_default()
    }

    /// Concatenate equally sized `local` slices in rank order on `root`.
    /// Returns `None` on every other rank.
    fn gather(&self, local: &[f64], root: usize) -> Option<Vec<f64>> {
        if self.rank() != root {
            self.send(root, TAG_GATHER, local);
            return None;
        }
        let recvs = (0..self.size())
            .filter(|&r| r != root)
            .map(|r| self.irecv(r, TAG_GATHER, local.len()))
            .collect();
        let mut incoming = self.wait_all(Vec::new(), recvs).into_iter();
        let mut out = Vec::with_capacity(local.len() * self.size());
        for r in 0..self.size() {
            if r == root {
                out.extend_from_slice(local);
            } else if let Some(chunk) = incoming.next() {
                out.extend_from_slice(&chunk);
            }
        }
        Some(out)
    }

    /// Overwrite `buf` on every rank with the contents held by `root`.
    fn broadcast(&self, buf: &mut [f64], root: usize) {
        if self.rank() == root {
            let sends = (0..self.size())
                .filter(|&r| r != root)
                .map(|r| self.isend(r, TAG_BROADCAST, buf))
                .collect();
            self.wait_all(sends, Vec::new());
        } else {
            let data = self.recv(root, TAG_BROADCAST, buf.len());
            buf.copy_from_slice(&data);
        }
    }

    /// Element-wise sum over all ranks, result on every rank.
    ///
    /// Contributions are added in rank order on rank 0 so the result does not
    /// depend on message arrival order.
    fn all_reduce_sum(&self, buf: &mut [f64]) {
        let n = buf.len();
        if let Some(all) = self.gather(buf, 0) {
            buf.iter_mut().for_each(|x| *x = 0.0);
            for chunk in all.chunks_exact(n.max(1)).take(self.size()) {
                for (acc, v) in buf.iter_mut().zip(chunk) {
                    *acc += *v;
                }
            }
        }
        self.broadcast(buf, 0);
    }

    /// Exchange `local` among the ranks listed in `group` (which must contain
    /// this rank). Returns every member's slice in `group` order.
    fn all_gather_group(&self, group: &[usize], local: &[f64]) -> Vec<Vec<f64>> {
        let me = self.rank();
        let sends = group
            .iter()
            .filter(|&&r| r != me)
            .map(|&r| self.isend(r, TAG_ALL_GATHER, local))
            .collect();
        let recvs = group
            .iter()
            .filter(|&&r| r != me)
            .map(|&r| self.irecv(r, TAG_ALL_GATHER, local.len()))
            .collect();
        let mut incoming = self.wait_all(sends, recvs).into_iter();
        group
            .iter()
            .map(|&r| {
                if r == me {
                    local.to_vec()
                } else {
                    incoming.next().unwrap_or_default()
                }
            })
            .collect()
    }
}

/// The communicator of a single process running alone.
///
/// Used for reference runs on the full problem: every collective degenerates
/// to a local copy and no peer exists to exchange with.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelfComm;

impl Comm for SelfComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
    fn isend(&self, peer: usize, tag: u16, buf: &[f64]) -> SendRequest {
        SendRequest { peer, tag, payload: buf.to_vec() }
    }
    fn irecv(&self, peer: usize, tag: u16, len: usize) -> RecvRequest {
        RecvRequest { peer, tag, len }
    }
    fn wait_all(&self, sends: Vec<SendRequest>, recvs: Vec<RecvRequest>) -> Vec<Vec<f64>> {
        // Only self-messages can complete here.
        let mut pending: Vec<SendRequest> = sends.into_iter().filter(|s| s.peer == 0).collect();
        recvs
            .into_iter()
            .map(|r| {
                match pending.iter().position(|s| s.tag == r.tag && r.peer == 0) {
                    Some(i) => pending.remove(i).payload,
                    None => vec![0.0; r.len],
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_comm_collectives_are_local() {
        let comm = SelfComm;
        let gathered = comm.gather(&[1.0, 2.0], 0).unwrap();
        assert_eq!(gathered, vec![1.0, 2.0]);
        let mut buf = [3.0, 4.0];
        comm.all_reduce_sum(&mut buf);
        assert_eq!(buf, [3.0, 4.0]);
        let parts = comm.all_gather_group(&[0], &[5.0]);
        assert_eq!(parts, vec![vec![5.0]]);
    }

    #[test]
    fn self_comm_delivers_self_messages() {
        let comm = SelfComm;
        let s = comm.isend(0, 7, &[9.0]);
        let r = comm.irecv(0, 7, 1);
        assert_eq!(comm.wait_all(vec![s], vec![r]), vec![vec![9.0]]);
    }
}
