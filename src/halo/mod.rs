//! One-layer halo exchange between grid-adjacent ranks.
//!
//! A round posts one send per active direction (the interior plane next to
//! that edge), one receive per active direction (into the ghost plane on that
//! edge), then waits for all of them. Sends are tagged with the direction of
//! travel, so the receive from the north neighbor expects `South`'s tag:
//! "I send north" pairs with "I receive from south" on the other side.
//!
//! Directions without a neighbor are skipped entirely; their ghost plane is
//! never written and stencils keep it out of the compute range via the
//! per-side offsets.

use log::trace;

use crate::block::LocalBlock;
use crate::error::DistError;
use crate::parallel::Comm;
use crate::topology::{Neighbors, NO_NEIGHBOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North = 0,
    South = 1,
    West = 2,
    East = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] =
        [Direction::North, Direction::South, Direction::West, Direction::East];

    /// Message tag of a transfer travelling in this direction.
    pub fn tag(self) -> u16 {
        self as u16
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::East => Direction::West,
        }
    }

    /// North and west are the low ends of their axes.
    pub fn is_low(self) -> bool {
        matches!(self, Direction::North | Direction::West)
    }

    fn pick(self, n: &Neighbors) -> Option<usize> {
        match self {
            Direction::North => n.north,
            Direction::South => n.south,
            Direction::West => n.west,
            Direction::East => n.east,
        }
    }
}

/// Neighbor set decoded from the `[north, south, west, east]` integer
/// symbols kernels receive; any negative value means no neighbor.
pub fn neighbors_from_symbols(symbols: [i64; 4]) -> Neighbors {
    let f = |s: i64| if s <= NO_NEIGHBOR { None } else { Some(s as usize) };
    Neighbors {
        north: f(symbols[0]),
        south: f(symbols[1]),
        west: f(symbols[2]),
        east: f(symbols[3]),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    dir: Direction,
    peer: usize,
    axis: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HaloExchanger {
    links: Vec<Link>,
}

impl HaloExchanger {
    /// 1-D chain: west/east along block axis 0.
    pub fn linear(neighbors: &Neighbors) -> Self {
        Self::with_axes(neighbors, None, Some(0))
    }

    /// 2-D grid: north/south along block axis 0, west/east along axis 1.
    /// Further block axes are local and carry no ghost layer.
    pub fn planar(neighbors: &Neighbors) -> Self {
        Self::with_axes(neighbors, Some(0), Some(1))
    }

    fn with_axes(neighbors: &Neighbors, ns_axis: Option<usize>, we_axis: Option<usize>) -> Self {
        let links = Direction::ALL
            .iter()
            .filter_map(|&dir| {
                let axis = match dir {
                    Direction::North | Direction::South => ns_axis?,
                    Direction::West | Direction::East => we_axis?,
                };
                dir.pick(neighbors).map(|peer| Link { dir, peer, axis })
            })
            .collect();
        Self { links }
    }

    /// Number of directions that take part in a round.
    pub fn active(&self) -> usize {
        self.links.len()
    }

    pub fn has(&self, dir: Direction) -> bool {
        self.links.iter().any(|l| l.dir == dir)
    }

    /// One exchange round on `block`: post sends, post receives, wait for
    /// all, then write the received planes into the ghost layers.
    pub fn exchange<C: Comm + ?Sized>(&self, comm: &C, block: &mut LocalBlock) -> Result<(), DistError> {
        if self.links.is_empty() {
            return Ok(());
        }
        for l in &self.links {
            if l.axis >= block.ndim() || block.halo()[l.axis] != 1 {
                return Err(DistError::ShapeMismatch {
                    expected: 1,
                    found: block.halo().get(l.axis).copied().unwrap_or(0),
                });
            }
        }

        let sends = self
            .links
            .iter()
            .map(|l| {
                let pos = if l.dir.is_low() { 1 } else { block.padded_shape()[l.axis] - 2 };
                comm.isend(l.peer, l.dir.tag(), &block.pack_plane(l.axis, pos))
            })
            .collect();
        let recvs = self
            .links
            .iter()
            .map(|l| comm.irecv(l.peer, l.dir.opposite().tag(), block.plane_len(l.axis)))
            .collect();
        let planes = comm.wait_all(sends, recvs);
        if planes.len() != self.links.len() {
            return Err(DistError::Communication(format!(
                "halo round completed {} of {} receives",
                planes.len(),
                self.links.len()
            )));
        }

        for (l, plane) in self.links.iter().zip(planes) {
            let ghost = if l.dir.is_low() { 0 } else { block.padded_shape()[l.axis] - 1 };
            block.unpack_plane(l.axis, ghost, &plane)?;
        }
        trace!("rank {}: halo round over {} directions", comm.rank(), self.links.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::init_block;
    use crate::distribution::BlockSpec;
    use crate::parallel::ThreadUniverse;
    use crate::topology::{ProcessGrid, Topology};

    #[test]
    fn tags_pair_with_opposites() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            assert_ne!(d.tag(), d.opposite().tag());
        }
        assert_eq!(Direction::North.tag(), 0);
        assert_eq!(Direction::East.opposite().tag(), 2);
    }

    #[test]
    fn symbols_decode_sentinel() {
        let n = neighbors_from_symbols([-1, 4, -1, 1]);
        assert_eq!(n.north, None);
        assert_eq!(n.south, Some(4));
        assert_eq!(n.east, Some(1));
    }

    #[test]
    fn one_dimensional_round_fills_ghosts() {
        // 16 elements over a chain of 4 ranks
        let ghosts = ThreadUniverse::run(4, |comm| {
            let topo = Topology::new(ProcessGrid::linear(4), comm.rank()).unwrap();
            let spec = BlockSpec::col_vector(16);
            let mut b = init_block(&spec, &topo, &[1], |g| 1.0 + g[0] as f64).unwrap();
            HaloExchanger::linear(&topo.neighbors).exchange(comm, &mut b).unwrap();
            (b.get(&[0]), b.get(&[5]))
        });
        assert_eq!(ghosts[0].0, 0.0);
        assert_eq!(ghosts[1].0, 4.0); // rank 0, local index 3
        assert_eq!(ghosts[0].1, 5.0);
        assert_eq!(ghosts[2].0, 8.0);
        assert_eq!(ghosts[3].1, 0.0);
    }

    #[test]
    fn two_dimensional_round_on_2x2() {
        let blocks = ThreadUniverse::run(4, |comm| {
            let topo = Topology::new(ProcessGrid::new(2, 2), comm.rank()).unwrap();
            let mut b = init_block(&BlockSpec::matrix(4, 4), &topo, &[1, 1], |g| {
                (g[0] * 4 + g[1]) as f64
            })
            .unwrap();
            HaloExchanger::planar(&topo.neighbors).exchange(comm, &mut b).unwrap();
            b
        });
        // rank 0 owns rows 0..2, cols 0..2; south ghost row is global row 2
        let b0 = &blocks[0];
        assert_eq!(b0.pack_plane(0, 3), vec![8.0, 9.0]);
        // east ghost column is global column 2
        assert_eq!(b0.pack_plane(1, 3), vec![2.0, 6.0]);
        // edges untouched
        assert_eq!(b0.pack_plane(0, 0), vec![0.0, 0.0]);
        assert_eq!(b0.pack_plane(1, 0), vec![0.0, 0.0]);
        // rank 3 north ghost row is global row 1, cols 2..4
        assert_eq!(blocks[3].pack_plane(0, 0), vec![6.0, 7.0]);
    }

    #[test]
    fn missing_ghost_layer_is_rejected() {
        let n = Neighbors { east: Some(0), ..Default::default() };
        let mut b = LocalBlock::zeros(&[4]);
        let err = HaloExchanger::linear(&n).exchange(&crate::parallel::SelfComm, &mut b);
        assert!(matches!(err, Err(DistError::ShapeMismatch { .. })));
    }
}
