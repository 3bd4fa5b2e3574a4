//! Named kernel arguments.
//!
//! A compiled kernel sees three namespaces: local buffers, floating-point
//! scalars (`alpha`, `beta`) and integer symbols (local block sizes, grid
//! shape, neighbor ranks, per-side offsets, step counts).

use std::collections::BTreeMap;

use crate::block::LocalBlock;
use crate::error::DistError;
use crate::halo::neighbors_from_symbols;
use crate::topology::{Neighbors, Offsets, ProcessGrid, Topology};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelArgs {
    buffers: BTreeMap<&'static str, LocalBlock>,
    scalars: BTreeMap<&'static str, f64>,
    symbols: BTreeMap<&'static str, i64>,
}

impl KernelArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_buffer(&mut self, name: &'static str, block: LocalBlock) {
        self.buffers.insert(name, block);
    }

    pub fn with_buffer(mut self, name: &'static str, block: LocalBlock) -> Self {
        self.insert_buffer(name, block);
        self
    }

    pub fn set_scalar(&mut self, name: &'static str, value: f64) {
        self.scalars.insert(name, value);
    }

    pub fn set_symbol(&mut self, name: &'static str, value: i64) {
        self.symbols.insert(name, value);
    }

    pub fn buffer(&self, name: &'static str) -> Result<&LocalBlock, DistError> {
        self.buffers.get(name).ok_or(DistError::MissingArgument(name))
    }

    pub fn buffer_mut(&mut self, name: &'static str) -> Result<&mut LocalBlock, DistError> {
        self.buffers.get_mut(name).ok_or(DistError::MissingArgument(name))
    }

    /// Disjoint mutable borrows of several buffers, in the order of `names`.
    pub fn buffers_mut<const N: usize>(
        &mut self,
        names: [&'static str; N],
    ) -> Result<[&mut LocalBlock; N], DistError> {
        let mut found: Vec<Option<&mut LocalBlock>> = (0..N).map(|_| None).collect();
        for (key, block) in self.buffers.iter_mut() {
            if let Some(pos) = names.iter().position(|n| n == key) {
                found[pos] = Some(block);
            }
        }
        let blocks = found
            .into_iter()
            .zip(names)
            .map(|(b, n)| b.ok_or(DistError::MissingArgument(n)))
            .collect::<Result<Vec<_>, _>>()?;
        blocks
            .try_into()
            .map_err(|_| DistError::MissingArgument("buffers"))
    }

    pub fn buffer_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.buffers.keys().copied()
    }

    pub fn scalar(&self, name: &'static str) -> Result<f64, DistError> {
        self.scalars.get(name).copied().ok_or(DistError::MissingArgument(name))
    }

    pub fn symbol(&self, name: &'static str) -> Result<i64, DistError> {
        self.symbols.get(name).copied().ok_or(DistError::MissingArgument(name))
    }

    /// A symbol that must be a non-negative size or count.
    pub fn extent(&self, name: &'static str) -> Result<usize, DistError> {
        let v = self.symbol(name)?;
        usize::try_from(v).map_err(|_| DistError::MissingArgument(name))
    }

    /// Record grid shape, coordinate, neighbor ranks (`nn ns nw ne`, `-1` for
    /// none) and per-side offsets (`noff soff woff eoff`).
    pub fn set_topology(&mut self, topo: &Topology) {
        self.set_symbol("Px", topo.grid.px as i64);
        self.set_symbol("Py", topo.grid.py as i64);
        self.set_symbol("pi", topo.pi() as i64);
        self.set_symbol("pj", topo.pj() as i64);
        let [nn, ns, nw, ne] = topo.neighbors.as_symbols();
        self.set_symbol("nn", nn);
        self.set_symbol("ns", ns);
        self.set_symbol("nw", nw);
        self.set_symbol("ne", ne);
        self.set_offsets(topo.offsets());
    }

    pub fn set_offsets(&mut self, off: Offsets) {
        self.set_symbol("noff", off.north as i64);
        self.set_symbol("soff", off.south as i64);
        self.set_symbol("woff", off.west as i64);
        self.set_symbol("eoff", off.east as i64);
    }

    pub fn grid(&self) -> Result<ProcessGrid, DistError> {
        let px = self.extent("Px")?;
        let py = self.extent("Py")?;
        if px == 0 || py == 0 {
            return Err(DistError::UnsupportedProcessCount { count: px * py });
        }
        Ok(ProcessGrid::new(px, py))
    }

    /// Topology of `rank` on the grid recorded in the symbols.
    pub fn topology(&self, rank: usize) -> Result<Topology, DistError> {
        Topology::new(self.grid()?, rank)
    }

    pub fn neighbors(&self) -> Result<Neighbors, DistError> {
        Ok(neighbors_from_symbols([
            self.symbol("nn")?,
            self.symbol("ns")?,
            self.symbol("nw")?,
            self.symbol("ne")?,
        ]))
    }

    pub fn offsets(&self) -> Result<Offsets, DistError> {
        Ok(Offsets {
            north: self.extent("noff")?,
            south: self.extent("soff")?,
            west: self.extent("woff")?,
            east: self.extent("eoff")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_mutable_buffers() {
        let mut args = KernelArgs::new()
            .with_buffer("A", LocalBlock::zeros(&[2]))
            .with_buffer("B", LocalBlock::zeros(&[3]));
        let [b, a] = args.buffers_mut(["B", "A"]).unwrap();
        assert_eq!(b.shape(), &[3]);
        a.set(&[0], 1.0);
        assert_eq!(args.buffer("A").unwrap().get(&[0]), 1.0);
        assert_eq!(args.buffers_mut(["A", "C"]).err(), Some(DistError::MissingArgument("C")));
    }

    #[test]
    fn topology_symbols_roundtrip() {
        let topo = Topology::new(ProcessGrid::new(2, 4), 5).unwrap();
        let mut args = KernelArgs::new();
        args.set_topology(&topo);
        assert_eq!(args.symbol("nn").unwrap(), 1);
        assert_eq!(args.symbol("ns").unwrap(), -1);
        assert_eq!(args.offsets().unwrap(), topo.offsets());
        assert_eq!(args.neighbors().unwrap(), topo.neighbors);
        assert_eq!(args.topology(5).unwrap(), topo);
        assert_eq!(args.scalar("alpha"), Err(DistError::MissingArgument("alpha")));
    }
}
