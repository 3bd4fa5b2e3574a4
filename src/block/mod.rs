//! Process-local dense buffers.
//!
//! A [`LocalBlock`] is a row-major N-D array owned by one rank. Each axis may
//! carry a ghost layer of width 1 on both sides; the interior of such an axis
//! is addressed with offset 1 and has padded length `local + 2`.
//!
//! [`init_block`] is the only way distributed inputs are produced: every
//! interior element is a pure function of its *global* index, so the union of
//! all blocks equals the array produced by the same function on a 1x1 grid.

pub mod init;
pub use init::init_block;

use std::ops::Range;

use crate::error::DistError;

#[derive(Debug, Clone, PartialEq)]
pub struct LocalBlock {
    shape: Vec<usize>,
    halo: Vec<usize>,
    padded: Vec<usize>,
    strides: Vec<usize>,
    data: Vec<f64>,
}

/// Visit every multi-index of the box `ranges` in row-major order.
/// An empty `ranges` visits the single empty index.
pub(crate) fn each_index<F: FnMut(&[usize])>(ranges: &[Range<usize>], mut f: F) {
    if ranges.iter().any(|r| r.is_empty()) {
        return;
    }
    let mut idx: Vec<usize> = ranges.iter().map(|r| r.start).collect();
    loop {
        f(&idx);
        let mut axis = ranges.len();
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            idx[axis] += 1;
            if idx[axis] < ranges[axis].end {
                break;
            }
            idx[axis] = ranges[axis].start;
        }
    }
}

fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for a in (0..shape.len().saturating_sub(1)).rev() {
        strides[a] = strides[a + 1] * shape[a + 1];
    }
    strides
}

impl LocalBlock {
    /// Zero-filled block without ghost layers.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::with_halo(shape, &vec![0; shape.len()])
    }

    /// Zero-filled block with a ghost layer of width `halo[a]` on both ends of
    /// axis `a`.
    pub fn with_halo(shape: &[usize], halo: &[usize]) -> Self {
        assert_eq!(shape.len(), halo.len(), "one halo width per axis");
        let padded: Vec<usize> = shape.iter().zip(halo).map(|(&n, &h)| n + 2 * h).collect();
        let strides = row_major_strides(&padded);
        let len = padded.iter().product();
        Self {
            shape: shape.to_vec(),
            halo: halo.to_vec(),
            padded,
            strides,
            data: vec![0.0; len],
        }
    }

    /// Wrap unpadded row-major data.
    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> Result<Self, DistError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(DistError::ShapeMismatch { expected, found: data.len() });
        }
        let mut b = Self::zeros(shape);
        b.data = data;
        Ok(b)
    }

    /// Interior (unpadded) shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn padded_shape(&self) -> &[usize] {
        &self.padded
    }

    pub fn halo(&self) -> &[usize] {
        &self.halo
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn has_halo(&self) -> bool {
        self.halo.iter().any(|&h| h > 0)
    }

    /// Padded storage, ghost cells included.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Flat offset of a padded multi-index.
    #[inline]
    pub fn offset(&self, idx: &[usize]) -> usize {
        debug_assert_eq!(idx.len(), self.strides.len());
        idx.iter().zip(&self.strides).map(|(i, s)| i * s).sum()
    }

    pub fn get(&self, idx: &[usize]) -> f64 {
        self.data[self.offset(idx)]
    }

    pub fn set(&mut self, idx: &[usize], value: f64) {
        let o = self.offset(idx);
        self.data[o] = value;
    }

    /// Padded index ranges covering the interior.
    pub fn interior_ranges(&self) -> Vec<Range<usize>> {
        self.shape.iter().zip(&self.halo).map(|(&n, &h)| h..h + n).collect()
    }

    /// Copy of the interior in unpadded row-major order.
    pub fn interior(&self) -> Vec<f64> {
        if !self.has_halo() {
            return self.data.clone();
        }
        let mut out = Vec::with_capacity(self.shape.iter().product());
        each_index(&self.interior_ranges(), |idx| out.push(self.data[self.offset(idx)]));
        out
    }

    /// Flat offsets of the plane `idx[axis] == pos`, restricted to the
    /// interior of every other axis, in row-major order.
    pub fn plane_offsets(&self, axis: usize, pos: usize) -> Vec<usize> {
        let mut ranges = self.interior_ranges();
        ranges[axis] = pos..pos + 1;
        let mut out = Vec::new();
        each_index(&ranges, |idx| out.push(self.offset(idx)));
        out
    }

    pub fn plane_len(&self, axis: usize) -> usize {
        self.shape
            .iter()
            .enumerate()
            .filter(|&(a, _)| a != axis)
            .map(|(_, &n)| n)
            .product()
    }

    pub fn pack_plane(&self, axis: usize, pos: usize) -> Vec<f64> {
        self.plane_offsets(axis, pos).into_iter().map(|o| self.data[o]).collect()
    }

    pub fn unpack_plane(&mut self, axis: usize, pos: usize, values: &[f64]) -> Result<(), DistError> {
        let offsets = self.plane_offsets(axis, pos);
        if offsets.len() != values.len() {
            return Err(DistError::ShapeMismatch { expected: offsets.len(), found: values.len() });
        }
        for (o, &v) in offsets.into_iter().zip(values) {
            self.data[o] = v;
        }
        Ok(())
    }

    /// Set every interior element to `f(local_index)`, where `local_index` is
    /// unpadded. Ghost cells are left untouched.
    pub fn fill_interior<F>(&mut self, f: F)
    where
        F: Fn(&[usize]) -> f64 + Sync,
    {
        let ndim = self.ndim();
        if ndim == 0 || self.shape.iter().any(|&n| n == 0) {
            return;
        }
        let halo = self.halo.clone();
        let strides = self.strides.clone();
        let inner: Vec<Range<usize>> = self.interior_ranges()[1..].to_vec();
        let fill_slab = |i0: usize, slab: &mut [f64]| {
            let mut local = vec![0; ndim];
            local[0] = i0;
            each_index(&inner, |rest| {
                let mut off = 0;
                for (a, &p) in rest.iter().enumerate() {
                    local[a + 1] = p - halo[a + 1];
                    off += p * strides[a + 1];
                }
                slab[off] = f(&local);
            });
        };
        let slabs = self.data.chunks_mut(strides[0]).skip(halo[0]).take(self.shape[0]);
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            let slabs: Vec<&mut [f64]> = slabs.collect();
            slabs.into_par_iter().enumerate().for_each(|(i0, slab)| fill_slab(i0, slab));
        }
        #[cfg(not(feature = "rayon"))]
        {
            for (i0, slab) in slabs.enumerate() {
                fill_slab(i0, slab);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_index_row_major() {
        let mut seen = Vec::new();
        each_index(&[0..2, 1..3], |i| seen.push((i[0], i[1])));
        assert_eq!(seen, vec![(0, 1), (0, 2), (1, 1), (1, 2)]);
        let mut count = 0;
        each_index(&[], |_| count += 1);
        assert_eq!(count, 1);
        each_index(&[0..0, 0..3], |_| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn padded_layout_and_interior() {
        let mut b = LocalBlock::with_halo(&[2, 3], &[1, 1]);
        assert_eq!(b.padded_shape(), &[4, 5]);
        b.fill_interior(|i| (i[0] * 10 + i[1]) as f64);
        assert_eq!(b.get(&[1, 1]), 0.0);
        assert_eq!(b.get(&[2, 3]), 12.0);
        assert_eq!(b.get(&[0, 0]), 0.0);
        assert_eq!(b.interior(), vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn planes_skip_ghost_corners() {
        let mut b = LocalBlock::with_halo(&[2, 3], &[1, 1]);
        b.fill_interior(|i| (i[0] * 10 + i[1]) as f64);
        // first interior column, rows 1..=2
        assert_eq!(b.pack_plane(1, 1), vec![0.0, 10.0]);
        // last interior row
        assert_eq!(b.pack_plane(0, 2), vec![10.0, 11.0, 12.0]);
        b.unpack_plane(0, 0, &[7.0, 8.0, 9.0]).unwrap();
        assert_eq!(b.get(&[0, 1]), 7.0);
        assert_eq!(b.get(&[0, 0]), 0.0);
        assert!(b.unpack_plane(1, 0, &[1.0]).is_err());
    }

    #[test]
    fn unhaloed_axis_keeps_full_extent_in_planes() {
        let mut b = LocalBlock::with_halo(&[2, 2, 3], &[1, 1, 0]);
        b.fill_interior(|i| (i[0] * 100 + i[1] * 10 + i[2]) as f64);
        assert_eq!(b.plane_len(0), 6);
        assert_eq!(b.pack_plane(0, 1), vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn from_vec_checks_length() {
        assert!(LocalBlock::from_vec(&[2, 2], vec![0.0; 3]).is_err());
        let b = LocalBlock::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(b.get(&[1, 0]), 3.0);
    }
}
