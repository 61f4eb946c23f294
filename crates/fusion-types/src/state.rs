// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — State Vector Layout
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Named coefficient blocks and the packing convention of the state vector.
//!
//! The block order is fixed by [`ARG_ORDER`]. Every layout sorts its
//! arguments by that order, so packing the same blocks through two
//! different layouts always produces compatible sub-vectors, and saved
//! snapshots remain readable across resolutions.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use ndarray::{s, Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{FusionError, FusionResult};

/// One named coefficient block of the state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Arg {
    /// Fourier-Zernike coefficients of R(ρ,θ,ζ).
    RLmn,
    /// Fourier-Zernike coefficients of Z(ρ,θ,ζ).
    ZLmn,
    /// Fourier-Zernike coefficients of the stream function λ.
    LLmn,
    /// Double-Fourier coefficients of the boundary R.
    RbLmn,
    /// Double-Fourier coefficients of the boundary Z.
    ZbLmn,
    /// Pressure power-series coefficients.
    PL,
    /// Rotational transform power-series coefficients.
    IL,
    /// Toroidal current power-series coefficients.
    CL,
    /// Total toroidal flux enclosed by the boundary.
    Psi,
}

pub const ARG_COUNT: usize = 9;

/// Global block order. Must never change: it is the on-disk convention.
pub const ARG_ORDER: [Arg; ARG_COUNT] = [
    Arg::RLmn,
    Arg::ZLmn,
    Arg::LLmn,
    Arg::RbLmn,
    Arg::ZbLmn,
    Arg::PL,
    Arg::IL,
    Arg::CL,
    Arg::Psi,
];

impl Arg {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Arg::RLmn => "R_lmn",
            Arg::ZLmn => "Z_lmn",
            Arg::LLmn => "L_lmn",
            Arg::RbLmn => "Rb_lmn",
            Arg::ZbLmn => "Zb_lmn",
            Arg::PL => "p_l",
            Arg::IL => "i_l",
            Arg::CL => "c_l",
            Arg::Psi => "Psi",
        }
    }

    /// Blocks describing the interior geometry (replaced by boundary terms
    /// in the proximal optimization space).
    pub fn is_internal(self) -> bool {
        matches!(self, Arg::RLmn | Arg::ZLmn | Arg::LLmn)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Size of every block for one equilibrium resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    sizes: [usize; ARG_COUNT],
}

impl Dimensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, arg: Arg, size: usize) -> Self {
        self.sizes[arg.index()] = size;
        self
    }

    pub fn get(&self, arg: Arg) -> usize {
        self.sizes[arg.index()]
    }
}

/// Owned coefficient blocks keyed by argument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateBlocks {
    blocks: BTreeMap<Arg, Array1<f64>>,
}

impl StateBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, arg: Arg, values: Array1<f64>) {
        self.blocks.insert(arg, values);
    }

    pub fn get(&self, arg: Arg) -> Option<&Array1<f64>> {
        self.blocks.get(&arg)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arg, &Array1<f64>)> {
        self.blocks.iter()
    }
}

/// Ordered, disjoint set of blocks forming one state vector.
#[derive(Debug, Clone, PartialEq)]
pub struct StateLayout {
    args: Vec<Arg>,
    sizes: Vec<usize>,
    offsets: Vec<usize>,
    dim: usize,
}

impl StateLayout {
    /// Layout over `args` (duplicates dropped, sorted by [`ARG_ORDER`]).
    pub fn new(args: &[Arg], dims: &Dimensions) -> Self {
        let mut ordered: Vec<Arg> = ARG_ORDER
            .iter()
            .copied()
            .filter(|a| args.contains(a))
            .collect();
        ordered.dedup();
        let sizes: Vec<usize> = ordered.iter().map(|&a| dims.get(a)).collect();
        let mut offsets = Vec::with_capacity(sizes.len());
        let mut dim = 0;
        for &n in &sizes {
            offsets.push(dim);
            dim += n;
        }
        StateLayout {
            args: ordered,
            sizes,
            offsets,
            dim,
        }
    }

    /// Smallest layout containing the blocks of both layouts.
    pub fn union(&self, other: &StateLayout) -> FusionResult<Self> {
        let mut dims = Dimensions::new();
        for layout in [self, other] {
            for (i, &arg) in layout.args.iter().enumerate() {
                let size = layout.sizes[i];
                let known = dims.get(arg);
                if known != 0 && known != size {
                    return Err(FusionError::DimensionMismatch {
                        context: format!("layout union for block {arg}"),
                        expected: known,
                        got: size,
                    });
                }
                dims = dims.with(arg, size);
            }
        }
        let mut args = self.args.clone();
        args.extend(other.args.iter().copied());
        Ok(StateLayout::new(&args, &dims))
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn contains(&self, arg: Arg) -> bool {
        self.position(arg).is_some()
    }

    pub fn size(&self, arg: Arg) -> usize {
        self.position(arg).map_or(0, |i| self.sizes[i])
    }

    pub fn dimensions(&self) -> Dimensions {
        self.args
            .iter()
            .zip(&self.sizes)
            .fold(Dimensions::new(), |d, (&a, &n)| d.with(a, n))
    }

    /// Index range of `arg` inside a packed vector.
    pub fn range(&self, arg: Arg) -> Option<Range<usize>> {
        self.position(arg)
            .map(|i| self.offsets[i]..self.offsets[i] + self.sizes[i])
    }

    fn position(&self, arg: Arg) -> Option<usize> {
        self.args.iter().position(|&a| a == arg)
    }

    fn check_len(&self, len: usize, context: &str) -> FusionResult<()> {
        if len != self.dim {
            return Err(FusionError::DimensionMismatch {
                context: context.to_string(),
                expected: self.dim,
                got: len,
            });
        }
        Ok(())
    }

    /// Borrow block `arg` of `x`. Absent blocks yield an empty view.
    pub fn block<'a>(&self, x: &'a Array1<f64>, arg: Arg) -> ArrayView1<'a, f64> {
        match self.range(arg) {
            Some(r) => x.slice(s![r]),
            None => x.slice(s![0..0]),
        }
    }

    pub fn pack(&self, blocks: &StateBlocks) -> FusionResult<Array1<f64>> {
        let mut x = Array1::zeros(self.dim);
        for (i, &arg) in self.args.iter().enumerate() {
            let values = blocks.get(arg).ok_or_else(|| {
                FusionError::ConfigError(format!("state block {arg} is missing"))
            })?;
            if values.len() != self.sizes[i] {
                return Err(FusionError::DimensionMismatch {
                    context: format!("packing block {arg}"),
                    expected: self.sizes[i],
                    got: values.len(),
                });
            }
            let off = self.offsets[i];
            x.slice_mut(s![off..off + self.sizes[i]]).assign(values);
        }
        Ok(x)
    }

    pub fn unpack(&self, x: &Array1<f64>) -> FusionResult<StateBlocks> {
        self.check_len(x.len(), "unpacking state vector")?;
        let mut blocks = StateBlocks::new();
        for &arg in &self.args {
            blocks.insert(arg, self.block(x, arg).to_owned());
        }
        Ok(blocks)
    }

    /// Pick this layout's blocks out of `x`, which is packed with `from`.
    pub fn restrict(&self, x: &Array1<f64>, from: &StateLayout) -> FusionResult<Array1<f64>> {
        from.check_len(x.len(), "restricting state vector")?;
        let mut out = Array1::zeros(self.dim);
        for (i, &arg) in self.args.iter().enumerate() {
            let src = from.range(arg).ok_or_else(|| {
                FusionError::ConfigError(format!("block {arg} absent from source layout"))
            })?;
            let off = self.offsets[i];
            out.slice_mut(s![off..off + self.sizes[i]])
                .assign(&x.slice(s![src]));
        }
        Ok(out)
    }

    /// Re-index the columns of a Jacobian taken w.r.t. `from` onto this
    /// layout. Blocks of this layout absent from `from` get zero columns.
    pub fn align_columns(&self, jac: &Array2<f64>, from: &StateLayout) -> FusionResult<Array2<f64>> {
        from.check_len(jac.ncols(), "aligning jacobian columns")?;
        let mut out = Array2::zeros((jac.nrows(), self.dim));
        for &arg in from.args() {
            let dst = self.range(arg).ok_or_else(|| {
                FusionError::ConfigError(format!("block {arg} absent from target layout"))
            })?;
            let src = from.range(arg).unwrap_or(0..0);
            out.slice_mut(s![.., dst]).assign(&jac.slice(s![.., src]));
        }
        Ok(out)
    }

    /// Absolute indices of block `arg` inside a packed vector.
    pub fn indices(&self, arg: Arg) -> Vec<usize> {
        self.range(arg).map(|r| r.collect()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Dimensions {
        Dimensions::new()
            .with(Arg::RLmn, 3)
            .with(Arg::ZLmn, 3)
            .with(Arg::LLmn, 2)
            .with(Arg::Psi, 1)
    }

    #[test]
    fn test_layout_sorts_by_global_order() {
        let layout = StateLayout::new(&[Arg::Psi, Arg::ZLmn, Arg::RLmn], &dims());
        assert_eq!(layout.args(), &[Arg::RLmn, Arg::ZLmn, Arg::Psi]);
        assert_eq!(layout.dim(), 7);
        assert_eq!(layout.range(Arg::Psi), Some(6..7));
    }

    #[test]
    fn test_pack_unpack() {
        let layout = StateLayout::new(&[Arg::RLmn, Arg::Psi], &dims());
        let mut blocks = StateBlocks::new();
        blocks.insert(Arg::RLmn, Array1::from(vec![1.0, 2.0, 3.0]));
        blocks.insert(Arg::Psi, Array1::from(vec![0.5]));
        let x = layout.pack(&blocks).unwrap();
        assert_eq!(x.to_vec(), vec![1.0, 2.0, 3.0, 0.5]);
        assert_eq!(layout.unpack(&x).unwrap(), blocks);
    }

    #[test]
    fn test_pack_rejects_wrong_block_size() {
        let layout = StateLayout::new(&[Arg::RLmn], &dims());
        let mut blocks = StateBlocks::new();
        blocks.insert(Arg::RLmn, Array1::zeros(2));
        assert!(layout.pack(&blocks).is_err());
    }

    #[test]
    fn test_restrict_and_align() {
        let full = StateLayout::new(&[Arg::RLmn, Arg::ZLmn, Arg::Psi], &dims());
        let sub = StateLayout::new(&[Arg::ZLmn], &dims());
        let x = Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(sub.restrict(&x, &full).unwrap().to_vec(), vec![4.0, 5.0, 6.0]);

        let jac = Array2::from_shape_vec((1, 3), vec![1.0, 2.0, 3.0]).unwrap();
        let aligned = full.align_columns(&jac, &sub).unwrap();
        assert_eq!(aligned.row(0).to_vec(), vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_union_rejects_conflicting_sizes() {
        let a = StateLayout::new(&[Arg::RLmn], &dims());
        let b = StateLayout::new(&[Arg::RLmn], &Dimensions::new().with(Arg::RLmn, 5));
        assert!(a.union(&b).is_err());
    }
}
