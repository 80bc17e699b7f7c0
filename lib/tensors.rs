//! Sets of tensors sharing one coordinate basis.
//!
//! A [`Tensors`] value is an n-dimensional numeric array of shape
//! `(n, d, d, ...)` whose leading axis runs over individual tensors: each
//! of the `n` rows is one rank-`r` tensor with `r` equal to the number of
//! trailing axes. The whole collection carries a [`CoordSys`] tag naming
//! the basis its components are expressed in, plus an optional free-form
//! name.
//!
//! All structural operations (`select`, `mask`, `cut`, `merged`, ...) are
//! pure: they return newly owned values and never alias the parent's
//! storage. The exceptions are [`transform`][Tensors::transform],
//! [`mirror`][Tensors::mirror] and [`to_segment`][Tensors::to_segment],
//! which mutate in place and say so.
//!
//! ```
//! use ndarray::array;
//! use tensor_fields::tensors::Tensors;
//!
//! let vectors = Tensors::new(array![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]])
//!     .unwrap();
//! assert_eq!(vectors.rank(), 1);
//! assert_eq!(vectors.dim(), 3);
//! ```

use std::borrow::Cow;
use itertools::Itertools;
use ndarray as nd;
use nd::{ Array, ArrayD, Axis, Dimension };
use num_traits::Float;
use rustc_hash::FxHashMap;
use thiserror::Error;
use crate::{
    bases::{ self, BasesError, CoordSys },
    expr::CutExpr,
};

#[derive(Debug, Error)]
pub enum TensorError {
    /// Returned when constructing from an array without a leading axis to
    /// run over rows.
    #[error("tensor data needs a leading axis over rows")]
    NoLeadingAxis,

    /// Returned when the trailing axes of the input array do not all share
    /// the manifold dimension.
    #[error("inconsistent dimensions: manifold dimension is {dim}, found trailing axes {found:?}")]
    InconsistentDims { dim: usize, found: Vec<usize> },

    /// Returned when a demanded manifold dimension does not match the
    /// data, or when operands of an operation differ in dimension.
    #[error("incorrect dimension: {got} given, {expected} demanded")]
    DimMismatch { expected: usize, got: usize },

    /// Returned when operands of an operation differ in rank.
    #[error("incorrect rank: {got} given, {expected} demanded")]
    RankMismatch { expected: usize, got: usize },

    /// Returned when constructing from an empty, shape-less input without
    /// an explicit dimension.
    #[error("empty tensors need an explicit dimension")]
    EmptyNoDim,

    /// Returned when merging an empty list of operands.
    #[error("nothing to merge")]
    NothingToMerge,

    /// Returned when an expression or mutator refers to a coordinate
    /// component outside the manifold dimension.
    #[error("coordinate component {axis} out of range for dimension {dim}")]
    AxisOutOfRange { axis: usize, dim: usize },

    /// Returned by row lookups that are only defined for rank 0 and 1.
    #[error("operation not supported for rank {rank}")]
    UnsupportedRank { rank: usize },

    /// Returned when a boolean mask has the wrong length.
    #[error("mask length {got} does not match row count {expected}")]
    MaskLength { expected: usize, got: usize },

    /// Returned when a row index is out of range.
    #[error("row index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Returned by [`Tensors::index`] when a value occurs more than once.
    #[error("multiple occurrences of value ({count} matches)")]
    MultipleMatches { count: usize },

    /// Returned by nearest-neighbour queries against an empty collection.
    #[error("nearest-neighbour query against an empty collection")]
    EmptyQuery,

    /// Returned by anything involving a coordinate transform.
    #[error("bases error: {0}")]
    Bases(#[from] BasesError),
}
use TensorError::*;
pub type TensorResult<T> = Result<T, TensorError>;

/// Return the tensor rank for an array shape (the number of trailing
/// axes).
pub fn rank_of(shape: &[usize]) -> usize { shape.len().saturating_sub(1) }

/// Return the manifold dimension for an array shape (the width of the
/// second axis, or 1 for rank-0 shapes).
pub fn dim_of(shape: &[usize]) -> usize {
    if shape.len() <= 1 { 1 } else { shape[1] }
}

// one-sided closeness: |a - b| <= atol + rtol * |b|
pub(crate) fn isclose<T>(a: T, b: T, rtol: T, atol: T, equal_nan: bool) -> bool
where T: Float
{
    if a.is_nan() || b.is_nan() {
        return equal_nan && a.is_nan() && b.is_nan();
    }
    if a.is_infinite() || b.is_infinite() { return a == b; }
    (a - b).abs() <= atol + rtol * b.abs()
}

/// Element-comparison options shared by the `equal` family.
///
/// With both tolerances unset the comparison is exact; otherwise an unset
/// tolerance counts as zero and closeness follows `isclose` semantics.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EqOpts {
    pub rtol: Option<f64>,
    pub atol: Option<f64>,
    pub equal_nan: bool,
}

impl EqOpts {
    /// Exact element equality.
    pub fn exact() -> Self { Self::default() }

    /// Tolerance-based comparison with the given relative and absolute
    /// tolerances.
    pub fn close(rtol: f64, atol: f64) -> Self {
        Self { rtol: Some(rtol), atol: Some(atol), equal_nan: false }
    }

    pub(crate) fn elem_eq(&self, a: f64, b: f64) -> bool {
        match (self.rtol, self.atol) {
            (None, None) =>
                a == b || (self.equal_nan && a.is_nan() && b.is_nan()),
            (rtol, atol) => isclose(
                a, b,
                rtol.unwrap_or(0.0), atol.unwrap_or(0.0),
                self.equal_nan,
            ),
        }
    }
}

/// Record of which rows of a source object ended up where, produced by
/// the merge and cut operations.
///
/// `indices[k]` is the row, in the object the template applies to, holding
/// the `k`-th row of the original source. Replaying a template via
/// [`Tensors::cut_template`] therefore reconstructs the source slice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Template {
    indices: Vec<usize>,
}

impl Template {
    pub fn new(indices: Vec<usize>) -> Self { Self { indices } }

    pub fn indices(&self) -> &[usize] { &self.indices }

    pub fn len(&self) -> usize { self.indices.len() }

    pub fn is_empty(&self) -> bool { self.indices.is_empty() }
}

impl From<Vec<usize>> for Template {
    fn from(indices: Vec<usize>) -> Self { Self { indices } }
}

/// An n-dimensional numeric array with a coordinate-system tag and a
/// name.
///
/// See the [module docs][self] for the shape conventions.
#[derive(Clone, Debug)]
pub struct Tensors {
    data: ArrayD<f64>,
    coord_sys: CoordSys,
    name: Option<String>,
}

impl Tensors {
    /// Create a new collection from an array of shape `(n, d, d, ...)`.
    ///
    /// Fails if the array has no leading axis or its trailing axes do not
    /// all share one dimension. The coordinate system defaults to
    /// cartesian; use [`with_coord_sys`][Self::with_coord_sys] to tag the
    /// raw components differently.
    pub fn new<D>(data: Array<f64, D>) -> TensorResult<Self>
    where D: Dimension
    {
        let data = data.into_dyn();
        if data.ndim() == 0 { return Err(NoLeadingAxis); }
        let shape = data.shape();
        let dim = dim_of(shape);
        if shape[1..].iter().any(|&d| d != dim) {
            return Err(InconsistentDims { dim, found: shape[1..].to_vec() });
        }
        Ok(Self { data, coord_sys: CoordSys::default(), name: None })
    }

    /// Like [`new`][Self::new], but additionally demand a manifold
    /// dimension.
    pub fn with_dim<D>(data: Array<f64, D>, dim: usize) -> TensorResult<Self>
    where D: Dimension
    {
        let new = Self::new(data)?;
        if new.dim() != dim {
            return Err(DimMismatch { expected: dim, got: new.dim() });
        }
        Ok(new)
    }

    /// Create a rank-0 collection (one scalar per row) from a vector of
    /// values.
    ///
    /// Fails on empty input, where the rank cannot be told apart from an
    /// empty rank-1 collection; use [`empty`][Self::empty] for those.
    pub fn from_vec(values: Vec<f64>) -> TensorResult<Self> {
        if values.is_empty() { return Err(EmptyNoDim); }
        Self::new(nd::Array1::from_vec(values))
    }

    /// Create a rank-1 collection from a list of equal-length rows.
    ///
    /// Fails on empty or ragged input.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> TensorResult<Self> {
        if rows.is_empty() { return Err(EmptyNoDim); }
        let dim = rows[0].len();
        if let Some(bad) = rows.iter().find(|r| r.len() != dim) {
            return Err(InconsistentDims { dim, found: vec![bad.len()] });
        }
        let n = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let data = nd::Array2::from_shape_vec((n, dim), flat)
            .expect("row-major construction from checked lengths");
        Self::new(data)
    }

    /// Create an empty rank-1 collection with an explicit manifold
    /// dimension.
    pub fn empty(dim: usize) -> Self {
        Self {
            data: ArrayD::zeros(nd::IxDyn(&[0, dim])),
            coord_sys: CoordSys::default(),
            name: None,
        }
    }

    /// Tag the raw components with a coordinate system (no data change).
    pub fn with_coord_sys(mut self, coord_sys: CoordSys) -> Self {
        self.coord_sys = coord_sys;
        self
    }

    /// Attach a name.
    pub fn with_name<S>(mut self, name: S) -> Self
    where S: Into<String>
    {
        self.name = Some(name.into());
        self
    }

    /// Number of rows (tensors) in the collection.
    pub fn len(&self) -> usize { self.data.shape()[0] }

    /// Return `true` if the collection has no rows.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Tensor rank: the number of trailing axes.
    pub fn rank(&self) -> usize { rank_of(self.data.shape()) }

    /// Manifold dimension: the width of the second axis, or 1 for rank 0.
    pub fn dim(&self) -> usize { dim_of(self.data.shape()) }

    /// Full array shape, leading axis included.
    pub fn shape(&self) -> &[usize] { self.data.shape() }

    /// The coordinate system the components are expressed in.
    pub fn coord_sys(&self) -> CoordSys { self.coord_sys }

    /// The attached name, if any.
    pub fn name(&self) -> Option<&str> { self.name.as_deref() }

    /// Replace the attached name.
    pub fn set_name<S>(&mut self, name: Option<S>)
    where S: Into<String>
    {
        self.name = name.map(S::into);
    }

    /// Borrow the underlying array.
    pub fn data(&self) -> &ArrayD<f64> { &self.data }

    /// Consume the collection, returning the bare array.
    pub fn into_data(self) -> ArrayD<f64> { self.data }

    // all components of row i, flattened
    pub(crate) fn row_components(&self, i: usize) -> Vec<f64> {
        if self.rank() == 0 {
            vec![self.data[[i]]]
        } else {
            self.data.index_axis(Axis(0), i).iter().copied().collect()
        }
    }

    /// Convert the components in place to another coordinate system.
    ///
    /// A pure tag update when the collection is rank 0 or empty; a no-op
    /// when the tag already matches. This mutates `self`; see
    /// [`transformed`][Self::transformed] for the pure variant.
    pub fn transform(&mut self, coord_sys: CoordSys) -> TensorResult<()> {
        if self.rank() == 0 || self.is_empty() {
            self.coord_sys = coord_sys;
            return Ok(());
        }
        if self.coord_sys == coord_sys { return Ok(()); }
        bases::transform_array(&mut self.data, self.coord_sys, coord_sys)?;
        self.coord_sys = coord_sys;
        Ok(())
    }

    /// Return a copy of `self` expressed in another coordinate system.
    pub fn transformed(&self, coord_sys: CoordSys) -> TensorResult<Self> {
        let mut new = self.clone();
        new.transform(coord_sys)?;
        Ok(new)
    }

    /// Return the rows at the given indices, in order, as a new
    /// collection. Indices may repeat.
    pub fn select(&self, indices: &[usize]) -> TensorResult<Self> {
        let n = self.len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= n) {
            return Err(IndexOutOfRange { index: bad, len: n });
        }
        Ok(Self {
            data: self.data.select(Axis(0), indices),
            coord_sys: self.coord_sys,
            name: self.name.clone(),
        })
    }

    /// Return the rows flagged `true` in `keep` as a new collection.
    pub fn mask(&self, keep: &[bool]) -> TensorResult<Self> {
        if keep.len() != self.len() {
            return Err(MaskLength { expected: self.len(), got: keep.len() });
        }
        let indices: Vec<usize> =
            keep.iter().copied().positions(|b| b).collect();
        self.select(&indices)
    }

    /// Return the contiguous row range `lo .. hi` as a new collection.
    pub fn slice_rows(&self, lo: usize, hi: usize) -> TensorResult<Self> {
        if hi > self.len() {
            return Err(IndexOutOfRange { index: hi, len: self.len() });
        }
        let indices: Vec<usize> = (lo..hi).collect();
        self.select(&indices)
    }

    /// Overwrite the rows at `indices` with the rows of `src`, in order.
    ///
    /// `src` is converted into `self`'s coordinate system first. This
    /// mutates `self`.
    pub fn set_rows(&mut self, indices: &[usize], src: &Self)
        -> TensorResult<()>
    {
        if src.rank() != self.rank() {
            return Err(RankMismatch { expected: self.rank(), got: src.rank() });
        }
        if src.dim() != self.dim() {
            return Err(DimMismatch { expected: self.dim(), got: src.dim() });
        }
        if indices.len() != src.len() {
            return Err(MaskLength { expected: src.len(), got: indices.len() });
        }
        let n = self.len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= n) {
            return Err(IndexOutOfRange { index: bad, len: n });
        }
        let src = if src.coord_sys == self.coord_sys {
            Cow::Borrowed(src)
        } else {
            Cow::Owned(src.transformed(self.coord_sys)?)
        };
        for (k, &i) in indices.iter().enumerate() {
            self.data.index_axis_mut(Axis(0), i)
                .assign(&src.data.index_axis(Axis(0), k));
        }
        Ok(())
    }

    /// Test whether `self` has the same content as `other`, exactly.
    ///
    /// `other` is compared in `self`'s coordinate system; when its tag
    /// differs and its data cannot be transformed (non-3-dimensional data
    /// carrying a curvilinear tag), the values are incomparable and the
    /// result is `false`. Names are not compared.
    pub fn equal(&self, other: &Self) -> bool {
        self.equal_opts(other, EqOpts::exact())
    }

    /// [`equal`][Self::equal] with explicit comparison options.
    pub fn equal_opts(&self, other: &Self, opts: EqOpts) -> bool {
        self.equal_mask(other, opts)
            .map(|mask| mask.iter().all(|&ok| ok))
            .unwrap_or(false)
    }

    /// Element-wise comparison mask, or `None` when the two collections
    /// are incomparable (different shapes, or an impossible transform).
    pub fn equal_mask(&self, other: &Self, opts: EqOpts)
        -> Option<ArrayD<bool>>
    {
        let other = if other.coord_sys != self.coord_sys {
            Cow::Owned(other.transformed(self.coord_sys).ok()?)
        } else {
            Cow::Borrowed(other)
        };
        if self.shape() != other.shape() { return None; }
        let mask = nd::Zip::from(&self.data).and(&other.data)
            .map_collect(|&a, &b| opts.elem_eq(a, b));
        Some(mask)
    }

    /// Merge several collections into one by concatenating rows.
    ///
    /// The result's coordinate system is `coord_sys` if given, otherwise
    /// the most frequent one among the operands (ties broken by first
    /// encounter). Every operand is copied and transformed into the
    /// resolved system before concatenation. Fails if the operands differ
    /// in rank or manifold dimension, or if there are none.
    pub fn merged(objects: &[Self], coord_sys: Option<CoordSys>)
        -> TensorResult<Self>
    {
        Self::merged_inner(objects, coord_sys).map(|(inst, _)| inst)
    }

    /// Like [`merged`][Self::merged], but also return one [`Template`]
    /// per operand recording where its rows landed in the result.
    pub fn merged_with_templates(
        objects: &[Self],
        coord_sys: Option<CoordSys>,
    ) -> TensorResult<(Self, Vec<Template>)>
    {
        let (inst, cum_lengths) = Self::merged_inner(objects, coord_sys)?;
        let templates = objects.iter().zip(&cum_lengths)
            .map(|(obj, &cum)| {
                Template::new((cum .. cum + obj.len()).collect())
            })
            .collect();
        Ok((inst, templates))
    }

    fn merged_inner(objects: &[Self], coord_sys: Option<CoordSys>)
        -> TensorResult<(Self, Vec<usize>)>
    {
        if objects.is_empty() { return Err(NothingToMerge); }
        let target = coord_sys
            .unwrap_or_else(|| most_frequent_coord_sys(objects));

        let rank = objects[0].rank();
        let dim = objects[0].dim();
        for obj in objects.iter() {
            if obj.rank() != rank {
                return Err(RankMismatch { expected: rank, got: obj.rank() });
            }
            if obj.dim() != dim {
                return Err(DimMismatch { expected: dim, got: obj.dim() });
            }
        }

        let transformed: Vec<Self> = objects.iter()
            .map(|obj| obj.transformed(target))
            .collect::<TensorResult<_>>()?;
        let views: Vec<_> = transformed.iter().map(|t| t.data.view()).collect();
        let data = nd::concatenate(Axis(0), &views)
            .expect("operands share rank and dimension");

        let mut cum_lengths: Vec<usize> = Vec::with_capacity(objects.len());
        let mut cum = 0;
        for obj in objects.iter() {
            cum_lengths.push(cum);
            cum += obj.len();
        }

        let inst = Self { data, coord_sys: target, name: None };
        Ok((inst, cum_lengths))
    }

    /// Evaluate a predicate row-wise, optionally in a temporarily
    /// transformed coordinate system, returning the boolean mask.
    pub fn eval_mask(&self, expr: &CutExpr, coord_sys: Option<CoordSys>)
        -> TensorResult<Vec<bool>>
    {
        let target = coord_sys.unwrap_or(self.coord_sys);
        let view = if target != self.coord_sys {
            Cow::Owned(self.transformed(target)?)
        } else {
            Cow::Borrowed(self)
        };
        let axis = expr.max_axis();
        if axis >= view.dim() {
            return Err(AxisOutOfRange { axis, dim: view.dim() });
        }
        let mask = (0..view.len())
            .map(|i| expr.eval_point(&view.row_components(i)))
            .collect();
        Ok(mask)
    }

    /// Return the subset of rows satisfying `expr`.
    ///
    /// The predicate is evaluated in `coord_sys` when given (the result
    /// stays in `self`'s system either way).
    pub fn cut(&self, expr: &CutExpr, coord_sys: Option<CoordSys>)
        -> TensorResult<Self>
    {
        self.cut_with_template(expr, coord_sys).map(|(inst, _)| inst)
    }

    /// Like [`cut`][Self::cut], but also return the [`Template`] listing
    /// which rows were kept.
    pub fn cut_with_template(
        &self,
        expr: &CutExpr,
        coord_sys: Option<CoordSys>,
    ) -> TensorResult<(Self, Template)>
    {
        let mask = self.eval_mask(expr, coord_sys)?;
        let indices: Vec<usize> =
            mask.iter().copied().positions(|b| b).collect();
        let inst = self.select(&indices)?;
        Ok((inst, Template::new(indices)))
    }

    /// Replay a recorded cut: return the rows the template points at.
    pub fn cut_template(&self, template: &Template) -> TensorResult<Self> {
        self.select(template.indices())
    }

    /// For each row of `self`, return the index of the closest row of
    /// `other` (after transforming `other` into `self`'s system).
    pub fn closest(&self, other: &Self) -> TensorResult<Vec<usize>> {
        if other.is_empty() { return Err(EmptyQuery); }
        if other.rank() != self.rank() {
            return Err(RankMismatch {
                expected: self.rank(), got: other.rank() });
        }
        if other.dim() != self.dim() {
            return Err(DimMismatch { expected: self.dim(), got: other.dim() });
        }
        let other = if other.coord_sys == self.coord_sys {
            Cow::Borrowed(other)
        } else {
            Cow::Owned(other.transformed(self.coord_sys)?)
        };
        let mut result = Vec::with_capacity(self.len());
        for i in 0..self.len() {
            let own = self.row_components(i);
            let mut best = 0_usize;
            let mut best_sq = f64::INFINITY;
            for j in 0..other.len() {
                let sq: f64 = other.row_components(j).iter().zip(&own)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                if sq < best_sq {
                    best = j;
                    best_sq = sq;
                }
            }
            result.push(best);
        }
        Ok(result)
    }

    /// Pairwise Euclidean distances between the rows of `self` and the
    /// rows of `other` (after transforming `other` into `self`'s system).
    pub fn distances(&self, other: &Self) -> TensorResult<nd::Array2<f64>> {
        if other.rank() != self.rank() {
            return Err(RankMismatch {
                expected: self.rank(), got: other.rank() });
        }
        if other.dim() != self.dim() {
            return Err(DimMismatch { expected: self.dim(), got: other.dim() });
        }
        let other = if other.coord_sys == self.coord_sys {
            Cow::Borrowed(other)
        } else {
            Cow::Owned(other.transformed(self.coord_sys)?)
        };
        let (n, m) = (self.len(), other.len());
        let mut dists = nd::Array2::zeros((n, m));
        for i in 0..n {
            let own = self.row_components(i);
            for j in 0..m {
                let sq: f64 = other.row_components(j).iter().zip(&own)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                dists[[i, j]] = sq.sqrt();
            }
        }
        Ok(dists)
    }

    /// Minimal distance from each row to any *other* row of `self`.
    ///
    /// Zero distances are excluded, so exact duplicates do not count as
    /// neighbours of each other; a row with no positive-distance partner
    /// reports infinity.
    pub fn min_dists(&self) -> TensorResult<Vec<f64>> {
        let dists = self.distances(self)?;
        let mins = dists.rows().into_iter()
            .map(|row| {
                row.iter().copied()
                    .filter(|&d| d > 0.0)
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        Ok(mins)
    }

    /// For every row, the indices of all rows within `epsilon` of it
    /// (itself included).
    pub fn epsilon_neighbourhood(&self, epsilon: f64)
        -> TensorResult<Vec<Vec<usize>>>
    {
        let dists = self.distances(self)?;
        let hoods = dists.rows().into_iter()
            .map(|row| {
                row.iter().copied()
                    .positions(|d| d <= epsilon)
                    .collect()
            })
            .collect();
        Ok(hoods)
    }

    /// Return the indices of all rows equal to `tensor`, exactly or
    /// within tolerances.
    ///
    /// `tensor` holds the components of a single row: one value for a
    /// rank-0 collection, `dim` values for rank 1. Higher ranks are not
    /// supported.
    pub fn indices(
        &self,
        tensor: &[f64],
        rtol: Option<f64>,
        atol: Option<f64>,
    ) -> TensorResult<Vec<usize>>
    {
        if self.rank() > 1 {
            return Err(UnsupportedRank { rank: self.rank() });
        }
        if tensor.len() != self.dim() {
            return Err(DimMismatch {
                expected: self.dim(), got: tensor.len() });
        }
        let opts = match (rtol, atol) {
            (None, None) => EqOpts::exact(),
            (r, a) => EqOpts::close(r.unwrap_or(0.0), a.unwrap_or(0.0)),
        };
        let found = (0..self.len())
            .filter(|&i| {
                self.row_components(i).iter().zip(tensor)
                    .all(|(&a, &b)| opts.elem_eq(a, b))
            })
            .collect();
        Ok(found)
    }

    /// Return the index of the single row equal to `tensor`, `None` when
    /// absent, or an error when ambiguous.
    pub fn index(
        &self,
        tensor: &[f64],
        rtol: Option<f64>,
        atol: Option<f64>,
    ) -> TensorResult<Option<usize>>
    {
        let found = self.indices(tensor, rtol, atol)?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(Some(found[0])),
            count => Err(MultipleMatches { count }),
        }
    }

    /// Return `true` if some row equals `tensor` exactly.
    pub fn contains(&self, tensor: &[f64]) -> bool {
        self.indices(tensor, None, None)
            .map(|found| !found.is_empty())
            .unwrap_or(false)
    }

    /// Reflect the given coordinate components at 0, for the rows where
    /// `condition` holds (all rows when `None`). This mutates `self`.
    pub fn mirror(
        &mut self,
        coordinates: &[usize],
        condition: Option<&[bool]>,
    ) -> TensorResult<()>
    {
        let n = self.len();
        if let Some(cond) = condition {
            if cond.len() != n {
                return Err(MaskLength { expected: n, got: cond.len() });
            }
        }
        let dim = self.dim();
        if let Some(&bad) = coordinates.iter().find(|&&c| c >= dim) {
            return Err(AxisOutOfRange { axis: bad, dim });
        }
        let rank0 = self.rank() == 0;
        for i in 0..n {
            if condition.map(|cond| cond[i]).unwrap_or(true) {
                for &c in coordinates {
                    if rank0 {
                        self.data[[i]] = -self.data[[i]];
                    } else {
                        self.data[[i, c]] = -self.data[[i, c]];
                    }
                }
            }
        }
        Ok(())
    }

    /// Map a periodic coordinate into segment `segment` of `num_segments`
    /// equal subdivisions of `periodicity`.
    ///
    /// The mapping is applied in `coord_sys` when given (with the data
    /// transformed there and back). This mutates `self`.
    pub fn to_segment(
        &mut self,
        segment: usize,
        num_segments: usize,
        coordinate: usize,
        periodicity: f64,
        offset: f64,
        coord_sys: Option<CoordSys>,
    ) -> TensorResult<()>
    {
        if segment >= num_segments {
            return Err(IndexOutOfRange { index: segment, len: num_segments });
        }
        if coordinate >= self.dim() {
            return Err(AxisOutOfRange { axis: coordinate, dim: self.dim() });
        }
        let original = self.coord_sys;
        let target = coord_sys.unwrap_or(original);
        self.transform(target)?;
        let seg_len = periodicity / num_segments as f64;
        let shift = offset + segment as f64 * seg_len;
        let rank0 = self.rank() == 0;
        for i in 0..self.len() {
            let v = if rank0 {
                self.data[[i]]
            } else {
                self.data[[i, coordinate]]
            };
            let mapped = (v - offset).rem_euclid(seg_len) + shift;
            if rank0 {
                self.data[[i]] = mapped;
            } else {
                self.data[[i, coordinate]] = mapped;
            }
        }
        self.transform(original)?;
        Ok(())
    }

    /// Build a rank-1 collection as the cartesian product of per-axis
    /// base vectors; the last axis varies fastest.
    pub fn grid(base_vectors: &[Vec<f64>]) -> TensorResult<Self> {
        if base_vectors.is_empty()
            || base_vectors.iter().any(|v| v.is_empty())
        {
            return Err(EmptyNoDim);
        }
        let dim = base_vectors.len();
        let count: usize = base_vectors.iter().map(|v| v.len()).product();
        let mut flat: Vec<f64> = Vec::with_capacity(count * dim);
        let mut cursor = vec![0_usize; dim];
        for _ in 0..count {
            for (axis, &k) in cursor.iter().enumerate() {
                flat.push(base_vectors[axis][k]);
            }
            // odometer increment, last axis fastest
            for axis in (0..dim).rev() {
                cursor[axis] += 1;
                if cursor[axis] < base_vectors[axis].len() { break; }
                cursor[axis] = 0;
            }
        }
        let data = nd::Array2::from_shape_vec((count, dim), flat)
            .expect("row-major construction from counted lengths");
        Self::new(data)
    }
}

// most frequent coord_sys among the operands, ties broken by first
// encounter
fn most_frequent_coord_sys(objects: &[Tensors]) -> CoordSys {
    let mut counts: FxHashMap<CoordSys, usize> = FxHashMap::default();
    for obj in objects.iter() {
        *counts.entry(obj.coord_sys).or_insert(0) += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    objects.iter()
        .map(|obj| obj.coord_sys)
        .find(|cs| counts[cs] == max)
        .unwrap_or_default()
}
