//! Integer connectivity maps over a tensor collection.
//!
//! A [`Map`] is a list of rows of row-indices into some owning tensor
//! collection — triangles (arity 3), edges (arity 2), single-vertex
//! markers (arity 1) — together with optional per-row fields (a normal
//! per face, a weight per edge, ...). A [`Maps`] container groups one
//! `Map` per arity, ordered by arity.
//!
//! References are plain integers, not pointers: a map knows nothing about
//! the collection it indexes. Keeping the references valid across
//! structural operations is the job of
//! [`TensorMaps`][crate::tensor_maps::TensorMaps].
//!
//! Maps are strict about their integer nature: building one from float
//! data demands exactly integral, non-negative values and fails
//! otherwise, rather than truncating silently.

use std::collections::BTreeMap;
use itertools::Itertools;
use ndarray as nd;
use nd::{ Array2, ArrayD, Axis };
use thiserror::Error;
use crate::{
    fields::{ Fields, FieldsError },
    tensors::{ EqOpts, Template, TensorError, Tensors },
};

#[derive(Debug, Error)]
pub enum MapsError {
    /// Returned when building a map from float data holding a value that
    /// is not an exact non-negative integer.
    #[error("map entry {value} is not an exact non-negative integer")]
    NonIntegralEntry { value: f64 },

    /// Returned when a map's column count does not match the demanded
    /// arity, or when operands of a map merge differ in arity.
    #[error("arity mismatch: {got} given, {expected} demanded")]
    ArityMismatch { expected: usize, got: usize },

    /// Returned when a map references a row index outside its owning
    /// collection.
    #[error("map reference {index} out of range for {len} tensors")]
    DanglingReference { index: usize, len: usize },

    /// Returned when an operation addresses an arity with no map present.
    #[error("no map of arity {arity}")]
    MissingArity { arity: usize },

    /// Returned by anything involving an operation on the level of the
    /// attached fields.
    #[error("fields error: {0}")]
    Fields(#[from] FieldsError),
}
use MapsError::*;
pub type MapsResult<T> = Result<T, MapsError>;

impl From<TensorError> for MapsError {
    fn from(err: TensorError) -> Self {
        Self::Fields(FieldsError::Tensor(err))
    }
}

/// One arity of connectivity: rows of row-indices plus per-row fields.
#[derive(Clone, Debug)]
pub struct Map {
    rows: Array2<usize>,
    fields: Fields,
}

impl Map {
    /// Create a new map from an index array and per-row fields.
    ///
    /// Every field must have exactly one row per map row.
    pub fn new(rows: Array2<usize>, fields: Vec<Tensors>) -> MapsResult<Self> {
        let n = rows.nrows();
        if let Some(bad) = fields.iter().find(|f| f.len() != n) {
            return Err(FieldsError::RigidLength {
                base: n, field: bad.len() }.into());
        }
        Ok(Self { rows, fields: Fields::new(fields) })
    }

    /// Create a new map from a list of equal-length index rows, without
    /// fields.
    ///
    /// Fails on empty input, where the arity cannot be inferred; use
    /// [`empty`][Self::empty] for that.
    pub fn from_rows(rows: Vec<Vec<usize>>) -> MapsResult<Self> {
        let arity = match rows.first() {
            Some(first) => first.len(),
            None => {
                return Err(TensorError::EmptyNoDim.into());
            },
        };
        if let Some(bad) = rows.iter().find(|r| r.len() != arity) {
            return Err(ArityMismatch { expected: arity, got: bad.len() });
        }
        let n = rows.len();
        let flat: Vec<usize> = rows.into_iter().flatten().collect();
        let rows = Array2::from_shape_vec((n, arity), flat)
            .expect("row-major construction from checked lengths");
        Self::new(rows, Vec::new())
    }

    /// Create an empty map of the given arity.
    pub fn empty(arity: usize) -> Self {
        Self {
            rows: Array2::zeros((0, arity)),
            fields: Fields::default(),
        }
    }

    /// Create a new map from float data, demanding that every value is an
    /// exact non-negative integer.
    pub fn try_from_data(data: &ArrayD<f64>, fields: Vec<Tensors>)
        -> MapsResult<Self>
    {
        let shape = data.shape();
        if shape.len() != 2 {
            return Err(TensorError::UnsupportedRank {
                rank: shape.len().saturating_sub(1) }.into());
        }
        let mut flat: Vec<usize> = Vec::with_capacity(data.len());
        for &value in data.iter() {
            if value.fract() != 0.0 || value < 0.0 || !value.is_finite() {
                return Err(NonIntegralEntry { value });
            }
            flat.push(value as usize);
        }
        let rows = Array2::from_shape_vec((shape[0], shape[1]), flat)
            .expect("row-major construction from source shape");
        Self::new(rows, fields)
    }

    /// Number of index columns per row.
    pub fn arity(&self) -> usize { self.rows.ncols() }

    /// Number of rows.
    pub fn len(&self) -> usize { self.rows.nrows() }

    /// Return `true` if the map has no rows.
    pub fn is_empty(&self) -> bool { self.rows.nrows() == 0 }

    /// Borrow the index array.
    pub fn rows(&self) -> &Array2<usize> { &self.rows }

    /// Borrow the attached fields.
    pub fn fields(&self) -> &Fields { &self.fields }

    /// Iterate over all referenced row indices, in row-major order.
    pub fn values(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.iter().copied()
    }

    /// The largest referenced row index, if any rows exist.
    pub fn max_ref(&self) -> Option<usize> { self.values().max() }

    /// Return the map rows at the given indices, fields included.
    pub fn select(&self, indices: &[usize]) -> MapsResult<Self> {
        let n = self.len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= n) {
            return Err(TensorError::IndexOutOfRange {
                index: bad, len: n }.into());
        }
        Ok(Self {
            rows: self.rows.select(Axis(0), indices),
            fields: self.fields.select(indices)?,
        })
    }

    /// Return a copy with every reference shifted up by `offset`.
    pub fn offset(&self, offset: usize) -> Self {
        Self {
            rows: self.rows.mapv(|v| v + offset),
            fields: self.fields.clone(),
        }
    }

    /// Return a copy with every reference passed through `f`.
    pub fn mapped_refs<F>(&self, f: F) -> Self
    where F: Fn(usize) -> usize
    {
        Self {
            rows: self.rows.mapv(|v| f(v)),
            fields: self.fields.clone(),
        }
    }

    // fallible variant of mapped_refs, for lookup-table renumbering
    pub(crate) fn renumbered<F>(&self, f: F) -> MapsResult<Self>
    where F: Fn(usize) -> MapsResult<usize>
    {
        let mut flat: Vec<usize> = Vec::with_capacity(self.rows.len());
        for v in self.values() {
            flat.push(f(v)?);
        }
        let rows =
            Array2::from_shape_vec((self.rows.nrows(), self.rows.ncols()), flat)
            .expect("row-major reconstruction from source shape");
        Ok(Self { rows, fields: self.fields.clone() })
    }

    // crate-internal constructor skipping the rigid check, for operations
    // that preserve it structurally
    pub(crate) fn from_parts(rows: Array2<usize>, fields: Fields) -> Self {
        Self { rows, fields }
    }

    /// Merge several maps of one arity by concatenating rows, merging
    /// each field index-wise.
    ///
    /// References are concatenated as-is; apply [`offset`][Self::offset]
    /// beforehand when the owning collections are being concatenated too.
    /// All operands must share the arity and the number of fields.
    pub fn merged(maps: &[Self]) -> MapsResult<Self> {
        Self::merged_impl(maps).map(|(inst, _)| inst)
    }

    /// Like [`merged`][Self::merged], but also return one [`Template`]
    /// per operand recording where its rows landed in the result.
    pub fn merged_with_templates(maps: &[Self])
        -> MapsResult<(Self, Vec<Template>)>
    {
        Self::merged_impl(maps)
    }

    fn merged_impl(maps: &[Self]) -> MapsResult<(Self, Vec<Template>)> {
        if maps.is_empty() {
            return Err(TensorError::NothingToMerge.into());
        }
        let arity = maps[0].arity();
        if let Some(bad) = maps.iter().find(|m| m.arity() != arity) {
            return Err(ArityMismatch { expected: arity, got: bad.arity() });
        }
        let n_fields = maps[0].fields.len();
        if let Some(bad) = maps.iter().find(|m| m.fields.len() != n_fields) {
            return Err(FieldsError::FieldCountMismatch {
                expected: n_fields, got: bad.fields.len() }.into());
        }

        let views: Vec<_> = maps.iter().map(|m| m.rows.view()).collect();
        let rows = nd::concatenate(Axis(0), &views)
            .expect("operands share arity");

        let mut fields: Vec<Tensors> = Vec::with_capacity(n_fields);
        for k in 0..n_fields {
            let parts: Vec<Tensors> = maps.iter()
                .map(|m| m.fields[k].clone())
                .collect();
            fields.push(Tensors::merged(&parts, None)
                .map_err(FieldsError::from)?);
        }

        let mut templates: Vec<Template> = Vec::with_capacity(maps.len());
        let mut cum = 0;
        for m in maps.iter() {
            templates.push(Template::new((cum .. cum + m.len()).collect()));
            cum += m.len();
        }

        let inst = Self { rows, fields: Fields::new(fields) };
        Ok((inst, templates))
    }

    /// Test whether `self` has the same rows and fields as `other`.
    pub fn equal(&self, other: &Self) -> bool {
        self.equal_opts(other, EqOpts::exact())
    }

    /// [`equal`][Self::equal] with explicit comparison options applied to
    /// the fields (references always compare exactly).
    pub fn equal_opts(&self, other: &Self, opts: EqOpts) -> bool {
        self.rows == other.rows
            && self.fields.len() == other.fields.len()
            && self.fields.iter().zip(other.fields.iter())
                .all(|(a, b)| a.equal_opts(b, opts))
    }
}

/// Connectivity maps grouped by arity, ordered by arity.
#[derive(Clone, Debug, Default)]
pub struct Maps(BTreeMap<usize, Map>);

impl Maps {
    /// Create a new, empty container.
    pub fn new() -> Self { Self::default() }

    /// Create a container from a list of maps, keyed by their arities.
    ///
    /// When two maps share an arity the later one wins, mirroring plain
    /// keyed insertion.
    pub fn from_maps<I>(maps: I) -> Self
    where I: IntoIterator<Item = Map>
    {
        let mut new = Self::new();
        for map in maps.into_iter() {
            new.insert(map);
        }
        new
    }

    /// Create a container from `(arity, map)` pairs, demanding that each
    /// arity matches its map's column count.
    pub fn from_pairs<I>(pairs: I) -> MapsResult<Self>
    where I: IntoIterator<Item = (usize, Map)>
    {
        let mut new = Self::new();
        for (arity, map) in pairs.into_iter() {
            new.insert_at(arity, map)?;
        }
        Ok(new)
    }

    /// Insert a map under its own arity, returning any previous entry.
    pub fn insert(&mut self, map: Map) -> Option<Map> {
        self.0.insert(map.arity(), map)
    }

    /// Insert a map under an explicit arity, demanding that it matches
    /// the map's column count.
    pub fn insert_at(&mut self, arity: usize, map: Map)
        -> MapsResult<Option<Map>>
    {
        if map.arity() != arity {
            return Err(ArityMismatch { expected: arity, got: map.arity() });
        }
        Ok(self.0.insert(arity, map))
    }

    /// Number of arities present.
    pub fn len(&self) -> usize { self.0.len() }

    /// Return `true` if no maps are present.
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn get(&self, arity: usize) -> Option<&Map> { self.0.get(&arity) }

    pub fn get_mut(&mut self, arity: usize) -> Option<&mut Map> {
        self.0.get_mut(&arity)
    }

    pub fn remove(&mut self, arity: usize) -> Option<Map> {
        self.0.remove(&arity)
    }

    /// Iterate over `(arity, map)` pairs in ascending arity order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Map)> {
        self.0.iter().map(|(&arity, map)| (arity, map))
    }

    /// The arities present, ascending.
    pub fn arities(&self) -> Vec<usize> { self.0.keys().copied().collect() }

    /// The largest row index referenced by any map, if any.
    pub fn max_ref(&self) -> Option<usize> {
        self.0.values().filter_map(Map::max_ref).max()
    }

    /// Test whether `self` has the same arities with equal maps as
    /// `other`.
    pub fn equal(&self, other: &Self) -> bool {
        self.equal_opts(other, EqOpts::exact())
    }

    /// [`equal`][Self::equal] with explicit comparison options.
    pub fn equal_opts(&self, other: &Self, opts: EqOpts) -> bool {
        if !self.arities().iter().eq(other.arities().iter()) {
            return false;
        }
        self.iter()
            .all(|(arity, map)| {
                other.get(arity)
                    .map(|o| map.equal_opts(o, opts))
                    .unwrap_or(false)
            })
    }
}

impl FromIterator<Map> for Maps {
    fn from_iter<I>(iter: I) -> Self
    where I: IntoIterator<Item = Map>
    {
        Self::from_maps(iter)
    }
}

impl<'a> IntoIterator for &'a Maps {
    type Item = (usize, &'a Map);
    type IntoIter = std::vec::IntoIter<(usize, &'a Map)>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().collect_vec().into_iter()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use super::*;

    #[test]
    fn from_rows_infers_arity() {
        let map = Map::from_rows(vec![vec![0, 1, 2], vec![0, 1, 3]]).unwrap();
        assert_eq!(map.arity(), 3);
        assert_eq!(map.len(), 2);
        assert_eq!(map.max_ref(), Some(3));

        let res = Map::from_rows(vec![vec![0, 1, 2], vec![0, 1]]);
        assert!(matches!(res, Err(MapsError::ArityMismatch { .. })));
    }

    #[test]
    fn float_construction_is_strict() {
        let good = Map::try_from_data(
            &array![[0.0, 1.0], [2.0, 3.0]].into_dyn(), Vec::new());
        assert_eq!(good.unwrap().arity(), 2);

        let res = Map::try_from_data(
            &array![[0.0, 1.5]].into_dyn(), Vec::new());
        assert!(matches!(res, Err(MapsError::NonIntegralEntry { .. })));

        let res = Map::try_from_data(
            &array![[0.0, -1.0]].into_dyn(), Vec::new());
        assert!(matches!(res, Err(MapsError::NonIntegralEntry { .. })));
    }

    #[test]
    fn fields_follow_row_selection() {
        let map = Map::new(
            array![[0, 1, 2], [0, 1, 3], [2, 3, 4]],
            vec![Tensors::from_rows(vec![
                vec![1.0, 2.0],
                vec![3.0, 4.0],
                vec![5.0, 6.0],
            ]).unwrap()],
        ).unwrap();
        let picked = map.select(&[2]).unwrap();
        assert_eq!(picked.rows(), &array![[2, 3, 4]]);
        assert!(picked.fields()[0].equal(
            &Tensors::from_rows(vec![vec![5.0, 6.0]]).unwrap()));
    }

    #[test]
    fn rigid_map_fields() {
        let res = Map::new(
            array![[0, 1], [1, 2]],
            vec![Tensors::from_vec(vec![1.0]).unwrap()],
        );
        assert!(matches!(
            res,
            Err(MapsError::Fields(FieldsError::RigidLength { .. })),
        ));
    }

    #[test]
    fn insert_at_demands_matching_arity() {
        let mut maps = Maps::new();
        let map = Map::from_rows(vec![vec![0, 1]]).unwrap();
        let res = maps.insert_at(3, map.clone());
        assert!(matches!(
            res,
            Err(MapsError::ArityMismatch { expected: 3, got: 2 }),
        ));
        maps.insert_at(2, map).unwrap();
        assert_eq!(maps.arities(), vec![2]);
    }

    #[test]
    fn maps_equality_demands_same_arities() {
        let mut a = Maps::new();
        a.insert(Map::from_rows(vec![vec![0, 1, 2]]).unwrap());
        let mut b = a.clone();
        assert!(a.equal(&b));
        b.insert(Map::from_rows(vec![vec![0]]).unwrap());
        assert!(!a.equal(&b));
    }

    #[test]
    fn merged_concatenates_rows_and_fields() {
        let a = Map::new(
            array![[0, 1, 2]],
            vec![Tensors::from_vec(vec![42.0]).unwrap()],
        ).unwrap();
        let b = Map::new(
            array![[3, 4, 5], [0, 4, 5]],
            vec![Tensors::from_vec(vec![21.0, 7.0]).unwrap()],
        ).unwrap();
        let (merged, templates) =
            Map::merged_with_templates(&[a, b]).unwrap();
        assert_eq!(merged.rows(), &array![[0, 1, 2], [3, 4, 5], [0, 4, 5]]);
        assert!(merged.fields()[0].equal(
            &Tensors::from_vec(vec![42.0, 21.0, 7.0]).unwrap()));
        assert_eq!(templates[0].indices(), &[0]);
        assert_eq!(templates[1].indices(), &[1, 2]);
    }
}
