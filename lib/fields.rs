//! Per-row field data attached to a tensor collection.
//!
//! A [`Fields`] value is an ordered sequence of [`Tensors`], each giving
//! one attribute (a scalar weight, a color vector, ...) per row of some
//! owning collection. A [`TensorFields`] bundles the owning collection
//! with its fields and keeps the two in lock-step: every slicing, merging
//! and cutting operation applies the same row selection to the base array
//! and to every field, so row `i` of any field always describes row `i`
//! of the base.
//!
//! By default construction is *rigid*: every field must have exactly as
//! many rows as the base. [`TensorFields::new_loose`] skips that check
//! for the rare uses that want detached lengths; the lock-step operations
//! then demand rigidity again.

use std::ops::Deref;
use thiserror::Error;
use crate::{
    bases::CoordSys,
    expr::CutExpr,
    tensors::{ EqOpts, Template, TensorError, Tensors },
};

#[derive(Debug, Error)]
pub enum FieldsError {
    /// Returned when a field's length does not match the base length
    /// under rigid construction.
    #[error("length of base ({base}) should be the same as the length of all fields (found {field})")]
    RigidLength { base: usize, field: usize },

    /// Returned when operands of a merge or write carry differing numbers
    /// of fields.
    #[error("field count mismatch: {got} given, {expected} demanded")]
    FieldCountMismatch { expected: usize, got: usize },

    /// Returned by anything involving an operation on the level of the
    /// underlying tensors.
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}
use FieldsError::*;
pub type FieldsResult<T> = Result<T, FieldsError>;

/// An ordered sequence of per-row attribute arrays.
#[derive(Clone, Debug, Default)]
pub struct Fields(Vec<Tensors>);

impl Fields {
    /// Create a new sequence from a vector of attribute arrays.
    pub fn new(fields: Vec<Tensors>) -> Self { Self(fields) }

    /// Number of fields (not rows).
    pub fn len(&self) -> usize { self.0.len() }

    /// Return `true` if there are no fields.
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn get(&self, k: usize) -> Option<&Tensors> { self.0.get(k) }

    pub fn iter(&self) -> std::slice::Iter<'_, Tensors> { self.0.iter() }

    pub(crate) fn push(&mut self, field: Tensors) { self.0.push(field); }

    pub(crate) fn get_mut(&mut self, k: usize) -> Option<&mut Tensors> {
        self.0.get_mut(k)
    }

    /// Apply the same row selection to every field.
    pub(crate) fn select(&self, indices: &[usize]) -> FieldsResult<Self> {
        let picked = self.0.iter()
            .map(|field| field.select(indices))
            .collect::<Result<_, _>>()?;
        Ok(Self(picked))
    }
}

impl Deref for Fields {
    type Target = [Tensors];

    fn deref(&self) -> &Self::Target { &self.0 }
}

impl FromIterator<Tensors> for Fields {
    fn from_iter<I>(iter: I) -> Self
    where I: IntoIterator<Item = Tensors>
    {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Fields {
    type Item = Tensors;
    type IntoIter = std::vec::IntoIter<Tensors>;

    fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = &'a Tensors;
    type IntoIter = std::slice::Iter<'a, Tensors>;

    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

/// A tensor collection with attached per-row fields.
///
/// Dereferences to the base [`Tensors`] for read access, so all shape and
/// query methods (`len`, `rank`, `dim`, `coord_sys`, `indices`, ...) are
/// available directly.
#[derive(Clone, Debug)]
pub struct TensorFields {
    tensors: Tensors,
    fields: Fields,
}

impl Deref for TensorFields {
    type Target = Tensors;

    fn deref(&self) -> &Self::Target { &self.tensors }
}

impl From<Tensors> for TensorFields {
    fn from(tensors: Tensors) -> Self {
        Self { tensors, fields: Fields::default() }
    }
}

impl TensorFields {
    /// Create a new collection with fields, demanding that every field
    /// has exactly as many rows as the base.
    pub fn new(tensors: Tensors, fields: Vec<Tensors>)
        -> FieldsResult<Self>
    {
        let base = tensors.len();
        if let Some(bad) = fields.iter().find(|f| f.len() != base) {
            return Err(RigidLength { base, field: bad.len() });
        }
        Ok(Self { tensors, fields: Fields::new(fields) })
    }

    /// Create a new collection without the rigid length check.
    ///
    /// The lock-step operations (`select`, `mask`, `merged`, ...) still
    /// demand matching lengths and will fail on out-of-range rows.
    pub fn new_loose(tensors: Tensors, fields: Vec<Tensors>) -> Self {
        Self { tensors, fields: Fields::new(fields) }
    }

    /// Borrow the base collection.
    pub fn tensors(&self) -> &Tensors { &self.tensors }

    /// Borrow the attached fields.
    pub fn fields(&self) -> &Fields { &self.fields }

    /// Split into the base collection and the fields.
    pub fn into_parts(self) -> (Tensors, Fields) {
        (self.tensors, self.fields)
    }

    /// Attach another field, demanding the rigid length.
    pub fn push_field(&mut self, field: Tensors) -> FieldsResult<()> {
        if field.len() != self.tensors.len() {
            return Err(RigidLength {
                base: self.tensors.len(), field: field.len() });
        }
        self.fields.push(field);
        Ok(())
    }

    /// The names of the attached fields, in order.
    pub fn names(&self) -> Vec<Option<&str>> {
        self.fields.iter().map(|f| f.name()).collect()
    }

    /// Convert the base components in place to another coordinate system.
    ///
    /// Fields carry their own coordinate systems and are left alone. This
    /// mutates `self`.
    pub fn transform(&mut self, coord_sys: CoordSys) -> FieldsResult<()> {
        self.tensors.transform(coord_sys)?;
        Ok(())
    }

    /// Return a copy with the base expressed in another coordinate
    /// system.
    pub fn transformed(&self, coord_sys: CoordSys) -> FieldsResult<Self> {
        let mut new = self.clone();
        new.transform(coord_sys)?;
        Ok(new)
    }

    /// Return the rows at the given indices as a new collection, applying
    /// the same selection to every field.
    pub fn select(&self, indices: &[usize]) -> FieldsResult<Self> {
        Ok(Self {
            tensors: self.tensors.select(indices)?,
            fields: self.fields.select(indices)?,
        })
    }

    /// Return the rows flagged `true` in `keep`, base and fields alike.
    pub fn mask(&self, keep: &[bool]) -> FieldsResult<Self> {
        if keep.len() != self.tensors.len() {
            return Err(FieldsError::Tensor(TensorError::MaskLength {
                expected: self.tensors.len(), got: keep.len() }));
        }
        let indices: Vec<usize> = keep.iter().enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect();
        self.select(&indices)
    }

    /// Return the contiguous row range `lo .. hi`, base and fields alike.
    pub fn slice_rows(&self, lo: usize, hi: usize) -> FieldsResult<Self> {
        let indices: Vec<usize> = (lo..hi).collect();
        self.select(&indices)
    }

    /// Overwrite the rows at `indices` with the rows of `src`, writing
    /// through to every field. This mutates `self`.
    pub fn set_rows(&mut self, indices: &[usize], src: &Self)
        -> FieldsResult<()>
    {
        if src.fields.len() != self.fields.len() {
            return Err(FieldCountMismatch {
                expected: self.fields.len(), got: src.fields.len() });
        }
        self.tensors.set_rows(indices, &src.tensors)?;
        for (k, field) in src.fields.iter().enumerate() {
            self.fields.get_mut(k)
                .expect("field counts checked above")
                .set_rows(indices, field)?;
        }
        Ok(())
    }

    /// Merge several collections by concatenating rows, merging each
    /// field index-wise.
    ///
    /// All operands must carry the same number of fields.
    pub fn merged(objects: &[Self], coord_sys: Option<CoordSys>)
        -> FieldsResult<Self>
    {
        Self::merged_impl(objects, coord_sys, false)
            .map(|(inst, _)| inst)
    }

    /// Like [`merged`][Self::merged], but also return one [`Template`]
    /// per operand recording where its rows landed in the result.
    pub fn merged_with_templates(
        objects: &[Self],
        coord_sys: Option<CoordSys>,
    ) -> FieldsResult<(Self, Vec<Template>)>
    {
        let (inst, templates) = Self::merged_impl(objects, coord_sys, true)?;
        Ok((inst, templates))
    }

    fn merged_impl(
        objects: &[Self],
        coord_sys: Option<CoordSys>,
        return_templates: bool,
    ) -> FieldsResult<(Self, Vec<Template>)>
    {
        if objects.is_empty() {
            return Err(FieldsError::Tensor(TensorError::NothingToMerge));
        }
        let n_fields = objects[0].fields.len();
        if let Some(bad) =
            objects.iter().find(|o| o.fields.len() != n_fields)
        {
            return Err(FieldCountMismatch {
                expected: n_fields, got: bad.fields.len() });
        }

        let bases: Vec<Tensors> =
            objects.iter().map(|o| o.tensors.clone()).collect();
        let (tensors, templates) = if return_templates {
            Tensors::merged_with_templates(&bases, coord_sys)?
        } else {
            (Tensors::merged(&bases, coord_sys)?, Vec::new())
        };

        let mut fields: Vec<Tensors> = Vec::with_capacity(n_fields);
        for k in 0..n_fields {
            let parts: Vec<Tensors> = objects.iter()
                .map(|o| o.fields[k].clone())
                .collect();
            fields.push(Tensors::merged(&parts, None)?);
        }

        let inst = Self { tensors, fields: Fields::new(fields) };
        Ok((inst, templates))
    }

    /// Test whether `self` has the same content as `other`: base equality
    /// and pairwise field equality. Differing field counts compare
    /// not-equal.
    pub fn equal(&self, other: &Self) -> bool {
        self.equal_opts(other, EqOpts::exact())
    }

    /// [`equal`][Self::equal] with explicit comparison options.
    pub fn equal_opts(&self, other: &Self, opts: EqOpts) -> bool {
        self.tensors.equal_opts(&other.tensors, opts)
            && self.fields.len() == other.fields.len()
            && self.fields.iter().zip(other.fields.iter())
                .all(|(a, b)| a.equal_opts(b, opts))
    }

    /// Return the subset of rows satisfying `expr`, fields included.
    pub fn cut(&self, expr: &CutExpr, coord_sys: Option<CoordSys>)
        -> FieldsResult<Self>
    {
        self.cut_with_template(expr, coord_sys).map(|(inst, _)| inst)
    }

    /// Like [`cut`][Self::cut], but also return the [`Template`] listing
    /// which rows were kept.
    pub fn cut_with_template(
        &self,
        expr: &CutExpr,
        coord_sys: Option<CoordSys>,
    ) -> FieldsResult<(Self, Template)>
    {
        let mask = self.tensors.eval_mask(expr, coord_sys)?;
        let indices: Vec<usize> = mask.iter().enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect();
        let inst = self.select(&indices)?;
        Ok((inst, Template::new(indices)))
    }

    /// Replay a recorded cut on base and fields alike.
    pub fn cut_template(&self, template: &Template) -> FieldsResult<Self> {
        self.select(template.indices())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use crate::expr::{ x, z };
    use super::*;

    fn scalar_field() -> TensorFields {
        let vectors = Tensors::new(
            array![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, -1.0, 0.0]],
        ).unwrap();
        TensorFields::new(
            vectors,
            vec![
                Tensors::from_vec(vec![42.0, 21.0, 10.5]).unwrap(),
                Tensors::from_vec(vec![1.0, 2.0, 3.0]).unwrap(),
            ],
        ).unwrap()
    }

    #[test]
    fn rigid_construction() {
        let base = Tensors::from_vec(vec![1.0, 2.0, 3.0]).unwrap();
        let field = Tensors::from_vec(vec![3.0]).unwrap();
        let res = TensorFields::new(base.clone(), vec![field.clone()]);
        assert!(matches!(
            res,
            Err(FieldsError::RigidLength { base: 3, field: 1 }),
        ));

        let loose = TensorFields::new_loose(base, vec![field]);
        assert_eq!(loose.len(), 3);
        assert_eq!(loose.fields()[0].len(), 1);
    }

    #[test]
    fn field_ranks() {
        let tf = scalar_field();
        assert_eq!(tf.rank(), 1);
        assert_eq!(tf.fields()[0].rank(), 0);
        assert_eq!(tf.fields().len(), 2);
    }

    #[test]
    fn slicing_propagates_to_fields() {
        let tf = scalar_field();
        let sliced = tf.slice_rows(2, 3).unwrap();
        assert_eq!(sliced.len(), 1);
        assert!(sliced.fields()[0].equal(
            &Tensors::from_vec(vec![10.5]).unwrap()));

        let masked = tf.mask(&[true, false, true]).unwrap();
        assert!(masked.tensors().equal(
            &Tensors::new(array![[0.0, 0.0, 0.0], [0.0, -1.0, 0.0]]).unwrap()));
        assert!(masked.fields()[0].equal(
            &Tensors::from_vec(vec![42.0, 10.5]).unwrap()));
        assert!(masked.fields()[1].equal(
            &Tensors::from_vec(vec![1.0, 3.0]).unwrap()));

        for k in 0..masked.fields().len() {
            assert_eq!(masked.fields()[k].len(), masked.len());
        }
    }

    #[test]
    fn set_rows_propagates_to_fields() {
        let original = scalar_field();
        let mut obj = TensorFields::new(
            Tensors::new(
                array![[9.0, 9.0, 9.0], [9.0, 9.0, 9.0], [0.0, -1.0, 0.0]],
            ).unwrap(),
            vec![
                Tensors::from_vec(vec![0.0, 0.0, 10.5]).unwrap(),
                Tensors::from_vec(vec![0.0, 0.0, 3.0]).unwrap(),
            ],
        ).unwrap();
        let rows = original.slice_rows(0, 2).unwrap();
        obj.set_rows(&[0, 1], &rows).unwrap();
        assert!(obj.equal(&original));
    }

    #[test]
    fn merged_demands_equal_field_counts() {
        let a = scalar_field();
        let b = TensorFields::new(
            Tensors::new(array![[1.0, 1.0, 1.0]]).unwrap(),
            vec![Tensors::from_vec(vec![7.0]).unwrap()],
        ).unwrap();
        let res = TensorFields::merged(&[a, b], None);
        assert!(matches!(
            res,
            Err(FieldsError::FieldCountMismatch { expected: 2, got: 1 }),
        ));
    }

    #[test]
    fn merged_concatenates_fields_index_wise() {
        let a = scalar_field();
        let b = a.slice_rows(0, 2).unwrap();
        let merged = TensorFields::merged(&[a, b], None).unwrap();
        assert_eq!(merged.len(), 5);
        assert!(merged.fields()[0].equal(
            &Tensors::from_vec(vec![42.0, 21.0, 10.5, 42.0, 21.0]).unwrap()));
    }

    #[test]
    fn merged_templates_invert_through_cut() {
        let a = scalar_field();
        let b = a.mask(&[true, false, true]).unwrap();
        let objects = [a, b];
        let (merged, templates) =
            TensorFields::merged_with_templates(&objects, None).unwrap();
        for (obj, template) in objects.iter().zip(&templates) {
            assert!(merged.cut_template(template).unwrap().equal(obj));
        }
    }

    #[test]
    fn equal_considers_fields() {
        let a = scalar_field();
        let mut b = a.clone();
        assert!(a.equal(&b));
        b = TensorFields::new(
            b.tensors().clone(),
            vec![b.fields()[0].clone()],
        ).unwrap();
        assert!(!a.equal(&b));
    }

    #[test]
    fn cut_projects_fields_through_the_template() {
        let p = Tensors::from_rows(vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![1.0, 2.0, -6.0],
            vec![-5.0, -5.0, -5.0],
            vec![1.0, 0.0, -1.0],
            vec![0.0, 1.0, -1.0],
        ]).unwrap();
        let field1 =
            Tensors::from_vec((0..6).map(|i| i as f64).collect()).unwrap();
        let mut tf = TensorFields::new(p.clone(), vec![field1]).unwrap();

        let expr = x().gt(0.0) & z().lt(0.0);
        let (_, template) = tf.cut_with_template(&expr, None).unwrap();

        tf.push_field(p.clone()).unwrap();
        let replay = tf.cut_template(&template).unwrap();
        assert!(replay.fields()[0].equal(
            &Tensors::from_vec(vec![2.0, 4.0]).unwrap()));
        let combi = p.cut(&expr, None).unwrap();
        assert!(replay.fields()[1].equal(&combi));
    }
}
