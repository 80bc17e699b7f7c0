//! Tensor collections with attached fields *and* connectivity maps, kept
//! mutually consistent through every structural operation.
//!
//! A [`TensorMaps`] owns a [`TensorFields`] (the vertices of a mesh, say,
//! with per-vertex data) and a [`Maps`] container whose integer rows
//! reference rows of that base by position. The type's job is the
//! bookkeeping this weak referencing demands: whenever rows are removed
//! or reordered — slicing, masking, merging, deduplication — every map
//! reference is shifted down past the removed rows, and map rows that
//! would dangle are dropped whole. The invariant is that every reference
//! in every map is a valid row index of the base, at all times; the
//! constructor refuses inputs that violate it.
//!
//! ```
//! use ndarray::array;
//! use tensor_fields::maps::{ Map, Maps };
//! use tensor_fields::tensor_maps::TensorMaps;
//! use tensor_fields::tensors::Tensors;
//!
//! let vertices = Tensors::new(
//!     array![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]).unwrap();
//! let faces = Map::from_rows(vec![vec![0, 1, 2]]).unwrap();
//! let mesh = TensorMaps::from_tensors(
//!     vertices, Maps::from_maps([faces])).unwrap();
//! assert_eq!(mesh.maps().get(3).unwrap().len(), 1);
//! ```

use std::collections::BTreeMap;
use itertools::Itertools;
use ndarray as nd;
use rustc_hash::{ FxHashMap, FxHashSet };
use crate::{
    bases::CoordSys,
    expr::CutExpr,
    fields::{ Fields, TensorFields },
    maps::{ Map, Maps, MapsError, MapsResult },
    tensors::{ EqOpts, Template, TensorError, Tensors },
};
use MapsError::*;

/// Record of which base rows *and* which map rows of a source object
/// ended up where, produced by the merge and cut operations of
/// [`TensorMaps`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MapsTemplate {
    tensors: Template,
    maps: BTreeMap<usize, Template>,
}

impl MapsTemplate {
    pub fn new(tensors: Template, maps: BTreeMap<usize, Template>) -> Self {
        Self { tensors, maps }
    }

    /// The base-row template.
    pub fn tensors(&self) -> &Template { &self.tensors }

    /// The map-row template at the given arity, if present.
    pub fn map(&self, arity: usize) -> Option<&Template> {
        self.maps.get(&arity)
    }

    /// Iterate over `(arity, template)` pairs in ascending arity order.
    pub fn maps(&self) -> impl Iterator<Item = (usize, &Template)> {
        self.maps.iter().map(|(&arity, tmpl)| (arity, tmpl))
    }
}

// union-find with path halving, for grouping map rows into connected
// components
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb { self.parent[rb] = ra; }
    }
}

/// A tensor collection with per-row fields and connectivity maps.
///
/// Dereferences to the base [`TensorFields`] (and through it to the base
/// [`Tensors`]) for read access.
#[derive(Clone, Debug)]
pub struct TensorMaps {
    base: TensorFields,
    maps: Maps,
}

impl std::ops::Deref for TensorMaps {
    type Target = TensorFields;

    fn deref(&self) -> &Self::Target { &self.base }
}

impl TensorMaps {
    /// Create a new collection from a base and its maps.
    ///
    /// Fails if any map references a row index outside the base.
    pub fn new(base: TensorFields, maps: Maps) -> MapsResult<Self> {
        let len = base.len();
        for (_, map) in maps.iter() {
            if let Some(bad) = map.values().find(|&v| v >= len) {
                return Err(DanglingReference { index: bad, len });
            }
        }
        Ok(Self { base, maps })
    }

    /// Create a new collection from bare tensors (no fields) and maps.
    pub fn from_tensors(tensors: Tensors, maps: Maps) -> MapsResult<Self> {
        Self::new(TensorFields::from(tensors), maps)
    }

    /// Borrow the base collection with its fields.
    pub fn base(&self) -> &TensorFields { &self.base }

    /// Borrow the connectivity maps.
    pub fn maps(&self) -> &Maps { &self.maps }

    /// Split into the base collection and the maps.
    pub fn into_parts(self) -> (TensorFields, Maps) {
        (self.base, self.maps)
    }

    /// Convert the base components in place to another coordinate system.
    /// Maps are index data and are left alone. This mutates `self`.
    pub fn transform(&mut self, coord_sys: CoordSys) -> MapsResult<()> {
        self.base.transform(coord_sys)?;
        Ok(())
    }

    /// Return a copy with the base expressed in another coordinate
    /// system.
    pub fn transformed(&self, coord_sys: CoordSys) -> MapsResult<Self> {
        let mut new = self.clone();
        new.transform(coord_sys)?;
        Ok(new)
    }

    /// Test whether `self` has the same content as `other`: base
    /// equality (tensors and fields) and equality of all maps.
    pub fn equal(&self, other: &Self) -> bool {
        self.equal_opts(other, EqOpts::exact())
    }

    /// [`equal`][Self::equal] with explicit comparison options.
    pub fn equal_opts(&self, other: &Self, opts: EqOpts) -> bool {
        self.base.equal_opts(&other.base, opts)
            && self.maps.equal_opts(&other.maps, opts)
    }

    /// Return the rows at the given indices as a new collection.
    ///
    /// The base and its fields follow the selection as in
    /// [`TensorFields::select`]. Every map row referencing a row that was
    /// not kept is dropped whole (fields included); surviving references
    /// are shifted down past the removed rows so they keep pointing at
    /// the same tensors. Indices may repeat (the renumbering accounts for
    /// removals, not reordering).
    pub fn select(&self, indices: &[usize]) -> MapsResult<Self> {
        self.select_impl(indices).map(|(inst, _)| inst)
    }

    // select, additionally reporting which map rows survived per arity
    fn select_impl(&self, indices: &[usize])
        -> MapsResult<(Self, BTreeMap<usize, Vec<usize>>)>
    {
        let base = self.base.select(indices)?;
        let n = self.base.len();
        let kept: FxHashSet<usize> = indices.iter().copied().collect();

        // shift-down counter: removed_below[i] = number of removed rows
        // with index < i
        let mut removed_below = vec![0_usize; n];
        let mut cum = 0;
        for (i, slot) in removed_below.iter_mut().enumerate() {
            *slot = cum;
            if !kept.contains(&i) { cum += 1; }
        }

        let mut maps = Maps::new();
        let mut kept_rows: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (arity, map) in self.maps.iter() {
            let rows: Vec<usize> = (0..map.len())
                .filter(|&r| {
                    map.rows().row(r).iter().all(|v| kept.contains(v))
                })
                .collect();
            let survived = map.select(&rows)?;
            maps.insert(survived.mapped_refs(|v| v - removed_below[v]));
            kept_rows.insert(arity, rows);
        }
        Ok((Self { base, maps }, kept_rows))
    }

    /// Return the rows flagged `true` in `keep`; maps follow as in
    /// [`select`][Self::select].
    pub fn mask(&self, keep: &[bool]) -> MapsResult<Self> {
        if keep.len() != self.base.len() {
            return Err(TensorError::MaskLength {
                expected: self.base.len(), got: keep.len() }.into());
        }
        let indices: Vec<usize> = keep.iter().enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect();
        self.select(&indices)
    }

    /// Return a copy without the rows flagged `true` in `remove`.
    pub fn removed(&self, remove: &[bool]) -> MapsResult<Self> {
        let keep: Vec<bool> = remove.iter().map(|&b| !b).collect();
        self.mask(&keep)
    }

    /// Return a copy with only the rows flagged `true` in `keep`.
    /// Complementary to [`removed`][Self::removed].
    pub fn keep(&self, keep: &[bool]) -> MapsResult<Self> {
        self.mask(keep)
    }

    /// Return the contiguous row range `lo .. hi`; maps follow.
    pub fn slice_rows(&self, lo: usize, hi: usize) -> MapsResult<Self> {
        let indices: Vec<usize> = (lo..hi).collect();
        self.select(&indices)
    }

    /// Merge several collections by concatenating rows.
    ///
    /// The base merges as in [`TensorFields::merged`]. For every arity
    /// present in any operand, the per-operand maps are merged after
    /// offsetting each one's references by that operand's cumulative row
    /// offset, so they keep pointing at the same tensors in the
    /// concatenated base; operands missing an arity are omitted from that
    /// arity's merge.
    pub fn merged(objects: &[Self], coord_sys: Option<CoordSys>)
        -> MapsResult<Self>
    {
        Self::merged_impl(objects, coord_sys).map(|(inst, _)| inst)
    }

    /// Like [`merged`][Self::merged], but also return one
    /// [`MapsTemplate`] per operand, reconstructing it exactly through
    /// [`cut_template`][Self::cut_template].
    pub fn merged_with_templates(
        objects: &[Self],
        coord_sys: Option<CoordSys>,
    ) -> MapsResult<(Self, Vec<MapsTemplate>)>
    {
        Self::merged_impl(objects, coord_sys)
    }

    fn merged_impl(objects: &[Self], coord_sys: Option<CoordSys>)
        -> MapsResult<(Self, Vec<MapsTemplate>)>
    {
        if objects.is_empty() {
            return Err(TensorError::NothingToMerge.into());
        }

        let bases: Vec<TensorFields> =
            objects.iter().map(|o| o.base.clone()).collect();
        let (base, base_templates) =
            TensorFields::merged_with_templates(&bases, coord_sys)?;

        let mut cum_lengths: Vec<usize> = Vec::with_capacity(objects.len());
        let mut cum = 0;
        for obj in objects.iter() {
            cum_lengths.push(cum);
            cum += obj.base.len();
        }

        let arities: Vec<usize> = objects.iter()
            .flat_map(|o| o.maps.arities())
            .sorted_unstable()
            .dedup()
            .collect();

        let mut maps = Maps::new();
        let mut map_templates: Vec<BTreeMap<usize, Template>> =
            vec![BTreeMap::new(); objects.len()];
        for &arity in arities.iter() {
            let participants: Vec<usize> = objects.iter().enumerate()
                .filter_map(|(i, o)| o.maps.get(arity).map(|_| i))
                .collect();
            let offset_maps: Vec<Map> = participants.iter()
                .map(|&i| {
                    objects[i].maps.get(arity)
                        .expect("participants filtered on presence")
                        .offset(cum_lengths[i])
                })
                .collect();
            let (merged_map, arity_templates) =
                Map::merged_with_templates(&offset_maps)?;
            maps.insert(merged_map);
            for (&i, tmpl) in participants.iter().zip(arity_templates) {
                map_templates[i].insert(arity, tmpl);
            }
        }

        let templates: Vec<MapsTemplate> =
            base_templates.into_iter().zip(map_templates)
            .map(|(tensors, maps)| MapsTemplate::new(tensors, maps))
            .collect();
        Ok((Self { base, maps }, templates))
    }

    /// Return the subset of rows satisfying `expr`; maps follow as in
    /// [`select`][Self::select].
    pub fn cut(&self, expr: &CutExpr, coord_sys: Option<CoordSys>)
        -> MapsResult<Self>
    {
        self.cut_with_template(expr, coord_sys).map(|(inst, _)| inst)
    }

    /// Like [`cut`][Self::cut], but also return the [`MapsTemplate`]
    /// recording which base rows and which map rows were kept.
    pub fn cut_with_template(
        &self,
        expr: &CutExpr,
        coord_sys: Option<CoordSys>,
    ) -> MapsResult<(Self, MapsTemplate)>
    {
        let mask = self.base.tensors().eval_mask(expr, coord_sys)?;
        let indices: Vec<usize> = mask.iter().enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect();
        let (inst, kept_rows) = self.select_impl(&indices)?;
        let maps = kept_rows.into_iter()
            .map(|(arity, rows)| (arity, Template::new(rows)))
            .collect();
        Ok((inst, MapsTemplate::new(Template::new(indices), maps)))
    }

    /// Replay a recorded cut or merge template.
    ///
    /// Base rows are picked by the tensor template; each map present in
    /// both `self` and the template has its rows picked by the map
    /// template and its references renumbered to the replayed base.
    /// Fails if a picked map row references a base row the template does
    /// not pick.
    pub fn cut_template(&self, template: &MapsTemplate) -> MapsResult<Self> {
        let base = self.base.select(template.tensors.indices())?;
        let mut lut: FxHashMap<usize, usize> = FxHashMap::default();
        for (pos, &orig) in template.tensors.indices().iter().enumerate() {
            lut.entry(orig).or_insert(pos);
        }
        let len = base.len();
        let mut maps = Maps::new();
        for (arity, map) in self.maps.iter() {
            let Some(tmpl) = template.map(arity) else { continue; };
            let picked = map.select(tmpl.indices())?;
            let renumbered = picked.renumbered(|v| {
                lut.get(&v).copied()
                    .ok_or(DanglingReference { index: v, len })
            })?;
            maps.insert(renumbered);
        }
        Ok(Self { base, maps })
    }

    /// Mask over base rows, `true` for rows referenced by no map of any
    /// arity.
    pub fn stale(&self) -> Vec<bool> {
        let used: FxHashSet<usize> = self.maps.iter()
            .flat_map(|(_, map)| map.values())
            .collect();
        (0..self.base.len()).map(|i| !used.contains(&i)).collect()
    }

    /// Return a cleaned copy.
    ///
    /// With `stale`, rows referenced by no map are removed. With
    /// `duplicates`, every set of rows with identical components is
    /// collapsed onto its first occurrence: references to the later
    /// copies are redirected there, then the now-redundant rows are
    /// removed. The two passes compose; both on is the usual call.
    pub fn cleaned(&self, stale: bool, duplicates: bool) -> MapsResult<Self> {
        let mut inst = if stale {
            self.removed(&self.stale())?
        } else {
            self.clone()
        };
        if duplicates {
            let n = inst.base.len();
            let mut first_of: FxHashMap<Vec<u64>, usize> =
                FxHashMap::default();
            let mut redirect: Vec<usize> = (0..n).collect();
            let mut remove = vec![false; n];
            for i in 0..n {
                let key: Vec<u64> = inst.base.tensors().row_components(i)
                    .iter()
                    .map(|v| v.to_bits())
                    .collect();
                match first_of.entry(key) {
                    std::collections::hash_map::Entry::Occupied(entry) => {
                        redirect[i] = *entry.get();
                        remove[i] = true;
                    },
                    std::collections::hash_map::Entry::Vacant(entry) => {
                        entry.insert(i);
                    },
                }
            }
            if remove.iter().any(|&b| b) {
                let maps = inst.maps.iter()
                    .map(|(_, map)| map.mapped_refs(|v| redirect[v]))
                    .collect();
                inst = Self { base: inst.base, maps };
                inst = inst.removed(&remove)?;
            }
        }
        Ok(inst)
    }

    /// Extract standalone parts.
    ///
    /// Each description is an `(arity, groups)` pair; for every group of
    /// map-row indices a copy of `self` is produced retaining only those
    /// rows of the map at that arity, then cleaned of stale tensors
    /// (without duplicate collapsing, so disjoint parts sharing
    /// coordinates are not fused).
    pub fn parts(&self, map_descriptions: &[(usize, Vec<Vec<usize>>)])
        -> MapsResult<Vec<Self>>
    {
        let mut out: Vec<Self> = Vec::new();
        for (arity, groups) in map_descriptions.iter() {
            let map = self.maps.get(*arity)
                .ok_or(MissingArity { arity: *arity })?;
            for group in groups.iter() {
                let mut obj = self.clone();
                obj.maps.insert(map.select(group)?);
                out.push(obj.cleaned(true, false)?);
            }
        }
        Ok(out)
    }

    /// Partition the map at the given arity into connected components:
    /// two map rows are connected when they share a referenced base row,
    /// transitively.
    ///
    /// Returns an `(arity, groups)` description consumable by
    /// [`parts`][Self::parts]; groups are ordered by first appearance,
    /// rows ascending within each group.
    pub fn disjoint_map(&self, arity: usize)
        -> MapsResult<(usize, Vec<Vec<usize>>)>
    {
        let map = self.maps.get(arity).ok_or(MissingArity { arity })?;
        let n = map.len();
        let mut uf = UnionFind::new(n);
        let mut seen: FxHashMap<usize, usize> = FxHashMap::default();
        for r in 0..n {
            for &v in map.rows().row(r).iter() {
                match seen.entry(v) {
                    std::collections::hash_map::Entry::Occupied(entry) => {
                        uf.union(*entry.get(), r);
                    },
                    std::collections::hash_map::Entry::Vacant(entry) => {
                        entry.insert(r);
                    },
                }
            }
        }
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut group_of: FxHashMap<usize, usize> = FxHashMap::default();
        for r in 0..n {
            let root = uf.find(r);
            let g = *group_of.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[g].push(r);
        }
        Ok((arity, groups))
    }

    /// Decompose an edge map (arity 2) into the minimal number of open or
    /// closed walks covering all edges.
    ///
    /// Nodes of degree greater than two are split by duplicating them, so
    /// no walk revisits a branching node; each connected component then
    /// yields one walk, returned as its own collection with the vertices
    /// in walk order and a single map row tracing them. The first vertex
    /// of each walk has degree 1 (a true endpoint) wherever possible;
    /// closed walks duplicate their start vertex at the end.
    pub fn paths(&self, arity: usize) -> MapsResult<Vec<Self>> {
        if arity != 2 {
            return Err(ArityMismatch { expected: 2, got: arity });
        }
        let obj = self.cleaned(true, true)?;
        let map = obj.maps.get(2).ok_or(MissingArity { arity: 2 })?;

        let orig_flat: Vec<usize> = map.values().collect();
        let mut flat = orig_flat.clone();
        let mut counts: FxHashMap<usize, usize> = FxHashMap::default();
        for &v in orig_flat.iter() {
            *counts.entry(v).or_insert(0) += 1;
        }

        // split nodes of degree > 2: the first two slots keep the node,
        // every further pair of slots gets a fresh duplicate
        let max_vertex = orig_flat.iter().copied().max().unwrap_or(0);
        let mut last = vec![-3_i64; max_vertex + 1];
        let mut duplicate_indices: Vec<usize> = Vec::new();
        let mut d_index = obj.base.len();
        for (i, &val) in orig_flat.iter().enumerate() {
            if counts[&val] > 2 {
                if last[val] < -1 {
                    last[val] += 1;
                    continue;
                }
                if last[val] == -1 {
                    duplicate_indices.push(val);
                    flat[i] = d_index;
                    last[val] = d_index as i64;
                    d_index += 1;
                } else {
                    flat[i] = last[val] as usize;
                    last[val] = -1;
                }
            }
        }

        let mut obj = obj;
        if !duplicate_indices.is_empty() {
            let duplicates = obj.select(&duplicate_indices)?;
            obj = Self::merged(&[obj, duplicates], None)?;
        }
        let n_edges = flat.len() / 2;
        let rows = nd::Array2::from_shape_vec((n_edges, 2), flat)
            .expect("edge list splits into pairs");
        obj.maps = Maps::from_maps([Map::from_parts(rows, Fields::default())]);

        let description = obj.disjoint_map(2)?;
        let paths = obj.parts(&[description])?;

        let mut sorted_paths: Vec<Self> = Vec::with_capacity(paths.len());
        for path in paths {
            sorted_paths.push(sort_path(path)?);
        }
        Ok(sorted_paths)
    }
}

// arrange one connected edge set into a single walk: pick an endpoint
// (degree 1) where one exists, else open the loop by duplicating vertex
// 0, then follow edges to the end and reorder the vertices along the
// walk
fn sort_path(path: TensorMaps) -> MapsResult<TensorMaps> {
    let mut edges: Vec<[usize; 2]> = {
        let pmap = path.maps().get(2).ok_or(MissingArity { arity: 2 })?;
        (0..pmap.len())
            .map(|r| {
                let row = pmap.rows().row(r);
                [row[0], row[1]]
            })
            .collect()
    };

    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for edge in edges.iter() {
        for &v in edge.iter() {
            *counts.entry(v).or_insert(0) += 1;
        }
    }

    let mut path = path;
    let first_node = match
        counts.iter().find(|(_, &c)| c == 1).map(|(&v, _)| v)
    {
        Some(v) => v,
        None => {
            // closed walk: duplicate the start vertex at the end and
            // relink its second edge there
            let n = path.base().len();
            let indices: Vec<usize> = (0..n).chain([0]).collect();
            path = path.select(&indices)?;
            let mut found_first = false;
            for edge in edges.iter_mut() {
                if let Some(pos) = edge.iter().position(|&v| v == 0) {
                    if found_first {
                        edge[pos] = n;
                        break;
                    }
                    found_first = true;
                }
            }
            0
        },
    };

    let n_edges = edges.len();
    let mut visited: FxHashSet<usize> = FxHashSet::default();
    let mut chain: Vec<usize> = vec![first_node];
    let mut node = first_node;
    while visited.len() < n_edges {
        let mut progressed = false;
        for (i, edge) in edges.iter().enumerate() {
            if visited.contains(&i) { continue; }
            if !edge.contains(&node) { continue; }
            visited.insert(i);
            let next = if edge[0] == node { edge[1] } else { edge[0] };
            chain.push(next);
            node = next;
            progressed = true;
        }
        if !progressed { break; }
    }

    let mut path = path.select(&chain)?;
    let walk = Map::from_rows(vec![(0..chain.len()).collect()])?;
    path.maps = Maps::from_maps([walk]);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use super::*;

    fn mesh() -> TensorMaps {
        let vectors = Tensors::new(array![
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, -1.0, 0.0],
            [1.0, 1.0, 1.0],
            [-1.0, -1.0, -1.0],
        ]).unwrap();
        let base = TensorFields::new(
            vectors,
            vec![
                Tensors::from_vec(vec![42.0, 21.0, 10.5, 1.0, 1.0]).unwrap(),
                Tensors::from_vec(vec![1.0, 2.0, 3.0, 3.0, 3.0]).unwrap(),
            ],
        ).unwrap();
        let faces = Map::new(
            array![[0, 1, 2], [0, 1, 3], [2, 3, 4]],
            vec![Tensors::from_rows(vec![
                vec![1.0, 2.0],
                vec![3.0, 4.0],
                vec![5.0, 6.0],
            ]).unwrap()],
        ).unwrap();
        let markers = Map::from_rows(
            vec![vec![0], vec![1], vec![2], vec![3], vec![4]]).unwrap();
        TensorMaps::new(base, Maps::from_maps([faces, markers])).unwrap()
    }

    #[test]
    fn construction_validates_references() {
        let vertices = Tensors::new(
            array![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]],
        ).unwrap();
        let faces = Map::from_rows(vec![vec![0, 1, 5]]).unwrap();
        let res = TensorMaps::from_tensors(
            vertices, Maps::from_maps([faces]));
        assert!(matches!(
            res,
            Err(MapsError::DanglingReference { index: 5, len: 3 }),
        ));
    }

    #[test]
    fn slicing_renumbers_maps() {
        let sliced = mesh().slice_rows(2, 5).unwrap();
        assert!(sliced.fields()[0].equal(
            &Tensors::from_vec(vec![10.5, 1.0, 1.0]).unwrap()));
        let faces = sliced.maps().get(3).unwrap();
        assert_eq!(faces.rows(), &array![[0, 1, 2]]);
        assert!(faces.fields()[0].equal(
            &Tensors::from_rows(vec![vec![5.0, 6.0]]).unwrap()));
        let markers = sliced.maps().get(1).unwrap();
        assert_eq!(markers.rows(), &array![[0], [1], [2]]);
    }

    #[test]
    fn picking_a_single_row_empties_wider_maps() {
        let picked = mesh().select(&[1]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked.maps().get(3).unwrap().len(), 0);
        assert_eq!(picked.maps().get(3).unwrap().arity(), 3);
        assert_eq!(picked.maps().get(1).unwrap().rows(), &array![[0]]);
    }

    #[test]
    fn masking_drops_and_renumbers() {
        let masked = mesh().mask(&[true, false, true, true, true]).unwrap();
        assert!(masked.tensors().equal(&Tensors::new(array![
            [0.0, 0.0, 0.0],
            [0.0, -1.0, 0.0],
            [1.0, 1.0, 1.0],
            [-1.0, -1.0, -1.0],
        ]).unwrap()));
        assert!(masked.fields()[0].equal(
            &Tensors::from_vec(vec![42.0, 10.5, 1.0, 1.0]).unwrap()));
        assert!(masked.fields()[1].equal(
            &Tensors::from_vec(vec![1.0, 3.0, 3.0, 3.0]).unwrap()));
        assert_eq!(masked.maps().get(3).unwrap().rows(), &array![[1, 2, 3]]);
        assert_eq!(
            masked.maps().get(1).unwrap().rows(),
            &array![[0], [1], [2], [3]],
        );
    }

    #[test]
    fn stale_flags_unreferenced_rows() {
        let vertices = Tensors::new(array![
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, -1.0, 0.0],
            [4.0, 4.0, 4.0],
        ]).unwrap();
        let tm = TensorMaps::from_tensors(
            vertices,
            Maps::from_maps([
                Map::from_rows(vec![vec![0, 1, 2], vec![0, 1, 2]]).unwrap(),
            ]),
        ).unwrap();
        assert_eq!(tm.stale(), vec![false, false, false, true]);
    }

    #[test]
    fn merged_offsets_second_operand() {
        let a = TensorMaps::from_tensors(
            Tensors::new(array![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ]).unwrap(),
            Maps::from_maps([
                Map::from_rows(vec![vec![0, 1, 2], vec![0, 2, 3]]).unwrap(),
            ]),
        ).unwrap();
        let mut shifted = a.tensors().data().clone();
        for i in 0..4 { shifted[[i, 0]] += 2.0; }
        let b = TensorMaps::from_tensors(
            Tensors::new(shifted).unwrap(),
            Maps::from_maps([
                Map::from_rows(vec![vec![0, 1, 2], vec![0, 2, 3]]).unwrap(),
            ]),
        ).unwrap();

        let merged = TensorMaps::merged(&[a.clone(), b], None).unwrap();
        assert_eq!(merged.len(), 8);
        assert_eq!(
            merged.maps().get(3).unwrap().rows(),
            &array![[0, 1, 2], [0, 2, 3], [4, 5, 6], [4, 6, 7]],
        );
    }

    #[test]
    fn merged_skips_operands_missing_an_arity() {
        let a = TensorMaps::from_tensors(
            Tensors::new(array![
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 1.0],
                [0.0, -1.0, 0.0],
                [1.0, 1.0, 1.0],
                [-1.0, -1.0, -1.0],
            ]).unwrap(),
            Maps::from_maps([
                Map::from_rows(
                    vec![vec![0, 1, 2], vec![0, 1, 3], vec![2, 3, 4]]).unwrap(),
                Map::from_rows(vec![vec![0], vec![4]]).unwrap(),
            ]),
        ).unwrap();
        let b = TensorMaps::from_tensors(
            Tensors::new(array![[9.0, 9.0, 9.0], [8.0, 8.0, 8.0]]).unwrap(),
            Maps::from_maps([Map::from_rows(vec![vec![0, 1]]).unwrap()]),
        ).unwrap();
        let merged = TensorMaps::merged(&[a, b], None).unwrap();
        // arity 3 came only from the first operand, arity 2 only from the
        // second (offset by 5), arity 1 only from the first
        assert_eq!(merged.maps().arities(), vec![1, 2, 3]);
        assert_eq!(merged.maps().get(2).unwrap().rows(), &array![[5, 6]]);
        assert_eq!(merged.maps().get(3).unwrap().len(), 3);
        assert_eq!(merged.maps().get(1).unwrap().rows(), &array![[0], [4]]);
    }

    #[test]
    fn cleaned_removes_stale_and_collapses_duplicates() {
        let tm = TensorMaps::from_tensors(
            Tensors::new(array![
                [0.0, 0.0, 0.0],
                [1.0, 1.0, 1.0],
                [2.0, 2.0, 2.0],
                [0.0, 0.0, 0.0],
                [3.0, 3.0, 3.0],
                [4.0, 4.0, 4.0],
                [5.0, 6.0, 7.0],
            ]).unwrap(),
            Maps::from_maps([
                Map::from_rows(vec![vec![0, 1, 2], vec![3, 4, 5]]).unwrap(),
                Map::from_rows(vec![vec![0], vec![3]]).unwrap(),
            ]),
        ).unwrap();
        let c = tm.cleaned(true, true).unwrap();
        assert!(c.tensors().equal(&Tensors::new(array![
            [0.0, 0.0, 0.0],
            [1.0, 1.0, 1.0],
            [2.0, 2.0, 2.0],
            [3.0, 3.0, 3.0],
            [4.0, 4.0, 4.0],
        ]).unwrap()));
        assert_eq!(
            c.maps().get(3).unwrap().rows(),
            &array![[0, 1, 2], [0, 3, 4]],
        );
        assert_eq!(c.maps().get(1).unwrap().rows(), &array![[0], [0]]);
    }

    #[test]
    fn removed_and_keep_are_complementary() {
        let m = TensorMaps::from_tensors(
            Tensors::new(array![
                [0.0, 0.0, 0.0],
                [1.0, 1.0, 1.0],
                [2.0, 2.0, 2.0],
                [0.0, 0.0, 0.0],
                [3.0, 3.0, 3.0],
                [4.0, 4.0, 4.0],
                [5.0, 5.0, 5.0],
            ]).unwrap(),
            Maps::from_maps([Map::new(
                array![[0, 1, 2], [0, 1, 3], [3, 4, 5], [3, 4, 1], [3, 4, 6]],
                vec![
                    Tensors::from_vec(vec![1.0, 3.0, 5.0, 7.0, 9.0]).unwrap(),
                    Tensors::from_vec(vec![2.0, 4.0, 6.0, 8.0, 0.0]).unwrap(),
                ],
            ).unwrap()]),
        ).unwrap();

        let expected_tensors = Tensors::new(array![
            [0.0, 0.0, 0.0],
            [3.0, 3.0, 3.0],
            [4.0, 4.0, 4.0],
            [5.0, 5.0, 5.0],
        ]).unwrap();

        let c = m.keep(
            &[false, false, false, true, true, true, true]).unwrap();
        assert!(c.tensors().equal(&expected_tensors));
        assert_eq!(
            c.maps().get(3).unwrap().rows(),
            &array![[0, 1, 2], [0, 1, 3]],
        );
        assert!(c.maps().get(3).unwrap().fields()[0].equal(
            &Tensors::from_vec(vec![5.0, 9.0]).unwrap()));
        assert!(c.maps().get(3).unwrap().fields()[1].equal(
            &Tensors::from_vec(vec![6.0, 0.0]).unwrap()));

        let r = m.removed(
            &[true, true, true, false, false, false, false]).unwrap();
        assert!(r.equal(&c));
    }

    #[test]
    fn disjoint_map_and_parts_split_components() {
        let a = TensorMaps::from_tensors(
            Tensors::new(array![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ]).unwrap(),
            Maps::from_maps([
                Map::from_rows(vec![vec![0, 1, 2], vec![0, 2, 3]]).unwrap(),
            ]),
        ).unwrap();
        let mut shifted = a.tensors().data().clone();
        for i in 0..4 { shifted[[i, 0]] += 2.0; }
        let b = TensorMaps::from_tensors(
            Tensors::new(shifted).unwrap(),
            Maps::from_maps([
                Map::from_rows(vec![vec![0, 1, 2], vec![0, 2, 3]]).unwrap(),
            ]),
        ).unwrap();

        let m = TensorMaps::merged(&[a.clone(), b.clone()], None).unwrap();
        let description = m.disjoint_map(3).unwrap();
        assert_eq!(description.1, vec![vec![0, 1], vec![2, 3]]);

        let parts = m.parts(&[description]).unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].maps().get(3).unwrap()
            .equal(parts[1].maps().get(3).unwrap()));
        assert!(parts[0].equal(&a));
        assert!(parts[1].equal(&b));
    }

    #[test]
    fn paths_demands_edge_maps() {
        let res = mesh().paths(3);
        assert!(matches!(
            res,
            Err(MapsError::ArityMismatch { expected: 2, got: 3 }),
        ));
    }

    #[test]
    fn cut_template_replays_map_bookkeeping() {
        let m = mesh();
        let expr = crate::expr::x().ge(0.0);
        let (cut, template) = m.cut_with_template(&expr, None).unwrap();
        let replay = m.cut_template(&template).unwrap();
        assert!(replay.equal(&cut));
    }

    #[test]
    fn merged_templates_reconstruct_operands() {
        let a = mesh();
        let b = a.mask(&[true, true, true, true, false]).unwrap();
        let objects = [a, b];
        let (merged, templates) =
            TensorMaps::merged_with_templates(&objects, None).unwrap();
        for (obj, template) in objects.iter().zip(&templates) {
            let back = merged.cut_template(template).unwrap();
            assert!(back.equal(obj));
        }
    }
}
