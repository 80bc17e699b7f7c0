//! Coordinate-system-aware tensor collections with attached per-row
//! fields and integer connectivity maps.
//!
//! The data model is built from four layers, leaves first:
//!
//! - [`tensors::Tensors`] — an n-dimensional numeric array of shape
//!   `(n, d, d, ...)` whose leading axis runs over individual tensors,
//!   tagged with the coordinate system its components are expressed in.
//!   Supports coordinate transforms, equality with tolerance, merging
//!   with reconstruction templates, predicate-based cutting, and
//!   nearest-neighbour/distance queries.
//! - [`fields::TensorFields`] — a `Tensors` base plus an ordered sequence
//!   of per-row attribute arrays ([`fields::Fields`]), sliced and merged
//!   in lock-step with the base.
//! - [`maps::Maps`] — connectivity grouped by arity: each [`maps::Map`]
//!   holds rows of integer indices (triangles, edges, ...) referencing
//!   rows of an owning collection by position, with optional per-row
//!   fields of its own.
//! - [`tensor_maps::TensorMaps`] — a `TensorFields` plus its `Maps`,
//!   with the index bookkeeping that keeps the weak integer references
//!   valid through slicing, masking, merging and deduplication, plus the
//!   topological operations (`stale`, `cleaned`, `parts`, `disjoint_map`,
//!   `paths`).
//!
//! Cut predicates are built in [`expr`] and evaluated row-wise, in a
//! temporarily transformed coordinate system when requested:
//!
//! ```
//! use ndarray::array;
//! use tensor_fields::expr::{ x, z };
//! use tensor_fields::tensors::Tensors;
//!
//! let p = Tensors::new(array![
//!     [1.0, 2.0, 3.0],
//!     [4.0, 5.0, 6.0],
//!     [1.0, 2.0, -6.0],
//! ]).unwrap();
//! let cut = p.cut(&(x().gt(0.0) & z().lt(0.0)), None).unwrap();
//! assert_eq!(cut.len(), 1);
//! ```
//!
//! Everything here is single-threaded and synchronous; all operations
//! are pure value transformations except the documented in-place
//! mutators (`transform`, `mirror`, `to_segment`).

pub mod bases;
pub mod expr;
pub mod tensors;
pub mod fields;
pub mod maps;
pub mod tensor_maps;

pub use bases::CoordSys;
pub use expr::CutExpr;
pub use tensors::{ EqOpts, Template, Tensors };
pub use fields::{ Fields, TensorFields };
pub use maps::{ Map, Maps };
pub use tensor_maps::{ MapsTemplate, TensorMaps };
