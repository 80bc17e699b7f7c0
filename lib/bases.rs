//! Coordinate-system tags and the array transforms between them.
//!
//! Every [`Tensors`][crate::tensors::Tensors] value carries a [`CoordSys`]
//! tag describing which basis its components are expressed in. The set of
//! recognized systems is closed: a tag is either one of the enum variants
//! here or it does not exist, so an unrecognized name can only ever appear
//! at the string-parsing boundary.
//!
//! The transform routines operate on rank-1 collections of 3-dimensional
//! points. Scalar (rank-0) and empty collections are handled one level up,
//! where changing the basis is a pure tag update.
//!
//! Conventions:
//! - cylinder coordinates are `(r, phi, z)` with `phi = atan2(y, x)`;
//! - spherical coordinates are `(r, phi, theta)` where `theta` is the
//!   elevation above the xy-plane, i.e. `theta = 0` in the plane and
//!   `theta = +pi/2` at the positive z-axis;
//! - both `phi` and `theta` are defined as 0 at the coordinate singularity
//!   `r = 0`.

use std::{ fmt, str::FromStr };
use ndarray as nd;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BasesError {
    /// Returned when parsing a coordinate-system tag that is not in the
    /// registry.
    #[error("unknown coordinate system '{0}'")]
    UnknownCoordSys(String),

    /// Returned when a nontrivial transform is requested for data that is
    /// not a rank-1 collection of 3-dimensional points.
    #[error("coordinate transform requires rank-1, dim-3 data; got rank {rank}, dim {dim}")]
    TransformShape { rank: usize, dim: usize },
}
use BasesError::*;
pub type BasesResult<T> = Result<T, BasesError>;

/// A recognized coordinate system.
///
/// The default is [`Cartesian`][Self::Cartesian].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CoordSys {
    #[default]
    Cartesian,
    Cylinder,
    Spherical,
}

/// All recognized tags, keyed by their canonical names.
static REGISTRY: Lazy<FxHashMap<&'static str, CoordSys>> = Lazy::new(|| {
    let mut reg = FxHashMap::default();
    reg.insert("cartesian", CoordSys::Cartesian);
    reg.insert("cylinder", CoordSys::Cylinder);
    reg.insert("spherical", CoordSys::Spherical);
    reg
});

impl CoordSys {
    /// Return the canonical name of the tag.
    pub fn name(self) -> &'static str {
        match self {
            Self::Cartesian => "cartesian",
            Self::Cylinder => "cylinder",
            Self::Spherical => "spherical",
        }
    }

    /// Return an iterator over every recognized coordinate system.
    pub fn all() -> impl Iterator<Item = CoordSys> {
        [Self::Cartesian, Self::Cylinder, Self::Spherical].into_iter()
    }
}

impl fmt::Display for CoordSys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CoordSys {
    type Err = BasesError;

    fn from_str(s: &str) -> BasesResult<Self> {
        REGISTRY.get(s).copied()
            .ok_or_else(|| UnknownCoordSys(s.to_string()))
    }
}

fn cartesian_to_cylinder(point: &mut [f64]) {
    let (x, y, z) = (point[0], point[1], point[2]);
    point[0] = x.hypot(y);
    point[1] = y.atan2(x);
    point[2] = z;
}

fn cylinder_to_cartesian(point: &mut [f64]) {
    let (r, phi, z) = (point[0], point[1], point[2]);
    point[0] = r * phi.cos();
    point[1] = r * phi.sin();
    point[2] = z;
}

fn cartesian_to_spherical(point: &mut [f64]) {
    let (x, y, z) = (point[0], point[1], point[2]);
    let rho = x.hypot(y);
    let r = rho.hypot(z);
    point[0] = r;
    point[1] = if r == 0.0 { 0.0 } else { y.atan2(x) };
    point[2] = if r == 0.0 { 0.0 } else { z.atan2(rho) };
}

fn spherical_to_cartesian(point: &mut [f64]) {
    let (r, phi, theta) = (point[0], point[1], point[2]);
    point[0] = r * theta.cos() * phi.cos();
    point[1] = r * theta.cos() * phi.sin();
    point[2] = r * theta.sin();
}

/// Convert `data` in place from coordinate system `from` to `to`.
///
/// A no-op when `from == to`. Anything else demands a rank-1 collection of
/// 3-dimensional points, i.e. an array of shape `(n, 3)`; conversions
/// between two curvilinear systems route through cartesian.
pub fn transform_array(
    data: &mut nd::ArrayD<f64>,
    from: CoordSys,
    to: CoordSys,
) -> BasesResult<()>
{
    if from == to { return Ok(()); }
    let shape = data.shape();
    if shape.len() != 2 || shape[1] != 3 {
        let rank = shape.len().saturating_sub(1);
        let dim = if shape.len() < 2 { 1 } else { shape[1] };
        return Err(TransformShape { rank, dim });
    }
    let n = shape[0];
    for i in 0..n {
        let mut point = [data[[i, 0]], data[[i, 1]], data[[i, 2]]];
        match from {
            CoordSys::Cartesian => { },
            CoordSys::Cylinder => { cylinder_to_cartesian(&mut point); },
            CoordSys::Spherical => { spherical_to_cartesian(&mut point); },
        }
        match to {
            CoordSys::Cartesian => { },
            CoordSys::Cylinder => { cartesian_to_cylinder(&mut point); },
            CoordSys::Spherical => { cartesian_to_spherical(&mut point); },
        }
        data[[i, 0]] = point[0];
        data[[i, 1]] = point[1];
        data[[i, 2]] = point[2];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;
    use ndarray::array;
    use super::*;

    fn points(rows: Vec<[f64; 3]>) -> nd::ArrayD<f64> {
        let n = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        nd::Array::from_shape_vec((n, 3), flat).unwrap().into_dyn()
    }

    #[test]
    fn parse_recognized_tags() {
        assert_eq!("cartesian".parse::<CoordSys>().unwrap(), CoordSys::Cartesian);
        assert_eq!("cylinder".parse::<CoordSys>().unwrap(), CoordSys::Cylinder);
        assert_eq!("spherical".parse::<CoordSys>().unwrap(), CoordSys::Spherical);
        assert!("polar".parse::<CoordSys>().is_err());
    }

    #[test]
    fn cartesian_to_cylinder_values() {
        let mut data = points(vec![
            [3.0, 4.0, 42.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, -1.0],
            [0.0, 0.0, 0.0],
        ]);
        transform_array(&mut data, CoordSys::Cartesian, CoordSys::Cylinder)
            .unwrap();
        assert!((data[[0, 0]] - 5.0).abs() < 1e-12);
        assert!((data[[0, 1]] - (4.0f64 / 3.0).atan()).abs() < 1e-12);
        assert_eq!(data[[0, 2]], 42.0);
        assert_eq!(data[[1, 1]], 0.0);
        assert!((data[[2, 1]] - FRAC_PI_2).abs() < 1e-12);
        assert_eq!(data[[3, 0]], 0.0);
    }

    #[test]
    fn cartesian_to_spherical_values() {
        let mut data = points(vec![
            [1.0, 2.0, 2.0],
            [1.0, 0.0, 0.0],
            [0.0, 0.0, -1.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0],
        ]);
        transform_array(&mut data, CoordSys::Cartesian, CoordSys::Spherical)
            .unwrap();
        assert!((data[[0, 0]] - 3.0).abs() < 1e-12);
        assert_eq!(data[[1, 2]], 0.0);
        assert!((data[[2, 2]] + FRAC_PI_2).abs() < 1e-12);
        assert!((data[[3, 2]] - FRAC_PI_2).abs() < 1e-12);
        // theta and phi pinned to 0 at the origin
        assert_eq!(data[[4, 1]], 0.0);
        assert_eq!(data[[4, 2]], 0.0);
    }

    #[test]
    fn round_trip_all_pairs() {
        let orig = points(vec![
            [1.0, 2.0, 3.0],
            [-0.5, 0.25, -4.0],
            [0.0, 1.0, -1.0],
            [2.0, -3.0, 0.5],
        ]);
        for c1 in CoordSys::all() {
            for c2 in CoordSys::all() {
                let mut data = orig.clone();
                transform_array(&mut data, CoordSys::Cartesian, c1).unwrap();
                transform_array(&mut data, c1, c2).unwrap();
                transform_array(&mut data, c2, CoordSys::Cartesian).unwrap();
                for (a, b) in data.iter().zip(orig.iter()) {
                    assert!((a - b).abs() < 1e-12, "{} != {}", a, b);
                }
            }
        }
    }

    #[test]
    fn transform_demands_dim_3() {
        let mut data = array![[1.0, 2.0], [3.0, 4.0]].into_dyn();
        let res =
            transform_array(&mut data, CoordSys::Cartesian, CoordSys::Cylinder);
        assert!(matches!(res, Err(BasesError::TransformShape { .. })));
    }

    #[test]
    fn transform_cylinder_doctest_point() {
        // (5, atan(4/3), 42) in cylinder coordinates is (3, 4, 42)
        let mut data = points(vec![[5.0, (4.0f64 / 3.0).atan(), 42.0]]);
        transform_array(&mut data, CoordSys::Cylinder, CoordSys::Cartesian)
            .unwrap();
        assert!((data[[0, 0]] - 3.0).abs() < 1e-12);
        assert!((data[[0, 1]] - 4.0).abs() < 1e-12);
        assert_eq!(data[[0, 2]], 42.0);
    }
}
