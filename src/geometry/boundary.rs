// src/geometry/boundary.rs

//! Open boundary approximating free space around the motor.

use super::{OpenBoundary, STATOR_GROUP};
use crate::params::{Coil, Magnet, DEFAULT_MATERIAL};
use crate::session::{BlockProps, OuterCondition};
use crate::Point;

/// Number of shells in the asymptotic boundary.
pub const BOUNDARY_SHELLS: u32 = 7;
/// Margin applied to the model's bounding radius.
pub const SAFETY_FACTOR: f64 = 1.5;

/// Radius of the open boundary.
///
/// Covers the wider of coils and magnets radially, and the magnet stack plus
/// one coil length axially, then applies [`SAFETY_FACTOR`].
pub fn air_radius(coil: &Coil, magnet: &Magnet) -> f64 {
    let r_max = coil.od.max(magnet.od) / 2.0;
    let h_max = magnet.stack_height() / 2.0 + coil.length;
    r_max.hypot(h_max) * SAFETY_FACTOR
}

/// Open boundary centered on the origin with the air label inside the annulus.
pub fn create_auto_boundary(coil: &Coil, magnet: &Magnet) -> OpenBoundary {
    let radius = air_radius(coil, magnet);
    OpenBoundary {
        shells: BOUNDARY_SHELLS,
        radius,
        center: Point::origin(),
        outer: OuterCondition::Dirichlet,
        air_label: Point::new(radius / 2.0, radius * 2.0 / 3.0),
        air: BlockProps::passive(DEFAULT_MATERIAL, STATOR_GROUP),
    }
}
