// src/geometry/magnets.rs

//! The stationary magnet stack: magnets, inter-magnet spacers and the tube.

use super::{Region, RegionKind, STATOR_GROUP};
use crate::params::Magnet;
use crate::session::BlockProps;
use crate::Point;

/// Magnetization of magnet `index`: -90° for even indices, +90° for odd ones.
pub fn magnetization_angle(index: u32) -> f64 {
    if index % 2 == 0 {
        -90.0
    } else {
        90.0
    }
}

/// Lays out the magnet stack centered on z = 0.
///
/// Emits `number` magnets with alternating poles, a spacer in every gap when
/// `length < pitch`, and one tube spanning the stack when `tube_od > od`.
pub fn create_magnets(magnet: &Magnet) -> Vec<Region> {
    let mut regions = Vec::new();
    let z_start = -((magnet.number.saturating_sub(1)) as f64 * magnet.pitch) / 2.0;
    let r = magnet.od / 2.0;
    let half_length = magnet.length / 2.0;

    for i in 0..magnet.number {
        let z_center = z_start + i as f64 * magnet.pitch;
        let block = BlockProps {
            magnetization: magnetization_angle(i),
            ..BlockProps::passive(magnet.material.clone(), STATOR_GROUP)
        };
        regions.push(Region::rectangle(
            RegionKind::Magnet,
            (0.0, r),
            (z_center - half_length, z_center + half_length),
            Point::new(r / 2.0, z_center),
            block,
        ));

        if magnet.length < magnet.pitch && i + 1 < magnet.number {
            let spacer_center = z_center + magnet.pitch / 2.0;
            let half_spacer = (magnet.pitch - magnet.length) / 2.0;
            regions.push(Region::rectangle(
                RegionKind::MagnetSpacer,
                (0.0, r),
                (spacer_center - half_spacer, spacer_center + half_spacer),
                Point::new(r / 2.0, spacer_center),
                BlockProps::passive(magnet.spacer_material.clone(), STATOR_GROUP),
            ));
        }
    }

    if magnet.tube_od > magnet.od {
        let half_height = magnet.number as f64 * magnet.pitch / 2.0;
        let tube_r = magnet.tube_od / 2.0;
        regions.push(Region::rectangle(
            RegionKind::Tube,
            (r, tube_r),
            (-half_height, half_height),
            Point::new(tube_r - (tube_r - r) / 2.0, 0.0),
            BlockProps::passive(magnet.tube_material.clone(), STATOR_GROUP),
        ));
    }

    regions
}
