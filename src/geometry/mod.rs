// src/geometry/mod.rs

//! Parametric geometry synthesis for the axisymmetric motor model.
//!
//! Synthesis is split in two: pure functions turn parameters into
//! [`Region`]s and an [`OpenBoundary`], and [`emit_region`] /
//! [`emit_boundary`] replay them against a solver session. Coordinates are
//! (r, z) in millimeters, r along x and the axis of symmetry along y.

pub mod boundary;
pub mod coils;
pub mod magnets;

use crate::session::{BlockProps, GeometryOps, OuterCondition, SelectionOps, SessionResult};
use crate::params::{Coil, Magnet};
use crate::Point;
use serde::Serialize;

pub use boundary::create_auto_boundary;
pub use coils::create_coils;
pub use magnets::create_magnets;

/// Group of everything that stays still: magnets, their spacers and tube.
pub const STATOR_GROUP: i32 = 0;
/// Group of spools and coil spacers, which move with the windings.
pub const MOVER_SUPPORT_GROUP: i32 = 4;
/// Every group that belongs to the mover.
pub const MOVER_GROUPS: [i32; 4] = [1, 2, 3, MOVER_SUPPORT_GROUP];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RegionKind {
    Magnet,
    MagnetSpacer,
    Tube,
    Coil,
    Spool,
    CoilSpacer,
}

/// A closed area of the model with its block label.
///
/// Regions are emitted once and never revisited. Nodes shared with a
/// neighbour are repeated; the solver merges coincident nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    pub kind: RegionKind,
    pub nodes: Vec<Point>,
    pub segments: Vec<[Point; 2]>,
    /// Group given to the boundary segments, if any.
    pub segment_group: Option<i32>,
    pub label: Point,
    pub block: BlockProps,
}

impl Region {
    /// Axis-aligned rectangle spanning `[r_in, r_out] x [z_bottom, z_top]`.
    pub fn rectangle(
        kind: RegionKind,
        (r_in, r_out): (f64, f64),
        (z_bottom, z_top): (f64, f64),
        label: Point,
        block: BlockProps,
    ) -> Self {
        let top_left = Point::new(r_in, z_top);
        let bottom_left = Point::new(r_in, z_bottom);
        let bottom_right = Point::new(r_out, z_bottom);
        let top_right = Point::new(r_out, z_top);
        Region {
            kind,
            nodes: vec![top_left, bottom_left, bottom_right, top_right],
            segments: vec![
                [top_left, bottom_left],
                [bottom_left, bottom_right],
                [bottom_right, top_right],
                [top_right, top_left],
            ],
            segment_group: None,
            label,
            block,
        }
    }

    pub fn with_segment_group(mut self, group: i32) -> Self {
        self.segment_group = Some(group);
        self
    }

    /// Largest distance from the origin reached by any node.
    pub fn max_extent(&self) -> f64 {
        self.nodes.iter().map(|p| p.coords.norm()).fold(0.0, f64::max)
    }

    /// Radial and axial span as `((r_min, r_max), (z_min, z_max))`.
    pub fn bounds(&self) -> ((f64, f64), (f64, f64)) {
        let mut r = (f64::INFINITY, f64::NEG_INFINITY);
        let mut z = (f64::INFINITY, f64::NEG_INFINITY);
        for p in &self.nodes {
            r = (r.0.min(p.x), r.1.max(p.x));
            z = (z.0.min(p.y), z.1.max(p.y));
        }
        (r, z)
    }
}

/// Asymptotic open boundary around the whole model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenBoundary {
    pub shells: u32,
    pub radius: f64,
    pub center: Point,
    pub outer: OuterCondition,
    /// Interior point of the air region where its label goes.
    pub air_label: Point,
    pub air: BlockProps,
}

/// The full synthesized model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotorGeometry {
    pub regions: Vec<Region>,
    pub boundary: OpenBoundary,
}

impl MotorGeometry {
    pub fn count(&self, kind: RegionKind) -> usize {
        self.regions.iter().filter(|r| r.kind == kind).count()
    }
}

/// Magnets, then coils, then the open boundary.
pub fn synthesize(magnet: &Magnet, coil: &Coil) -> MotorGeometry {
    let mut regions = create_magnets(magnet);
    regions.extend(create_coils(coil));
    MotorGeometry { regions, boundary: create_auto_boundary(coil, magnet) }
}

/// Draws one region: nodes, segments (grouped when asked), then its labelled block.
pub fn emit_region<S>(session: &mut S, region: &Region) -> SessionResult<()>
where
    S: GeometryOps + SelectionOps + ?Sized,
{
    for &node in &region.nodes {
        session.add_node(node)?;
    }
    for &[from, to] in &region.segments {
        session.add_segment(from, to)?;
        if let Some(group) = region.segment_group {
            session.select_segment(nalgebra::center(&from, &to))?;
            session.set_segment_group(group)?;
            session.clear_selected()?;
        }
    }
    place_block(session, region.label, &region.block)
}

pub fn emit_boundary<S>(session: &mut S, boundary: &OpenBoundary) -> SessionResult<()>
where
    S: GeometryOps + SelectionOps + ?Sized,
{
    session.make_open_boundary(boundary.shells, boundary.radius, boundary.center, boundary.outer)?;
    place_block(session, boundary.air_label, &boundary.air)
}

pub fn emit_all<S>(session: &mut S, geometry: &MotorGeometry) -> SessionResult<()>
where
    S: GeometryOps + SelectionOps + ?Sized,
{
    for region in &geometry.regions {
        tracing::debug!(kind = ?region.kind, label = ?region.label, "emitting region");
        emit_region(session, region)?;
    }
    emit_boundary(session, &geometry.boundary)
}

fn place_block<S>(session: &mut S, at: Point, props: &BlockProps) -> SessionResult<()>
where
    S: GeometryOps + SelectionOps + ?Sized,
{
    session.add_block_label(at)?;
    session.select_label(at)?;
    session.set_block_props(props)?;
    session.clear_selected()
}
