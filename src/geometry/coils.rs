// src/geometry/coils.rs

//! The moving coil stack: windings, spools and spacers between coils.

use super::{Region, RegionKind, MOVER_SUPPORT_GROUP};
use crate::params::Coil;
use crate::session::BlockProps;
use crate::{Phase, Point};

/// Phase of coil `index` in a stack of `number` coils.
///
/// The A, B, C cycle runs from the top of the stack down, so the last coil is always phase A.
pub fn coil_phase(index: u32, number: u32) -> Phase {
    debug_assert!(index < number, "coil index {} outside a stack of {}", index, number);
    Phase::ALL[((number - 1 - index) % 3) as usize]
}

/// Signed turns of coil `index`.
///
/// Within every run of three coils phase B is wound positive and A, C
/// negative; the signs flip on each following run of three. Counts beyond
/// `i32::MAX` saturate; the parameter loader rejects them.
pub fn winding_turns(index: u32, phase: Phase, nb_turn: u32) -> i32 {
    let turns = i32::try_from(nb_turn).unwrap_or(i32::MAX);
    let b_positive = (index / 3) % 2 == 0;
    match (phase == Phase::B, b_positive) {
        (true, true) | (false, false) => turns,
        _ => -turns,
    }
}

/// Lays out the coil stack centered on z = `vertical_offset`.
///
/// Each coil is a winding block in its phase circuit and group. When the
/// spool encloses the winding and has flanges, a spool outline wraps it;
/// when coil plus flanges are shorter than the pitch, a spacer fills the gap
/// to the next coil. Spools and spacers share the mover support group.
pub fn create_coils(coil: &Coil) -> Vec<Region> {
    let mut regions = Vec::new();
    let total_height = (coil.number.saturating_sub(1)) as f64 * coil.pitch;
    let z_start = -total_height / 2.0 + coil.vertical_offset;
    let half_length = coil.length / 2.0;
    let r_in = coil.id / 2.0;
    let r_out = coil.od / 2.0;

    for i in 0..coil.number {
        let phase = coil_phase(i, coil.number);
        let z_center = z_start + i as f64 * coil.pitch;
        let block = BlockProps {
            circuit: Some(phase.circuit_name().to_string()),
            turns: winding_turns(i, phase, coil.nb_turn),
            ..BlockProps::passive(coil.material.clone(), phase.group())
        };
        regions.push(
            Region::rectangle(
                RegionKind::Coil,
                (r_in, r_out),
                (z_center - half_length, z_center + half_length),
                Point::new(r_in + (r_out - r_in) / 2.0, z_center),
                block,
            )
            .with_segment_group(phase.group()),
        );

        if coil.has_spool() {
            regions.push(spool(coil, z_center));
        }

        if coil.needs_spacer() && i + 1 < coil.number {
            regions.push(coil_spacer(coil, z_center));
        }
    }

    regions
}

/// Spool outline around one coil, closed by the coil's outer edge.
///
/// The spool is drawn as a flanged channel: its outer side only exists over
/// the flange width at each end, leaving the winding's outer face exposed.
fn spool(coil: &Coil, z_center: f64) -> Region {
    let half_length = coil.length / 2.0;
    let flange = coil.spool_flange_width;
    let half_spool = half_length + flange;
    let r_coil = coil.od / 2.0;
    let r_in = coil.spool_id / 2.0;
    let r_out = coil.spool_od / 2.0;

    let coil_bottom_right = Point::new(r_coil, z_center - half_length);
    let coil_top_right = Point::new(r_coil, z_center + half_length);
    let top_left = Point::new(r_in, z_center + half_spool);
    let bottom_left = Point::new(r_in, z_center - half_spool);
    let bottom_right = Point::new(r_out, z_center - half_spool);
    let bottom_flange = Point::new(r_out, z_center - half_spool + flange);
    let top_right = Point::new(r_out, z_center + half_spool);
    let top_flange = Point::new(r_out, z_center + half_spool - flange);

    Region {
        kind: RegionKind::Spool,
        nodes: vec![top_left, bottom_left, bottom_right, bottom_flange, top_right, top_flange],
        segments: vec![
            [top_left, bottom_left],
            [bottom_left, bottom_right],
            [bottom_right, bottom_flange],
            [bottom_flange, coil_bottom_right],
            [coil_top_right, top_flange],
            [top_flange, top_right],
            [top_right, top_left],
        ],
        segment_group: Some(MOVER_SUPPORT_GROUP),
        label: Point::new(r_in + (r_out - r_in) / 2.0, z_center + half_spool - flange / 2.0),
        block: BlockProps::passive(coil.spool_material.clone(), MOVER_SUPPORT_GROUP),
    }
}

/// Spacer between coil `z_center` and the next one, as wide as coil or spool, whichever is wider.
fn coil_spacer(coil: &Coil, z_center: f64) -> Region {
    let spacer_length = coil.pitch - (coil.length + 2.0 * coil.spool_flange_width);
    let spacer_center = z_center + coil.pitch / 2.0;
    let half_spacer = spacer_length / 2.0;
    let r_start = if coil.spool_id != 0.0 {
        (coil.id / 2.0).min(coil.spool_id / 2.0)
    } else {
        coil.id / 2.0
    };
    let r_end = (coil.od / 2.0).max(coil.spool_od / 2.0);

    Region::rectangle(
        RegionKind::CoilSpacer,
        (r_start, r_end),
        (spacer_center - half_spacer, spacer_center + half_spacer),
        Point::new(r_start + (r_end - r_start) / 2.0, spacer_center),
        BlockProps::passive(coil.spacer_material.clone(), MOVER_SUPPORT_GROUP),
    )
    .with_segment_group(MOVER_SUPPORT_GROUP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::fixtures;

    fn windings(regions: &[Region]) -> Vec<&Region> {
        regions.iter().filter(|r| r.kind == RegionKind::Coil).collect()
    }

    #[test]
    fn test_phase_cycle_runs_from_the_top() {
        let phases: Vec<Phase> = (0..6).map(|i| coil_phase(i, 6)).collect();
        assert_eq!(phases, vec![Phase::C, Phase::B, Phase::A, Phase::C, Phase::B, Phase::A]);

        let phases: Vec<Phase> = (0..4).map(|i| coil_phase(i, 4)).collect();
        assert_eq!(phases, vec![Phase::A, Phase::C, Phase::B, Phase::A]);
    }

    #[test]
    fn test_six_coil_circuits_groups_and_turns() {
        let regions = create_coils(&fixtures::coil());
        let coils = windings(&regions);
        assert_eq!(coils.len(), 6);

        let circuits: Vec<&str> = coils.iter().map(|c| c.block.circuit.as_deref().unwrap()).collect();
        assert_eq!(circuits, vec!["CoilC", "CoilB", "CoilA", "CoilC", "CoilB", "CoilA"]);

        let groups: Vec<i32> = coils.iter().map(|c| c.block.group).collect();
        assert_eq!(groups, vec![3, 2, 1, 3, 2, 1]);

        let turns: Vec<i32> = coils.iter().map(|c| c.block.turns).collect();
        assert_eq!(turns, vec![-100, 100, -100, 100, -100, 100]);

        for coil in &coils {
            assert_eq!(coil.segment_group, Some(coil.block.group));
            assert_eq!(coil.block.material, "C");
        }
    }

    #[test]
    fn test_oversized_turn_count_keeps_polarity() {
        let mut coil = fixtures::coil();
        coil.number = 3;
        coil.nb_turn = 3_000_000_000;
        let regions = create_coils(&coil);
        let turns: Vec<i32> = windings(&regions).iter().map(|c| c.block.turns).collect();
        assert_eq!(turns, vec![-i32::MAX, i32::MAX, -i32::MAX]);
    }

    #[test]
    fn test_coils_span_bore_and_follow_offset() {
        let mut coil = fixtures::coil();
        coil.vertical_offset = 1.5;
        let regions = create_coils(&coil);
        let coils = windings(&regions);

        assert_eq!(coils[0].bounds(), ((3.0, 6.0), (-12.5, -9.5)));
        assert_eq!(coils[0].label, Point::new(4.5, -11.0));
        assert_eq!(coils[5].label.y, 14.0);
    }

    #[test]
    fn test_spacers_fill_gaps_between_coils_only() {
        let regions = create_coils(&fixtures::coil());
        let spacers: Vec<&Region> = regions.iter().filter(|r| r.kind == RegionKind::CoilSpacer).collect();

        assert_eq!(spacers.len(), 5);
        assert_eq!(spacers[0].bounds(), ((3.0, 6.0), (-11.0, -9.0)));
        assert_eq!(spacers[0].block.group, MOVER_SUPPORT_GROUP);
        assert_eq!(spacers[0].segment_group, Some(MOVER_SUPPORT_GROUP));
        assert_eq!(spacers[0].block.material, "Spacer");
    }

    #[test]
    fn test_spool_wraps_coil_with_flanges() {
        let mut coil = fixtures::coil();
        coil.number = 1;
        coil.spool_id = 5.0;
        coil.spool_od = 14.0;
        coil.spool_flange_width = 0.5;
        coil.spool_material = "PLA".to_string();
        let regions = create_coils(&coil);

        assert_eq!(regions.len(), 2);
        let spool = &regions[1];
        assert_eq!(spool.kind, RegionKind::Spool);
        assert_eq!(spool.nodes.len(), 6);
        assert_eq!(spool.segments.len(), 7);
        assert_eq!(spool.bounds(), ((2.5, 7.0), (-2.0, 2.0)));
        assert_eq!(spool.label, Point::new(4.75, 1.75));
        assert_eq!(spool.block.group, MOVER_SUPPORT_GROUP);
        assert_eq!(spool.block.circuit, None);
        assert_eq!(spool.block.material, "PLA");
        // closes onto the winding's outer corners
        assert_eq!(spool.segments[3][1], Point::new(6.0, -1.5));
        assert_eq!(spool.segments[4][0], Point::new(6.0, 1.5));
    }

    #[test]
    fn test_spacer_widens_to_spool_and_shrinks_by_flanges() {
        let mut coil = fixtures::coil();
        coil.number = 2;
        coil.spool_id = 5.0;
        coil.spool_od = 14.0;
        coil.spool_flange_width = 0.5;
        let regions = create_coils(&coil);
        let spacer = regions.iter().find(|r| r.kind == RegionKind::CoilSpacer).unwrap();

        assert_eq!(spacer.bounds(), ((2.5, 7.0), (-0.5, 0.5)));
        assert_eq!(regions.iter().filter(|r| r.kind == RegionKind::Spool).count(), 2);
    }

    #[test]
    fn test_spool_outside_bore_is_skipped() {
        let mut coil = fixtures::coil();
        coil.spool_id = 7.0;
        coil.spool_od = 14.0;
        coil.spool_flange_width = 0.5;
        let regions = create_coils(&coil);
        assert!(regions.iter().all(|r| r.kind != RegionKind::Spool));
    }

    #[test]
    fn test_no_spacer_when_flanges_fill_pitch() {
        let mut coil = fixtures::coil();
        coil.spool_id = 5.0;
        coil.spool_od = 14.0;
        coil.spool_flange_width = 1.0;
        let regions = create_coils(&coil);
        assert!(regions.iter().all(|r| r.kind != RegionKind::CoilSpacer));
    }
}
