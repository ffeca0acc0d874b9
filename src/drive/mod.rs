// src/drive/mod.rs

//! Moves the coil stack and keeps the phase currents synchronized with its position.

use crate::geometry::MOVER_GROUPS;
use crate::session::{AnalysisOps, EditMode, GeometryOps, SelectionOps, SessionResult};
use crate::{Phase, PhaseValues};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Balanced three-phase sinusoidal excitation locked to mechanical position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Excitation {
    /// Peak phase current (A).
    pub peak_current: f64,
    /// Distance between two identical magnetic poles (mm).
    pub pole_length: f64,
    /// Axial coil pitch (mm); shifts the electrical angle of every phase.
    pub coil_pitch: f64,
}

impl Excitation {
    /// `peak * sin(2π·pos/pole + phase + 2π·coil_pitch/pole)`.
    pub fn compute_current(&self, position: f64, phase: f64) -> f64 {
        let angle = 2.0 * PI * position / self.pole_length + phase + 2.0 * PI * self.coil_pitch / self.pole_length;
        self.peak_current * angle.sin()
    }

    /// Currents of all three phases at `position`.
    pub fn currents_at(&self, position: f64) -> PhaseValues {
        PhaseValues::from_fn(|phase| self.compute_current(position, phase.angle()))
    }
}

/// Tracks the mover position and pushes currents after each move.
#[derive(Debug, Clone)]
pub struct MoverDriver {
    excitation: Excitation,
    offset_pos: f64,
    currents: PhaseValues,
}

impl MoverDriver {
    pub fn new(excitation: Excitation) -> Self {
        MoverDriver { excitation, offset_pos: 0.0, currents: PhaseValues::default() }
    }

    pub fn excitation(&self) -> &Excitation {
        &self.excitation
    }

    /// Accumulated mover displacement from the as-built position.
    pub fn offset_pos(&self) -> f64 {
        self.offset_pos
    }

    /// Currents last pushed to the circuits.
    pub fn currents(&self) -> PhaseValues {
        self.currents
    }

    /// Rigidly moves every mover group by `delta` along the axis, then sets
    /// the three circuit currents for the new position.
    ///
    /// Magnets (group 0) never move. Must run before every solve, including
    /// the first one, so that position and currents agree.
    pub fn translate_and_set_currents<S>(&mut self, session: &mut S, delta: f64) -> SessionResult<()>
    where
        S: GeometryOps + SelectionOps + AnalysisOps + ?Sized,
    {
        session.clear_selected()?;
        session.set_edit_mode(EditMode::Group)?;
        for group in MOVER_GROUPS {
            session.select_group(group)?;
        }
        session.translate_selected(Vector2::new(0.0, delta))?;
        self.offset_pos += delta;

        self.currents = self.excitation.currents_at(self.offset_pos);
        for phase in Phase::ALL {
            session.set_current(phase.circuit_name(), self.currents[phase])?;
        }
        tracing::debug!(
            position = self.offset_pos,
            a = self.currents.a,
            b = self.currents.b,
            c = self.currents.c,
            "mover translated"
        );
        Ok(())
    }
}
