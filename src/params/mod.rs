// src/params/mod.rs

//! Typed parameter records for the magnet stack and the coil stack.
//!
//! Both records are built once by the configuration loader and never mutated
//! afterwards. Geometry synthesis consumes them as-is: no bounds checking is
//! performed there, see [`check_geometry`] for the opt-in validation layer.

use serde::{Deserialize, Serialize};

/// Material assigned to optional regions whose material was not configured.
pub const DEFAULT_MATERIAL: &str = "Air";

fn default_material() -> String {
    DEFAULT_MATERIAL.to_string()
}

/// Permanent-magnet stator stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Magnet {
    /// Outer diameter of each magnet (mm).
    pub od: f64,
    /// Axial length of each magnet (mm).
    pub length: f64,
    /// Axial center-to-center distance between magnets (mm).
    pub pitch: f64,
    pub material: String,
    #[serde(default = "default_material")]
    pub spacer_material: String,
    /// Number of magnets in the stack.
    pub number: u32,
    /// Outer diameter of the tube around the stack. No tube unless larger than `od`.
    #[serde(default)]
    pub tube_od: f64,
    #[serde(default = "default_material")]
    pub tube_material: String,
}

impl Magnet {
    /// Distance between two identical poles (N to N).
    pub fn pole_length(&self) -> f64 {
        2.0 * self.pitch
    }

    /// Axial extent of the magnet stack, first magnet bottom to last magnet top.
    pub fn stack_height(&self) -> f64 {
        (self.number.saturating_sub(1)) as f64 * self.pitch + self.length
    }
}

/// Three-phase coil stack (the mover).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Coil {
    /// Inner diameter of the winding (mm).
    pub id: f64,
    /// Outer diameter of the winding (mm).
    pub od: f64,
    pub length: f64,
    pub pitch: f64,
    pub material: String,
    #[serde(default = "default_material")]
    pub spacer_material: String,
    /// Turns per coil. The sign is assigned by the winding pattern.
    pub nb_turn: u32,
    pub number: u32,
    /// Peak phase current (A). Only needed when sweeping.
    #[serde(default)]
    pub current_peak: Option<f64>,
    /// Axial shift of the whole coil stack (mm).
    #[serde(default)]
    pub vertical_offset: f64,
    #[serde(default)]
    pub spool_id: f64,
    #[serde(default)]
    pub spool_od: f64,
    #[serde(default)]
    pub spool_flange_width: f64,
    #[serde(default = "default_material")]
    pub spool_material: String,
    #[serde(default)]
    pub tube_id: f64,
    #[serde(default)]
    pub tube_od: f64,
    #[serde(default = "default_material")]
    pub tube_material: String,
}

impl Coil {
    /// Whether a spool is drawn around each coil.
    pub fn has_spool(&self) -> bool {
        self.spool_flange_width > 0.0 && self.spool_id <= self.id && self.spool_od >= self.od
    }

    /// Whether a spacer is drawn between consecutive coils.
    pub fn needs_spacer(&self) -> bool {
        self.length + 2.0 * self.spool_flange_width < self.pitch
    }
}

/// A problem found by [`check_geometry`].
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryIssue {
    ZeroCount { section: &'static str },
    NonPositive { section: &'static str, field: &'static str, value: f64 },
    Overlap { section: &'static str, length: f64, pitch: f64 },
    InvertedBore { id: f64, od: f64 },
    NoTurns,
}

impl std::fmt::Display for GeometryIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            GeometryIssue::ZeroCount { section } => write!(f, "{}: number must be at least 1", section),
            GeometryIssue::NonPositive { section, field, value } => {
                write!(f, "{}: {} must be positive, got {}", section, field, value)
            }
            GeometryIssue::Overlap { section, length, pitch } => {
                write!(f, "{}: length {} exceeds pitch {}, elements overlap", section, length, pitch)
            }
            GeometryIssue::InvertedBore { id, od } => {
                write!(f, "Coil: id {} must be smaller than od {}", id, od)
            }
            GeometryIssue::NoTurns => write!(f, "Coil: nb_turn must be at least 1"),
        }
    }
}

/// Checks the invariants geometry synthesis relies on.
///
/// Synthesis itself never calls this: invalid parameters produce
/// self-overlapping geometry unless the caller opts in here first.
pub fn check_geometry(magnet: &Magnet, coil: &Coil) -> Vec<GeometryIssue> {
    let mut issues = Vec::new();

    if magnet.number == 0 {
        issues.push(GeometryIssue::ZeroCount { section: "Magnet" });
    }
    for (field, value) in [("od", magnet.od), ("length", magnet.length), ("pitch", magnet.pitch)] {
        if !(value > 0.0) {
            issues.push(GeometryIssue::NonPositive { section: "Magnet", field, value });
        }
    }
    if magnet.length > magnet.pitch {
        issues.push(GeometryIssue::Overlap { section: "Magnet", length: magnet.length, pitch: magnet.pitch });
    }

    if coil.number == 0 {
        issues.push(GeometryIssue::ZeroCount { section: "Coil" });
    }
    for (field, value) in [("od", coil.od), ("length", coil.length), ("pitch", coil.pitch)] {
        if !(value > 0.0) {
            issues.push(GeometryIssue::NonPositive { section: "Coil", field, value });
        }
    }
    if coil.id >= coil.od {
        issues.push(GeometryIssue::InvertedBore { id: coil.id, od: coil.od });
    }
    let coil_span = coil.length + 2.0 * coil.spool_flange_width.max(0.0);
    if coil.number > 1 && coil_span > coil.pitch {
        issues.push(GeometryIssue::Overlap { section: "Coil", length: coil_span, pitch: coil.pitch });
    }
    if coil.nb_turn == 0 {
        issues.push(GeometryIssue::NoTurns);
    }

    issues
}
