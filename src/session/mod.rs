// src/session/mod.rs

//! The interface to the external electromagnetic solver.
//!
//! The solver is a stateful, single-document process. Every operation the
//! rest of the crate needs is grouped into four capability traits, and an
//! explicit session value is passed to whoever issues commands. Nothing in
//! the crate keeps an ambient "current document".

pub mod recording;
#[cfg(feature = "pyfemm")]
pub mod pyfemm;

use crate::Point;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use thiserror::Error;

pub use recording::{Command, ForceQuery, RecordingSession};
#[cfg(feature = "pyfemm")]
pub use pyfemm::PyFemmSession;

/// Failure of a single solver call.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("solver operation `{operation}` failed: {message}")]
    Call { operation: &'static str, message: String },

    #[error("solver operation `{operation}` requires an open session")]
    NotOpen { operation: &'static str },
}

impl SessionError {
    pub fn call(operation: &'static str, message: impl Into<String>) -> Self {
        SessionError::Call { operation, message: message.into() }
    }

    /// Name of the solver operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            SessionError::Call { operation, .. } | SessionError::NotOpen { operation } => operation,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Analysis type of a new document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemKind {
    Magnetic,
    Electrostatic,
    HeatFlow,
    CurrentFlow,
}

impl ProblemKind {
    pub fn code(self) -> i32 {
        match self {
            ProblemKind::Magnetic => 0,
            ProblemKind::Electrostatic => 1,
            ProblemKind::HeatFlow => 2,
            ProblemKind::CurrentFlow => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formulation {
    Planar,
    Axisymmetric,
}

impl Formulation {
    pub fn keyword(self) -> &'static str {
        match self {
            Formulation::Planar => "planar",
            Formulation::Axisymmetric => "axi",
        }
    }
}

/// Problem definition applied right after a document is created or opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDefinition {
    /// Excitation frequency in Hz, zero for magnetostatics.
    pub frequency: f64,
    pub length_unit: String,
    pub formulation: Formulation,
}

impl ProblemDefinition {
    /// Magnetostatic, millimeters, axisymmetric: the only setup a tubular motor needs.
    pub fn axisymmetric_mm() -> Self {
        ProblemDefinition {
            frequency: 0.0,
            length_unit: "millimeters".to_string(),
            formulation: Formulation::Axisymmetric,
        }
    }
}

/// Properties assigned to a block label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockProps {
    pub material: String,
    pub automesh: bool,
    pub mesh_size: f64,
    /// Circuit the block belongs to, if it carries current.
    pub circuit: Option<String>,
    /// Magnetization direction in degrees.
    pub magnetization: f64,
    pub group: i32,
    /// Signed winding turns; zero for non-winding blocks.
    pub turns: i32,
}

impl BlockProps {
    /// Auto-meshed block without circuit, magnetization or turns.
    pub fn passive(material: impl Into<String>, group: i32) -> Self {
        BlockProps {
            material: material.into(),
            automesh: true,
            mesh_size: 0.0,
            circuit: None,
            magnetization: 0.0,
            group,
            turns: 0,
        }
    }
}

/// Condition on the outermost shell of an open boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OuterCondition {
    Dirichlet,
    Neumann,
}

impl OuterCondition {
    pub fn code(self) -> i32 {
        match self {
            OuterCondition::Dirichlet => 0,
            OuterCondition::Neumann => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditMode {
    Nodes,
    Segments,
    Blocks,
    Group,
}

impl EditMode {
    pub fn keyword(self) -> &'static str {
        match self {
            EditMode::Nodes => "nodes",
            EditMode::Segments => "segments",
            EditMode::Blocks => "blocks",
            EditMode::Group => "group",
        }
    }
}

/// Block integral quantities read back after a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegralQuantity {
    /// Weighted stress tensor force along the axis of symmetry.
    AxialForce,
}

impl IntegralQuantity {
    pub fn code(self) -> i32 {
        match self {
            IntegralQuantity::AxialForce => 19,
        }
    }
}

/// Process and document lifecycle, library and circuit definitions.
pub trait DocumentOps {
    /// Starts (or attaches to) the solver process.
    fn open(&mut self) -> SessionResult<()>;
    fn new_document(&mut self, kind: ProblemKind) -> SessionResult<()>;
    fn open_document(&mut self, path: &Path) -> SessionResult<()>;
    fn define_problem(&mut self, definition: &ProblemDefinition) -> SessionResult<()>;
    /// Copies a named material from the solver's library into the document.
    fn get_material(&mut self, name: &str) -> SessionResult<()>;
    fn add_circuit(&mut self, name: &str, current: f64, series: bool) -> SessionResult<()>;
    fn save_as(&mut self, path: &Path) -> SessionResult<()>;
    fn close(&mut self) -> SessionResult<()>;
}

/// Drawing and moving geometry.
pub trait GeometryOps {
    fn add_node(&mut self, at: Point) -> SessionResult<()>;
    fn add_segment(&mut self, from: Point, to: Point) -> SessionResult<()>;
    fn add_block_label(&mut self, at: Point) -> SessionResult<()>;
    /// Assigns a group to the selected segments, leaving their boundary unset.
    fn set_segment_group(&mut self, group: i32) -> SessionResult<()>;
    fn set_block_props(&mut self, props: &BlockProps) -> SessionResult<()>;
    fn make_open_boundary(&mut self, shells: u32, radius: f64, center: Point, outer: OuterCondition) -> SessionResult<()>;
    fn set_edit_mode(&mut self, mode: EditMode) -> SessionResult<()>;
    fn translate_selected(&mut self, offset: Vector2<f64>) -> SessionResult<()>;
}

/// Pre-processor selection.
pub trait SelectionOps {
    fn select_segment(&mut self, near: Point) -> SessionResult<()>;
    fn select_label(&mut self, near: Point) -> SessionResult<()>;
    fn select_group(&mut self, group: i32) -> SessionResult<()>;
    fn clear_selected(&mut self) -> SessionResult<()>;
}

/// Meshing, solving, post-processing and circuit excitation.
pub trait AnalysisOps {
    fn create_mesh(&mut self) -> SessionResult<()>;
    fn analyze(&mut self) -> SessionResult<()>;
    fn load_solution(&mut self) -> SessionResult<()>;
    fn set_smoothing(&mut self, enabled: bool) -> SessionResult<()>;
    fn hide_contour_plot(&mut self) -> SessionResult<()>;
    fn clear_block_selection(&mut self) -> SessionResult<()>;
    fn group_select_block(&mut self, group: i32) -> SessionResult<()>;
    /// Integrates `quantity` over every block currently selected in the post-processor.
    fn block_integral(&mut self, quantity: IntegralQuantity) -> SessionResult<f64>;
    fn set_current(&mut self, circuit: &str, current: f64) -> SessionResult<()>;
}

/// Everything a study needs from one solver session.
pub trait SolverSession: DocumentOps + GeometryOps + SelectionOps + AnalysisOps {}

impl<T: DocumentOps + GeometryOps + SelectionOps + AnalysisOps> SolverSession for T {}

/// Owns an opened session and closes it when dropped.
///
/// Use [`ScopedSession::close`] to observe the close result; on any early
/// return the drop path closes the solver and only logs a failure.
pub struct ScopedSession<S: DocumentOps> {
    inner: S,
    closed: bool,
}

impl<S: DocumentOps> ScopedSession<S> {
    pub fn open(mut session: S) -> SessionResult<Self> {
        session.open()?;
        tracing::debug!("solver session opened");
        Ok(ScopedSession { inner: session, closed: false })
    }

    /// Closes the solver. A failed close is not retried on drop.
    pub fn close(&mut self) -> SessionResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close()?;
        tracing::debug!("solver session closed");
        Ok(())
    }
}

impl<S: DocumentOps> Deref for ScopedSession<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.inner
    }
}

impl<S: DocumentOps> DerefMut for ScopedSession<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S: DocumentOps> Drop for ScopedSession<S> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.inner.close() {
                tracing::warn!(error = %e, "failed to close solver session");
            }
        }
    }
}
