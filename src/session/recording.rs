// src/session/recording.rs

//! An in-memory solver session.
//!
//! Records every command, tracks block labels and their translations, and
//! answers block integrals from a pluggable force response. It backs the
//! unit tests and the CLI dry-run, where no solver process is available.

use super::{
    AnalysisOps, BlockProps, DocumentOps, EditMode, GeometryOps, IntegralQuantity, OuterCondition,
    ProblemDefinition, ProblemKind, SelectionOps, SessionError, SessionResult,
};
use crate::{Phase, Point};
use nalgebra::Vector2;
use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// One solver call, as issued.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Open,
    NewDocument(ProblemKind),
    OpenDocument(PathBuf),
    DefineProblem(ProblemDefinition),
    GetMaterial(String),
    AddCircuit { name: String, current: f64, series: bool },
    SaveAs(PathBuf),
    Close,
    AddNode(Point),
    AddSegment(Point, Point),
    AddBlockLabel(Point),
    SetSegmentGroup(i32),
    SetBlockProps(BlockProps),
    MakeOpenBoundary { shells: u32, radius: f64, center: Point, outer: OuterCondition },
    SetEditMode(EditMode),
    TranslateSelected(Vector2<f64>),
    SelectSegment(Point),
    SelectLabel(Point),
    SelectGroup(i32),
    ClearSelected,
    CreateMesh,
    Analyze,
    LoadSolution,
    SetSmoothing(bool),
    HideContourPlot,
    ClearBlockSelection,
    GroupSelectBlock(i32),
    BlockIntegral(IntegralQuantity),
    SetCurrent { circuit: String, current: f64 },
}

/// What the force response sees when a block integral is requested.
#[derive(Debug, Clone)]
pub struct ForceQuery {
    pub quantity: IntegralQuantity,
    /// Groups selected in the post-processor, ascending.
    pub groups: Vec<i32>,
    /// Present circuit currents by circuit name.
    pub currents: BTreeMap<String, f64>,
    /// Accumulated axial translation of each translated group.
    pub group_offsets: BTreeMap<i32, f64>,
}

type ForceResponse = Box<dyn FnMut(&ForceQuery) -> f64>;

/// A block label placed in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLabel {
    pub at: Point,
    pub props: Option<BlockProps>,
}

pub struct RecordingSession {
    commands: Rc<RefCell<Vec<Command>>>,
    open: bool,
    has_document: bool,
    analyzed: bool,
    solution_loaded: bool,
    materials: BTreeSet<String>,
    rejected_materials: BTreeSet<String>,
    circuits: BTreeMap<String, f64>,
    labels: Vec<PlacedLabel>,
    selected_labels: Vec<usize>,
    selected_groups: BTreeSet<i32>,
    group_offsets: BTreeMap<i32, f64>,
    block_selection: BTreeSet<i32>,
    fail_operation: Option<&'static str>,
    force_response: ForceResponse,
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("open", &self.open)
            .field("commands", &self.commands.borrow().len())
            .field("labels", &self.labels.len())
            .field("circuits", &self.circuits)
            .finish()
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSession {
    /// A session whose per-group force is the current of that group's circuit, in newtons per ampere.
    pub fn new() -> Self {
        Self::with_force_response(linear_force(1.0))
    }

    pub fn with_force_response(response: impl FnMut(&ForceQuery) -> f64 + 'static) -> Self {
        RecordingSession {
            commands: Rc::new(RefCell::new(Vec::new())),
            open: false,
            has_document: false,
            analyzed: false,
            solution_loaded: false,
            materials: BTreeSet::new(),
            rejected_materials: BTreeSet::new(),
            circuits: BTreeMap::new(),
            labels: Vec::new(),
            selected_labels: Vec::new(),
            selected_groups: BTreeSet::new(),
            group_offsets: BTreeMap::new(),
            block_selection: BTreeSet::new(),
            fail_operation: None,
            force_response: Box::new(response),
        }
    }

    /// Makes `get_material` fail for `name`, as if the library lacked it.
    pub fn reject_material(mut self, name: &str) -> Self {
        self.rejected_materials.insert(name.to_string());
        self
    }

    /// Pre-defines circuits, as found in a model file opened with `open_document`.
    pub fn with_circuits<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        for name in names {
            self.circuits.insert(name.to_string(), 0.0);
        }
        self
    }

    /// Makes every call to `operation` fail.
    pub fn fail_on(mut self, operation: &'static str) -> Self {
        self.fail_operation = Some(operation);
        self
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn commands(&self) -> Ref<'_, Vec<Command>> {
        self.commands.borrow()
    }

    /// Shared handle on the command log, usable after the session is dropped.
    pub fn commands_handle(&self) -> Rc<RefCell<Vec<Command>>> {
        Rc::clone(&self.commands)
    }

    pub fn materials(&self) -> &BTreeSet<String> {
        &self.materials
    }

    pub fn circuits(&self) -> &BTreeMap<String, f64> {
        &self.circuits
    }

    pub fn labels(&self) -> &[PlacedLabel] {
        &self.labels
    }

    /// Accumulated axial translation applied to `group`.
    pub fn group_offset(&self, group: i32) -> f64 {
        self.group_offsets.get(&group).copied().unwrap_or(0.0)
    }

    fn issue(&mut self, operation: &'static str, command: Command) -> SessionResult<()> {
        if !self.open && command != Command::Open {
            return Err(SessionError::NotOpen { operation });
        }
        if self.fail_operation == Some(operation) {
            return Err(SessionError::call(operation, "injected failure"));
        }
        self.commands.borrow_mut().push(command);
        Ok(())
    }

    fn require_document(&self, operation: &'static str) -> SessionResult<()> {
        if self.has_document {
            Ok(())
        } else {
            Err(SessionError::call(operation, "no document is open"))
        }
    }

    fn invalidate_solution(&mut self) {
        self.analyzed = false;
        self.solution_loaded = false;
    }
}

/// Force response proportional to each selected group's circuit current.
///
/// Groups 1, 2 and 3 carry circuits CoilA, CoilB and CoilC; every other group contributes nothing.
pub fn linear_force(newtons_per_ampere: f64) -> impl FnMut(&ForceQuery) -> f64 {
    move |query: &ForceQuery| {
        query
            .groups
            .iter()
            .filter_map(|&group| Phase::from_group(group))
            .map(|phase| query.currents.get(phase.circuit_name()).copied().unwrap_or(0.0))
            .sum::<f64>()
            * newtons_per_ampere
    }
}

impl DocumentOps for RecordingSession {
    fn open(&mut self) -> SessionResult<()> {
        self.issue("openfemm", Command::Open)?;
        self.open = true;
        Ok(())
    }

    fn new_document(&mut self, kind: ProblemKind) -> SessionResult<()> {
        self.issue("newdocument", Command::NewDocument(kind))?;
        self.has_document = true;
        Ok(())
    }

    fn open_document(&mut self, path: &Path) -> SessionResult<()> {
        self.issue("opendocument", Command::OpenDocument(path.to_path_buf()))?;
        self.has_document = true;
        Ok(())
    }

    fn define_problem(&mut self, definition: &ProblemDefinition) -> SessionResult<()> {
        self.require_document("mi_probdef")?;
        self.issue("mi_probdef", Command::DefineProblem(definition.clone()))
    }

    fn get_material(&mut self, name: &str) -> SessionResult<()> {
        self.require_document("mi_getmaterial")?;
        self.issue("mi_getmaterial", Command::GetMaterial(name.to_string()))?;
        if self.rejected_materials.contains(name) {
            return Err(SessionError::call("mi_getmaterial", format!("material '{}' not found in library", name)));
        }
        self.materials.insert(name.to_string());
        Ok(())
    }

    fn add_circuit(&mut self, name: &str, current: f64, series: bool) -> SessionResult<()> {
        self.require_document("mi_addcircprop")?;
        self.issue("mi_addcircprop", Command::AddCircuit { name: name.to_string(), current, series })?;
        self.circuits.insert(name.to_string(), current);
        Ok(())
    }

    fn save_as(&mut self, path: &Path) -> SessionResult<()> {
        self.require_document("mi_saveas")?;
        self.issue("mi_saveas", Command::SaveAs(path.to_path_buf()))
    }

    fn close(&mut self) -> SessionResult<()> {
        self.issue("closefemm", Command::Close)?;
        self.open = false;
        self.has_document = false;
        Ok(())
    }
}

impl GeometryOps for RecordingSession {
    fn add_node(&mut self, at: Point) -> SessionResult<()> {
        self.issue("mi_addnode", Command::AddNode(at))?;
        self.invalidate_solution();
        Ok(())
    }

    fn add_segment(&mut self, from: Point, to: Point) -> SessionResult<()> {
        self.issue("mi_addsegment", Command::AddSegment(from, to))?;
        self.invalidate_solution();
        Ok(())
    }

    fn add_block_label(&mut self, at: Point) -> SessionResult<()> {
        self.issue("mi_addblocklabel", Command::AddBlockLabel(at))?;
        self.labels.push(PlacedLabel { at, props: None });
        self.invalidate_solution();
        Ok(())
    }

    fn set_segment_group(&mut self, group: i32) -> SessionResult<()> {
        self.issue("mi_setsegmentprop", Command::SetSegmentGroup(group))
    }

    fn set_block_props(&mut self, props: &BlockProps) -> SessionResult<()> {
        self.issue("mi_setblockprop", Command::SetBlockProps(props.clone()))?;
        for &index in &self.selected_labels {
            self.labels[index].props = Some(props.clone());
        }
        self.invalidate_solution();
        Ok(())
    }

    fn make_open_boundary(&mut self, shells: u32, radius: f64, center: Point, outer: OuterCondition) -> SessionResult<()> {
        self.issue("mi_makeABC", Command::MakeOpenBoundary { shells, radius, center, outer })?;
        self.invalidate_solution();
        Ok(())
    }

    fn set_edit_mode(&mut self, mode: EditMode) -> SessionResult<()> {
        self.issue("mi_seteditmode", Command::SetEditMode(mode))
    }

    fn translate_selected(&mut self, offset: Vector2<f64>) -> SessionResult<()> {
        self.issue("mi_movetranslate", Command::TranslateSelected(offset))?;
        let groups = &self.selected_groups;
        for label in &mut self.labels {
            if let Some(props) = &label.props {
                if groups.contains(&props.group) {
                    label.at += offset;
                }
            }
        }
        for &group in groups {
            *self.group_offsets.entry(group).or_insert(0.0) += offset.y;
        }
        self.invalidate_solution();
        Ok(())
    }
}

impl SelectionOps for RecordingSession {
    fn select_segment(&mut self, near: Point) -> SessionResult<()> {
        self.issue("mi_selectsegment", Command::SelectSegment(near))
    }

    fn select_label(&mut self, near: Point) -> SessionResult<()> {
        self.issue("mi_selectlabel", Command::SelectLabel(near))?;
        let nearest = self
            .labels
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = (a.at - near).norm();
                let db = (b.at - near).norm();
                da.total_cmp(&db)
            })
            .map(|(index, _)| index);
        if let Some(index) = nearest {
            self.selected_labels.push(index);
        }
        Ok(())
    }

    fn select_group(&mut self, group: i32) -> SessionResult<()> {
        self.issue("mi_selectgroup", Command::SelectGroup(group))?;
        self.selected_groups.insert(group);
        Ok(())
    }

    fn clear_selected(&mut self) -> SessionResult<()> {
        self.issue("mi_clearselected", Command::ClearSelected)?;
        self.selected_labels.clear();
        self.selected_groups.clear();
        Ok(())
    }
}

impl AnalysisOps for RecordingSession {
    fn create_mesh(&mut self) -> SessionResult<()> {
        self.require_document("mi_createmesh")?;
        self.issue("mi_createmesh", Command::CreateMesh)
    }

    fn analyze(&mut self) -> SessionResult<()> {
        self.require_document("mi_analyze")?;
        self.issue("mi_analyze", Command::Analyze)?;
        self.analyzed = true;
        self.solution_loaded = false;
        Ok(())
    }

    fn load_solution(&mut self) -> SessionResult<()> {
        if !self.analyzed {
            return Err(SessionError::call("mi_loadsolution", "no solution for the current geometry"));
        }
        self.issue("mi_loadsolution", Command::LoadSolution)?;
        self.solution_loaded = true;
        Ok(())
    }

    fn set_smoothing(&mut self, enabled: bool) -> SessionResult<()> {
        self.issue("mo_smooth", Command::SetSmoothing(enabled))
    }

    fn hide_contour_plot(&mut self) -> SessionResult<()> {
        self.issue("mo_hidecontourplot", Command::HideContourPlot)
    }

    fn clear_block_selection(&mut self) -> SessionResult<()> {
        self.issue("mo_clearblock", Command::ClearBlockSelection)?;
        self.block_selection.clear();
        Ok(())
    }

    fn group_select_block(&mut self, group: i32) -> SessionResult<()> {
        self.issue("mo_groupselectblock", Command::GroupSelectBlock(group))?;
        self.block_selection.insert(group);
        Ok(())
    }

    fn block_integral(&mut self, quantity: IntegralQuantity) -> SessionResult<f64> {
        if !self.solution_loaded {
            return Err(SessionError::call("mo_blockintegral", "no solution loaded"));
        }
        if self.block_selection.is_empty() {
            return Err(SessionError::call("mo_blockintegral", "no blocks selected"));
        }
        self.issue("mo_blockintegral", Command::BlockIntegral(quantity))?;
        let query = ForceQuery {
            quantity,
            groups: self.block_selection.iter().copied().collect(),
            currents: self.circuits.clone(),
            group_offsets: self.group_offsets.clone(),
        };
        Ok((self.force_response)(&query))
    }

    fn set_current(&mut self, circuit: &str, current: f64) -> SessionResult<()> {
        if !self.circuits.contains_key(circuit) {
            return Err(SessionError::call("mi_setcurrent", format!("unknown circuit '{}'", circuit)));
        }
        self.issue("mi_setcurrent", Command::SetCurrent { circuit: circuit.to_string(), current })?;
        self.circuits.insert(circuit.to_string(), current);
        self.invalidate_solution();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened() -> RecordingSession {
        let mut session = RecordingSession::new();
        session.open().unwrap();
        session.new_document(ProblemKind::Magnetic).unwrap();
        session
    }

    #[test]
    fn test_calls_before_open_are_rejected() {
        let mut session = RecordingSession::new();
        let err = session.add_node(Point::new(0.0, 0.0)).unwrap_err();
        assert!(matches!(err, SessionError::NotOpen { operation: "mi_addnode" }));
    }

    #[test]
    fn test_rejected_material_fails_and_is_not_added() {
        let mut session = opened().reject_material("Unobtainium");
        assert!(session.get_material("Unobtainium").is_err());
        session.get_material("Air").unwrap();
        assert_eq!(session.materials().iter().collect::<Vec<_>>(), vec!["Air"]);
    }

    #[test]
    fn test_translate_moves_only_selected_groups() {
        let mut session = opened();
        for (y, group) in [(0.0, 0), (1.0, 2)] {
            let at = Point::new(1.0, y);
            session.add_block_label(at).unwrap();
            session.select_label(at).unwrap();
            session.set_block_props(&BlockProps::passive("Air", group)).unwrap();
            session.clear_selected().unwrap();
        }
        session.select_group(2).unwrap();
        session.translate_selected(Vector2::new(0.0, 2.5)).unwrap();

        assert_eq!(session.labels()[0].at, Point::new(1.0, 0.0));
        assert_eq!(session.labels()[1].at, Point::new(1.0, 3.5));
        assert_eq!(session.group_offset(2), 2.5);
        assert_eq!(session.group_offset(0), 0.0);
    }

    #[test]
    fn test_block_integral_requires_loaded_solution() {
        let mut session = opened();
        session.add_circuit("CoilA", 0.0, true).unwrap();
        session.group_select_block(1).unwrap();
        assert!(session.block_integral(IntegralQuantity::AxialForce).is_err());

        session.create_mesh().unwrap();
        session.analyze().unwrap();
        session.load_solution().unwrap();
        assert_eq!(session.block_integral(IntegralQuantity::AxialForce).unwrap(), 0.0);
    }

    #[test]
    fn test_linear_force_follows_circuit_currents() {
        let mut session = opened();
        for name in ["CoilA", "CoilB", "CoilC"] {
            session.add_circuit(name, 0.0, true).unwrap();
        }
        session.set_current("CoilA", 2.0).unwrap();
        session.set_current("CoilC", -0.5).unwrap();
        session.analyze().unwrap();
        session.load_solution().unwrap();

        session.group_select_block(1).unwrap();
        session.group_select_block(3).unwrap();
        assert_eq!(session.block_integral(IntegralQuantity::AxialForce).unwrap(), 1.5);
    }

    #[test]
    fn test_unknown_circuit_current_is_an_error() {
        let mut session = opened();
        let err = session.set_current("CoilZ", 1.0).unwrap_err();
        assert_eq!(err.operation(), "mi_setcurrent");
    }

    #[test]
    fn test_injected_failure_names_operation() {
        let mut session = opened().fail_on("mi_analyze");
        let err = session.analyze().unwrap_err();
        assert!(err.to_string().contains("mi_analyze"));
    }
}
