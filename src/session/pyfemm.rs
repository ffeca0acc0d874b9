// src/session/pyfemm.rs

//! FEMM driven through its Python bindings (`pip install pyfemm`).

use super::{
    AnalysisOps, BlockProps, DocumentOps, EditMode, GeometryOps, IntegralQuantity, OuterCondition,
    ProblemDefinition, ProblemKind, SelectionOps, SessionError, SessionResult,
};
use crate::Point;
use nalgebra::Vector2;
use pyo3::prelude::*;
use pyo3::types::{PyModule, PyTuple};
use std::path::Path;

/// Boundary property name FEMM uses for "no boundary condition".
const NO_BOUNDARY: &str = "<None>";

/// `openfemm` argument that keeps the FEMM window hidden.
const HIDE_WINDOW: i32 = 1;

/// A session bound to the `femm` Python module.
pub struct PyFemmSession {
    femm: Py<PyModule>,
}

impl PyFemmSession {
    /// Imports the `femm` module. Fails if Python cannot find it.
    pub fn new() -> SessionResult<Self> {
        Python::with_gil(|py| {
            let femm = PyModule::import_bound(py, "femm").map_err(|e| SessionError::call("import femm", e.to_string()))?;
            Ok(PyFemmSession { femm: femm.unbind() })
        })
    }

    fn call<A>(&self, operation: &'static str, args: A) -> SessionResult<()>
    where
        A: IntoPy<Py<PyTuple>>,
    {
        Python::with_gil(|py| {
            self.femm
                .bind(py)
                .call_method1(operation, args)
                .map(|_| ())
                .map_err(|e| SessionError::call(operation, e.to_string()))
        })
    }
}

fn path_arg(path: &Path) -> String {
    // FEMM expects forward slashes on every platform
    path.to_string_lossy().replace('\\', "/")
}

impl DocumentOps for PyFemmSession {
    fn open(&mut self) -> SessionResult<()> {
        self.call("openfemm", (HIDE_WINDOW,))
    }

    fn new_document(&mut self, kind: ProblemKind) -> SessionResult<()> {
        self.call("newdocument", (kind.code(),))
    }

    fn open_document(&mut self, path: &Path) -> SessionResult<()> {
        self.call("opendocument", (path_arg(path),))
    }

    fn define_problem(&mut self, definition: &ProblemDefinition) -> SessionResult<()> {
        self.call(
            "mi_probdef",
            (definition.frequency, definition.length_unit.as_str(), definition.formulation.keyword()),
        )
    }

    fn get_material(&mut self, name: &str) -> SessionResult<()> {
        self.call("mi_getmaterial", (name,))
    }

    fn add_circuit(&mut self, name: &str, current: f64, series: bool) -> SessionResult<()> {
        self.call("mi_addcircprop", (name, current, i32::from(series)))
    }

    fn save_as(&mut self, path: &Path) -> SessionResult<()> {
        self.call("mi_saveas", (path_arg(path),))
    }

    fn close(&mut self) -> SessionResult<()> {
        self.call("closefemm", ())
    }
}

impl GeometryOps for PyFemmSession {
    fn add_node(&mut self, at: Point) -> SessionResult<()> {
        self.call("mi_addnode", (at.x, at.y))
    }

    fn add_segment(&mut self, from: Point, to: Point) -> SessionResult<()> {
        self.call("mi_addsegment", (from.x, from.y, to.x, to.y))
    }

    fn add_block_label(&mut self, at: Point) -> SessionResult<()> {
        self.call("mi_addblocklabel", (at.x, at.y))
    }

    fn set_segment_group(&mut self, group: i32) -> SessionResult<()> {
        // (boundary, element size, automesh, hidden, group)
        self.call("mi_setsegmentprop", (NO_BOUNDARY, 0, 1, 0, group))
    }

    fn set_block_props(&mut self, props: &BlockProps) -> SessionResult<()> {
        self.call(
            "mi_setblockprop",
            (
                props.material.as_str(),
                i32::from(props.automesh),
                props.mesh_size,
                props.circuit.as_deref().unwrap_or(""),
                props.magnetization,
                props.group,
                props.turns,
            ),
        )
    }

    fn make_open_boundary(&mut self, shells: u32, radius: f64, center: Point, outer: OuterCondition) -> SessionResult<()> {
        self.call("mi_makeABC", (shells, radius, center.x, center.y, outer.code()))
    }

    fn set_edit_mode(&mut self, mode: EditMode) -> SessionResult<()> {
        self.call("mi_seteditmode", (mode.keyword(),))
    }

    fn translate_selected(&mut self, offset: Vector2<f64>) -> SessionResult<()> {
        self.call("mi_movetranslate", (offset.x, offset.y))
    }
}

impl SelectionOps for PyFemmSession {
    fn select_segment(&mut self, near: Point) -> SessionResult<()> {
        self.call("mi_selectsegment", (near.x, near.y))
    }

    fn select_label(&mut self, near: Point) -> SessionResult<()> {
        self.call("mi_selectlabel", (near.x, near.y))
    }

    fn select_group(&mut self, group: i32) -> SessionResult<()> {
        self.call("mi_selectgroup", (group,))
    }

    fn clear_selected(&mut self) -> SessionResult<()> {
        self.call("mi_clearselected", ())
    }
}

impl AnalysisOps for PyFemmSession {
    fn create_mesh(&mut self) -> SessionResult<()> {
        self.call("mi_createmesh", ())
    }

    fn analyze(&mut self) -> SessionResult<()> {
        self.call("mi_analyze", ())
    }

    fn load_solution(&mut self) -> SessionResult<()> {
        self.call("mi_loadsolution", ())
    }

    fn set_smoothing(&mut self, enabled: bool) -> SessionResult<()> {
        self.call("mo_smooth", (if enabled { "on" } else { "off" },))
    }

    fn hide_contour_plot(&mut self) -> SessionResult<()> {
        self.call("mo_hidecontourplot", ())
    }

    fn clear_block_selection(&mut self) -> SessionResult<()> {
        self.call("mo_clearblock", ())
    }

    fn group_select_block(&mut self, group: i32) -> SessionResult<()> {
        self.call("mo_groupselectblock", (group,))
    }

    fn block_integral(&mut self, quantity: IntegralQuantity) -> SessionResult<f64> {
        const OPERATION: &str = "mo_blockintegral";
        Python::with_gil(|py| {
            let value = self
                .femm
                .bind(py)
                .call_method1(OPERATION, (quantity.code(),))
                .map_err(|e| SessionError::call(OPERATION, e.to_string()))?;
            // some pyfemm versions wrap scalar results in a list
            if let Ok(scalar) = value.extract::<f64>() {
                return Ok(scalar);
            }
            let values: Vec<f64> = value.extract().map_err(|e| SessionError::call(OPERATION, e.to_string()))?;
            values
                .first()
                .copied()
                .ok_or_else(|| SessionError::call(OPERATION, "empty result"))
        })
    }

    fn set_current(&mut self, circuit: &str, current: f64) -> SessionResult<()> {
        self.call("mi_setcurrent", (circuit, current))
    }
}
