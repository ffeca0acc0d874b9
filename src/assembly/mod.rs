// src/assembly/mod.rs

//! Turns motor parameters into a saved solver model.

use crate::config::MotorParameters;
use crate::geometry::{self, MotorGeometry};
use crate::session::{ProblemDefinition, ProblemKind, SolverSession};
use crate::{Phase, StudyResult};
use serde::Serialize;
use std::path::PathBuf;

/// Default file name of a generated model.
pub const DEFAULT_MODEL_FILE: &str = "SimGenerated.fem";

/// A material the solver library could not provide.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialImportWarning {
    pub material: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaterialReport {
    pub added: Vec<String>,
    pub failed: Vec<MaterialImportWarning>,
}

/// The model as it was drawn and saved.
#[derive(Debug, Clone)]
pub struct AssembledModel {
    pub materials: MaterialReport,
    pub geometry: MotorGeometry,
    pub path: PathBuf,
}

pub struct ModelBuilder {
    parameters: MotorParameters,
    output_path: PathBuf,
}

impl ModelBuilder {
    pub fn new(parameters: MotorParameters, output_path: impl Into<PathBuf>) -> Self {
        ModelBuilder { parameters, output_path: output_path.into() }
    }

    pub fn parameters(&self) -> &MotorParameters {
        &self.parameters
    }

    /// Creates the document, imports materials, defines the phase circuits,
    /// draws the whole motor and saves it.
    ///
    /// A material missing from the solver library is reported, not raised;
    /// every other solver failure aborts the build.
    pub fn build<S: SolverSession + ?Sized>(&self, session: &mut S) -> StudyResult<AssembledModel> {
        let _span = tracing::info_span!("assemble", path = %self.output_path.display()).entered();

        session.new_document(ProblemKind::Magnetic)?;
        session.define_problem(&ProblemDefinition::axisymmetric_mm())?;

        let materials = self.import_materials(session);

        for phase in Phase::ALL {
            session.add_circuit(phase.circuit_name(), 0.0, true)?;
        }

        let geometry = geometry::synthesize(&self.parameters.magnet, &self.parameters.coil);
        geometry::emit_all(session, &geometry)?;
        tracing::info!(regions = geometry.regions.len(), radius = geometry.boundary.radius, "geometry emitted");

        session.save_as(&self.output_path)?;
        tracing::info!(path = %self.output_path.display(), "model saved");

        Ok(AssembledModel { materials, geometry, path: self.output_path.clone() })
    }

    fn import_materials<S: SolverSession + ?Sized>(&self, session: &mut S) -> MaterialReport {
        let mut report = MaterialReport::default();
        for material in &self.parameters.materials {
            match session.get_material(material) {
                Ok(()) => report.added.push(material.clone()),
                Err(e) => {
                    tracing::warn!(material = %material, error = %e, "could not add material");
                    report.failed.push(MaterialImportWarning { material: material.clone(), reason: e.to_string() });
                }
            }
        }
        tracing::info!(added = report.added.len(), failed = report.failed.len(), "materials imported");
        report
    }
}
