pub mod assembly;
pub mod config;
pub mod drive;
pub mod geometry;
pub mod output;
pub mod params;
pub mod provenance;
pub mod session;
pub mod sweep;

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};
use thiserror::Error;

use assembly::{MaterialReport, ModelBuilder};
use config::MotorParameters;
use drive::{Excitation, MoverDriver};
use provenance::{RunLedger, Stage};
use session::{DocumentOps, ProblemDefinition, ScopedSession, SessionError, SolverSession};
use sweep::{SimulationSample, SweepRange};

/// A point in the (r, z) half-plane, in millimeters.
pub type Point = nalgebra::Point2<f64>;

// --- Phases ---

/// One of the three winding phases, each with its own circuit and group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Phase {
    A,
    B,
    C,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::A, Phase::B, Phase::C];

    pub fn circuit_name(self) -> &'static str {
        match self {
            Phase::A => "CoilA",
            Phase::B => "CoilB",
            Phase::C => "CoilC",
        }
    }

    /// Group shared by every winding of this phase.
    pub fn group(self) -> i32 {
        match self {
            Phase::A => 1,
            Phase::B => 2,
            Phase::C => 3,
        }
    }

    pub fn from_group(group: i32) -> Option<Phase> {
        Phase::ALL.into_iter().find(|phase| phase.group() == group)
    }

    /// Electrical phase offset in radians.
    pub fn angle(self) -> f64 {
        match self {
            Phase::A => 0.0,
            Phase::B => 2.0 * PI / 3.0,
            Phase::C => -2.0 * PI / 3.0,
        }
    }
}

/// One value per phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseValues {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl PhaseValues {
    pub fn from_fn(mut f: impl FnMut(Phase) -> f64) -> Self {
        PhaseValues { a: f(Phase::A), b: f(Phase::B), c: f(Phase::C) }
    }
}

impl Index<Phase> for PhaseValues {
    type Output = f64;

    fn index(&self, phase: Phase) -> &f64 {
        match phase {
            Phase::A => &self.a,
            Phase::B => &self.b,
            Phase::C => &self.c,
        }
    }
}

impl IndexMut<Phase> for PhaseValues {
    fn index_mut(&mut self, phase: Phase) -> &mut f64 {
        match phase {
            Phase::A => &mut self.a,
            Phase::B => &mut self.b,
            Phase::C => &mut self.c,
        }
    }
}

// --- Errors ---

#[derive(Debug, Error)]
pub enum StudyError {
    #[error("configuration error in {}: {message}", path.display())]
    Configuration { path: PathBuf, message: String },

    #[error("missing required field '{field}' in section '{section}'")]
    Validation { section: &'static str, field: &'static str },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("invalid sweep: {0}")]
    Sweep(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StudyResult<T> = Result<T, StudyError>;

// --- Study Facade ---

/// Where the solver model comes from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    /// Synthesize the model from parameters and save it to `model_path`.
    Generate { parameters: MotorParameters, model_path: PathBuf },
    /// Open a model file built earlier, driving it with the given excitation.
    Load { model_path: PathBuf, excitation: Excitation },
}

/// Run settings shared by both model sources.
#[derive(Debug, Clone)]
pub struct StudyOptions {
    pub sweep: SweepRange,
    /// Directory receiving the results table, the ledger and the solver scratch file.
    pub out_dir: PathBuf,
}

impl StudyOptions {
    pub fn scratch_path(&self) -> PathBuf {
        self.out_dir.join("SimOutput.fem")
    }

    pub fn results_path(&self) -> PathBuf {
        self.out_dir.join(output::RESULTS_FILE)
    }

    pub fn provenance_path(&self) -> PathBuf {
        self.out_dir.join(provenance::LEDGER_FILE)
    }
}

#[derive(Debug, Clone)]
pub struct StudyOutcome {
    pub samples: Vec<SimulationSample>,
    /// Material import results; only present when the model was generated.
    pub materials: Option<MaterialReport>,
    pub results_path: PathBuf,
    pub provenance_path: PathBuf,
}

/// Builds or loads a motor model, sweeps the mover through it and writes
/// the results table and the run ledger.
#[derive(Debug, Default)]
pub struct MotorStudy {
    ledger: RunLedger,
}

impl MotorStudy {
    pub fn new() -> Self {
        MotorStudy { ledger: RunLedger::new() }
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    /// The main entry point: one solver session from open to close.
    ///
    /// The session is closed on every path out of this call, including errors.
    pub fn run<S: SolverSession>(
        &mut self,
        session: S,
        source: ModelSource,
        options: &StudyOptions,
    ) -> StudyResult<StudyOutcome> {
        let mut session = ScopedSession::open(session)?;

        let (excitation, materials) = match source {
            ModelSource::Generate { parameters, model_path } => {
                let excitation = excitation_for(&parameters);
                self.ledger.record(
                    Stage::Parameters,
                    &parameters,
                    serde_json::json!({ "source": parameters.source.display().to_string() }),
                )?;
                let model = ModelBuilder::new(parameters, model_path).build(&mut *session)?;
                self.ledger.record(
                    Stage::Geometry,
                    &model.geometry,
                    serde_json::json!({
                        "regions": model.geometry.regions.len(),
                        "model": model.path.display().to_string(),
                        "failed_materials": model.materials.failed.len(),
                    }),
                )?;
                (excitation, Some(model.materials))
            }
            ModelSource::Load { model_path, excitation } => {
                load_model(&mut *session, &model_path)?;
                self.ledger.record(
                    Stage::Parameters,
                    &excitation,
                    serde_json::json!({ "model": model_path.display().to_string() }),
                )?;
                (excitation, None)
            }
        };

        fs::create_dir_all(&options.out_dir)?;
        let mut driver = MoverDriver::new(excitation);
        let samples = sweep::run_sweep(&mut *session, &mut driver, &options.sweep, &options.scratch_path())?;
        self.ledger.record(
            Stage::Sweep,
            &samples,
            serde_json::json!({ "samples": samples.len(), "range": options.sweep }),
        )?;

        let results_path = options.results_path();
        output::save_samples_csv(&samples, &results_path)?;
        let provenance_path = options.provenance_path();
        self.ledger.save(&provenance_path)?;

        session.close()?;
        tracing::info!(samples = samples.len(), "study complete");

        Ok(StudyOutcome { samples, materials, results_path, provenance_path })
    }
}

/// Excitation of a generated model: pole length is two magnet pitches.
pub fn excitation_for(parameters: &MotorParameters) -> Excitation {
    let peak_current = parameters.coil.current_peak.unwrap_or_else(|| {
        tracing::warn!("coil current_peak is not set, sweeping at zero current");
        0.0
    });
    Excitation {
        peak_current,
        pole_length: parameters.magnet.pole_length(),
        coil_pitch: parameters.coil.pitch,
    }
}

/// Opens an existing model file and reapplies the problem definition.
pub fn load_model<S: DocumentOps + ?Sized>(session: &mut S, path: &Path) -> StudyResult<()> {
    if !path.is_file() {
        return Err(StudyError::Configuration {
            path: path.to_path_buf(),
            message: "model file does not exist".to_string(),
        });
    }
    session.open_document(path)?;
    session.define_problem(&ProblemDefinition::axisymmetric_mm())?;
    tracing::info!(path = %path.display(), "loaded existing model");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{synthesize, RegionKind};
    use crate::params::fixtures;
    use crate::session::{Command, RecordingSession};
    use std::collections::BTreeSet;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tlm_fem_{}_{}", name, std::process::id()))
    }

    fn parameters() -> MotorParameters {
        let (magnet, coil) = (fixtures::magnet(), fixtures::coil());
        let materials: BTreeSet<String> =
            ["Air", "C", "M", "Spacer"].into_iter().map(String::from).collect();
        MotorParameters { magnet, coil, materials, source: PathBuf::from("Parameters.yml") }
    }

    #[test]
    fn test_three_magnet_six_coil_scenario() {
        let geometry = synthesize(&fixtures::magnet(), &fixtures::coil());
        assert_eq!(geometry.count(RegionKind::Magnet), 3);
        assert_eq!(geometry.count(RegionKind::MagnetSpacer), 2);
        assert_eq!(geometry.count(RegionKind::Coil), 6);

        let coils: Vec<_> = geometry.regions.iter().filter(|r| r.kind == RegionKind::Coil).collect();
        let circuits: Vec<&str> = coils.iter().filter_map(|r| r.block.circuit.as_deref()).collect();
        assert_eq!(circuits, vec!["CoilC", "CoilB", "CoilA", "CoilC", "CoilB", "CoilA"]);
        let turns: Vec<i32> = coils.iter().map(|r| r.block.turns).collect();
        assert_eq!(turns, vec![-100, 100, -100, 100, -100, 100]);
    }

    #[test]
    fn test_phase_groups_round_trip() {
        for phase in Phase::ALL {
            assert_eq!(Phase::from_group(phase.group()), Some(phase));
        }
        assert_eq!(Phase::from_group(0), None);
        assert_eq!(Phase::from_group(4), None);
    }

    #[test]
    fn test_generate_study_writes_results_and_ledger() {
        let out_dir = scratch_dir("generate");
        let session = RecordingSession::new();
        let log = session.commands_handle();
        let options = StudyOptions { sweep: SweepRange::new(-2.0, 2.0, 1.0).unwrap(), out_dir: out_dir.clone() };
        let source = ModelSource::Generate { parameters: parameters(), model_path: out_dir.join("SimGenerated.fem") };

        let mut study = MotorStudy::new();
        let outcome = study.run(session, source, &options).unwrap();

        assert_eq!(outcome.samples.len(), 5);
        assert!(outcome.materials.unwrap().failed.is_empty());
        let csv = fs::read_to_string(&outcome.results_path).unwrap();
        assert_eq!(csv.lines().count(), 6);

        let stages: Vec<Stage> = study.ledger().entries().iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec![Stage::Parameters, Stage::Geometry, Stage::Sweep]);
        assert!(study.ledger().verify().unwrap());
        let saved = RunLedger::from_json(&fs::read_to_string(&outcome.provenance_path).unwrap()).unwrap();
        assert_eq!(saved.entries().len(), 3);

        let commands = log.borrow();
        assert_eq!(commands.iter().filter(|c| **c == Command::Close).count(), 1);
        assert_eq!(commands.last(), Some(&Command::Close));
        drop(commands);
        fs::remove_dir_all(&out_dir).unwrap();
    }

    #[test]
    fn test_session_is_closed_when_the_sweep_fails() {
        let out_dir = scratch_dir("failing");
        let session = RecordingSession::new().fail_on("mi_analyze");
        let log = session.commands_handle();
        let options = StudyOptions { sweep: SweepRange::new(0.0, 1.0, 1.0).unwrap(), out_dir: out_dir.clone() };
        let source = ModelSource::Generate { parameters: parameters(), model_path: out_dir.join("SimGenerated.fem") };

        let err = MotorStudy::new().run(session, source, &options).unwrap_err();
        assert!(matches!(err, StudyError::Session(_)));
        assert_eq!(log.borrow().last(), Some(&Command::Close));
        assert!(!options.results_path().exists());
        let _ = fs::remove_dir_all(&out_dir);
    }

    #[test]
    fn test_load_missing_model_is_a_configuration_error() {
        let session = RecordingSession::new();
        let log = session.commands_handle();
        let options = StudyOptions { sweep: SweepRange::new(0.0, 0.0, 1.0).unwrap(), out_dir: scratch_dir("missing") };
        let source = ModelSource::Load {
            model_path: PathBuf::from("no/such/model.fem"),
            excitation: Excitation { peak_current: 3.0, pole_length: 40.0, coil_pitch: 6.8 },
        };

        let err = MotorStudy::new().run(session, source, &options).unwrap_err();
        assert!(matches!(err, StudyError::Configuration { .. }));
        assert!(err.to_string().contains("model.fem"));
        assert_eq!(log.borrow().last(), Some(&Command::Close));
    }

    #[test]
    fn test_load_existing_model_sweeps_its_circuits() {
        let out_dir = scratch_dir("load");
        fs::create_dir_all(&out_dir).unwrap();
        let model_path = out_dir.join("SimGenerated.fem");
        fs::write(&model_path, "[Format] = 4.0\n").unwrap();

        let session = RecordingSession::new().with_circuits(Phase::ALL.map(Phase::circuit_name));
        let log = session.commands_handle();
        let options = StudyOptions { sweep: SweepRange::new(-20.0, 20.0, 10.0).unwrap(), out_dir: out_dir.clone() };
        let excitation = Excitation { peak_current: 3.0, pole_length: 40.0, coil_pitch: 6.8 };
        let source = ModelSource::Load { model_path: model_path.clone(), excitation };

        let outcome = MotorStudy::new().run(session, source, &options).unwrap();
        let positions: Vec<f64> = outcome.samples.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![-20.0, -10.0, 0.0, 10.0, 20.0]);
        assert_eq!(outcome.samples[2].currents, excitation.currents_at(0.0));
        assert!(outcome.materials.is_none());
        assert!(log.borrow().contains(&Command::OpenDocument(model_path)));
        fs::remove_dir_all(&out_dir).unwrap();
    }

    #[test]
    fn test_missing_peak_current_sweeps_at_zero() {
        let mut parameters = parameters();
        parameters.coil.current_peak = None;
        let excitation = excitation_for(&parameters);
        assert_eq!(excitation.peak_current, 0.0);
        assert_eq!(excitation.pole_length, 10.0);
        assert_eq!(excitation.coil_pitch, 5.0);
    }
}
