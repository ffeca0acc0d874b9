// src/sweep/mod.rs

//! Position sweep: translate, mesh, solve and read back forces at each step.

use crate::drive::MoverDriver;
use crate::session::{AnalysisOps, DocumentOps, IntegralQuantity, SessionResult, SolverSession};
use crate::{Phase, PhaseValues, StudyError, StudyResult};
use serde::Serialize;
use std::path::Path;

/// Upper bound on the number of steps in one sweep.
pub const MAX_SWEEP_STEPS: f64 = 1_000_000.0;

/// Positions visited by a sweep.
///
/// The first sample is taken at `start`. Then `ceil((end - start) / step)`
/// further samples follow, each `step` further along. When the span divides
/// evenly the last sample sits exactly on `end`; otherwise it is the first
/// grid point past `end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepRange {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl SweepRange {
    pub fn new(start: f64, end: f64, step: f64) -> StudyResult<Self> {
        if !(start.is_finite() && end.is_finite() && step.is_finite()) {
            return Err(StudyError::Sweep(format!("sweep bounds must be finite: {}..{} by {}", start, end, step)));
        }
        if step <= 0.0 {
            return Err(StudyError::Sweep(format!("sweep step must be positive, got {}", step)));
        }
        let steps = (end - start) / step;
        if !steps.is_finite() {
            return Err(StudyError::Sweep(format!("sweep span {}..{} is not representable", start, end)));
        }
        if steps > MAX_SWEEP_STEPS {
            return Err(StudyError::Sweep(format!(
                "sweep {}..{} by {} needs {:.0} steps, more than {}",
                start, end, step, steps, MAX_SWEEP_STEPS
            )));
        }
        Ok(SweepRange { start, end, step })
    }

    /// Number of steps taken after the first sample.
    pub fn step_count(&self) -> usize {
        let steps = (self.end - self.start) / self.step;
        if steps <= 0.0 {
            return 0;
        }
        // An exact division must not round up by one step.
        (steps - 1e-9 * steps.max(1.0)).ceil() as usize
    }

    pub fn sample_count(&self) -> usize {
        self.step_count() + 1
    }

    /// Translation applied before each solve: `start`, then `step` repeated.
    pub fn deltas(&self) -> impl Iterator<Item = f64> {
        std::iter::once(self.start).chain(std::iter::repeat(self.step).take(self.step_count()))
    }
}

/// Currents and forces at one sweep position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulationSample {
    pub position: f64,
    pub currents: PhaseValues,
    pub forces: PhaseValues,
    /// Force integrated over all three phase groups at once.
    pub total_force: f64,
}

/// Saves the working copy to `scratch`, meshes and solves it.
pub fn mesh_and_solve<S>(session: &mut S, scratch: &Path) -> SessionResult<()>
where
    S: DocumentOps + AnalysisOps + ?Sized,
{
    session.save_as(scratch)?;
    session.create_mesh()?;
    session.analyze()
}

/// Reads per-phase and total axial force from the current solution.
///
/// The total is its own integral over the union of the phase groups, not the
/// sum of the per-phase values.
pub fn extract_sample<S>(session: &mut S, driver: &MoverDriver) -> SessionResult<SimulationSample>
where
    S: AnalysisOps + ?Sized,
{
    session.load_solution()?;
    session.set_smoothing(false)?;
    session.hide_contour_plot()?;

    let mut forces = PhaseValues::default();
    for phase in Phase::ALL {
        session.clear_block_selection()?;
        session.group_select_block(phase.group())?;
        forces[phase] = session.block_integral(IntegralQuantity::AxialForce)?;
    }

    session.clear_block_selection()?;
    for phase in Phase::ALL {
        session.group_select_block(phase.group())?;
    }
    let total_force = session.block_integral(IntegralQuantity::AxialForce)?;
    session.clear_block_selection()?;

    Ok(SimulationSample { position: driver.offset_pos(), currents: driver.currents(), forces, total_force })
}

/// Runs the sweep, one translate-solve-extract cycle per position.
///
/// The first failing solver call aborts the whole sweep: the mover position
/// and circuit currents can no longer be trusted to agree after it.
pub fn run_sweep<S>(
    session: &mut S,
    driver: &mut MoverDriver,
    range: &SweepRange,
    scratch: &Path,
) -> StudyResult<Vec<SimulationSample>>
where
    S: SolverSession + ?Sized,
{
    let _span = tracing::info_span!("sweep", start = range.start, end = range.end, step = range.step).entered();
    let mut samples = Vec::with_capacity(range.sample_count());

    for delta in range.deltas() {
        driver.translate_and_set_currents(session, delta)?;
        mesh_and_solve(session, scratch)?;
        let sample = extract_sample(session, driver)?;
        tracing::info!(position = sample.position, total_force = sample.total_force, "simulated position");
        samples.push(sample);
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::Excitation;
    use crate::session::{Command, ProblemKind, RecordingSession};

    fn ready_session(session: RecordingSession) -> RecordingSession {
        let mut session = session;
        session.open().unwrap();
        session.new_document(ProblemKind::Magnetic).unwrap();
        for phase in Phase::ALL {
            session.add_circuit(phase.circuit_name(), 0.0, true).unwrap();
        }
        session
    }

    fn driver() -> MoverDriver {
        MoverDriver::new(Excitation { peak_current: 3.0, pole_length: 40.0, coil_pitch: 6.8 })
    }

    #[test]
    fn test_inclusive_end_when_span_divides() {
        let range = SweepRange::new(-20.0, 20.0, 1.0).unwrap();
        assert_eq!(range.sample_count(), 41);
        let positions: Vec<f64> = range
            .deltas()
            .scan(0.0, |pos, d| {
                *pos += d;
                Some(*pos)
            })
            .collect();
        assert_eq!(positions.first(), Some(&-20.0));
        assert_eq!(positions.last(), Some(&20.0));
    }

    #[test]
    fn test_uneven_span_overshoots_to_next_grid_point() {
        let range = SweepRange::new(0.0, 1.0, 0.3).unwrap();
        assert_eq!(range.step_count(), 4);
        assert_eq!(range.sample_count(), 5);
    }

    #[test]
    fn test_floating_point_span_does_not_add_a_step() {
        let range = SweepRange::new(0.0, 0.3, 0.1).unwrap();
        assert_eq!(range.sample_count(), 4);
    }

    #[test]
    fn test_empty_span_still_samples_start() {
        let range = SweepRange::new(5.0, 5.0, 1.0).unwrap();
        assert_eq!(range.deltas().collect::<Vec<_>>(), vec![5.0]);
        let backwards = SweepRange::new(5.0, -5.0, 1.0).unwrap();
        assert_eq!(backwards.sample_count(), 1);
    }

    #[test]
    fn test_invalid_steps_are_rejected() {
        assert!(matches!(SweepRange::new(0.0, 1.0, 0.0), Err(StudyError::Sweep(_))));
        assert!(matches!(SweepRange::new(0.0, 1.0, -1.0), Err(StudyError::Sweep(_))));
        assert!(matches!(SweepRange::new(0.0, f64::NAN, 1.0), Err(StudyError::Sweep(_))));
    }

    #[test]
    fn test_unbounded_step_counts_are_rejected() {
        let overflowing = SweepRange::new(-1e308, 1e308, 1.0);
        assert!(matches!(overflowing, Err(StudyError::Sweep(_))));

        let huge = SweepRange::new(0.0, 1e20, 1.0).unwrap_err();
        assert!(huge.to_string().contains("more than"));

        let largest = SweepRange::new(0.0, MAX_SWEEP_STEPS, 1.0).unwrap();
        assert_eq!(largest.sample_count(), MAX_SWEEP_STEPS as usize + 1);
    }

    #[test]
    fn test_total_force_comes_from_union_integral() {
        // answers with a marker for the union so it cannot be mistaken for a sum
        let session = RecordingSession::with_force_response(|query| match query.groups.as_slice() {
            [g] => *g as f64,
            _ => 100.0,
        });
        let mut session = ready_session(session);
        let mut driver = driver();
        let range = SweepRange::new(0.0, 0.0, 1.0).unwrap();
        let samples = run_sweep(&mut session, &mut driver, &range, Path::new("out/SimOutput.fem")).unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].forces, PhaseValues { a: 1.0, b: 2.0, c: 3.0 });
        assert_eq!(samples[0].total_force, 100.0);
    }

    #[test]
    fn test_sweep_records_position_and_currents_per_step() {
        let mut session = ready_session(RecordingSession::new());
        let mut driver = driver();
        let range = SweepRange::new(-2.0, 2.0, 1.0).unwrap();
        let samples = run_sweep(&mut session, &mut driver, &range, Path::new("out/SimOutput.fem")).unwrap();

        let positions: Vec<f64> = samples.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        for sample in &samples {
            let expected = driver.excitation().currents_at(sample.position);
            assert_eq!(sample.currents, expected);
            // linear response: force per phase equals its current
            assert_eq!(sample.forces, sample.currents);
        }

        let commands = session.commands();
        let solves = commands.iter().filter(|c| **c == Command::Analyze).count();
        assert_eq!(solves, 5);
        let saves: Vec<&Command> = commands.iter().filter(|c| matches!(c, Command::SaveAs(_))).collect();
        assert_eq!(saves.len(), 5);
    }

    #[test]
    fn test_failed_solve_aborts_sweep() {
        let mut session = ready_session(RecordingSession::new().fail_on("mi_analyze"));
        let mut driver = driver();
        let range = SweepRange::new(0.0, 3.0, 1.0).unwrap();
        let err = run_sweep(&mut session, &mut driver, &range, Path::new("scratch.fem")).unwrap_err();

        assert!(matches!(err, StudyError::Session(_)));
        assert!(err.to_string().contains("mi_analyze"));
        assert_eq!(driver.offset_pos(), 0.0);
    }

    #[test]
    fn test_extraction_sequence() {
        let mut session = ready_session(RecordingSession::new());
        let mut driver = driver();
        driver.translate_and_set_currents(&mut session, 0.0).unwrap();
        mesh_and_solve(&mut session, Path::new("scratch.fem")).unwrap();
        let start = session.commands().len();
        extract_sample(&mut session, &driver).unwrap();

        let commands = session.commands();
        let tail = &commands[start..];
        assert_eq!(&tail[..3], &[Command::LoadSolution, Command::SetSmoothing(false), Command::HideContourPlot]);
        let integrals = tail.iter().filter(|c| matches!(c, Command::BlockIntegral(_))).count();
        assert_eq!(integrals, 4);
        assert_eq!(tail.last(), Some(&Command::ClearBlockSelection));
    }
}
