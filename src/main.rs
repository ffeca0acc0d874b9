use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tlm_fem::assembly::DEFAULT_MODEL_FILE;
use tlm_fem::config;
use tlm_fem::drive::Excitation;
use tlm_fem::params::check_geometry;
use tlm_fem::session::{RecordingSession, SolverSession};
use tlm_fem::sweep::SweepRange;
use tlm_fem::{ModelSource, MotorStudy, Phase, StudyOptions, StudyOutcome, StudyResult};

/// Tubular linear motor force sweeps with FEMM
#[derive(Parser)]
#[command(name = "tlm-fem", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a model from a parameter file, then sweep it
    Generate {
        /// YAML parameter file with `Magnet` and `Coil` sections
        #[arg(long, default_value = "Parameters.yml")]
        params: PathBuf,

        /// Where to save the generated model
        #[arg(long, default_value = DEFAULT_MODEL_FILE)]
        model: PathBuf,

        /// Refuse parameters that would produce overlapping geometry
        #[arg(long)]
        strict: bool,

        #[command(flatten)]
        sweep: SweepArgs,
    },
    /// Sweep an existing model file
    Load {
        #[arg(long, default_value = DEFAULT_MODEL_FILE)]
        model: PathBuf,

        /// Peak phase current (A)
        #[arg(long, default_value_t = 3.0)]
        peak_current: f64,

        /// Distance between two identical poles (mm)
        #[arg(long, default_value_t = 40.0)]
        pole_length: f64,

        /// Axial coil pitch (mm)
        #[arg(long, default_value_t = 6.8)]
        coil_pitch: f64,

        #[command(flatten)]
        sweep: SweepArgs,
    },
}

#[derive(Args)]
struct SweepArgs {
    /// First mover position (mm)
    #[arg(long, default_value_t = -20.0, allow_hyphen_values = true)]
    start: f64,

    /// Last mover position (mm)
    #[arg(long, default_value_t = 20.0, allow_hyphen_values = true)]
    end: f64,

    /// Distance between positions (mm)
    #[arg(long, default_value_t = 1.0)]
    step: f64,

    /// Directory for results, ledger and solver scratch files
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// Record solver calls in memory instead of driving FEMM
    #[arg(long)]
    dry_run: bool,
}

impl SweepArgs {
    fn options(&self) -> StudyResult<StudyOptions> {
        Ok(StudyOptions { sweep: SweepRange::new(self.start, self.end, self.step)?, out_dir: self.out_dir.clone() })
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (source, sweep) = match cli.command {
        Command::Generate { params, model, strict, sweep } => {
            let parameters = config::load_parameters(&params).unwrap_or_else(|e| {
                eprintln!("Parameter error: {}", e);
                std::process::exit(1);
            });
            let issues = check_geometry(&parameters.magnet, &parameters.coil);
            for issue in &issues {
                tracing::warn!("geometry check: {}", issue);
            }
            if strict && !issues.is_empty() {
                eprintln!("Geometry check failed with {} issue(s) in {}", issues.len(), params.display());
                std::process::exit(1);
            }
            (ModelSource::Generate { parameters, model_path: model }, sweep)
        }
        Command::Load { model, peak_current, pole_length, coil_pitch, sweep } => {
            let excitation = Excitation { peak_current, pole_length, coil_pitch };
            (ModelSource::Load { model_path: model, excitation }, sweep)
        }
    };

    let options = sweep.options().unwrap_or_else(|e| {
        eprintln!("Sweep error: {}", e);
        std::process::exit(1);
    });

    let outcome = if sweep.dry_run {
        tracing::warn!("dry run: no solver is started and forces are synthetic");
        let mut session = RecordingSession::new();
        if matches!(source, ModelSource::Load { .. }) {
            session = session.with_circuits(Phase::ALL.map(Phase::circuit_name));
        }
        run_study(session, source, &options)
    } else {
        run_femm(source, &options)
    };

    let outcome = outcome.unwrap_or_else(|e| {
        eprintln!("Study error: {}", e);
        std::process::exit(1);
    });

    if let Some(report) = &outcome.materials {
        for warning in &report.failed {
            eprintln!("Material '{}' was not added: {}", warning.material, warning.reason);
        }
    }
    println!("{} positions written to {}", outcome.samples.len(), outcome.results_path.display());
    println!("Run ledger written to {}", outcome.provenance_path.display());
}

fn run_study<S: SolverSession>(session: S, source: ModelSource, options: &StudyOptions) -> StudyResult<StudyOutcome> {
    MotorStudy::new().run(session, source, options)
}

#[cfg(feature = "pyfemm")]
fn run_femm(source: ModelSource, options: &StudyOptions) -> StudyResult<StudyOutcome> {
    let session = tlm_fem::session::PyFemmSession::new()?;
    run_study(session, source, options)
}

#[cfg(not(feature = "pyfemm"))]
fn run_femm(_source: ModelSource, _options: &StudyOptions) -> StudyResult<StudyOutcome> {
    eprintln!("This build has no FEMM backend: rebuild with `--features pyfemm` or pass --dry-run");
    std::process::exit(1);
}
