// src/output/mod.rs

//! Tabular sweep results (CSV).

use crate::sweep::SimulationSample;
use crate::{Phase, StudyResult};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// File name of the results table inside the output directory.
pub const RESULTS_FILE: &str = "SimulationResults.csv";

/// Write sweep samples as CSV, one row per position in sweep order.
///
/// Format:
/// ```csv
/// Position,Current.CoilA,Current.CoilB,Current.CoilC,Force.CoilA,Force.CoilB,Force.CoilC,Force.Sum
/// -20,2.5,-0.3,-2.2,1.1,0.2,-0.9,0.4
/// ```
pub fn write_samples_csv<W: Write>(samples: &[SimulationSample], writer: &mut W) -> StudyResult<()> {
    write!(writer, "Position")?;
    for phase in Phase::ALL {
        write!(writer, ",Current.{}", phase.circuit_name())?;
    }
    for phase in Phase::ALL {
        write!(writer, ",Force.{}", phase.circuit_name())?;
    }
    writeln!(writer, ",Force.Sum")?;

    for sample in samples {
        write!(writer, "{}", sample.position)?;
        for phase in Phase::ALL {
            write!(writer, ",{}", sample.currents[phase])?;
        }
        for phase in Phase::ALL {
            write!(writer, ",{}", sample.forces[phase])?;
        }
        writeln!(writer, ",{}", sample.total_force)?;
    }
    Ok(())
}

/// Writes the results table to `path`, creating parent directories.
pub fn save_samples_csv(samples: &[SimulationSample], path: &Path) -> StudyResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(fs::File::create(path)?);
    write_samples_csv(samples, &mut writer)?;
    writer.flush()?;
    tracing::info!(path = %path.display(), rows = samples.len(), "wrote sweep results");
    Ok(())
}
