use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{
    datatypes::{CaseFailure, CaseRecord, RunConfig},
    error::PyroliteError,
    vtm::{self, Cell, MultiBlockMesh},
};

const FLUID_BLOCK: usize = 0;
const SOLID_BLOCK: usize = 1;
const BOUNDARY_SUB_BLOCK: &str = "Boundary";
const INTERNAL_SUB_BLOCK: &str = "Internal";

pub const HEAT_FLUX_FIELD: &str = "Heat_Flux";
pub const TEMPERATURE_FIELD: &str = "Temperature";

/// Integrates a per-vertex field over the boundary line mesh, scaled by the
/// out-of-plane thickness.
///
/// Walks every line cell of the wall mesh: the segment's contribution is the
/// mean of the two endpoint values times the segment length. Zero-length
/// segments contribute nothing.
///
/// # Arguments
/// * `mesh` - The multi-block results mesh
/// * `field_name` - The per-vertex field to integrate, e.g. "Heat_Flux"
/// * `thickness` - Out-of-plane thickness of the cross-section
///
/// # Returns
/// The integrated heat-transfer rate
pub fn integrate_boundary_flux(
    mesh: &MultiBlockMesh,
    field_name: &str,
    thickness: f64,
) -> Result<f64, PyroliteError> {
    let boundary = mesh
        .block(FLUID_BLOCK)?
        .sub_block(BOUNDARY_SUB_BLOCK)?
        .first_dataset()?;
    let field = boundary.point_field(field_name)?;

    let mut q_dot_sum: f64 = 0.0;

    for cell in &boundary.cells {
        if let Cell::Line([i0, i1]) = cell {
            let p0 = &boundary.points[*i0];
            let p1 = &boundary.points[*i1];

            let ds = f64::sqrt(
                f64::powi(p0.x - p1.x, 2) + f64::powi(p0.y - p1.y, 2) + f64::powi(p0.z - p1.z, 2),
            );
            let qdot = 0.5 * (field[*i0] + field[*i1]);

            q_dot_sum += qdot * ds * thickness;
        }
    }

    Ok(q_dot_sum)
}

/// Area-weighted mean of a per-vertex field over the solid interior mesh.
///
/// Each triangle contributes its area times the mean of its three vertex
/// values. A mesh with zero total area has no defined mean and is reported
/// as a degenerate-mesh error rather than a NaN.
///
/// # Arguments
/// * `mesh` - The multi-block results mesh
/// * `field_name` - The per-vertex field to average, e.g. "Temperature"
///
/// # Returns
/// The area-weighted mean field value
pub fn mean_volume_field(mesh: &MultiBlockMesh, field_name: &str) -> Result<f64, PyroliteError> {
    let solid = mesh
        .block(SOLID_BLOCK)?
        .sub_block(INTERNAL_SUB_BLOCK)?
        .first_dataset()?;
    let field = solid.point_field(field_name)?;

    let mut area_sum: f64 = 0.0;
    let mut weighted_sum: f64 = 0.0;

    for cell in &solid.cells {
        if let Cell::Triangle([i0, i1, i2]) = cell {
            let area = cell.area(&solid.points);

            area_sum += area;
            weighted_sum += area * (field[*i0] + field[*i1] + field[*i2]) / 3.0;
        }
    }

    if area_sum == 0.0 {
        return Err(PyroliteError::DegenerateMesh(
            "Solid interior mesh has zero total area".to_owned(),
        ));
    }

    Ok(weighted_sum / area_sum)
}

/// Inputs parsed back from a case's job summary.
#[derive(Debug, PartialEq)]
struct JobSummary {
    fidelity: usize,
    mach: f64,
    aoa: f64,
    wall_temp: f64,
}

/// Parses a job_summary.txt written by the runner: a title line ending in
/// ':' followed by `Key= value` lines.
fn parse_job_summary(contents: &str) -> Result<JobSummary, PyroliteError> {
    let mut fidelity: Option<usize> = None;
    let mut mach: Option<f64> = None;
    let mut aoa: Option<f64> = None;
    let mut wall_temp: Option<f64> = None;

    for line in contents.lines().skip(1) {
        if line.is_empty() {
            continue;
        }

        let (key, value) = match line.split_once('=') {
            Some(pair) => pair,
            None => {
                return Err(PyroliteError::Input(format!(
                    "Bad line in job summary: '{line}'"
                )))
            }
        };
        let value = value.trim();

        match key.trim() {
            "Fidelity" => fidelity = value.parse().ok(),
            "Mach" => mach = value.parse().ok(),
            "AoA" => aoa = value.parse().ok(),
            "T_wall" => wall_temp = value.parse().ok(),
            other => {
                println!("warning [process]: unknown job summary field '{other}'");
            }
        }
    }

    match (fidelity, mach, aoa, wall_temp) {
        (Some(fidelity), Some(mach), Some(aoa), Some(wall_temp)) => Ok(JobSummary {
            fidelity,
            mach,
            aoa,
            wall_temp,
        }),
        _ => Err(PyroliteError::Input(
            "Job summary is missing Fidelity, Mach, AoA, or T_wall".to_owned(),
        )),
    }
}

/// Pulls one named column out of the final row of a convergence-history CSV.
///
/// Header names arrive quoted and space-padded from the solver; both are
/// stripped before matching.
fn read_final_residual(contents: &str, residual_column: &str) -> Result<f64, PyroliteError> {
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());

    let header = match lines.next() {
        Some(h) => h,
        None => {
            return Err(PyroliteError::Input(
                "Convergence history is empty".to_owned(),
            ))
        }
    };
    let names: Vec<String> = header
        .split(',')
        .map(|n| n.replace(' ', "").replace('"', ""))
        .collect();

    let last_line = match lines.last() {
        Some(l) => l,
        None => {
            return Err(PyroliteError::Input(
                "Convergence history has no data rows".to_owned(),
            ))
        }
    };

    let mut values: Vec<f64> = Vec::new();
    for token in last_line.split(',') {
        match token.trim().parse() {
            Ok(v) => values.push(v),
            Err(_) => {
                return Err(PyroliteError::Input(format!(
                    "Non-float value '{}' in convergence history",
                    token.trim()
                )))
            }
        }
    }

    if values.len() != names.len() {
        return Err(PyroliteError::Input(format!(
            "Convergence history row has {} values for {} columns",
            values.len(),
            names.len()
        )));
    }

    match names.iter().position(|n| n == residual_column) {
        Some(i) => Ok(values[i]),
        None => Err(PyroliteError::Input(format!(
            "No '{}' column in convergence history",
            residual_column
        ))),
    }
}

struct ProcessedCase {
    case_id: String,
    summary: JobSummary,
    q_dot: f64,
    t_mean: f64,
}

/// Processes a single case directory into its derived quantities. Any
/// failure drops the whole case; nothing partial is returned.
fn process_case(
    case_id: &str,
    case_dir: &Path,
    config: &RunConfig,
) -> Result<ProcessedCase, PyroliteError> {
    let summary_contents = match std::fs::read_to_string(case_dir.join("job_summary.txt")) {
        Ok(c) => c,
        Err(err) => {
            return Err(PyroliteError::Input(format!(
                "Unable to open job summary: {err}"
            )))
        }
    };
    let summary = parse_job_summary(&summary_contents)?;

    let history_contents = match std::fs::read_to_string(case_dir.join("run_cht.csv")) {
        Ok(c) => c,
        Err(err) => {
            return Err(PyroliteError::Input(format!(
                "Unable to open convergence history: {err}"
            )))
        }
    };
    let final_residual = read_final_residual(&history_contents, &config.residual_column)?;

    if final_residual > config.convergence_tolerance {
        return Err(PyroliteError::NotConverged(format!(
            "{} = {:.3} is above tolerance {:.3}",
            config.residual_column, final_residual, config.convergence_tolerance
        )));
    }

    let mesh = vtm::read_vtm(&case_dir.join("flow.vtm"))?;
    let q_dot = integrate_boundary_flux(&mesh, HEAT_FLUX_FIELD, config.wedge_thickness)?;
    let t_mean = mean_volume_field(&mesh, TEMPERATURE_FIELD)?;

    Ok(ProcessedCase {
        case_id: case_id.to_string(),
        summary,
        q_dot,
        t_mean,
    })
}

/// Processes every case directory under the simulations root
///
/// # Arguments
/// * `config` - The sweep configuration
///
/// # Returns
/// The successful case records and the per-case failures, in that order
pub fn process_cases(
    config: &RunConfig,
) -> Result<(Vec<CaseRecord>, Vec<CaseFailure>), PyroliteError> {
    let sim_root = PathBuf::from(&config.simulations_dir);

    let entries = match std::fs::read_dir(&sim_root) {
        Ok(e) => e,
        Err(err) => {
            return Err(PyroliteError::PostProcessor(format!(
                "Unable to open simulations directory {}: {err}",
                sim_root.display()
            )))
        }
    };

    let mut case_dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    case_dirs.sort();

    println!("info: processing {} cases...", case_dirs.len());

    let mut processed: Vec<ProcessedCase> = Vec::new();
    let mut failures: Vec<CaseFailure> = Vec::new();

    for case_dir in &case_dirs {
        let case_id = case_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| case_dir.display().to_string());

        match process_case(&case_id, case_dir, config) {
            Ok(case) => processed.push(case),
            Err(error) => {
                println!("warning [process]: dropping case {}: {}", case_id, error);
                failures.push(CaseFailure { case_id, error });
            }
        }
    }

    // Relabel fidelities so the largest model index is the highest fidelity.
    let max_label = processed
        .iter()
        .map(|c| c.summary.fidelity)
        .max()
        .unwrap_or(0);
    let records: Vec<CaseRecord> = processed
        .into_iter()
        .map(|case| CaseRecord {
            model_index: max_label + 1 - case.summary.fidelity,
            case_id: case.case_id,
            mach: case.summary.mach,
            aoa: case.summary.aoa,
            wall_temp: case.summary.wall_temp,
            q_dot: case.q_dot,
            t_mean: case.t_mean,
        })
        .collect();

    println!(
        "info: processed {} cases, dropped {}",
        records.len(),
        failures.len()
    );

    Ok((records, failures))
}

/// Writes the training dataset CSV with its commented label header
///
/// # Arguments
/// * `records` - The successful case records
/// * `output_file` - The filename of the output csv
pub fn write_training_csv(records: &[CaseRecord], output_file: &str) -> Result<(), PyroliteError> {
    let mut csv_file = match std::fs::File::create(output_file) {
        Ok(f) => f,
        Err(err) => {
            return Err(PyroliteError::PostProcessor(format!(
                "Failed to create {output_file}: {err}"
            )));
        }
    };

    csv_file
        .write(
            "# x_labels: Mach, AoA, T_wall\n\
             # y_labels: Q_dot, T_avg\n\
             # params: \n\
             # header: model_index, Mach, AoA, T_wall, Q_dot, T_avg\n"
                .as_bytes(),
        )
        .unwrap();

    for record in records {
        csv_file
            .write(
                format!(
                    "{model_index},{mach},{aoa},{wall_temp},{q_dot},{t_mean}\n",
                    model_index = record.model_index,
                    mach = record.mach,
                    aoa = record.aoa,
                    wall_temp = record.wall_temp,
                    q_dot = record.q_dot,
                    t_mean = record.t_mean,
                )
                .as_bytes(),
            )
            .unwrap();
    }

    println!("info: wrote {} rows to {}", records.len(), output_file);

    Ok(())
}

/// Plots residual histories by shelling out to the Python helper script.
pub fn plot_history(history_files: &[String], plotter_path: &str) -> Result<(), PyroliteError> {
    println!("info: plotting in python...");

    match std::process::Command::new("python")
        .arg(plotter_path)
        .args(history_files)
        .output()
    {
        Ok(_) => Ok(()),
        Err(err) => Err(PyroliteError::PostProcessor(format!(
            "Unable to run plotter {plotter_path}: {err}"
        ))),
    }
}
