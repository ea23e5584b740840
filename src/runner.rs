use std::io::Write;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use json::JsonValue;

use crate::{
    datatypes::{RunConfig, SamplePoint},
    error::PyroliteError,
};

/// Parses the input json into a JsonValue object
///
/// # Arguments
/// * `input_file` - The path to the input file
///
/// # Returns
/// A JsonValue object
fn load_input_file(input_file: &str) -> Result<JsonValue, PyroliteError> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(_err) => {
            return Err(PyroliteError::Input(format!(
                "Unable to open input file {}",
                input_file
            )))
        }
    };

    let input_file_json = match json::parse(&file_string) {
        Ok(f) => f,
        Err(err) => {
            return Err(PyroliteError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    if !input_file_json.has_key("metadata") {
        return Err(PyroliteError::Input(
            "Input json missing metadata section".to_string(),
        ));
    }
    if !input_file_json.has_key("paths") {
        return Err(PyroliteError::Input(
            "Input json missing paths section".to_string(),
        ));
    }

    Ok(input_file_json)
}

fn parse_float_field(section: &JsonValue, name: &str) -> Result<f64, PyroliteError> {
    match section[name].as_f64() {
        Some(v) => Ok(v),
        None => Err(PyroliteError::Input(format!(
            "Input json missing {} field",
            name
        ))),
    }
}

fn parse_string_field(section: &JsonValue, name: &str) -> Result<String, PyroliteError> {
    match section[name].as_str() {
        Some(v) => Ok(v.to_string()),
        None => Err(PyroliteError::Input(format!(
            "Input json missing {} field",
            name
        ))),
    }
}

fn parse_range_field(section: &JsonValue, name: &str) -> Result<[f64; 2], PyroliteError> {
    let values: Vec<f64> = section[name].members().filter_map(|v| v.as_f64()).collect();

    if values.len() != 2 || section[name].len() != 2 {
        return Err(PyroliteError::Input(format!(
            "Input json field {} must be a two-float range",
            name
        )));
    }

    Ok([values[0], values[1]])
}

/// Loads and validates the sweep configuration
///
/// # Arguments
/// * `input_file` - The path to the input json file
///
/// # Returns
/// A RunConfig instance
pub fn load_config(input_file: &str) -> Result<RunConfig, PyroliteError> {
    let input_json = load_input_file(input_file)?;
    let metadata = &input_json["metadata"];
    let paths = &input_json["paths"];

    let mut samples_per_fidelity: Vec<usize> = Vec::new();
    for member in metadata["samples_per_fidelity"].members() {
        match member.as_usize() {
            Some(n) => samples_per_fidelity.push(n),
            None => {
                return Err(PyroliteError::Input(
                    "Non-integer count in samples_per_fidelity".to_string(),
                ))
            }
        }
    }
    if samples_per_fidelity.is_empty() {
        return Err(PyroliteError::Input(
            "Input json missing samples_per_fidelity field".to_string(),
        ));
    }

    Ok(RunConfig {
        speed_of_sound: parse_float_field(metadata, "speed_of_sound")?,
        wedge_thickness: parse_float_field(metadata, "wedge_thickness")?,
        convergence_tolerance: parse_float_field(metadata, "convergence_tolerance")?,
        residual_column: parse_string_field(metadata, "residual_column")?,
        solver_command: parse_string_field(metadata, "solver_command")?,
        samples_per_fidelity,
        mach_range: parse_range_field(metadata, "mach_range")?,
        aoa_range: parse_range_field(metadata, "aoa_range")?,
        wall_temp_range: parse_range_field(metadata, "wall_temp_range")?,
        templates_dir: parse_string_field(paths, "templates_dir")?,
        simulations_dir: parse_string_field(paths, "simulations_dir")?,
        mesh_prefix: parse_string_field(paths, "mesh_prefix")?,
    })
}

/// Replaces template markers with their per-case values.
fn render_template(contents: &str, replacements: &[(&str, String)]) -> String {
    let mut rendered = contents.to_string();
    for (marker, value) in replacements {
        rendered = rendered.replace(marker, value);
    }
    rendered
}

/// Freestream velocity components for a sample, from Mach and angle of attack.
fn flow_velocity(config: &RunConfig, sample: &SamplePoint) -> (f64, f64) {
    let aoa_rad = sample.aoa.to_radians();
    let speed = config.speed_of_sound * sample.mach;
    (speed * f64::cos(aoa_rad), speed * f64::sin(aoa_rad))
}

fn read_template(config: &RunConfig, name: &str) -> Result<String, PyroliteError> {
    let path = Path::new(&config.templates_dir).join(name);
    match std::fs::read_to_string(&path) {
        Ok(c) => Ok(c),
        Err(_err) => Err(PyroliteError::Runner(format!(
            "Unable to open template {}",
            path.display()
        ))),
    }
}

fn write_case_file(case_dir: &Path, name: &str, contents: &str) -> Result<(), PyroliteError> {
    let path = case_dir.join(name);
    match std::fs::write(&path, contents) {
        Ok(()) => Ok(()),
        Err(err) => Err(PyroliteError::Runner(format!(
            "Unable to write {}: {err}",
            path.display()
        ))),
    }
}

/// Writes the human-readable job summary that the process stage parses back.
fn write_job_summary(case_dir: &Path, sample: &SamplePoint) -> Result<(), PyroliteError> {
    let mut summary = String::from("Hypersonic wedge CHT job:\n");
    summary += &format!("Fidelity= {}\n", sample.fidelity);
    summary += &format!("Mach= {:.4}\n", sample.mach);
    summary += &format!("AoA= {:.4}\n", sample.aoa);
    summary += &format!("T_wall= {:.4}\n", sample.wall_temp);

    write_case_file(case_dir, "job_summary.txt", &summary)
}

/// Renders the per-case solver configuration files from the templates
///
/// # Arguments
/// * `config` - The sweep configuration
/// * `sample` - The sample point for this case
/// * `case_dir` - The case directory
pub fn setup_case(
    config: &RunConfig,
    sample: &SamplePoint,
    case_dir: &Path,
) -> Result<(), PyroliteError> {
    write_job_summary(case_dir, sample)?;

    let mesh_file = format!("{}{}.su2", config.mesh_prefix, sample.fidelity);
    let run_cfg = render_template(
        &read_template(config, "run_cht_base.cfg")?,
        &[("INP_MESH", mesh_file)],
    );
    write_case_file(case_dir, "run_cht.cfg", &run_cfg)?;

    let (vx, vy) = flow_velocity(config, sample);
    let flow_cfg = render_template(
        &read_template(config, "flow_wedge_base.cfg")?,
        &[
            ("INP_MACH", format!("{:.4}", sample.mach)),
            ("INP_AOA", format!("{:.4}", sample.aoa)),
            ("INP_VX", format!("{:.4}", vx)),
            ("INP_VY", format!("{:.4}", vy)),
        ],
    );
    write_case_file(case_dir, "flow_wedge.cfg", &flow_cfg)?;

    let solid_cfg = render_template(
        &read_template(config, "solid_wedge_base.cfg")?,
        &[("INP_WALL_TEMP", format!("{:.4}", sample.wall_temp))],
    );
    write_case_file(case_dir, "solid_wedge.cfg", &solid_cfg)?;

    Ok(())
}

/// Invokes the external solver in the case directory and captures its stdout.
fn run_solver(config: &RunConfig, case_dir: &Path) -> Result<(), PyroliteError> {
    let output = match std::process::Command::new(&config.solver_command)
        .arg("run_cht.cfg")
        .current_dir(case_dir)
        .output()
    {
        Ok(out) => out,
        Err(err) => {
            return Err(PyroliteError::Runner(format!(
                "{} failed: {err}",
                config.solver_command
            )));
        }
    };

    if !output.status.success() {
        println!(
            "warning [run]: solver exited with {} in {}",
            output.status,
            case_dir.display()
        );
    }

    let mut log_file = match std::fs::File::create(case_dir.join("output.txt")) {
        Ok(f) => f,
        Err(err) => {
            return Err(PyroliteError::Runner(format!(
                "Unable to create solver log in {}: {err}",
                case_dir.display()
            )))
        }
    };
    log_file
        .write_all(&output.stdout)
        .expect("Failed to write solver log");

    Ok(())
}

/// Runs the whole sweep: one case directory per sample, sequentially
///
/// # Arguments
/// * `plan` - The sampling plan
/// * `config` - The sweep configuration
pub fn run(plan: &[SamplePoint], config: &RunConfig) -> Result<(), PyroliteError> {
    let sim_root = PathBuf::from(&config.simulations_dir);
    if let Err(err) = std::fs::create_dir_all(&sim_root) {
        return Err(PyroliteError::Runner(format!(
            "Unable to create simulations directory {}: {err}",
            sim_root.display()
        )));
    }

    println!("info: running {} cases...", plan.len());
    let bar = ProgressBar::new(plan.len() as u64);

    for sample in plan {
        let case_dir = sim_root.join(format!("case_{:04}", sample.index));
        if let Err(err) = std::fs::create_dir_all(&case_dir) {
            return Err(PyroliteError::Runner(format!(
                "Unable to create case directory {}: {err}",
                case_dir.display()
            )));
        }

        setup_case(config, sample, &case_dir)?;
        run_solver(config, &case_dir)?;
        bar.inc(1);
    }

    bar.finish_with_message(format!("info: finished {} cases\n", plan.len()));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RunConfig {
        RunConfig {
            speed_of_sound: 343.0,
            wedge_thickness: 1.0,
            convergence_tolerance: -4.0,
            residual_column: "bgs[Rho][0]".to_string(),
            solver_command: "SU2_CFD".to_string(),
            samples_per_fidelity: vec![4, 2],
            mach_range: [2.0, 8.0],
            aoa_range: [-15.0, 15.0],
            wall_temp_range: [300.0, 700.0],
            templates_dir: "templates".to_string(),
            simulations_dir: "simulations".to_string(),
            mesh_prefix: "wedge_mesh_".to_string(),
        }
    }

    #[test]
    fn template_markers_are_replaced() {
        let rendered = render_template(
            "MESH_FILENAME= INP_MESH\nMACH_NUMBER= INP_MACH\n",
            &[
                ("INP_MESH", "wedge_mesh_2.su2".to_string()),
                ("INP_MACH", "4.5000".to_string()),
            ],
        );

        assert_eq!(
            rendered,
            "MESH_FILENAME= wedge_mesh_2.su2\nMACH_NUMBER= 4.5000\n"
        );
    }

    #[test]
    fn velocity_decomposition_at_zero_aoa() {
        let config = test_config();
        let sample = SamplePoint {
            index: 0,
            fidelity: 1,
            mach: 5.0,
            aoa: 0.0,
            wall_temp: 400.0,
        };

        let (vx, vy) = flow_velocity(&config, &sample);
        assert!((vx - 343.0 * 5.0).abs() < 1e-9);
        assert!(vy.abs() < 1e-9);
    }

    #[test]
    fn velocity_magnitude_is_mach_times_sos() {
        let config = test_config();
        let sample = SamplePoint {
            index: 0,
            fidelity: 1,
            mach: 3.0,
            aoa: -12.5,
            wall_temp: 400.0,
        };

        let (vx, vy) = flow_velocity(&config, &sample);
        let speed = f64::sqrt(vx * vx + vy * vy);
        assert!((speed - 343.0 * 3.0).abs() < 1e-9);
        assert!(vy < 0.0);
    }

    #[test]
    fn config_round_trip() {
        let path = std::env::temp_dir().join("pyrolite_config_test.json");
        std::fs::write(
            &path,
            r#"{
                "metadata": {
                    "speed_of_sound": 343.0,
                    "wedge_thickness": 1.0,
                    "convergence_tolerance": -4.0,
                    "residual_column": "bgs[Rho][0]",
                    "solver_command": "SU2_CFD",
                    "samples_per_fidelity": [100, 20],
                    "mach_range": [2.0, 8.0],
                    "aoa_range": [-15.0, 15.0],
                    "wall_temp_range": [300.0, 700.0]
                },
                "paths": {
                    "templates_dir": "templates",
                    "simulations_dir": "simulations",
                    "mesh_prefix": "wedge_mesh_"
                }
            }"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.samples_per_fidelity, vec![100, 20]);
        assert_eq!(config.mach_range, [2.0, 8.0]);
        assert_eq!(config.residual_column, "bgs[Rho][0]");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_metadata_field_is_an_input_error() {
        let path = std::env::temp_dir().join("pyrolite_config_missing_test.json");
        std::fs::write(
            &path,
            r#"{
                "metadata": { "speed_of_sound": 343.0 },
                "paths": {
                    "templates_dir": "templates",
                    "simulations_dir": "simulations",
                    "mesh_prefix": "wedge_mesh_"
                }
            }"#,
        )
        .unwrap();

        let err = load_config(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, PyroliteError::Input(_)));

        std::fs::remove_file(&path).unwrap();
    }
}
