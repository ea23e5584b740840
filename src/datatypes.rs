use crate::error::PyroliteError;

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One entry in the sampling plan. `fidelity` is the mesh-selection label;
/// larger labels select coarser meshes.
#[derive(Debug, Clone)]
pub struct SamplePoint {
    pub index: usize,
    pub fidelity: usize,
    pub mach: f64,
    pub aoa: f64,
    pub wall_temp: f64,
}

/// Sweep configuration, loaded from the input json.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub speed_of_sound: f64,
    pub wedge_thickness: f64,
    pub convergence_tolerance: f64,
    pub residual_column: String,
    pub solver_command: String,
    pub samples_per_fidelity: Vec<usize>,
    pub mach_range: [f64; 2],
    pub aoa_range: [f64; 2],
    pub wall_temp_range: [f64; 2],
    pub templates_dir: String,
    pub simulations_dir: String,
    pub mesh_prefix: String,
}

/// A fully processed, converged case -- one row of the training dataset.
#[derive(Debug, Clone)]
pub struct CaseRecord {
    pub case_id: String,
    pub model_index: usize,
    pub mach: f64,
    pub aoa: f64,
    pub wall_temp: f64,
    pub q_dot: f64,
    pub t_mean: f64,
}

/// A case that was dropped, with the error that dropped it.
#[derive(Debug)]
pub struct CaseFailure {
    pub case_id: String,
    pub error: PyroliteError,
}
