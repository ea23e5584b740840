use rand::Rng;

use crate::{
    datatypes::{RunConfig, SamplePoint},
    error::PyroliteError,
};

/// Generates the sampling plan for the sweep.
///
/// `samples_per_fidelity` is ordered lowest to highest fidelity; the emitted
/// fidelity labels count down from the number of fidelities, so the largest
/// label selects the coarsest mesh.
///
/// # Arguments
/// * `config` - The sweep configuration
///
/// # Returns
/// An ordered vector of sample points
pub fn generate_plan(config: &RunConfig) -> Result<Vec<SamplePoint>, PyroliteError> {
    if config.samples_per_fidelity.is_empty() {
        return Err(PyroliteError::Sampler(
            "samples_per_fidelity is empty".to_owned(),
        ));
    }

    for range in [
        &config.mach_range,
        &config.aoa_range,
        &config.wall_temp_range,
    ] {
        if range[0] >= range[1] {
            return Err(PyroliteError::Sampler(format!(
                "Bad sampling range [{}, {}]",
                range[0], range[1]
            )));
        }
    }

    let n_fidelities = config.samples_per_fidelity.len();
    let mut rng = rand::thread_rng();
    let mut plan: Vec<SamplePoint> = Vec::new();
    let mut index: usize = 0;

    for (j, count) in config.samples_per_fidelity.iter().enumerate() {
        let fidelity = n_fidelities - j;

        for _ in 0..*count {
            plan.push(SamplePoint {
                index,
                fidelity,
                mach: rng.gen_range(config.mach_range[0]..config.mach_range[1]),
                aoa: rng.gen_range(config.aoa_range[0]..config.aoa_range[1]),
                wall_temp: rng.gen_range(config.wall_temp_range[0]..config.wall_temp_range[1]),
            });
            index += 1;
        }
    }

    println!(
        "info: generated sampling plan with {} cases across {} fidelity levels",
        plan.len(),
        n_fidelities
    );

    Ok(plan)
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
            samples_per_fidelity: vec![10, 4],
            mach_range: [2.0, 8.0],
            aoa_range: [-15.0, 15.0],
            wall_temp_range: [300.0, 700.0],
            templates_dir: "templates".to_string(),
            simulations_dir: "simulations".to_string(),
            mesh_prefix: "wedge_mesh_".to_string(),
        }
    }

    #[test]
    fn plan_has_per_fidelity_counts_and_labels() {
        let plan = generate_plan(&test_config()).unwrap();

        assert_eq!(plan.len(), 14);
        assert!(plan[..10].iter().all(|s| s.fidelity == 2));
        assert!(plan[10..].iter().all(|s| s.fidelity == 1));

        // indices are a global running count
        for (i, sample) in plan.iter().enumerate() {
            assert_eq!(sample.index, i);
        }
    }

    #[test]
    fn samples_stay_inside_ranges() {
        let config = test_config();
        let plan = generate_plan(&config).unwrap();

        for sample in &plan {
            assert!(sample.mach >= config.mach_range[0] && sample.mach < config.mach_range[1]);
            assert!(sample.aoa >= config.aoa_range[0] && sample.aoa < config.aoa_range[1]);
            assert!(
                sample.wall_temp >= config.wall_temp_range[0]
                    && sample.wall_temp < config.wall_temp_range[1]
            );
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        let mut config = test_config();
        config.mach_range = [8.0, 2.0];

        let err = generate_plan(&config).unwrap_err();
        assert!(matches!(err, PyroliteError::Sampler(_)));
    }
}
