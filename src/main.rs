use clap::{Parser, Subcommand};

mod datatypes;
mod error;
mod post_processor;
mod runner;
mod sampler;
mod vtm;

use error::PyroliteError;

#[derive(Parser)]
#[command(name = "pyrolite")]
#[command(about = "Multi-fidelity conjugate-heat-transfer sweep driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a sampling plan and run the solver for every case
    Run {
        /// Path to the sweep configuration json
        input_json: String,
    },
    /// Assemble the training dataset from completed cases
    Process {
        /// Path to the sweep configuration json
        input_json: String,
        /// Filename of the output dataset csv
        #[arg(long, default_value = "train_data_wedge_cht.csv")]
        output: String,
    },
    /// Plot convergence histories with the python helper script
    Plot {
        /// Convergence history csv files
        #[arg(required = true)]
        history_files: Vec<String>,
        /// Path to the plotter script
        #[arg(long, default_value = "scripts/plot_history.py")]
        script: String,
    },
}

fn run_sweep(input_json: &str) -> Result<(), PyroliteError> {
    let config = runner::load_config(input_json)?;
    let plan = sampler::generate_plan(&config)?;
    runner::run(&plan, &config)
}

fn process_sweep(input_json: &str, output: &str) -> Result<(), PyroliteError> {
    let config = runner::load_config(input_json)?;
    let (records, _failures) = post_processor::process_cases(&config)?;

    post_processor::write_training_csv(&records, output)
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { input_json } => run_sweep(&input_json),
        Command::Process { input_json, output } => process_sweep(&input_json, &output),
        Command::Plot {
            history_files,
            script,
        } => post_processor::plot_history(&history_files, &script),
    };

    if let Err(err) = result {
        println!("{err}");
        std::process::exit(1)
    }
}
