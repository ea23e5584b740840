use std::fmt::Display;

#[derive(Debug)]
pub enum PyroliteError {
    Input(String),
    Sampler(String),
    Runner(String),
    Mesh(String),
    MissingSubBlock(String),
    MissingField(String),
    DegenerateMesh(String),
    NotConverged(String),
    PostProcessor(String),
}

impl Display for PyroliteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (err_name, value) = match self {
            PyroliteError::Input(v) => ("Input", v),
            PyroliteError::Sampler(v) => ("Sampler", v),
            PyroliteError::Runner(v) => ("Runner", v),
            PyroliteError::Mesh(v) => ("Mesh", v),
            PyroliteError::MissingSubBlock(v) => ("Missing Sub-Block", v),
            PyroliteError::MissingField(v) => ("Missing Field", v),
            PyroliteError::DegenerateMesh(v) => ("Degenerate Mesh", v),
            PyroliteError::NotConverged(v) => ("Not Converged", v),
            PyroliteError::PostProcessor(v) => ("Post Processor", v),
        };

        write!(f, "{} error: {}", err_name, value)
    }
}
