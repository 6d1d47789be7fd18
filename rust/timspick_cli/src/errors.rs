use timspick::TimspickError;

#[derive(Debug)]
pub enum CliError {
    Config {
        source: String,
    },
    ParseError {
        msg: String,
    },
    Io {
        source: String,
        path: Option<String>,
    },
    DataReading {
        source: String,
    },
    Pipeline {
        source: String,
    },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config { source } => write!(f, "Error interpreting the config: {}", source),
            CliError::ParseError { msg } => write!(f, "Error parsing config: {}", msg),
            CliError::Io { source, path } => {
                if let Some(path) = path {
                    write!(f, "Error reading file {}: {}", path, source)
                } else {
                    write!(f, "Error reading file: {}", source)
                }
            }
            CliError::DataReading { source } => write!(f, "Error reading data: {}", source),
            CliError::Pipeline { source } => write!(f, "Error running the pipeline: {}", source),
        }
    }
}

impl From<timsrust::TimsRustError> for CliError {
    fn from(e: timsrust::TimsRustError) -> Self {
        CliError::DataReading {
            source: format!("{:?}", e),
        }
    }
}

impl From<timspick::errors::DataError> for CliError {
    fn from(e: timspick::errors::DataError) -> Self {
        CliError::DataReading {
            source: e.to_string(),
        }
    }
}

impl From<TimspickError> for CliError {
    fn from(e: TimspickError) -> Self {
        CliError::Pipeline {
            source: e.to_string(),
        }
    }
}
