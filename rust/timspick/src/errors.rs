use std::path::PathBuf;

/// Errors raised while validating a resolved configuration, before any
/// stage is allowed to run.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    NonPositiveTolerance {
        stage: &'static str,
        field: &'static str,
        value: f64,
    },
    ZeroThreshold {
        stage: &'static str,
        field: &'static str,
    },
    ZeroThreads,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NonPositiveTolerance {
                stage,
                field,
                value,
            } => {
                write!(f, "{stage}.{field} must be positive, got {value}")
            }
            ConfigError::ZeroThreshold { stage, field } => {
                write!(f, "{stage}.{field} must be at least 1")
            }
            ConfigError::ZeroThreads => write!(f, "number_of_threads must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Malformed-input failures surfaced by a stage. These abort the run,
/// they are never retried.
#[derive(Debug, Clone, PartialEq)]
pub enum DataError {
    IndexOutOfRange {
        stage: &'static str,
        index: usize,
        size: usize,
    },
    EmptyCoordinateAxis {
        stage: &'static str,
        axis: &'static str,
    },
    ZeroIntensityCluster {
        cluster: usize,
    },
    MismatchedArrayLengths {
        stage: &'static str,
        expected: usize,
        got: usize,
    },
    NonUniformScanCount {
        frame: usize,
        expected: usize,
        got: usize,
    },
    NoCycleStructure {
        reason: String,
    },
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::IndexOutOfRange { stage, index, size } => {
                write!(f, "{stage}: index {index} out of range for size {size}")
            }
            DataError::EmptyCoordinateAxis { stage, axis } => {
                write!(f, "{stage}: {axis} coordinate axis is empty")
            }
            DataError::ZeroIntensityCluster { cluster } => {
                write!(f, "cluster {cluster} accumulated zero intensity")
            }
            DataError::MismatchedArrayLengths {
                stage,
                expected,
                got,
            } => {
                write!(f, "{stage}: expected array length {expected}, got {got}")
            }
            DataError::NonUniformScanCount {
                frame,
                expected,
                got,
            } => {
                write!(
                    f,
                    "frame {frame} has {got} scans, acquisition declares {expected}"
                )
            }
            DataError::NoCycleStructure { reason } => {
                write!(f, "could not resolve acquisition cycle: {reason}")
            }
        }
    }
}

impl std::error::Error for DataError {}

/// Failures of the persistent array store (missing keys, dtype or length
/// mismatches on re-open, underlying io).
#[derive(Debug)]
pub enum StoreError {
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    ManifestParse {
        msg: String,
    },
    MissingKey {
        key: String,
    },
    DtypeMismatch {
        key: String,
        expected: &'static str,
        got: String,
    },
    LengthMismatch {
        key: String,
        expected_bytes: usize,
        got_bytes: usize,
    },
    MissingAttr {
        group: String,
        name: String,
    },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io { source, path } => match path {
                Some(p) => write!(f, "store io error at {}: {}", p.display(), source),
                None => write!(f, "store io error: {}", source),
            },
            StoreError::ManifestParse { msg } => write!(f, "store manifest: {}", msg),
            StoreError::MissingKey { key } => write!(f, "store has no array named '{}'", key),
            StoreError::DtypeMismatch { key, expected, got } => {
                write!(f, "array '{}' holds {} values, requested {}", key, got, expected)
            }
            StoreError::LengthMismatch {
                key,
                expected_bytes,
                got_bytes,
            } => {
                write!(
                    f,
                    "array '{}' file is {} bytes, manifest declares {}",
                    key, got_bytes, expected_bytes
                )
            }
            StoreError::MissingAttr { group, name } => {
                write!(f, "group '{}' has no attribute '{}'", group, name)
            }
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(source: std::io::Error) -> Self {
        StoreError::Io { source, path: None }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::ManifestParse { msg: e.to_string() }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum TimspickError {
    Config(ConfigError),
    Data(DataError),
    Store(StoreError),
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
}

impl std::fmt::Display for TimspickError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimspickError::Config(e) => write!(f, "configuration error: {}", e),
            TimspickError::Data(e) => write!(f, "data error: {}", e),
            TimspickError::Store(e) => write!(f, "store error: {}", e),
            TimspickError::Io { source, path } => match path {
                Some(p) => write!(f, "io error at {}: {}", p.display(), source),
                None => write!(f, "io error: {}", source),
            },
        }
    }
}

impl std::error::Error for TimspickError {}

pub type Result<T> = std::result::Result<T, TimspickError>;

impl From<ConfigError> for TimspickError {
    fn from(e: ConfigError) -> Self {
        TimspickError::Config(e)
    }
}

impl From<DataError> for TimspickError {
    fn from(e: DataError) -> Self {
        TimspickError::Data(e)
    }
}

impl From<StoreError> for TimspickError {
    fn from(e: StoreError) -> Self {
        TimspickError::Store(e)
    }
}

impl From<std::io::Error> for TimspickError {
    fn from(source: std::io::Error) -> Self {
        TimspickError::Io { source, path: None }
    }
}
