use thiserror::Error;

use crate::RasterDataType;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Input '{0}' has no name, all inputs must be named when multiple inputs are provided")]
    MissingSourceName(String),
    #[error("Invalid character '{character}' in source name \"{name}\"")]
    IllegalIdentifier { name: String, character: char },
    #[error("Duplicate source name: {0}")]
    DuplicateSourceName(String),
    #[error("Failed to open source dataset: {0}")]
    SourceOpenFailure(String),
    #[error("Raster dimensions do not match ({}x{}) <-> ({}x{})", .size1.0, .size1.1, .size2.0, .size2.1)]
    DimensionMismatch {
        size1: (usize, usize),
        size2: (usize, usize),
    },
    #[error("Source extents do not match: {0}")]
    ExtentMismatch(String),
    #[error("Source resolutions have no common divisor: {0}")]
    NoCommonResolution(String),
    #[error("Source spatial references do not match")]
    SpatialReferenceMismatch,
    // The field cannot be called `source`, thiserror reserves that name for error chaining.
    #[error("Expression cannot operate on all bands of {source_name} ({actual} bands); expected {expected} bands")]
    IncompatibleBandCounts {
        source_name: String,
        actual: usize,
        expected: usize,
    },
    #[error("Invalid nodata value: {0}")]
    InvalidNoDataValue(String),
    #[error("Nodata value {value} cannot be represented in output data type {data_type}")]
    NoDataNotRepresentable { value: f64, data_type: RasterDataType },
    #[error("Unknown builtin function: {0}")]
    UnknownBuiltinFunction(String),
    #[error("Unrecognized argument '{argument}' for builtin function '{function}'{valid}")]
    UnrecognizedBuiltinArgument {
        function: String,
        argument: String,
        /// Preformatted " (valid arguments: ...)" suffix, empty when the function takes none.
        valid: String,
    },
    #[error("Expression validation failed: {0}")]
    ExpressionValidationFailure(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    GdalError(#[from] gdal::errors::GdalError),
}

impl From<std::num::ParseFloatError> for Error {
    fn from(err: std::num::ParseFloatError) -> Self {
        Error::InvalidNoDataValue(err.to_string())
    }
}
