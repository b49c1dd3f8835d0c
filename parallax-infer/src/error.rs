//! Error types for parallax-infer organized by pipeline stage.

use ndarray::ShapeError;
use ndarray_stats::errors::MinMaxError;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline error variants organized by processing stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Asset loading stage error
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Preprocessing stage error
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    /// Graph definition error
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Conversion stage error
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// Execution target selection error
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Inference stage error
    #[error(transparent)]
    Run(#[from] RunError),
}

/// Media and model asset loading errors.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Source media or model file unreachable or missing
    #[error("asset unavailable: {0}")]
    Unavailable(String),

    /// IO error during asset loading
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WAV file format error
    #[error(transparent)]
    Hound(#[from] hound::Error),

    /// Image decoding error
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Preprocessing errors (target spec cannot be satisfied).
#[derive(Debug, Error)]
pub enum PreprocessError {
    /// Produced tensor does not match the target specification
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Channel count validation failed
    #[error("invalid channel count: expected mono or stereo, got {0} channels")]
    InvalidChannels(u16),

    /// Video clip has no frames to preprocess
    #[error("empty clip: no frames to preprocess")]
    EmptyClip,

    /// Target specification is not satisfiable
    #[error("invalid target spec: {0}")]
    InvalidSpec(String),
}

/// Model graph definition errors.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Graph has no nodes
    #[error("graph `{0}` contains no nodes")]
    Empty(String),

    /// Node name collides with an earlier node or a graph input
    #[error("duplicate tensor name `{0}`")]
    DuplicateName(String),

    /// Node references a tensor that is neither a graph input nor an earlier node
    #[error("node `{node}` references unknown tensor `{input}`")]
    UnknownInput { node: String, input: String },

    /// Node references a weight missing from the weight map
    #[error("node `{node}` references missing weight `{weight}`")]
    MissingWeight { node: String, weight: String },

    /// Weight tensor has the wrong rank for its consuming op
    #[error("weight `{weight}` has rank {got}, node `{node}` expects rank {expected}")]
    WeightRank {
        node: String,
        weight: String,
        expected: usize,
        got: usize,
    },

    /// Weight tensor data length disagrees with its declared shape
    #[error("weight `{weight}` declares shape for {expected} values but carries {got}")]
    WeightData {
        weight: String,
        expected: usize,
        got: usize,
    },

    /// Node has the wrong number of data inputs for its op
    #[error("node `{node}` has {got} inputs, op expects {expected}")]
    Arity {
        node: String,
        expected: usize,
        got: usize,
    },

    /// Declared graph output is never produced
    #[error("graph output `{0}` is never produced")]
    UnproducedOutput(String),
}

/// Conversion step errors (source model to on-disk artifact).
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Forward computation cannot be captured as a static data-flow graph.
    ///
    /// Fatal and non-retryable: the model must be restructured into a fixed
    /// composition of shape-stable ops before it can be exported.
    #[error("graph export failed: node `{node}` uses data-dependent op `{op}`")]
    GraphExport { node: String, op: String },

    /// Structure descriptor file is missing
    #[error("artifact descriptor not found: {0}")]
    DescriptorMissing(PathBuf),

    /// Weights blob is missing next to the descriptor
    #[error("weights blob not found: {0}")]
    WeightsMissing(PathBuf),

    /// Descriptor and weights blob disagree
    #[error("weights mismatch for `{name}`: descriptor declares {expected} bytes, blob has {got}")]
    WeightsMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    /// Descriptor is internally inconsistent
    #[error("artifact descriptor corrupt: {0}")]
    Descriptor(String),

    /// Descriptor (de)serialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// IO error while reading or writing artifact files
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Execution target selection errors.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Requested target is not present among available targets
    #[error("execution target `{requested}` unavailable (available: {})", available.join(", "))]
    Unavailable {
        requested: String,
        available: Vec<String>,
    },
}

/// Inference errors (runner invocation).
#[derive(Debug, Error)]
pub enum RunError {
    /// Wrong number of input tensors
    #[error("input arity mismatch: model expects {expected} inputs, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    /// Input tensor does not match the declared input shape
    #[error("input `{name}` shape mismatch: expected {expected:?}, got {got:?}")]
    InputShape {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Kernel operand shapes are incompatible
    #[error("op `{op}` cannot combine shapes {lhs:?} and {rhs:?}")]
    Incompatible {
        op: String,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    /// Missing expected output tensor
    #[error("missing model output: {name}")]
    MissingOutput { name: String },

    /// Weighted op invoked without its weight tensor resolved
    #[error("op `{op}` invoked without its weight tensor")]
    MissingWeight { op: String },

    /// ndarray shape error
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// ndarray-stats min/max error
    #[error(transparent)]
    MinMax(#[from] MinMaxError),
}

/// Result type alias for parallax-infer operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// hound::Error → AssetError → Error
impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Asset(AssetError::Hound(e))
    }
}

// std::io::Error → AssetError → Error
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Asset(AssetError::Io(e))
    }
}

// image::ImageError → AssetError → Error
impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Asset(AssetError::Image(e))
    }
}

// serde_json::Error → ConvertError → Error
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Convert(ConvertError::Json(e))
    }
}

// ShapeError → RunError → Error
impl From<ShapeError> for Error {
    fn from(e: ShapeError) -> Self {
        Error::Run(RunError::Shape(e))
    }
}

// MinMaxError → RunError → Error
impl From<MinMaxError> for Error {
    fn from(e: MinMaxError) -> Self {
        Error::Run(RunError::MinMax(e))
    }
}
