use thiserror::Error;

/// The snapshot core's error taxonomy (spec §7).
///
/// `Fatal` conditions are not represented here: per spec they are
/// non-recoverable invariant breaches and are raised as a host-level abort
/// (a panic), never returned to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Size, limit, or feature-mismatch failure.
    #[error("{0}")]
    Range(RangeError),
    /// Structural invalidity discovered while loading a snapshot.
    #[error("{0}")]
    Type(TypeError),
    /// Environmental failure (a capability the host didn't enable).
    #[error("{0}")]
    Common(CommonError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Snapshot buffer too small")]
    BufferTooSmall,
    #[error("Maximum snapshot size exceeded")]
    MaximumSnapshotSizeExceeded,
    #[error("Tagged template literals not supported")]
    TaggedTemplateLiterals,
    #[error("Unsupported flags")]
    UnsupportedFlags,
    #[error("Regular expression not supported")]
    RegularExpressionNotSupported,
    #[error("Unsupported static snapshot literal: {0}")]
    UnsupportedStaticLiteral(String),
    #[error("Unsupported compiled code")]
    UnsupportedCompiledCode,
    #[error("At least two snapshots must be passed")]
    AtLeastTwoSnapshots,
    #[error("Output buffer is too small")]
    OutputBufferTooSmall,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("Invalid snapshot format")]
    InvalidFormat,
    #[error("Invalid snapshot version or features")]
    InvalidVersionOrFeatures,
    #[error("Function index is higher than maximum")]
    FunctionIndexOutOfRange,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommonError {
    #[error("Static snapshots are not enabled")]
    StaticSnapshotsNotEnabled,
    #[error("Static snapshots cannot be copied into memory")]
    StaticCannotBeCopied,
    #[error("Cannot allocate memory for literals")]
    CannotAllocateMemoryForLiterals,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<RangeError> for Error {
    fn from(e: RangeError) -> Self {
        Error::Range(e)
    }
}

impl From<TypeError> for Error {
    fn from(e: TypeError) -> Self {
        Error::Type(e)
    }
}

impl From<CommonError> for Error {
    fn from(e: CommonError) -> Self {
        Error::Common(e)
    }
}
