use thiserror::Error;

/// Errors raised by the core. Operations that fail do not leave
/// partially-updated state: they either do not begin or revert before
/// returning (see Error taxonomy in the design notes).
#[derive(Debug, Error)]
pub enum StraditizeError {
    #[error("column geometry has not been set")]
    ColumnsNotSet,

    #[error("data box has not been set")]
    DataBoxNotSet,

    #[error("X-limits have not been set")]
    XAxisNotSet,

    #[error("Y-limits have not been set")]
    YAxisNotSet,

    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("column {col} is already owned by another child reader")]
    ColumnAlreadyOwned { col: usize },

    #[error("reader has no foreground pixels")]
    EmptyReader,

    #[error("axis anchors coincide; cannot compute an affine mapping")]
    DegenerateAxis,

    #[error("x-values belong to different columns: {0:?}")]
    CrossColumnXAxis(Vec<usize>),

    #[error("reader index {0} does not exist")]
    NoSuchReader(usize),

    #[error("reader {index} is not a {expected} reader")]
    WrongReaderKind { index: usize, expected: &'static str },

    #[error("dataset is malformed: {0}")]
    Dataset(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StraditizeError>;
