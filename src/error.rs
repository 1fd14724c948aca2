use std::collections::TryReserveError;

/// Everything that can go wrong while building a MAT-file image.
///
/// There is no rollback: once an operation fails, the partially written
/// file is unusable.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("out of memory while growing a scratch region")]
    OutOfMemory,
    #[error("variable has {0} dimensions, the format allows at most 255")]
    DimensionCountTooLarge(usize),
    #[error("variable name is {0} bytes long, the heap entry allows at most 255")]
    NameTooLong(usize),
    #[error("variable name contains a NUL byte")]
    InvalidName,
    #[error("the root symbol node is full, a file holds at most 8 variables")]
    TooManyVariables,
    #[error("{0} bytes of element data do not fit a compact dataset")]
    DataTooLarge(u64),
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::OutOfMemory
    }
}
