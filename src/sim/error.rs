use thiserror::Error;

/// Failure of the sparse factorization or solve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("cannot allocate {entries} factor entries")]
    Allocation { entries: usize },
    /// `column` is the 0-based cell index whose pivot vanished.
    #[error("singular matrix: zero pivot at column {}", .column + 1)]
    SingularPivot { column: usize },
    #[error("solve called before a successful factorization")]
    NotFactored,
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl SolverError {
    /// Diagnostic code: negative for structural or resource failures,
    /// positive 1-based column index of a singular pivot.
    pub fn info(&self) -> i64 {
        match self {
            Self::Allocation { .. } => -1,
            Self::NotFactored => -2,
            Self::DimensionMismatch { .. } => -3,
            Self::SingularPivot { column } => *column as i64 + 1,
        }
    }
}

/// Failure of a simulation operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmulationError {
    /// The operation does not match the configured analysis type.
    #[error("wrong configuration: {0}")]
    WrongConfig(String),
    #[error("the stack has no element")]
    EmptyStack,
    #[error("the stack has no channel")]
    NoChannel,
    #[error("invalid flow rate {0}")]
    InvalidFlowRate(f64),
    #[error("thermal data must be filled before emulating")]
    NotFactored,
    #[error("cannot allocate {len} entries for the {what}")]
    Allocation { what: &'static str, len: usize },
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Failure of a temperature query. [`QueryError::code`] gives the numeric
/// code reported to callers that expect one.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown stack element '{0}'")]
    UnknownStackElement(String),
    #[error("stack element '{0}' is not a die")]
    NotADie(String),
    #[error("stack element '{0}' is not a channel")]
    NotAChannel(String),
    #[error("die '{die}' has no floorplan element '{element}'")]
    UnknownFloorplanElement { die: String, element: String },
    #[error("channel outlet {index} out of range ({count} outlets)")]
    OutletOutOfRange { index: usize, count: usize },
    #[error("cell ({layer}, {row}, {column}) is outside the grid")]
    CellOutOfRange {
        layer: usize,
        row: usize,
        column: usize,
    },
    #[error("cannot write thermal map: {0}")]
    Io(#[from] std::io::Error),
}

impl QueryError {
    pub fn code(&self) -> i32 {
        match self {
            Self::UnknownStackElement(_) | Self::CellOutOfRange { .. } => -1,
            Self::NotADie(_) | Self::NotAChannel(_) | Self::Io(_) => -2,
            Self::UnknownFloorplanElement { .. } | Self::OutletOutOfRange { .. } => -3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_info_codes() {
        assert_eq!(SolverError::SingularPivot { column: 0 }.info(), 1);
        assert_eq!(SolverError::SingularPivot { column: 41 }.info(), 42);
        assert!(SolverError::Allocation { entries: 10 }.info() < 0);
        assert!(SolverError::NotFactored.info() < 0);
        let msg = SolverError::SingularPivot { column: 4 }.to_string();
        assert!(msg.contains("column 5"), "{msg}");
    }

    #[test]
    fn test_query_codes() {
        assert_eq!(QueryError::UnknownStackElement("x".into()).code(), -1);
        assert_eq!(QueryError::NotADie("x".into()).code(), -2);
        let e = QueryError::UnknownFloorplanElement {
            die: "d".into(),
            element: "e".into(),
        };
        assert_eq!(e.code(), -3);
    }
}
