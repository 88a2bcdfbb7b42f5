//! Error type shared by every terrain operation.

use thiserror::Error;

/// Failures reported by the point store, the derived structures and the
/// file helpers.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// A point with this id is already stored (or appears twice in a batch).
    #[error("point {0} already exists")]
    DuplicateId(u64),

    /// The point cannot be represented: non-finite or out-of-range coordinates.
    #[error("invalid point {id}: {reason}")]
    InvalidPoint { id: u64, reason: String },

    /// Query arguments such as a radius or query coordinates are unusable.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A break line that can never act as a constraint edge.
    #[error("invalid break line {start}-{end}: {reason}")]
    InvalidBreakLine { start: u64, end: u64, reason: String },

    #[error("point {0} not found")]
    NotFound(u64),

    /// Triangulation needs three points that are not all collinear.
    #[error("triangulation needs at least 3 non-collinear points, found {found} points")]
    InsufficientPoints { found: usize },

    #[error("location ({x}, {y}) lies outside the triangulated surface")]
    OutsideBoundary { x: f64, y: f64 },

    #[error("break lines cannot be satisfied: {0}")]
    ConstraintUnsatisfiable(String),

    #[error("unknown interpolation method `{0}`")]
    InvalidMethod(String),

    /// Binary point-cloud data that does not match its declared layout.
    #[error("malformed point data: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TerrainError {
    /// Returns `true` for input validation failures (bad ids, coordinates,
    /// query arguments or break lines).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TerrainError::DuplicateId(_)
                | TerrainError::InvalidPoint { .. }
                | TerrainError::InvalidQuery(_)
                | TerrainError::InvalidBreakLine { .. }
        )
    }

    pub(crate) fn invalid_point(id: u64, reason: impl Into<String>) -> Self {
        TerrainError::InvalidPoint {
            id,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TerrainError>;
