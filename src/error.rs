use crate::data::{ConstraintId, SectionId, SlotId};
use std::fmt;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving a scheduling request.
///
/// Infeasible or budget-limited schedules are not errors; they come back
/// as an incomplete [`ScheduleResponse`](crate::data::ScheduleResponse).
#[derive(Error, Debug)]
pub enum Error {
    /// The request was malformed or internally inconsistent
    #[error("Invalid input: {0}")]
    Input(#[from] InputErrors),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The blocking worker running the search failed
    #[error("Worker error: {0}")]
    Worker(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Input(_) => 400,
            _ => 500,
        }
    }
}

/// A single problem found while validating a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("{field}: duplicate {entity} id {id}")]
    DuplicateId {
        field: String,
        entity: &'static str,
        id: u32,
    },

    #[error("{field}: unknown {entity} id {id}")]
    UnknownReference {
        field: String,
        entity: &'static str,
        id: u32,
    },

    #[error("{field}: section {section_id} has zero duration")]
    ZeroDuration { field: String, section_id: SectionId },

    #[error(
        "{field}: section {section_id} needs {duration} contiguous slots but the longest same-day run is {longest_run}"
    )]
    DurationExceedsDay {
        field: String,
        section_id: SectionId,
        duration: u32,
        longest_run: u32,
    },

    #[error("{field}: constraint {constraint_id} has from period {from} after to period {to}")]
    InvertedWindow {
        field: String,
        constraint_id: ConstraintId,
        from: u32,
        to: u32,
    },

    #[error("{field}: slot {slot_id} appears twice at day {day} period {period}")]
    DuplicatePosition {
        field: String,
        slot_id: SlotId,
        day: u32,
        period: u32,
    },
}

impl InputError {
    /// Path of the offending request field, e.g. `sections[2].instructorId`.
    pub fn field(&self) -> &str {
        match self {
            InputError::DuplicateId { field, .. }
            | InputError::UnknownReference { field, .. }
            | InputError::ZeroDuration { field, .. }
            | InputError::DurationExceedsDay { field, .. }
            | InputError::InvertedWindow { field, .. }
            | InputError::DuplicatePosition { field, .. } => field,
        }
    }
}

/// Every validation problem found in one request. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputErrors(Vec<InputError>);

impl InputErrors {
    pub(crate) fn from_vec(errors: Vec<InputError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self(errors))
        }
    }

    pub fn errors(&self) -> &[InputError] {
        &self.0
    }
}

impl fmt::Display for InputErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for InputErrors {}
