use crate::month::ReferenceMonth;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Reference month set is empty")]
    EmptyReferenceMonths,

    #[error("Reference months not strictly increasing: {prev} followed by {next}")]
    NonMonotonicMonths {
        prev: ReferenceMonth,
        next: ReferenceMonth,
    },

    #[error("Invalid reference month '{value}' (expected YYYY-MM or YYYY-MM-DD)")]
    InvalidMonth { value: String },

    #[error("Customer '{customer_id}' has more than one test-group assignment")]
    DuplicateAssignment { customer_id: String },

    #[error("Customer '{customer_id}' resolved to the unclassified sentinel in {reference_month}")]
    Unclassified {
        customer_id: String,
        reference_month: ReferenceMonth,
    },

    #[error("Unknown {field} value '{value}' in store")]
    UnknownEnumValue { field: &'static str, value: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
