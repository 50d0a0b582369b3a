use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::{Grade, Score};

/// Reasons the calculator refuses to produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalculationError {
    #[error("missing required score(s): {}", .fields.join(", "))]
    MissingInput { fields: Vec<&'static str> },

    #[error("score {value} for {field} is outside 0..=100")]
    OutOfRange { field: &'static str, value: Score },

    #[error("only one supplementary exam may be recorded, found: {}", .fields.join(", "))]
    AmbiguousExtra { fields: Vec<&'static str> },
}

impl CalculationError {
    pub fn fields(&self) -> Vec<&'static str> {
        match self {
            CalculationError::MissingInput { fields } => fields.clone(),
            CalculationError::OutOfRange { field, .. } => vec![*field],
            CalculationError::AmbiguousExtra { fields } => fields.clone(),
        }
    }
}

/// A grading scheme that cannot be used to grade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemeError {
    #[error("grading scheme has no grade bands")]
    NoBands,

    #[error("grade band {min}..={max} is inverted")]
    InvertedBand { min: Score, max: Score },

    #[error("grade bands must start at 0, found {0}")]
    DoesNotStartAtZero(Score),

    #[error("grade bands must end at 100, found {0}")]
    DoesNotEndAtHundred(Score),

    #[error("gap or overlap between band ending at {previous_max} and band starting at {next_min}")]
    Discontinuous { previous_max: Score, next_min: Score },

    #[error("grade {higher} for higher points is worse than grade {lower} below it")]
    NotMonotone { higher: Grade, lower: Grade },

    #[error("grade {0} is outside 1..=6")]
    GradeOutOfRange(Grade),

    #[error("weight group '{0}' sums to zero")]
    ZeroWeight(&'static str),

    #[error("supplementary rule weights sum to zero")]
    ZeroSupplementaryWeight,

    #[error("inconsistent pass rules: {0}")]
    InconsistentPassRules(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("score {value} for {field} is outside 0..=100")]
    OutOfRange { field: &'static str, value: Score },
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Entry not found")]
    NotFound,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Calculation(#[from] CalculationError),

    #[error("Forbidden")]
    Forbidden,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) | ApiError::Calculation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Calculation(
                err @ (CalculationError::MissingInput { .. } | CalculationError::AmbiguousExtra { .. }),
            ) => json!({ "detail": err.to_string(), "fields": err.fields() }),
            ApiError::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "request failed");
                json!({ "detail": "Internal server error" })
            }
            other => json!({ "detail": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
