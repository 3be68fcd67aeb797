//! Error types.
//!
//! Corpus and model errors are start-up configuration failures; input
//! errors are per-request and map to HTTP 400 through [`ApiError`].

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("cannot read training data {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed training data: {0}")]
    Csv(#[from] csv::Error),

    #[error("training data is missing column `{0}`")]
    MissingColumn(&'static str),

    #[error("invalid Potability label `{value}` on line {line}")]
    InvalidLabel { line: u64, value: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum ModelError {
    #[error("training corpus is empty")]
    EmptyCorpus,

    #[error("training corpus has {count} example(s) of {label:?}; at least 2 are required")]
    InsufficientClass {
        label: crate::types::Potability,
        count: usize,
    },

    #[error("training partition contains no {0:?} examples")]
    ClassMissingFromTraining(crate::types::Potability),

    #[error("column mean for `{0}` is not finite")]
    NonFiniteMean(&'static str),

    #[error("invalid training parameter {param}: {constraint}")]
    InvalidParameter {
        param: &'static str,
        constraint: &'static str,
    },
}

#[derive(Error, Debug, PartialEq)]
pub enum InputError {
    #[error("unknown field `{0}`")]
    UnknownField(String),

    #[error("field `{0}` given more than once")]
    DuplicateField(&'static str),

    #[error("field `{0}` must be a number")]
    NotNumeric(String),

    #[error("field `{0}` must be finite")]
    NotFinite(&'static str),

    #[error("field `{field}` = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{0}")]
    Invalid(String),
}

/// Errors surfaced by HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    InvalidInput(#[from] InputError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Malformed or mistyped JSON bodies are input errors like any other. The
/// rejection text carries the path of the offending field.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(InputError::Invalid(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request.failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
