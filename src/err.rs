use std::collections::BTreeMap;

use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

use crate::repo::RepoError;
use crate::validate::taken;

/// Field name to the list of messages for every rule that field failed.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub const VALIDATION_FAILED: &str = "Validasi gagal";
pub const NOT_FOUND: &str = "Siswa tidak ditemukan";
pub const INVALID_CREDENTIALS: &str = "NIS atau password salah";
pub const PAYLOAD_TOO_LARGE: &str = "Ukuran request melebihi batas";
const SERVER_FAULT: &str = "Terjadi kesalahan pada server";

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    message: &'static str,
    #[serde(flatten)]
    value: V,
}

impl<V: Serialize> Success<V> {
    pub fn of(message: &'static str, value: V) -> Self {
        Self {
            success: true,
            message,
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Data<T> {
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing<T> {
    pub data: Vec<T>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Empty {}

#[derive(Debug)]
pub enum Error {
    Validation { errors: FieldErrors },
    NotFound { message: String },
    InvalidCredentials,
    PayloadTooLarge,
    InternalError { message: &'static str, error: String },
}

#[derive(Serialize)]
struct Failure<'a> {
    success: bool,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a FieldErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Error {
    pub fn validation(errors: FieldErrors) -> Self {
        Self::Validation { errors }
    }

    pub fn field<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.into()]);
        Self::Validation { errors }
    }

    pub fn not_found() -> Self {
        Self::NotFound {
            message: NOT_FOUND.to_string(),
        }
    }

    /// Relabels an internal fault with the failure message of the operation it happened in.
    /// Client errors pass through untouched.
    pub fn failed<E: Into<Error>>(message: &'static str) -> impl Fn(E) -> Error {
        move |err| match err.into() {
            Error::InternalError { error, .. } => Error::InternalError { message, error },
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Error::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn internal<E: ToString>(err: E) -> Self {
        Self::InternalError {
            message: SERVER_FAULT,
            error: err.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = match &self {
            Error::Validation { errors } => {
                log::debug!("validation failed: {:?}", errors);
                Failure {
                    success: false,
                    message: VALIDATION_FAILED,
                    errors: Some(errors),
                    error: None,
                }
            }
            Error::NotFound { message } => {
                log::debug!("not found: {}", message);
                Failure {
                    success: false,
                    message,
                    errors: None,
                    error: None,
                }
            }
            Error::InvalidCredentials => {
                log::debug!("rejected login attempt");
                Failure {
                    success: false,
                    message: INVALID_CREDENTIALS,
                    errors: None,
                    error: None,
                }
            }
            Error::PayloadTooLarge => {
                log::debug!("refused oversized request body");
                Failure {
                    success: false,
                    message: PAYLOAD_TOO_LARGE,
                    errors: None,
                    error: None,
                }
            }
            Error::InternalError { message, error } => {
                log::error!("{}: {}", message, error);
                Failure {
                    success: false,
                    message,
                    errors: None,
                    error: Some(error.as_str()),
                }
            }
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::internal(io)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::internal(err)
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::internal(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", err))
    }
}

impl From<RepoError> for Error {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::DuplicateNis => Self::field("nis", taken("nis")),
            RepoError::Database(err) => Self::internal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_relabels_only_internal_errors() {
        let relabel = Error::failed::<Error>("Gagal menghapus siswa");

        match relabel(Error::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only file system",
        ))) {
            Error::InternalError { message, error } => {
                assert_eq!(message, "Gagal menghapus siswa");
                assert_eq!(error, "read-only file system");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(relabel(Error::not_found()), Error::NotFound { .. }));
        assert!(matches!(
            relabel(Error::InvalidCredentials),
            Error::InvalidCredentials
        ));
    }

    #[test]
    fn duplicate_nis_is_a_validation_error() {
        let err = Error::from(RepoError::DuplicateNis);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        match err {
            Error::Validation { errors } => {
                assert_eq!(errors["nis"], vec!["The nis has already been taken."]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn failure_body_omits_absent_fields() {
        let body = serde_json::to_value(Failure {
            success: false,
            message: NOT_FOUND,
            errors: None,
            error: None,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "success": false, "message": "Siswa tidak ditemukan" })
        );
    }
}
