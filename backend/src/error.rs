//! Error handling for the TerraView backend
//!
//! Provides consistent error responses in English and Spanish

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::external::BloomModelError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    // Authorization errors
    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Forbidden: {message}")]
    Forbidden {
        message: String,
        message_es: String,
    },

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_es: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {message}")]
    Conflict {
        resource: String,
        message: String,
        message_es: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // External service errors
    #[error(transparent)]
    BloomModel(#[from] BloomModelError),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Build a field validation error
    pub fn validation(
        field: impl Into<String>,
        message: impl Into<String>,
        message_es: impl Into<String>,
    ) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
            message_es: message_es.into(),
        }
    }

    /// Build a 403 with a specific reason
    pub fn forbidden(message: impl Into<String>, message_es: impl Into<String>) -> Self {
        AppError::Forbidden {
            message: message.into(),
            message_es: message_es.into(),
        }
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::TokenExpired | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::InsufficientPermissions | AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::Validation { .. } | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BloomModel(BloomModelError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            AppError::BloomModel(_) => StatusCode::BAD_GATEWAY,
            AppError::DatabaseError(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Convert derive-based input validation into a single field error
///
/// The first failing field (by name) is reported.
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let mut fields: Vec<&&str> = field_errors.keys().collect();
        fields.sort();

        let Some(field) = fields.first() else {
            return AppError::ValidationError("Invalid input".to_string());
        };
        let first = field_errors
            .get(**field)
            .and_then(|errs| errs.first());

        let code = first.map(|e| &*e.code).unwrap_or("invalid");
        let message = first
            .and_then(|e| e.message.as_ref())
            .map(|m| m.to_string())
            .unwrap_or_else(|| default_message(code, field).to_string());

        AppError::Validation {
            field: field.to_string(),
            message,
            message_es: spanish_message(code).to_string(),
        }
    }
}

fn default_message(code: &str, field: &str) -> String {
    match code {
        "required" => format!("{} is required", field),
        "length" => format!("{} has an invalid length", field),
        "range" => format!("{} is out of range", field),
        _ => format!("{} is invalid", field),
    }
}

fn spanish_message(code: &str) -> &'static str {
    match code {
        "required" => "Este campo es obligatorio",
        "length" => "La longitud del campo no es válida",
        "range" => "El valor está fuera de rango",
        "contribution_type" => "Tipo de contribución inválido",
        "description_length" => {
            "La descripción es obligatoria y debe tener al menos 10 caracteres"
        }
        "latitude_range" => "La latitud debe estar entre -90 y 90",
        "longitude_range" => "La longitud debe estar entre -180 y 180",
        "hectares_range" => "Las hectáreas deben ser mayores que cero",
        _ => "Datos inválidos",
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_es: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: &str, message_en: impl Into<String>, message_es: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message_en: message_en.into(),
            message_es: message_es.into(),
            field: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_detail = match &self {
            AppError::TokenExpired => {
                ErrorDetail::new("TOKEN_EXPIRED", "Token has expired", "El token ha expirado")
            }
            AppError::InvalidToken => {
                ErrorDetail::new("INVALID_TOKEN", "Invalid token", "Token inválido")
            }
            AppError::InsufficientPermissions => ErrorDetail::new(
                "INSUFFICIENT_PERMISSIONS",
                "You do not have permission to perform this action",
                "No tienes permiso para realizar esta acción",
            ),
            AppError::Forbidden { message, message_es } => {
                ErrorDetail::new("FORBIDDEN", message.clone(), message_es.clone())
            }
            AppError::Validation {
                field,
                message,
                message_es,
            } => ErrorDetail {
                field: Some(field.clone()),
                ..ErrorDetail::new("VALIDATION_ERROR", message.clone(), message_es.clone())
            },
            AppError::ValidationError(msg) => ErrorDetail::new(
                "VALIDATION_ERROR",
                msg.clone(),
                format!("Datos inválidos: {}", msg),
            ),
            AppError::Conflict {
                resource,
                message,
                message_es,
            } => ErrorDetail {
                field: Some(resource.clone()),
                ..ErrorDetail::new("CONFLICT", message.clone(), message_es.clone())
            },
            AppError::NotFound(resource) => ErrorDetail::new(
                "NOT_FOUND",
                format!("{} not found", resource),
                format!("No se encontró {}", resource),
            ),
            AppError::BloomModel(BloomModelError::Timeout { stage }) => ErrorDetail {
                field: Some(stage.to_string()),
                ..ErrorDetail::new(
                    "PREDICTION_TIMEOUT",
                    "The bloom prediction service did not respond in time",
                    "El servicio de predicción de floración no respondió a tiempo",
                )
            },
            AppError::BloomModel(err) => ErrorDetail {
                field: Some(err.stage().to_string()),
                ..ErrorDetail::new(
                    "PREDICTION_SERVICE_ERROR",
                    "The bloom prediction service failed",
                    "El servicio de predicción de floración falló",
                )
            },
            AppError::DatabaseError(_) => ErrorDetail::new(
                "DATABASE_ERROR",
                "A database error occurred",
                "Ocurrió un error en la base de datos",
            ),
            AppError::InternalError(_) => ErrorDetail::new(
                "INTERNAL_ERROR",
                "An internal server error occurred",
                "Ocurrió un error interno del servidor",
            ),
        };

        // Log the error with its cause; the body stays generic for 5xx
        if status.is_server_error() {
            tracing::error!(error = ?self, status = %status, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
