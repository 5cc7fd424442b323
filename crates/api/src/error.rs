use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use kiara_core::error::CoreError;
use kiara_pipeline::DispatchError;
use kiara_providers::ProviderError;
use serde_json::{json, Value};

/// Non-standard "client closed request" status, logged for abandoned
/// generations. The client never sees it.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`DispatchError`] and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce `{error, code, details?}` bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `kiara_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A failed generation dispatch.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

/// Status, machine-readable code, message, and optional details.
type ErrorParts = (StatusCode, &'static str, String, Option<Value>);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Dispatch(err) => classify_dispatch_error(err),
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(details) = details {
            body["details"] = details;
        }

        let mut response = (status, axum::Json(body)).into_response();
        if let Some(retry_after) = retry_after(&self) {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

fn internal() -> ErrorParts {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
        None,
    )
}

fn retry_after(err: &AppError) -> Option<u64> {
    match err {
        AppError::Core(CoreError::RateLimited { retry_after_secs })
        | AppError::Dispatch(DispatchError::Core(CoreError::RateLimited { retry_after_secs })) => {
            Some(*retry_after_secs)
        }
        _ => None,
    }
}

fn classify_core_error(core: &CoreError) -> ErrorParts {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
            None,
        ),
        CoreError::UnknownModel(_) => (
            StatusCode::NOT_FOUND,
            "MODEL_NOT_FOUND",
            core.to_string(),
            None,
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None),
        CoreError::InsufficientCredits { balance, required } => (
            StatusCode::PAYMENT_REQUIRED,
            "INSUFFICIENT_CREDITS",
            "Insufficient credits".to_string(),
            Some(json!({ "balance": balance, "required": required })),
        ),
        CoreError::RateLimited { retry_after_secs } => (
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Too many generation requests".to_string(),
            Some(json!({ "retry_after_seconds": retry_after_secs })),
        ),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone(), None),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone(), None),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone(), None),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// Map a dispatch failure. Provider messages are surfaced; configuration and
/// storage details are logged and sanitized.
fn classify_dispatch_error(err: &DispatchError) -> ErrorParts {
    match err {
        DispatchError::Core(core) => classify_core_error(core),
        DispatchError::NormalizationMiss { .. } => (
            StatusCode::BAD_GATEWAY,
            "NO_OUTPUTS",
            err.to_string(),
            None,
        ),
        DispatchError::Provider(provider) => match provider {
            ProviderError::TimedOut { .. } => (
                StatusCode::GATEWAY_TIMEOUT,
                "PROVIDER_TIMEOUT",
                provider.to_string(),
                None,
            ),
            ProviderError::Canceled { .. } => (
                StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST),
                "CANCELED",
                provider.to_string(),
                None,
            ),
            ProviderError::Configuration(msg) => {
                tracing::error!(error = %msg, "Provider configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    "The selected model is not configured correctly".to_string(),
                    None,
                )
            }
            ProviderError::Core(core) => {
                tracing::error!(error = %core, "Job supervision error");
                internal()
            }
            _ => (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                provider.to_string(),
                None,
            ),
        },
        DispatchError::Store(store) => {
            tracing::error!(error = %store, "Generation store error");
            internal()
        }
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> ErrorParts {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
            None,
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                        None,
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}
