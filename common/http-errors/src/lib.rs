use axum::{
    extract::{rejection::{JsonRejection, PathRejection}, Request},
    http::{header::ALLOW, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Header carrying the machine-readable error code alongside the envelope.
pub const ERROR_CODE_HEADER: &str = "X-Error-Code";

/// Uniform failure envelope: `{"success": false, "error": <status>, "message": "..."}`.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub success: bool,
    pub error: u16,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: &'static str, message: Option<String> },
    Unauthorized { code: &'static str, message: String },
    Forbidden { code: &'static str, message: String },
    NotFound { code: &'static str },
    MethodNotAllowed,
    Unprocessable { code: &'static str, message: Option<String> },
    /// The message is logged, never returned to the caller.
    Internal { message: Option<String> },
    Other { status: StatusCode },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E) -> Self { Self::Internal { message: Some(e.to_string()) } }
    pub fn bad_request(code: &'static str) -> Self { Self::BadRequest { code, message: None } }
    pub fn not_found(code: &'static str) -> Self { Self::NotFound { code } }
    pub fn unprocessable(code: &'static str) -> Self { Self::Unprocessable { code, message: None } }

    /// Envelope for a bare status produced outside of `ApiError` (router fallbacks, panics, rejections).
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => Self::bad_request("bad_request"),
            StatusCode::UNAUTHORIZED => Self::Unauthorized { code: "unauthorized", message: "Unauthorized".into() },
            StatusCode::FORBIDDEN => Self::Forbidden { code: "forbidden", message: "Forbidden".into() },
            StatusCode::NOT_FOUND => Self::not_found("not_found"),
            StatusCode::METHOD_NOT_ALLOWED => Self::MethodNotAllowed,
            StatusCode::UNPROCESSABLE_ENTITY => Self::unprocessable("unprocessable"),
            StatusCode::INTERNAL_SERVER_ERROR => Self::Internal { message: None },
            other => Self::Other { status: other },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Other { status } => *status,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. }
            | ApiError::Unauthorized { code, .. }
            | ApiError::Forbidden { code, .. }
            | ApiError::NotFound { code }
            | ApiError::Unprocessable { code, .. } => *code,
            ApiError::MethodNotAllowed => "method_not_allowed",
            ApiError::Internal { .. } => "internal_error",
            ApiError::Other { .. } => "http_error",
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::BadRequest { message, .. } => message.clone().unwrap_or_else(|| "Bad Request".into()),
            ApiError::Unauthorized { message, .. } | ApiError::Forbidden { message, .. } => message.clone(),
            ApiError::NotFound { .. } => "Resource(s) not found".into(),
            ApiError::MethodNotAllowed => "Method(s) not allowed".into(),
            ApiError::Unprocessable { message, .. } => message.clone().unwrap_or_else(|| "Request unprocessable".into()),
            ApiError::Internal { .. } => "Internal server error".into(),
            ApiError::Other { status } => status.canonical_reason().unwrap_or("Request failed").into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal { message: Some(detail) } = &self {
            tracing::error!(error = %detail, "internal error");
        }
        let status = self.status();
        let code = self.code();
        let body = ErrorBody { success: false, error: status.as_u16(), message: self.public_message() };
        let mut resp = (status, Json(body)).into_response();
        resp.headers_mut().insert(ERROR_CODE_HEADER, HeaderValue::from_static(code));
        resp
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            // well-formed JSON that does not match the expected shape
            JsonRejection::JsonDataError(err) => ApiError::Unprocessable { code: "invalid_body", message: Some(err.body_text()) },
            JsonRejection::JsonSyntaxError(_) => ApiError::BadRequest { code: "malformed_json", message: None },
            JsonRejection::MissingJsonContentType(_) => ApiError::BadRequest { code: "missing_json_content_type", message: None },
            _ => ApiError::bad_request("unreadable_body"),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(_: PathRejection) -> Self {
        ApiError::not_found("not_found")
    }
}

/// Rewrites any error response that did not come from `ApiError` into the uniform envelope.
pub async fn normalize_error_response(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) || response.headers().contains_key(ERROR_CODE_HEADER) {
        return response;
    }
    let allow = response.headers().get(ALLOW).cloned();
    let mut normalized = ApiError::from_status(status).into_response();
    if let Some(allow) = allow {
        normalized.headers_mut().insert(ALLOW, allow);
    }
    normalized
}

pub type ApiResult<T> = Result<T, ApiError>;
