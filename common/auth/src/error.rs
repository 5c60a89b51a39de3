use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use jsonwebtoken::errors::ErrorKind;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Coarse classification used for status codes, logging and the `X-Error-Code` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    MissingToken,
    UnknownKey,
    ExpiredToken,
    InvalidToken,
    InvalidClaims,
    Forbidden,
    KeySource,
}

impl AuthErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorKind::MissingToken => "missing_token",
            AuthErrorKind::UnknownKey => "unknown_key",
            AuthErrorKind::ExpiredToken => "expired_token",
            AuthErrorKind::InvalidToken => "invalid_token",
            AuthErrorKind::InvalidClaims => "invalid_claims",
            AuthErrorKind::Forbidden => "forbidden",
            AuthErrorKind::KeySource => "key_source",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthErrorKind::Forbidden => StatusCode::FORBIDDEN,
            AuthErrorKind::KeySource => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization header is expected.")]
    MissingAuthorization,
    #[error("Authorization header must be bearer token.")]
    InvalidAuthorization,
    #[error("Unable to find the appropriate key: token has no kid.")]
    MissingKeyId,
    #[error("Unable to find the appropriate key for kid '{0}'.")]
    UnknownKeyId(String),
    #[error("Unable to parse authentication token: {0}")]
    InvalidHeader(String),
    #[error("Token expired.")]
    TokenExpired,
    #[error("Unable to parse authentication token: {0}")]
    Verification(String),
    #[error("Incorrect claims. Please, check the audience and issuer.")]
    ClaimMismatch(String),
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("malformed claim payload: {0}")]
    InvalidJson(String),
    #[error("Permissions not included in JWT.")]
    MissingPermissions,
    #[error("Permission not found.")]
    PermissionDenied { required: String },
    #[error("failed to parse decoding key for kid '{0}': {1}")]
    KeyParse(String, String),
    #[error("failed to fetch JWKS: {0}")]
    JwksFetch(String),
    #[error("failed to parse JWKS response: {0}")]
    JwksDecode(String),
    #[error("JWKS entry missing key id (kid)")]
    JwksMissingKid,
    #[error("JWKS key '{0}' missing required RSA components")]
    JwksMissingComponents(String),
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => AuthErrorKind::MissingToken,
            AuthError::MissingKeyId | AuthError::UnknownKeyId(_) => AuthErrorKind::UnknownKey,
            AuthError::TokenExpired => AuthErrorKind::ExpiredToken,
            AuthError::InvalidHeader(_) | AuthError::Verification(_) => AuthErrorKind::InvalidToken,
            AuthError::ClaimMismatch(_)
            | AuthError::InvalidClaim(_, _)
            | AuthError::InvalidJson(_)
            | AuthError::MissingPermissions => AuthErrorKind::InvalidClaims,
            AuthError::PermissionDenied { .. } => AuthErrorKind::Forbidden,
            AuthError::KeyParse(_, _)
            | AuthError::JwksFetch(_)
            | AuthError::JwksDecode(_)
            | AuthError::JwksMissingKid
            | AuthError::JwksMissingComponents(_) => AuthErrorKind::KeySource,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::ClaimMismatch(value.to_string()),
            _ => Self::Verification(value.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let kind = err.kind();
        match kind {
            AuthErrorKind::Forbidden => ApiError::Forbidden { code: kind.as_str(), message: err.to_string() },
            AuthErrorKind::KeySource => ApiError::internal(err),
            _ => ApiError::Unauthorized { code: kind.as_str(), message: err.to_string() },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
