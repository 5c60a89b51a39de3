use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::extractors::{bearer_token, AuthContext};
use crate::verifier::JwtVerifier;

/// Exact, case-sensitive membership of `required` in the token's `permissions` claim.
pub fn check_permission(claims: &Claims, required: &str) -> AuthResult<()> {
    if claims.permissions.is_none() {
        return Err(AuthError::MissingPermissions);
    }
    if claims.has_permission(required) {
        Ok(())
    } else {
        Err(AuthError::PermissionDenied {
            required: required.to_string(),
        })
    }
}

/// A required permission bound to the verifier that checks it.
///
/// Layer it onto a single handler with
/// `handler.layer(middleware::from_fn_with_state(guard, require_permission))`.
#[derive(Clone)]
pub struct AuthGuard {
    verifier: Arc<JwtVerifier>,
    required: &'static str,
}

impl AuthGuard {
    pub fn new(verifier: Arc<JwtVerifier>, required: &'static str) -> Self {
        Self { verifier, required }
    }

    pub fn required(&self) -> &'static str {
        self.required
    }

    pub fn authorize(&self, headers: &HeaderMap) -> AuthResult<AuthContext> {
        let token = bearer_token(headers)?;
        let claims = self.verifier.verify(&token)?;
        check_permission(&claims, self.required)?;
        Ok(AuthContext { claims })
    }
}

/// Middleware body for [`AuthGuard`]: the wrapped handler only runs once authorization succeeded.
pub async fn require_permission(
    State(guard): State<AuthGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    match guard.authorize(request.headers()) {
        Ok(ctx) => {
            debug!(permission = guard.required, subject = %ctx.subject(), "request authorized");
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => {
            warn!(
                permission = guard.required,
                kind = err.kind().as_str(),
                error = %err,
                "request rejected by auth guard"
            );
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(permissions: serde_json::Value) -> Claims {
        let mut payload = json!({"iss": "issuer", "sub": "auth0|barista", "exp": 1_900_000_000});
        if !permissions.is_null() {
            payload["permissions"] = permissions;
        }
        Claims::try_from(payload).expect("claims")
    }

    #[test]
    fn grants_listed_permission() {
        let c = claims(json!(["get:drinks", "post:drinks"]));
        check_permission(&c, "post:drinks").expect("granted");
    }

    #[test]
    fn missing_claim_is_invalid_claims_not_forbidden() {
        let c = claims(serde_json::Value::Null);
        let err = check_permission(&c, "get:drinks").unwrap_err();
        assert!(matches!(err, AuthError::MissingPermissions));
    }

    #[test]
    fn unlisted_permission_is_forbidden() {
        let c = claims(json!(["get:drinks"]));
        let err = check_permission(&c, "get:drinks-detail").unwrap_err();
        match err {
            AuthError::PermissionDenied { required } => assert_eq!(required, "get:drinks-detail"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn matching_is_exact_and_case_sensitive() {
        let c = claims(json!(["GET:drinks", "get:*", "get:drinks "]));
        assert!(check_permission(&c, "get:drinks").is_err());
    }
}
