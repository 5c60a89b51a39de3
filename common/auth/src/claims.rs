use serde::Deserialize;

use crate::error::{AuthError, AuthResult};

/// The parts of a verified token that handlers act on.
///
/// Expiry, issuer and audience are enforced by the verifier and not carried here.
#[derive(Debug, Clone)]
pub struct Claims {
    pub subject: String,
    /// `None` when the token carries no `permissions` claim at all.
    pub permissions: Option<Vec<String>>,
}

impl Claims {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .as_deref()
            .is_some_and(|granted| granted.iter().any(|value| value == permission))
    }
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    sub: String,
    #[serde(default)]
    permissions: Option<Vec<String>>,
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = AuthError;

    fn try_from(value: ClaimsRepr) -> AuthResult<Self> {
        if value.sub.trim().is_empty() {
            return Err(AuthError::InvalidClaim("sub", value.sub));
        }

        Ok(Self {
            subject: value.sub,
            permissions: value.permissions,
        })
    }
}

impl TryFrom<serde_json::Value> for Claims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let repr: ClaimsRepr =
            serde_json::from_value(value).map_err(|err| AuthError::InvalidJson(err.to_string()))?;
        Claims::try_from(repr)
    }
}
