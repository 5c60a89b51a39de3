/// Runtime configuration for JWT verification.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Expected issuer claim (iss).
    pub issuer: String,
    /// Expected audience claim (aud).
    pub audience: String,
    /// Allowable clock skew in seconds when validating exp/nbf.
    pub leeway_seconds: u32,
}

impl JwtConfig {
    /// Construct config with sensible defaults (30 second leeway).
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_seconds: 30,
        }
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }
}

fn bare_domain(domain: &str) -> &str {
    let trimmed = domain.trim().trim_end_matches('/');
    trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed)
}

/// Issuer for an Auth0 tenant domain, e.g. `coffee.us.auth0.com` -> `https://coffee.us.auth0.com/`.
pub fn auth0_issuer(domain: &str) -> String {
    format!("https://{}/", bare_domain(domain))
}

pub fn auth0_jwks_url(domain: &str) -> String {
    format!("https://{}/.well-known/jwks.json", bare_domain(domain))
}
