pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod jwks;
pub mod verifier;

pub use claims::Claims;
pub use config::JwtConfig;
pub use error::{AuthError, AuthErrorKind, AuthResult};
pub use extractors::{bearer_token, AuthContext};
pub use guards::{check_permission, require_permission, AuthGuard};
pub use jwks::JwksFetcher;
pub use verifier::{JwtVerifier, KeyRing};
