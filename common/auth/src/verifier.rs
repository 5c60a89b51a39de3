use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::{debug, info};

use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::jwks::JwksFetcher;

#[derive(Default)]
struct KeySets {
    /// Keys configured at startup from PEM; never touched by a refresh.
    pinned: HashMap<String, DecodingKey>,
    /// The key set last published by the JWKS endpoint.
    published: HashMap<String, DecodingKey>,
}

/// RS256 public keys by `kid`.
#[derive(Clone, Default)]
pub struct KeyRing {
    sets: Arc<RwLock<KeySets>>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin_rsa_pem(&self, kid: impl Into<String>, pem: &[u8]) -> AuthResult<()> {
        let kid = kid.into();
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|err| AuthError::KeyParse(kid.clone(), err.to_string()))?;
        self.sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .pinned
            .insert(kid, key);
        Ok(())
    }

    /// Swaps the published set wholesale, so a kid dropped upstream stops verifying.
    pub fn replace_jwks(&self, keys: Vec<(String, DecodingKey)>) -> usize {
        let published: HashMap<_, _> = keys.into_iter().collect();
        let count = published.len();
        self.sets.write().unwrap_or_else(PoisonError::into_inner).published = published;
        count
    }

    pub fn lookup(&self, kid: &str) -> Option<DecodingKey> {
        let sets = self.sets.read().unwrap_or_else(PoisonError::into_inner);
        sets.pinned.get(kid).or_else(|| sets.published.get(kid)).cloned()
    }

    pub fn len(&self) -> usize {
        let sets = self.sets.read().unwrap_or_else(PoisonError::into_inner);
        sets.pinned.len() + sets.published.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Checks RS256 bearer tokens against a [`KeyRing`] fed by a local PEM, a JWKS endpoint, or both.
pub struct JwtVerifier {
    validation: Validation,
    keys: KeyRing,
    jwks: Option<JwksFetcher>,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[config.issuer]);
        validation.set_audience(&[config.audience]);
        validation.leeway = config.leeway_seconds.into();
        Self {
            validation,
            keys: KeyRing::new(),
            jwks: None,
        }
    }

    pub fn with_local_key(self, kid: impl Into<String>, pem: &[u8]) -> AuthResult<Self> {
        self.keys.pin_rsa_pem(kid, pem)?;
        Ok(self)
    }

    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks = Some(JwksFetcher::new(url));
        self
    }

    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    pub fn jwks_url(&self) -> Option<&str> {
        self.jwks.as_ref().map(JwksFetcher::url)
    }

    /// Signature, expiry, issuer and audience checks; permissions are checked separately.
    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let header =
            decode_header(token).map_err(|err| AuthError::InvalidHeader(err.to_string()))?;
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;
        let key = self
            .keys
            .lookup(&kid)
            .ok_or_else(|| AuthError::UnknownKeyId(kid.clone()))?;

        let data = decode::<Value>(token, &key, &self.validation)?;
        let claims = Claims::try_from(data.claims)?;
        debug!(kid, subject = %claims.subject, "token verified");
        Ok(claims)
    }

    /// Reloads the published keys. A failed fetch keeps the previous set.
    pub async fn refresh_jwks(&self) -> AuthResult<usize> {
        let Some(fetcher) = &self.jwks else {
            return Ok(0);
        };
        let count = self.keys.replace_jwks(fetcher.fetch().await?);
        info!(count, jwks_url = fetcher.url(), "JWKS key set replaced");
        Ok(count)
    }
}
