use jsonwebtoken::DecodingKey;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AuthError, AuthResult};

/// Loads RS256 signing keys from a JWKS endpoint (e.g. `https://<tenant>/.well-known/jwks.json`).
#[derive(Clone)]
pub struct JwksFetcher {
    client: Client,
    url: String,
}

impl JwksFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> AuthResult<Vec<(String, DecodingKey)>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| AuthError::JwksFetch(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::JwksFetch(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        let body: JwksResponse = response
            .json()
            .await
            .map_err(|err| AuthError::JwksDecode(err.to_string()))?;

        decode_keys(body)
    }
}

fn decode_keys(body: JwksResponse) -> AuthResult<Vec<(String, DecodingKey)>> {
    let mut keys = Vec::new();
    for key in body.keys.into_iter() {
        let kid = key.kid.ok_or(AuthError::JwksMissingKid)?;

        // Only RSA signing keys can verify RS256 tokens; anything else in the set is ignored.
        let kty = key.kty.as_deref().unwrap_or("RSA");
        let usable = kty == "RSA"
            && key.alg.as_deref().map_or(true, |alg| alg == "RS256")
            && key.key_use.as_deref().map_or(true, |key_use| key_use == "sig");
        if !usable {
            debug!(kid, kty, "skipping JWKS entry that is not an RS256 signing key");
            continue;
        }

        let modulus = key
            .n
            .ok_or_else(|| AuthError::JwksMissingComponents(kid.clone()))?;
        let exponent = key
            .e
            .ok_or_else(|| AuthError::JwksMissingComponents(kid.clone()))?;

        let decoding_key = DecodingKey::from_rsa_components(&modulus, &exponent)
            .map_err(|err| AuthError::KeyParse(kid.clone(), err.to_string()))?;
        keys.push((kid, decoding_key));
    }

    Ok(keys)
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: Option<String>,
    alg: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
    n: Option<String>,
    e: Option<String>,
}
