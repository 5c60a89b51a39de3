use std::env;
use std::net::{IpAddr, SocketAddr};

use anyhow::{bail, Context, Result};
use common_auth::config::{auth0_issuer, auth0_jwks_url};

/// Which set of response quirks the drink routes reproduce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compatibility {
    #[default]
    Corrected,
    /// Empty detail listing answers 401 and writes echo every drink sharing the title.
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtSettings {
    pub issuer: String,
    pub audience: String,
    pub jwks_url: Option<String>,
    pub dev_public_key_pem: Option<String>,
    pub leeway_seconds: u32,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt: JwtSettings,
    pub jwks_refresh_secs: u64,
    pub cors_allowed_origins: Vec<String>,
    pub seed_on_start: bool,
    pub compat: Compatibility,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match var("PORT") {
            Some(raw) => raw.parse::<u16>().with_context(|| format!("PORT is not a valid port: {raw}"))?,
            None => 5000,
        };
        let database_url = var("DATABASE_URL");

        let auth0_domain = var("AUTH0_DOMAIN");
        let issuer = match (var("JWT_ISSUER"), auth0_domain.as_deref()) {
            (Some(issuer), _) => issuer,
            (None, Some(domain)) => auth0_issuer(domain),
            (None, None) => bail!("JWT_ISSUER or AUTH0_DOMAIN must be set"),
        };
        let audience = var("JWT_AUDIENCE")
            .or_else(|| var("API_AUDIENCE"))
            .context("JWT_AUDIENCE must be set")?;
        let jwks_url = var("JWT_JWKS_URL").or_else(|| auth0_domain.as_deref().map(auth0_jwks_url));
        let dev_public_key_pem = var("JWT_DEV_PUBLIC_KEY_PEM");
        if jwks_url.is_none() && dev_public_key_pem.is_none() {
            bail!("no signing key source: set AUTH0_DOMAIN, JWT_JWKS_URL or JWT_DEV_PUBLIC_KEY_PEM");
        }
        let leeway_seconds = match var("JWT_LEEWAY_SECONDS") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("JWT_LEEWAY_SECONDS is not a number: {raw}"))?,
            None => 30,
        };
        let jwks_refresh_secs = match var("JWKS_REFRESH_SECONDS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("JWKS_REFRESH_SECONDS is not a number: {raw}"))?,
            None => 300,
        };

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| vec!["*".to_string()]);

        let seed_on_start = flag(var("DRINKS_SEED_ON_START"), "DRINKS_SEED_ON_START")?;
        let compat = if flag(var("DRINKS_LEGACY_COMPAT"), "DRINKS_LEGACY_COMPAT")? {
            Compatibility::Legacy
        } else {
            Compatibility::Corrected
        };

        Ok(Self {
            host,
            port,
            database_url,
            jwt: JwtSettings { issuer, audience, jwks_url, dev_public_key_pem, leeway_seconds },
            jwks_refresh_secs: jwks_refresh_secs.max(60),
            cors_allowed_origins,
            seed_on_start,
            compat,
        })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("HOST is not an IP address: {}", self.host))?;
        Ok(SocketAddr::from((ip, self.port)))
    }
}

fn flag(value: Option<String>, name: &str) -> Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => bail!("{name} must be a boolean, got {other}"),
    }
}
