use crate::server::AUTH_TOKEN_HEADER;
use axum::http::{
    HeaderName, HeaderValue, Method,
    header::{CONTENT_TYPE, InvalidHeaderValue},
};
use murmur_common::{
    model::auth::{EmptySecretError, TokenSigner},
    snowflake::{ProcessId, SnowflakePartOutOfRangeError, WorkerId},
};
use serde::Deserialize;
use std::{
    fmt::{self, Debug, Formatter},
    net::{IpAddr, SocketAddr},
    time::Duration,
};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("JWT_SECRET is not usable: {0}")]
    JwtSecret(#[from] EmptySecretError),
    #[error("Machine id out of range: {0}")]
    MachinePart(#[from] SnowflakePartOutOfRangeError),
    #[error("CORS_ALLOWED_ORIGINS must list explicit origins, not \"*\"")]
    WildcardOrigin,
    #[error("CORS origin {origin:?} is not a valid header value: {source}")]
    CorsOrigin {
        origin: String,
        source: InvalidHeaderValue,
    },
}

/// Process configuration, read from the environment.
#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
pub struct Env {
    pub server_address: IpAddr,
    pub server_port: u16,
    pub jwt_secret: String,
    /// Without one the server keeps everything in memory.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,
    #[serde(default)]
    pub worker_id: u8,
    #[serde(default)]
    pub process_id: u8,
    #[serde(default = "default_cors_allowed_origins")]
    pub cors_allowed_origins: Vec<String>,
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_database_max_connections() -> u32 {
    10
}

fn default_cors_allowed_origins() -> Vec<String> {
    [
        "http://localhost:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ]
    .map(str::to_owned)
    .to_vec()
}

impl Debug for Env {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("server_address", &self.server_address)
            .field("server_port", &self.server_port)
            .field("jwt_secret", &"<redacted>")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<redacted>"),
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("database_max_connections", &self.database_max_connections)
            .field("worker_id", &self.worker_id)
            .field("process_id", &self.process_id)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

impl Env {
    /// Loads an optional `.env` file, then reads the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if e.not_found() {
                debug!("No .env file found");
            } else {
                return Err(e.into());
            }
        }

        Ok(envy::from_env()?)
    }

    #[must_use]
    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.server_address, self.server_port)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn worker_id(&self) -> Result<WorkerId, ConfigError> {
        Ok(self.worker_id.try_into()?)
    }

    pub fn process_id(&self) -> Result<ProcessId, ConfigError> {
        Ok(self.process_id.try_into()?)
    }

    pub fn token_signer(&self) -> Result<TokenSigner, ConfigError> {
        Ok(TokenSigner::new(self.jwt_secret.as_bytes())?)
    }

    pub fn cors_layer(&self) -> Result<CorsLayer, ConfigError> {
        let origins = self
            .cors_allowed_origins
            .iter()
            .map(|origin| {
                if origin.trim() == "*" {
                    return Err(ConfigError::WildcardOrigin);
                }
                HeaderValue::from_str(origin).map_err(|source| ConfigError::CorsOrigin {
                    origin: origin.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([CONTENT_TYPE, HeaderName::from_static(AUTH_TOKEN_HEADER)])
            .allow_credentials(true))
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, Env};
    use std::time::Duration;

    fn parse(vars: &[(&str, &str)]) -> Result<Env, envy::Error> {
        envy::from_iter(
            vars.iter()
                .map(|(key, value)| ((*key).to_owned(), (*value).to_owned())),
        )
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("SERVER_ADDRESS", "127.0.0.1"),
        ("SERVER_PORT", "5000"),
        ("JWT_SECRET", "not very secret"),
    ];

    #[test]
    fn defaults_apply() {
        let env = parse(MINIMAL).unwrap();

        assert_eq!(env.socket_address().to_string(), "127.0.0.1:5000");
        assert_eq!(env.database_url, None);
        assert_eq!(env.request_timeout(), Duration::from_secs(10));
        assert_eq!(env.database_max_connections, 10);
        assert_eq!(env.worker_id().unwrap().get(), 0);
        assert_eq!(env.cors_allowed_origins.len(), 3);
        let _signer = env.token_signer().unwrap();
        let _cors = env.cors_layer().unwrap();
    }

    #[test]
    fn secret_is_required() {
        assert!(parse(&MINIMAL[..2]).is_err());
    }

    #[test]
    fn overrides_are_read() {
        let mut vars = MINIMAL.to_vec();
        vars.extend([
            ("DATABASE_URL", "postgres://localhost/murmur"),
            ("REQUEST_TIMEOUT_SECS", "3"),
            ("WORKER_ID", "7"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example,https://b.example"),
        ]);

        let env = parse(&vars).unwrap();

        assert_eq!(
            env.database_url.as_deref(),
            Some("postgres://localhost/murmur")
        );
        assert_eq!(env.request_timeout(), Duration::from_secs(3));
        assert_eq!(env.worker_id().unwrap().get(), 7);
        assert_eq!(
            env.cors_allowed_origins,
            ["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn wildcard_origin_is_a_config_error() {
        let mut vars = MINIMAL.to_vec();
        vars.push(("CORS_ALLOWED_ORIGINS", "https://a.example,*"));

        let env = parse(&vars).unwrap();

        assert!(matches!(env.cors_layer(), Err(ConfigError::WildcardOrigin)));
    }

    #[test]
    fn machine_ids_are_range_checked() {
        let mut vars = MINIMAL.to_vec();
        vars.push(("PROCESS_ID", "32"));

        let env = parse(&vars).unwrap();

        assert!(matches!(env.process_id(), Err(ConfigError::MachinePart(_))));
    }

    #[test]
    fn empty_secret_is_rejected() {
        let mut vars = MINIMAL[..2].to_vec();
        vars.push(("JWT_SECRET", ""));

        let env = parse(&vars).unwrap();

        assert!(matches!(env.token_signer(), Err(ConfigError::JwtSecret(_))));
    }

    #[test]
    fn debug_hides_secrets() {
        let env = parse(MINIMAL).unwrap();

        assert!(!format!("{env:?}").contains("not very secret"));
    }
}
