use crate::server::{AUTH_TOKEN_HEADER, ServerError};
use crate::service::{AuthError, guard::SessionGuard};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Header, HeaderName, HeaderValue};
use murmur_common::model::auth::Identity;
use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};
use tracing::debug;

static AUTH_TOKEN_HEADER_NAME: HeaderName = HeaderName::from_static(AUTH_TOKEN_HEADER);

/// The `x-auth-token` request header.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthToken(String);

impl AuthToken {
    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuthToken").field(&"[redacted]").finish()
    }
}

impl Header for AuthToken {
    fn name() -> &'static HeaderName {
        &AUTH_TOKEN_HEADER_NAME
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        if values.next().is_some() {
            return Err(headers::Error::invalid());
        }

        value
            .to_str()
            .map(|token| Self(token.to_owned()))
            .map_err(|_| headers::Error::invalid())
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(std::iter::once(value));
        }
    }
}

type AuthTokenHeader = TypedHeader<AuthToken>;

/// Extracting this rejects the request unless it carries a valid session
/// token.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct AuthenticatedUser(pub Identity);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<SessionGuard>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = match AuthTokenHeader::from_request_parts(parts, state).await {
            Ok(TypedHeader(token)) => Some(token),
            Err(rejection) if rejection.is_missing() => None,
            Err(rejection) => {
                debug!(%rejection, "Unreadable auth token header");
                return Err(AuthError::InvalidCredential.into());
            }
        };

        let identity = Arc::<SessionGuard>::from_ref(state)
            .authorize(token.as_ref().map(AuthToken::get))?;

        Ok(Self(identity))
    }
}
