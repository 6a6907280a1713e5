use crate::model::{
    Id,
    user::{Email, User, UserMarker},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

pub const SESSION_TOKEN_VALIDITY: Duration = Duration::hours(24);

/// The verified `(id, email)` pair a session token vouches for.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
pub struct Identity {
    pub id: Id<UserMarker>,
    pub email: Email,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    iat: i64,
    exp: i64,
}

#[derive(Clone, Eq, PartialEq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for SessionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionToken").field(&"[redacted]").finish()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The token signing secret must not be empty")]
pub struct EmptySecretError;

#[derive(Debug, Error)]
#[error("Signing the session token failed: {0}")]
pub struct TokenIssueError(jsonwebtoken::errors::Error);

/// Why a token was turned away. Only meant for internal logs.
#[derive(Debug)]
pub enum TokenRejection {
    Jwt(jsonwebtoken::errors::Error),
    Subject,
    Email,
}

/// The message never carries the reason.
#[derive(Debug, Error)]
#[error("Token is not valid")]
pub struct InvalidTokenError {
    reason: TokenRejection,
}

impl InvalidTokenError {
    #[must_use]
    pub fn reason(&self) -> &TokenRejection {
        &self.reason
    }
}

/// Issues and verifies HS256 session tokens. Verification is pure: no
/// state is kept about issued tokens.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Result<Self, EmptySecretError> {
        if secret.is_empty() {
            return Err(EmptySecretError);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    pub fn issue(&self, identity: &Identity) -> Result<SessionToken, TokenIssueError> {
        self.issue_at(identity, OffsetDateTime::now_utc())
    }

    /// Issues a token as if it were `issued_at`; it expires
    /// [`SESSION_TOKEN_VALIDITY`] later.
    pub fn issue_at(
        &self,
        identity: &Identity,
        issued_at: OffsetDateTime,
    ) -> Result<SessionToken, TokenIssueError> {
        let claims = Claims {
            sub: identity.id.to_string(),
            email: identity.email.get().to_owned(),
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + SESSION_TOKEN_VALIDITY).unix_timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map(SessionToken)
            .map_err(TokenIssueError)
    }

    pub fn verify(&self, token: &str) -> Result<Identity, InvalidTokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| InvalidTokenError {
                reason: TokenRejection::Jwt(err),
            })?
            .claims;

        let id = claims.sub.parse().map_err(|_| InvalidTokenError {
            reason: TokenRejection::Subject,
        })?;
        let email = Email::parse(&claims.email).map_err(|_| InvalidTokenError {
            reason: TokenRejection::Email,
        })?;

        Ok(Identity { id, email })
    }
}

impl Debug for TokenSigner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("keys", &"[redacted]")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        auth::{EmptySecretError, Identity, SESSION_TOKEN_VALIDITY, TokenRejection, TokenSigner},
        user::Email,
    };
    use time::{Duration, OffsetDateTime};

    fn alice() -> Identity {
        Identity {
            id: Id::from(7_000_000_000_000_000_001),
            email: Email::parse("alice@example.com").unwrap(),
        }
    }

    #[test]
    fn issued_token_verifies_to_same_identity() {
        let signer = TokenSigner::new(b"test secret").unwrap();
        let token = signer.issue(&alice()).unwrap();

        assert_eq!(signer.verify(token.as_str()).unwrap(), alice());
    }

    #[test]
    fn token_expires_after_validity_window() {
        let signer = TokenSigner::new(b"test secret").unwrap();
        let now = OffsetDateTime::now_utc();

        let fresh = signer
            .issue_at(&alice(), now - SESSION_TOKEN_VALIDITY + Duration::minutes(5))
            .unwrap();
        assert!(signer.verify(fresh.as_str()).is_ok());

        let stale = signer
            .issue_at(&alice(), now - SESSION_TOKEN_VALIDITY - Duration::minutes(5))
            .unwrap();
        let err = signer.verify(stale.as_str()).unwrap_err();
        assert!(matches!(err.reason(), TokenRejection::Jwt(_)));
        assert_eq!(err.to_string(), "Token is not valid");
    }

    #[test]
    fn foreign_or_tampered_tokens_are_rejected() {
        let signer = TokenSigner::new(b"test secret").unwrap();
        let other = TokenSigner::new(b"other secret").unwrap();
        let token = signer.issue(&alice()).unwrap();

        assert!(other.verify(token.as_str()).is_err());

        // Bob's claims under Alice's signature.
        let bob = Identity {
            id: Id::from(7_000_000_000_000_000_002),
            email: Email::parse("bob@example.com").unwrap(),
        };
        let bob_token = signer.issue(&bob).unwrap();
        let alice_parts: Vec<&str> = token.as_str().split('.').collect();
        let bob_parts: Vec<&str> = bob_token.as_str().split('.').collect();
        let tampered = format!("{}.{}.{}", alice_parts[0], bob_parts[1], alice_parts[2]);
        assert!(signer.verify(&tampered).is_err());

        for malformed in ["", "garbage", "a.b.c"] {
            assert!(signer.verify(malformed).is_err());
        }
    }

    #[test]
    fn empty_secret_is_refused() {
        assert_eq!(TokenSigner::new(b"").unwrap_err(), EmptySecretError);
    }

    #[test]
    fn token_is_redacted_in_debug() {
        let signer = TokenSigner::new(b"test secret").unwrap();
        let token = signer.issue(&alice()).unwrap();
        assert!(!format!("{token:?}").contains(token.as_str()));
    }
}
