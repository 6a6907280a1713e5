use crate::model::{Id, IdKind, ValidationError};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Display, Formatter},
    sync::LazyLock,
};
use thiserror::Error;
use time::OffsetDateTime;

pub const PASSWORD_MIN_LEN: usize = 6;
pub const PASSWORD_SALT_LEN: usize = 16;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9_]+([.-]?[A-Za-z0-9_]+)*@[A-Za-z0-9_]+([.-]?[A-Za-z0-9_]+)*(\.[A-Za-z0-9_]{2,3})+$",
    )
    .expect("Email pattern is a valid regex")
});

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;
impl IdKind for UserMarker {
    const KIND: &'static str = "user";
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id<UserMarker>,
    pub email: Email,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A user together with the hash needed to authenticate them.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct UserAccount {
    pub user: User,
    pub password_hash: HashedPassword,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewUser {
    pub email: Email,
    pub password_hash: HashedPassword,
}

/// A lowercased, trimmed email address matching [`EMAIL_PATTERN`].
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct Email(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Please enter a valid email")]
pub struct InvalidEmailError(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, InvalidEmailError> {
        let normalized = raw.trim().to_lowercase();
        if EMAIL_PATTERN.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(InvalidEmailError(normalized))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Password(String);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum InvalidPasswordError {
    #[error("Password must be at least {PASSWORD_MIN_LEN} characters long")]
    TooShort,
}

impl Password {
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Password").field(&"[redacted]").finish()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Please provide both email and password")]
pub struct MissingCredentialsError;

/// Email and password as submitted for registration or login.
#[derive(Clone, Eq, PartialEq, Default, Hash, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn validate_registration(self) -> Result<(Email, Password), ValidationError> {
        let (email, password) = self.require_both()?;
        let email = Email::parse(&email)?;
        if password.chars().count() < PASSWORD_MIN_LEN {
            return Err(InvalidPasswordError::TooShort.into());
        }

        Ok((email, Password(password)))
    }

    /// Only presence is checked here. An email that does not parse cannot
    /// belong to any account, so it is reported as `None` and the caller
    /// rejects it like any other unknown email.
    pub fn validate_login(self) -> Result<(Option<Email>, Password), ValidationError> {
        let (email, password) = self.require_both()?;

        Ok((Email::parse(&email).ok(), Password(password)))
    }

    fn require_both(self) -> Result<(String, String), MissingCredentialsError> {
        if self.email.is_empty() || self.password.is_empty() {
            return Err(MissingCredentialsError);
        }

        Ok((self.email, self.password))
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// An Argon2 hash in PHC string format.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct HashedPassword(String);

impl HashedPassword {
    /// Wraps a stored PHC string. The string is only parsed on verification.
    #[must_use]
    pub fn from_phc(phc: String) -> Self {
        Self(phc)
    }

    #[must_use]
    pub fn as_phc(&self) -> &str {
        &self.0
    }
}

impl Debug for HashedPassword {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HashedPassword").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Password hashing failed: {0}")]
pub struct PasswordHashError(password_hash::Error);

/// Hashes new passwords with Argon2id.
///
/// Verification reads the parameters from the stored hash, so changing the
/// parameters here does not invalidate existing accounts.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(Params::DEFAULT)
    }
}

impl PasswordHasher {
    #[must_use]
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    pub fn hash(&self, password: &Password) -> Result<HashedPassword, PasswordHashError> {
        let salt_bytes: [u8; PASSWORD_SALT_LEN] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes).map_err(PasswordHashError)?;

        let hash = self
            .argon2()
            .hash_password(password.expose().as_bytes(), &salt)
            .map_err(PasswordHashError)?;

        Ok(HashedPassword(hash.to_string()))
    }

    pub fn verify(
        &self,
        password: &Password,
        hashed: &HashedPassword,
    ) -> Result<bool, PasswordHashError> {
        let parsed = PasswordHash::new(&hashed.0).map_err(PasswordHashError)?;

        match self
            .argon2()
            .verify_password(password.expose().as_bytes(), &parsed)
        {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(PasswordHashError(err)),
        }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}
