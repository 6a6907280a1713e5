use crate::service::{AuthError, Result, ServiceError};
use murmur_common::model::{
    auth::{Identity, SessionToken, TokenSigner},
    user::{Credentials, HashedPassword, NewUser, Password, PasswordHasher, User},
};
use murmur_db::store::{DbError, FeedStore};
use serde::Serialize;
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info};

/// A freshly issued token and the identity it was issued for.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Session {
    pub token: SessionToken,
    pub user: Identity,
}

/// Registers and authenticates users.
pub struct AccountService {
    store: Arc<dyn FeedStore>,
    signer: Arc<TokenSigner>,
    hasher: PasswordHasher,
}

impl AccountService {
    #[must_use]
    pub fn new(store: Arc<dyn FeedStore>, signer: Arc<TokenSigner>, hasher: PasswordHasher) -> Self {
        Self {
            store,
            signer,
            hasher,
        }
    }

    pub async fn register(&self, credentials: Credentials) -> Result<Session> {
        let (email, password) = credentials.validate_registration()?;
        let password_hash = self.hash_password(password).await?;

        let user = match self
            .store
            .create_user(&NewUser {
                email,
                password_hash,
            })
            .await
        {
            Ok(user) => user,
            Err(DbError::UniqueViolation) => return Err(ServiceError::Conflict),
            Err(err) => return Err(err.into()),
        };

        info!(user_id = %user.id, email = %user.email, "New user registered");
        self.open_session(&user)
    }

    pub async fn authenticate(&self, credentials: Credentials) -> Result<Session> {
        let (email, password) = credentials.validate_login()?;
        let Some(email) = email else {
            debug!("Login with malformed email");
            self.spend_verification_cost(password).await?;
            return Err(AuthError::InvalidCredentials.into());
        };

        let Some(account) = self.store.fetch_account_by_email(&email).await? else {
            debug!(%email, "Login for unknown email");
            self.spend_verification_cost(password).await?;
            return Err(AuthError::InvalidCredentials.into());
        };

        if !self
            .verify_password(password, account.password_hash)
            .await?
        {
            debug!(%email, "Login with wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        info!(user_id = %account.user.id, %email, "User logged in");
        self.open_session(&account.user)
    }

    pub fn issue_token(&self, user: &User) -> Result<SessionToken> {
        Ok(self.signer.issue(&Identity::from(user))?)
    }

    fn open_session(&self, user: &User) -> Result<Session> {
        Ok(Session {
            token: self.issue_token(user)?,
            user: Identity::from(user),
        })
    }

    // Argon2 is CPU bound, so it runs on the blocking pool.
    async fn hash_password(&self, password: Password) -> Result<HashedPassword> {
        let hasher = self.hasher.clone();
        Ok(task::spawn_blocking(move || hasher.hash(&password)).await??)
    }

    /// Hashing costs the same as verifying, so logins for emails without an
    /// account take as long as logins with a wrong password.
    async fn spend_verification_cost(&self, password: Password) -> Result<()> {
        self.hash_password(password).await.map(drop)
    }

    async fn verify_password(&self, password: Password, hash: HashedPassword) -> Result<bool> {
        let hasher = self.hasher.clone();
        Ok(task::spawn_blocking(move || hasher.verify(&password, &hash)).await??)
    }
}
