//! The feed's business rules, independent of HTTP.
//!
//! Each service is constructed with the store handle it works on; none of
//! them keep state of their own between calls.

pub mod accounts;
pub mod guard;
pub mod likes;
pub mod posts;

use murmur_common::model::{
    Id, ValidationError,
    auth::TokenIssueError,
    post::PostMarker,
    user::PasswordHashError,
};
use murmur_db::store::DbError;
use thiserror::Error;
use tokio::task::JoinError;

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum AuthError {
    /// Unknown email and wrong password both end up here.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("No token, authorization denied")]
    MissingCredential,
    /// Malformed, expired and forged tokens all end up here.
    #[error("Token is not valid")]
    InvalidCredential,
}

/// Failures of the infrastructure rather than of the request. Their details
/// are logged, never shown to the caller.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error(transparent)]
    TokenIssue(#[from] TokenIssueError),
    #[error("Blocking task failed: {0}")]
    Join(#[from] JoinError),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Not authorized to delete this post")]
    Forbidden(Id<PostMarker>),
    #[error("Post not found")]
    PostNotFound(Id<PostMarker>),
    #[error("User already exists with this email")]
    Conflict,
    #[error(transparent)]
    Internal(#[from] InternalError),
}

macro_rules! internal_error_from {
    ($($source:ty),+ $(,)?) => {
        $(
            impl From<$source> for ServiceError {
                fn from(value: $source) -> Self {
                    Self::Internal(value.into())
                }
            }
        )+
    };
}

internal_error_from!(DbError, PasswordHashError, TokenIssueError, JoinError);

#[cfg(test)]
pub(crate) mod test_support {
    use crate::service::{
        accounts::AccountService, guard::SessionGuard, likes::LikeService, posts::PostService,
    };
    use argon2::Params;
    use murmur_common::model::{auth::TokenSigner, user::PasswordHasher};
    use murmur_db::{memory::MemoryStore, store::FeedStore};
    use std::sync::Arc;

    pub(crate) const TEST_SECRET: &[u8] = b"murmur test secret";

    pub(crate) struct Services {
        pub accounts: AccountService,
        pub posts: PostService,
        pub likes: LikeService,
        pub guard: SessionGuard,
    }

    pub(crate) fn cheap_hasher() -> PasswordHasher {
        PasswordHasher::new(Params::new(256, 1, 1, None).unwrap())
    }

    pub(crate) fn services() -> Services {
        services_with(cheap_hasher())
    }

    pub(crate) fn services_with(hasher: PasswordHasher) -> Services {
        let store: Arc<dyn FeedStore> = Arc::new(MemoryStore::default());
        let signer = Arc::new(TokenSigner::new(TEST_SECRET).unwrap());

        Services {
            accounts: AccountService::new(Arc::clone(&store), Arc::clone(&signer), hasher),
            posts: PostService::new(Arc::clone(&store)),
            likes: LikeService::new(store),
            guard: SessionGuard::new(signer),
        }
    }
}
