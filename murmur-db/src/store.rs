use async_trait::async_trait;
use murmur_common::{
    model::{
        Id, MurmurSnowflakeGenerator, ValidationError,
        post::{LikeToggle, NewPost, Post, PostMarker},
        user::{Email, NewUser, User, UserAccount},
    },
    snowflake::{ProcessId, SnowflakeTimestampError, WorkerId},
};
use parking_lot::Mutex;
use thiserror::Error;
use time::OffsetDateTime;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ValidationError),
    #[error("A record with the same unique key already exists")]
    UniqueViolation,
    #[error("Could not generate an id: {0}")]
    Snowflake(#[from] SnowflakeTimestampError),
    #[error("Migrating the database failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// The durable record of users and posts.
///
/// Every mutating method is a single atomic operation on one record; callers
/// never need to read before they write.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Round trip to the backing store, used by the health check.
    async fn ping(&self) -> Result<()>;

    /// Fails with [`DbError::UniqueViolation`] if the email is taken.
    async fn create_user(&self, user: &NewUser) -> Result<User>;

    async fn fetch_account_by_email(&self, email: &Email) -> Result<Option<UserAccount>>;

    async fn create_post(&self, post: &NewPost) -> Result<Post>;

    /// Newest first, at most `limit` posts.
    async fn fetch_recent_posts(&self, limit: usize) -> Result<Vec<Post>>;

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    /// Deletes the post only if `author` wrote it. Returns whether a post
    /// was deleted.
    async fn delete_post(&self, post_id: Id<PostMarker>, author: &Email) -> Result<bool>;

    /// Flips `liker`'s like on the post and adjusts its counter in the same
    /// write. `None` if there is no such post.
    async fn toggle_like(&self, post_id: Id<PostMarker>, liker: &Email)
    -> Result<Option<LikeToggle>>;
}

/// Snowflake source shared by all writers of one store handle.
#[derive(Debug)]
pub struct IdGenerator(Mutex<MurmurSnowflakeGenerator>);

impl IdGenerator {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self(Mutex::new(MurmurSnowflakeGenerator::new(
            worker_id, process_id,
        )))
    }

    pub fn generate_at<Marker>(&self, time: OffsetDateTime) -> Result<Id<Marker>> {
        let snowflake = self.0.lock().generate_at(time)?;
        Ok(snowflake.into())
    }
}

#[cfg(test)]
mod tests {
    use crate::store::IdGenerator;
    use murmur_common::{
        model::{Id, post::PostMarker},
        snowflake::{ProcessId, WorkerId},
    };
    use std::collections::HashSet;
    use time::macros::datetime;

    #[test]
    fn ids_stay_unique_past_one_millisecond_of_increments() {
        let ids = IdGenerator::new(WorkerId::default(), ProcessId::default());
        let time = datetime!(2025-06-01 12:00 UTC);

        let generated: HashSet<Id<PostMarker>> = (0..10_000)
            .map(|_| ids.generate_at(time).unwrap())
            .collect();

        assert_eq!(generated.len(), 10_000);
    }
}
