use crate::{
    record::{AccountRecord, PostRecord, ToggledPostRecord, UserRecord},
    store::{DbError, FeedStore, IdGenerator, Result},
};
use async_trait::async_trait;
use murmur_common::{
    model::{
        Id,
        post::{LikeToggle, NewPost, Post, PostMarker},
        user::{Email, NewUser, User, UserAccount, UserMarker},
    },
    snowflake::{ProcessId, WorkerId},
};
use sqlx::{
    PgPool,
    migrate::Migrator,
    postgres::{PgConnectOptions, PgPoolOptions},
    query, query_as, query_scalar,
};
use std::{str::FromStr, time::Duration};
use time::OffsetDateTime;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// PostgreSQL-backed [`FeedStore`].
#[derive(Debug)]
pub struct DbClient {
    pool: PgPool,
    ids: IdGenerator,
}

fn map_unique_violation(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::UniqueViolation,
        other => other.into(),
    }
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            pool,
            ids: IdGenerator::new(worker_id, process_id),
        }
    }

    /// Connects a pool whose statements and connection checkouts are both
    /// bounded by `timeout`.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        timeout: Duration,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let statement_timeout = timeout.as_millis().to_string();
        let options = PgConnectOptions::from_str(url)?
            .options([("statement_timeout", statement_timeout.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool, worker_id, process_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl FeedStore for DbClient {
    async fn ping(&self) -> Result<()> {
        query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let created_at = OffsetDateTime::now_utc();
        let user_id: Id<UserMarker> = self.ids.generate_at(created_at)?;

        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (user_snowflake, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING
                users.user_snowflake,
                users.email,
                users.created_at
            ",
        )
        .bind(user_id.snowflake().get().cast_signed())
        .bind(user.email.get())
        .bind(user.password_hash.as_phc())
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        Ok(record.try_into()?)
    }

    async fn fetch_account_by_email(&self, email: &Email) -> Result<Option<UserAccount>> {
        let record = query_as::<_, AccountRecord>(
            "
            SELECT
                users.user_snowflake,
                users.email,
                users.password_hash,
                users.created_at
            FROM
                users.users
            WHERE
                users.email = $1
            ",
        )
        .bind(email.get())
        .fetch_optional(&self.pool)
        .await?;

        let account = record.map(UserAccount::try_from).transpose()?;
        Ok(account)
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let created_at = OffsetDateTime::now_utc();
        let post_id: Id<PostMarker> = self.ids.generate_at(created_at)?;

        let record = query_as::<_, PostRecord>(
            "
            INSERT INTO posts.posts (post_snowflake, author_email, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING
                posts.post_snowflake,
                posts.author_email,
                posts.content,
                posts.liked_by,
                posts.like_count,
                posts.created_at
            ",
        )
        .bind(post_id.snowflake().get().cast_signed())
        .bind(post.author.get())
        .bind(post.content.get())
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.try_into()?)
    }

    async fn fetch_recent_posts(&self, limit: usize) -> Result<Vec<Post>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let records = query_as::<_, PostRecord>(
            "
            SELECT
                posts.post_snowflake,
                posts.author_email,
                posts.content,
                posts.liked_by,
                posts.like_count,
                posts.created_at
            FROM
                posts.posts
            ORDER BY
                posts.created_at DESC,
                posts.post_snowflake DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            SELECT
                posts.post_snowflake,
                posts.author_email,
                posts.content,
                posts.liked_by,
                posts.like_count,
                posts.created_at
            FROM
                posts.posts
            WHERE
                posts.post_snowflake = $1
            ",
        )
        .bind(post_id.snowflake().get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    async fn delete_post(&self, post_id: Id<PostMarker>, author: &Email) -> Result<bool> {
        let result = query(
            "
            DELETE FROM posts.posts
            WHERE
                posts.post_snowflake = $1
                AND posts.author_email = $2
            ",
        )
        .bind(post_id.snowflake().get().cast_signed())
        .bind(author.get())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn toggle_like(
        &self,
        post_id: Id<PostMarker>,
        liker: &Email,
    ) -> Result<Option<LikeToggle>> {
        // One statement: the row lock taken by UPDATE serializes concurrent
        // toggles, and both SET expressions read the same old row.
        let record = query_as::<_, ToggledPostRecord>(
            "
            UPDATE posts.posts
            SET
                liked_by = CASE
                    WHEN $2 = ANY(posts.liked_by) THEN array_remove(posts.liked_by, $2)
                    ELSE array_append(posts.liked_by, $2)
                END,
                like_count = CASE
                    WHEN $2 = ANY(posts.liked_by) THEN GREATEST(posts.like_count - 1, 0)
                    ELSE posts.like_count + 1
                END
            WHERE
                posts.post_snowflake = $1
            RETURNING
                posts.post_snowflake,
                posts.author_email,
                posts.content,
                posts.liked_by,
                posts.like_count,
                posts.created_at,
                $2 = ANY(posts.liked_by) AS liked
            ",
        )
        .bind(post_id.snowflake().get().cast_signed())
        .bind(liker.get())
        .fetch_optional(&self.pool)
        .await?;

        let toggle = record.map(LikeToggle::try_from).transpose()?;
        Ok(toggle)
    }
}

// These need a PostgreSQL server: `DATABASE_URL=... cargo test -- --ignored`.
#[cfg(test)]
mod tests {
    use crate::{
        client::DbClient,
        store::{DbError, FeedStore},
    };
    use murmur_common::{
        model::{
            Id,
            post::{LikeAction, NewPost, PostContent},
            user::{Email, HashedPassword, NewUser},
        },
        snowflake::{ProcessId, WorkerId},
    };
    use sqlx::PgPool;
    use std::sync::Arc;

    fn email(raw: &str) -> Email {
        Email::parse(raw).unwrap()
    }

    async fn client_with_post(pool: PgPool) -> (Arc<DbClient>, NewPost) {
        let client = DbClient::new(pool, WorkerId::default(), ProcessId::default());
        client
            .create_user(&NewUser {
                email: email("alice@example.com"),
                password_hash: HashedPassword::from_phc("$argon2id$stub".to_owned()),
            })
            .await
            .unwrap();

        let post = NewPost {
            author: email("alice@example.com"),
            content: PostContent::new("hello").unwrap(),
        };
        (Arc::new(client), post)
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a PostgreSQL server"]
    async fn duplicate_email_is_a_unique_violation(pool: PgPool) {
        let (client, _) = client_with_post(pool).await;

        let again = client
            .create_user(&NewUser {
                email: email("alice@example.com"),
                password_hash: HashedPassword::from_phc("$argon2id$other".to_owned()),
            })
            .await;

        assert!(matches!(again, Err(DbError::UniqueViolation)));
        assert!(
            client
                .fetch_account_by_email(&email("alice@example.com"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a PostgreSQL server"]
    async fn toggle_flips_membership_and_count(pool: PgPool) {
        let (client, new_post) = client_with_post(pool).await;
        let post = client.create_post(&new_post).await.unwrap();
        let bob = email("bob@example.com");

        let liked = client.toggle_like(post.id, &bob).await.unwrap().unwrap();
        assert_eq!(liked.action, LikeAction::Liked);
        assert_eq!(liked.post.likes.like_count(), 1);
        assert!(liked.post.likes.contains(&bob));

        let unliked = client.toggle_like(post.id, &bob).await.unwrap().unwrap();
        assert_eq!(unliked.action, LikeAction::Unliked);
        assert_eq!(unliked.post.likes, post.likes);

        let missing = Id::from(1);
        assert!(client.toggle_like(missing, &bob).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a PostgreSQL server"]
    async fn concurrent_toggles_lose_no_updates(pool: PgPool) {
        let (client, new_post) = client_with_post(pool).await;
        let post_id = client.create_post(&new_post).await.unwrap().id;

        let mut handles = Vec::new();
        for n in 0..8 {
            let client = Arc::clone(&client);
            handles.push(tokio::spawn(async move {
                let liker = email(&format!("user{n}@example.com"));
                for _ in 0..3 {
                    client.toggle_like(post_id, &liker).await.unwrap().unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let post = client.fetch_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.likes.like_count(), 8);
        assert_eq!(post.likes.liked_by().len(), 8);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a PostgreSQL server"]
    async fn delete_is_guarded_by_author(pool: PgPool) {
        let (client, new_post) = client_with_post(pool).await;
        let post = client.create_post(&new_post).await.unwrap();

        assert!(!client.delete_post(post.id, &email("bob@example.com")).await.unwrap());
        assert!(client.delete_post(post.id, &email("alice@example.com")).await.unwrap());
        assert!(client.fetch_post(post.id).await.unwrap().is_none());
        assert!(
            client
                .fetch_recent_posts(50)
                .await
                .unwrap()
                .iter()
                .all(|listed| listed.id != post.id)
        );
    }
}
