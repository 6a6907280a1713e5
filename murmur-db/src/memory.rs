use crate::store::{DbError, FeedStore, IdGenerator, Result};
use async_trait::async_trait;
use murmur_common::{
    model::{
        Id,
        post::{LikeToggle, Likes, NewPost, Post, PostMarker},
        user::{Email, NewUser, User, UserAccount},
    },
    snowflake::{ProcessId, WorkerId},
};
use parking_lot::Mutex;
use std::{cmp::Reverse, collections::HashMap};
use time::OffsetDateTime;

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<Email, UserAccount>,
    posts: HashMap<Id<PostMarker>, Post>,
}

/// Process-local [`FeedStore`]. Each operation holds the lock for its whole
/// read-modify-write, which gives the same per-record atomicity as the
/// database.
#[derive(Debug)]
pub struct MemoryStore {
    ids: IdGenerator,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            ids: IdGenerator::new(worker_id, process_id),
            state: Mutex::default(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(WorkerId::default(), ProcessId::default())
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let mut state = self.state.lock();
        if state.accounts.contains_key(&user.email) {
            return Err(DbError::UniqueViolation);
        }

        let created_at = OffsetDateTime::now_utc();
        let created = User {
            id: self.ids.generate_at(created_at)?,
            email: user.email.clone(),
            created_at,
        };
        state.accounts.insert(
            user.email.clone(),
            UserAccount {
                user: created.clone(),
                password_hash: user.password_hash.clone(),
            },
        );

        Ok(created)
    }

    async fn fetch_account_by_email(&self, email: &Email) -> Result<Option<UserAccount>> {
        Ok(self.state.lock().accounts.get(email).cloned())
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let created_at = OffsetDateTime::now_utc();
        let created = Post {
            id: self.ids.generate_at(created_at)?,
            author: post.author.clone(),
            content: post.content.clone(),
            likes: Likes::default(),
            created_at,
        };
        self.state.lock().posts.insert(created.id, created.clone());

        Ok(created)
    }

    async fn fetch_recent_posts(&self, limit: usize) -> Result<Vec<Post>> {
        let state = self.state.lock();
        let mut posts: Vec<Post> = state.posts.values().cloned().collect();
        posts.sort_unstable_by_key(|post| Reverse((post.created_at, post.id)));
        posts.truncate(limit);

        Ok(posts)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        Ok(self.state.lock().posts.get(&post_id).cloned())
    }

    async fn delete_post(&self, post_id: Id<PostMarker>, author: &Email) -> Result<bool> {
        let mut state = self.state.lock();
        let owned = state
            .posts
            .get(&post_id)
            .is_some_and(|post| &post.author == author);
        if owned {
            state.posts.remove(&post_id);
        }

        Ok(owned)
    }

    async fn toggle_like(
        &self,
        post_id: Id<PostMarker>,
        liker: &Email,
    ) -> Result<Option<LikeToggle>> {
        let mut state = self.state.lock();
        let Some(post) = state.posts.get_mut(&post_id) else {
            return Ok(None);
        };

        let action = post.likes.toggle(liker);
        Ok(Some(LikeToggle {
            post: post.clone(),
            action,
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        memory::MemoryStore,
        store::{DbError, FeedStore},
    };
    use murmur_common::model::{
        Id,
        post::{LikeAction, NewPost, PostContent},
        user::{Email, HashedPassword, NewUser},
    };
    use std::sync::Arc;

    fn email(raw: &str) -> Email {
        Email::parse(raw).unwrap()
    }

    fn new_post(author: &str, content: &str) -> NewPost {
        NewPost {
            author: email(author),
            content: PostContent::new(content).unwrap(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let store = MemoryStore::default();
        let user = NewUser {
            email: email("alice@example.com"),
            password_hash: HashedPassword::from_phc("$argon2id$stub".to_owned()),
        };

        let created = store.create_user(&user).await.unwrap();
        assert_eq!(created.email, user.email);
        assert!(matches!(
            store.create_user(&user).await,
            Err(DbError::UniqueViolation)
        ));

        let account = store
            .fetch_account_by_email(&user.email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.user, created);
        assert_eq!(account.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn recent_posts_are_newest_first_and_bounded() {
        let store = MemoryStore::default();
        let mut created = Vec::new();
        for n in 0..5 {
            let post = store
                .create_post(&new_post("alice@example.com", &format!("post {n}")))
                .await
                .unwrap();
            created.push(post.id);
        }

        let recent = store.fetch_recent_posts(3).await.unwrap();
        let recent_ids: Vec<_> = recent.iter().map(|post| post.id).collect();
        let expected: Vec<_> = created.iter().rev().take(3).copied().collect();
        assert_eq!(recent_ids, expected);
    }

    #[tokio::test]
    async fn delete_requires_matching_author() {
        let store = MemoryStore::default();
        let post = store
            .create_post(&new_post("alice@example.com", "hello"))
            .await
            .unwrap();

        assert!(!store.delete_post(post.id, &email("bob@example.com")).await.unwrap());
        assert!(store.fetch_post(post.id).await.unwrap().is_some());

        assert!(store.delete_post(post.id, &email("alice@example.com")).await.unwrap());
        assert!(store.fetch_post(post.id).await.unwrap().is_none());
        assert!(!store.delete_post(post.id, &email("alice@example.com")).await.unwrap());
    }

    #[tokio::test]
    async fn toggle_like_on_missing_post() {
        let store = MemoryStore::default();
        let missing = Id::from(12_345);
        assert!(
            store
                .toggle_like(missing, &email("bob@example.com"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_toggles_lose_no_updates() {
        let store = Arc::new(MemoryStore::default());
        let post_id = store
            .create_post(&new_post("alice@example.com", "hello"))
            .await
            .unwrap()
            .id;

        // 16 users toggle 3 times each: everyone ends up having liked it.
        let mut handles = Vec::new();
        for n in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let liker = email(&format!("user{n}@example.com"));
                let mut actions = Vec::new();
                for _ in 0..3 {
                    let toggle = store.toggle_like(post_id, &liker).await.unwrap().unwrap();
                    assert_eq!(
                        toggle.post.likes.like_count() as usize,
                        toggle.post.likes.liked_by().len()
                    );
                    actions.push(toggle.action);
                }
                actions
            }));
        }
        for handle in handles {
            assert_eq!(
                handle.await.unwrap(),
                [LikeAction::Liked, LikeAction::Unliked, LikeAction::Liked]
            );
        }

        let post = store.fetch_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.likes.like_count(), 16);
        assert_eq!(post.likes.liked_by().len(), 16);
    }
}
