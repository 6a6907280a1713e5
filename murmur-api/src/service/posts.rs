use crate::service::{Result, ServiceError};
use murmur_common::model::{
    Id, ValidationError,
    auth::Identity,
    post::{CreatePost, Post, PostMarker},
};
use murmur_db::store::FeedStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Creating, listing and deleting posts.
pub struct PostService {
    store: Arc<dyn FeedStore>,
}

/// Parses a post id as it appears in a request path.
pub(crate) fn parse_post_id(raw: &str) -> Result<Id<PostMarker>> {
    Ok(raw.parse::<Id<PostMarker>>().map_err(ValidationError::from)?)
}

impl PostService {
    #[must_use]
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, identity: &Identity, request: CreatePost) -> Result<Post> {
        let new_post = request
            .validate(identity.email.clone())
            .map_err(ValidationError::from)?;
        let post = self.store.create_post(&new_post).await?;

        info!(post_id = %post.id, author = %post.author, "New post created");
        Ok(post)
    }

    /// A snapshot of the newest `limit` posts, newest first.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<Post>> {
        Ok(self.store.fetch_recent_posts(limit).await?)
    }

    pub async fn delete_by_id(&self, identity: &Identity, post_id: &str) -> Result<()> {
        let post_id = parse_post_id(post_id)?;
        let post = self
            .store
            .fetch_post(post_id)
            .await?
            .ok_or(ServiceError::PostNotFound(post_id))?;

        if post.author != identity.email {
            warn!(%post_id, author = %post.author, requester = %identity.email, "Refused to delete foreign post");
            return Err(ServiceError::Forbidden(post_id));
        }

        // Authors never change, so a miss here means someone else deleted it first.
        if !self.store.delete_post(post_id, &identity.email).await? {
            return Err(ServiceError::PostNotFound(post_id));
        }

        info!(%post_id, author = %identity.email, "Post deleted");
        Ok(())
    }
}
