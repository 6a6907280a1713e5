use crate::service::{Result, ServiceError, posts::parse_post_id};
use murmur_common::model::{auth::Identity, post::LikeToggle};
use murmur_db::store::FeedStore;
use std::sync::Arc;
use tracing::debug;

/// Toggles likes. The flip and the counter update happen in one store
/// operation, never as a separate read and write.
pub struct LikeService {
    store: Arc<dyn FeedStore>,
}

impl LikeService {
    #[must_use]
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self { store }
    }

    pub async fn toggle_like(&self, identity: &Identity, post_id: &str) -> Result<LikeToggle> {
        let post_id = parse_post_id(post_id)?;
        let toggle = self
            .store
            .toggle_like(post_id, &identity.email)
            .await?
            .ok_or(ServiceError::PostNotFound(post_id))?;

        debug!(
            %post_id,
            liker = %identity.email,
            action = ?toggle.action,
            like_count = toggle.post.likes.like_count(),
            "Toggled like"
        );
        Ok(toggle)
    }
}
