use crate::model::{Id, IdKind, user::Email};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::warn;

pub const POST_CONTENT_MAX_LEN: usize = 500;
pub const RECENT_POSTS_LIMIT: usize = 50;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;
impl IdKind for PostMarker {
    const KIND: &'static str = "post";
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author: Email,
    pub content: PostContent,
    #[serde(flatten)]
    pub likes: Likes,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewPost {
    pub author: Email,
    pub content: PostContent,
}

/// Request body for creating a post.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct CreatePost {
    #[serde(default)]
    pub content: String,
}

impl CreatePost {
    pub fn validate(self, author: Email) -> Result<NewPost, InvalidPostContentError> {
        Ok(NewPost {
            author,
            content: PostContent::new(&self.content)?,
        })
    }
}

/// Trimmed post text of 1 to [`POST_CONTENT_MAX_LEN`] characters.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct PostContent(String);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum InvalidPostContentError {
    #[error("Post content cannot be empty")]
    Empty,
    #[error("Post content cannot exceed {POST_CONTENT_MAX_LEN} characters")]
    TooLong,
}

impl PostContent {
    pub fn new(raw: &str) -> Result<Self, InvalidPostContentError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidPostContentError::Empty);
        }
        if trimmed.chars().count() > POST_CONTENT_MAX_LEN {
            return Err(InvalidPostContentError::TooLong);
        }

        Ok(Self(trimmed.to_owned()))
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

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Liked,
    Unliked,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Like count was negative: {0}")]
pub struct InvalidLikeCountError(pub i32);

/// The set of users who liked a post and its denormalized size.
///
/// Both halves only change together through [`Likes::toggle`], so
/// `like_count == liked_by.len()` holds for every value built with
/// [`Likes::default`].
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Likes {
    liked_by: BTreeSet<Email>,
    like_count: u32,
}

impl Likes {
    /// Rebuilds the state of a stored post as it was persisted.
    #[must_use]
    pub fn from_stored(liked_by: BTreeSet<Email>, like_count: u32) -> Self {
        Self {
            liked_by,
            like_count,
        }
    }

    #[must_use]
    pub fn liked_by(&self) -> &BTreeSet<Email> {
        &self.liked_by
    }

    #[must_use]
    pub fn like_count(&self) -> u32 {
        self.like_count
    }

    #[must_use]
    pub fn contains(&self, email: &Email) -> bool {
        self.liked_by.contains(email)
    }

    /// Flips `email`'s membership, adjusting the counter in the same step.
    pub fn toggle(&mut self, email: &Email) -> LikeAction {
        if self.liked_by.remove(email) {
            if self.like_count == 0 {
                warn!(%email, "Like count already zero while unliking, clamping");
            }
            self.like_count = self.like_count.saturating_sub(1);
            LikeAction::Unliked
        } else {
            self.liked_by.insert(email.clone());
            self.like_count = self.like_count.saturating_add(1);
            LikeAction::Liked
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct LikeToggle {
    pub post: Post,
    pub action: LikeAction,
}
