use murmur_common::model::{
    ValidationError,
    post::{InvalidLikeCountError, LikeAction, LikeToggle, Likes, Post, PostContent},
    user::{Email, HashedPassword, User, UserAccount},
};
use sqlx::FromRow;
use std::collections::BTreeSet;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub email: String,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct AccountRecord {
    #[sqlx(flatten)]
    pub user: UserRecord,
    pub password_hash: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub post_snowflake: i64,
    pub author_email: String,
    pub content: String,
    pub liked_by: Vec<String>,
    pub like_count: i32,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct ToggledPostRecord {
    #[sqlx(flatten)]
    pub post: PostRecord,
    pub liked: bool,
}

impl TryFrom<UserRecord> for User {
    type Error = ValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_snowflake.cast_unsigned().into(),
            email: Email::parse(&value.email)?,
            created_at: value.created_at,
        })
    }
}

impl TryFrom<AccountRecord> for UserAccount {
    type Error = ValidationError;

    fn try_from(value: AccountRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: value.user.try_into()?,
            password_hash: HashedPassword::from_phc(value.password_hash),
        })
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        let liked_by = value
            .liked_by
            .iter()
            .map(|email| Email::parse(email))
            .collect::<Result<BTreeSet<_>, _>>()?;
        let like_count = u32::try_from(value.like_count)
            .map_err(|_| InvalidLikeCountError(value.like_count))?;

        Ok(Self {
            id: value.post_snowflake.cast_unsigned().into(),
            author: Email::parse(&value.author_email)?,
            content: PostContent::new(&value.content)?,
            likes: Likes::from_stored(liked_by, like_count),
            created_at: value.created_at,
        })
    }
}

impl TryFrom<ToggledPostRecord> for LikeToggle {
    type Error = ValidationError;

    fn try_from(value: ToggledPostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            post: value.post.try_into()?,
            action: if value.liked {
                LikeAction::Liked
            } else {
                LikeAction::Unliked
            },
        })
    }
}
