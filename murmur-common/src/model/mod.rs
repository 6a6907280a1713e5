pub mod auth;
pub mod post;
pub mod user;

use crate::{
    model::{
        post::{InvalidLikeCountError, InvalidPostContentError},
        user::{InvalidEmailError, InvalidPasswordError, MissingCredentialsError},
    },
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
};
use derive_where::derive_where;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::{
    fmt::{Debug, Display, Formatter},
    marker::PhantomData,
    str::FromStr,
};
use thiserror::Error;
use time::{OffsetDateTime, macros::datetime};

/// Everything that can be wrong with a value before it enters the model,
/// whether it came from a request body or from a database row.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ValidationError {
    #[error(transparent)]
    MissingCredentials(#[from] MissingCredentialsError),
    #[error(transparent)]
    Email(#[from] InvalidEmailError),
    #[error(transparent)]
    Password(#[from] InvalidPasswordError),
    #[error(transparent)]
    PostContent(#[from] InvalidPostContentError),
    #[error(transparent)]
    LikeCount(#[from] InvalidLikeCountError),
    #[error(transparent)]
    Id(#[from] InvalidIdError),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct MurmurEpoch;
impl Epoch for MurmurEpoch {
    const EPOCH_TIME: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);
}

pub type MurmurSnowflake = Snowflake<MurmurEpoch>;
pub type MurmurSnowflakeGenerator = SnowflakeGenerator<MurmurEpoch>;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Invalid {kind} ID")]
pub struct InvalidIdError {
    kind: &'static str,
}

/// Names the entity an [`Id`] belongs to, for error messages.
pub trait IdKind {
    const KIND: &'static str;
}

#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Id<Marker>(MurmurSnowflake, PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: MurmurSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> MurmurSnowflake {
        self.0
    }
}

impl<Marker> Debug for Id<Marker> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.0.get()).finish()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker: IdKind> FromStr for Id<Marker> {
    type Err = InvalidIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = InvalidIdError { kind: Marker::KIND };
        // u64::from_str accepts a leading '+', ids never carry one.
        if s.is_empty() || !s.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(invalid);
        }

        s.parse::<u64>().map(Self::from).map_err(|_| invalid)
    }
}

// Ids are strings on the wire, JavaScript numbers cannot hold 64 bits.
impl<Marker> Serialize for Id<Marker> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, Marker: IdKind> Deserialize<'de> for Id<Marker> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let inner = String::deserialize(deserializer)?;
        inner
            .parse()
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&inner), &Marker::KIND))
    }
}

impl<Marker> From<MurmurSnowflake> for Id<Marker> {
    fn from(value: MurmurSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(MurmurSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}
