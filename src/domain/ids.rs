use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Identifiers issued by the chat platform (Discord snowflakes).
///
/// Snowflakes fit in 63 bits, so they are stored as `BIGINT` without loss.
macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn as_i64(&self) -> i64 {
                self.0 as i64
            }

            pub fn from_i64(raw: i64) -> Self {
                Self(raw as u64)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
                raw.trim().parse::<u64>().map(Self)
            }
        }
    };
}

snowflake!(
    /// A guild / workspace owning one jam lifecycle at a time
    CommunityId
);
snowflake!(UserId);
snowflake!(RoleId);
snowflake!(
    /// Text, voice or category channel
    ChannelId
);

/// Database-assigned identifiers
macro_rules! serial {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

serial!(JamId);
serial!(TeamId);

/// Invites are addressed from outside the process (the acceptance control), so they get
/// an unguessable identifier instead of a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteId(pub Uuid);

impl InviteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InviteId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InviteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InviteId {
    type Err = uuid::Error;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(raw.trim()).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflakes_survive_bigint_storage() {
        let user = UserId(1_046_583_812_034_117_653);
        assert_eq!(UserId::from_i64(user.as_i64()), user);
        assert_eq!("  1046583812034117653 ".parse::<UserId>().unwrap(), user);
    }

    #[test]
    fn invite_id_parses_its_own_display() {
        let id = InviteId::new();
        assert_eq!(id.to_string().parse::<InviteId>().unwrap(), id);
        assert!("not-a-uuid".parse::<InviteId>().is_err());
    }
}
