//! Defines the [`User`] type, the author and visitor identity, along with its
//! privilege [`UserLevel`].

use crate::post::Post;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifies a [`User`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The privilege level of a [`User`]. Levels are totally ordered:
/// `Normal < Moderator < Admin`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserLevel {
    Normal,
    Moderator,
    Admin,
}

impl UserLevel {
    /// The position of the level in the privilege order.
    fn rank(self) -> u8 {
        match self {
            UserLevel::Normal => 0,
            UserLevel::Moderator => 1,
            UserLevel::Admin => 2,
        }
    }
}

impl Default for UserLevel {
    fn default() -> Self {
        UserLevel::Normal
    }
}

impl Ord for UserLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for UserLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for UserLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            UserLevel::Normal => "normal",
            UserLevel::Moderator => "moderator",
            UserLevel::Admin => "admin",
        })
    }
}

/// A registered account. Accounts start out unverified and may not sign in
/// or publish until an admin verifies them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    /// Unique, at most 64 characters.
    pub username: String,

    /// Unique.
    pub email: String,

    /// The password hash as a PHC string.
    pub password_hash: String,

    /// The display name, if the user set one.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub about_me: Option<String>,

    #[serde(default)]
    pub level: UserLevel,

    #[serde(default)]
    pub is_verified: bool,
}

/// The fields of a [`User`] that exist before the store assigns an ID.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub level: UserLevel,
    pub is_verified: bool,
}

impl NewUser {
    pub fn with_id(self, id: UserId) -> User {
        User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            name: None,
            about_me: None,
            level: self.level,
            is_verified: self.is_verified,
        }
    }
}

impl User {
    /// Whether this user may edit `post`. Only the post's author and admins
    /// may; moderators have no extra post privileges.
    pub fn can_edit(&self, post: &Post) -> bool {
        post.author == self.id || self.level == UserLevel::Admin
    }

    /// The name to show for the user: the display name when set, otherwise
    /// the username.
    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(name) if !name.is_empty() => name,
            _ => &self.username,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_user(id: u64, username: &str, level: UserLevel) -> User {
    User {
        id: UserId(id),
        username: username.to_owned(),
        email: format!("{}@example.org", username),
        password_hash: String::new(),
        name: None,
        about_me: None,
        level,
        is_verified: true,
    }
}
