//! Defines the [`Tag`] type, which represents a [`crate::post::Post`] tag, and
//! [`normalize`], which turns the free-text tag field of a post into tags.

use crate::store::{Result, Store};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifies a [`Tag`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
pub struct TagId(pub u64);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Represents a [`crate::post::Post`] tag. Tags are created lazily, the first
/// time a post mentions them, and are never deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,

    /// The tag's title. Titles are globally unique and never contain
    /// whitespace.
    pub title: String,
}

impl Hash for Tag {
    /// Implements [`Hash`] for [`Tag`] by delegating directly to the `title`
    /// field.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.title.hash(state)
    }
}

impl PartialEq for Tag {
    /// Implements [`PartialEq`] and [`Eq`] for [`Tag`] by delegating directly
    /// to the `title` field.
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
    }
}
impl Eq for Tag {}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.title)
    }
}

/// The result of [`normalize`]: the deduplicated set of tags named by the
/// input, some of which may be provisional.
#[derive(Debug, Default)]
pub struct NormalizedTags {
    tags: HashSet<Tag>,
    staged: Vec<Tag>,
}

impl NormalizedTags {
    /// Every tag named by the input, existing or provisional.
    pub fn tags(&self) -> &HashSet<Tag> {
        &self.tags
    }

    /// The tags that don't exist in the store yet. These must be handed to
    /// [`Store::save_atomically`] together with the post that names them.
    pub fn staged(&self) -> &[Tag] {
        &self.staged
    }

    pub fn into_parts(self) -> (HashSet<Tag>, Vec<Tag>) {
        (self.tags, self.staged)
    }
}

/// Parses the free-text tag field of a post. The text is split on whitespace;
/// each distinct token resolves to the existing tag with that exact title, or
/// to a new provisional tag allocated by [`Store::create_tag`]. Provisional
/// tags only become durable when the caller saves them with the post.
///
/// Empty input yields an empty set.
pub fn normalize<S: Store + ?Sized>(
    store: &S,
    raw: &str,
) -> Result<NormalizedTags> {
    let mut normalized = NormalizedTags::default();
    for token in raw.split_whitespace() {
        if normalized.tags.iter().any(|t| t.title == token) {
            continue;
        }
        let tag = match store.find_tag_by_title(token)? {
            Some(tag) => tag,
            None => {
                let tag = store.create_tag(token);
                normalized.staged.push(tag.clone());
                tag
            }
        };
        normalized.tags.insert(tag);
    }
    Ok(normalized)
}

/// Serializes a set of tags back into tag-field text, sorted by title so the
/// output is deterministic.
pub fn display<'a, I>(tags: I) -> String
where
    I: IntoIterator<Item = &'a Tag>,
{
    let mut titles: Vec<&str> =
        tags.into_iter().map(|t| t.title.as_str()).collect();
    titles.sort_unstable();
    titles.join(" ")
}
