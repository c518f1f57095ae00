//! Defines the [`Post`] type. Posts are only ever built or changed by the
//! publishing pipeline ([`crate::publish`]), which keeps the derived fields
//! (`slug`, `html_body`) in step with the source fields.

use crate::markdown::Html;
use crate::tag::{self, Tag, TagId};
use crate::user::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Identifies a [`Post`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
pub struct PostId(pub u64);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A published article.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,

    /// Never empty, and unique across posts.
    pub title: String,

    /// Derived from `title` on every save. See [`crate::slug::slugify`].
    pub slug: String,

    /// Either supplied by the author or taken from the first paragraph of
    /// the body.
    pub summary: String,

    /// The Markdown source, as written by the author.
    pub markdown_body: String,

    /// Rendered from `markdown_body` on every save; never edited directly.
    pub html_body: Html,

    pub date_published: DateTime<Utc>,

    /// Equal to `date_published` when the post is created, advanced on every
    /// subsequent save.
    pub date_edited: DateTime<Utc>,

    pub author: UserId,

    #[serde(default)]
    pub tags: HashSet<Tag>,
}

impl Post {
    /// Whether the post carries the tag with the given ID.
    pub fn has_tag(&self, id: TagId) -> bool {
        self.tags.iter().any(|t| t.id == id)
    }

    /// The post's tags as tag-field text, sorted by title.
    pub fn tag_line(&self) -> String {
        tag::display(&self.tags)
    }

    /// Whether the post has been edited since it was published.
    pub fn is_edited(&self) -> bool {
        self.date_edited > self.date_published
    }
}

/// Orders posts newest first, falling back to the highest ID so the order is
/// total.
pub fn newest_first(a: &Post, b: &Post) -> std::cmp::Ordering {
    b.date_published
        .cmp(&a.date_published)
        .then_with(|| b.id.cmp(&a.id))
}

#[cfg(test)]
pub(crate) fn test_post(id: u64, title: &str, author: UserId) -> Post {
    let now = Utc::now();
    Post {
        id: PostId(id),
        title: title.to_owned(),
        slug: crate::slug::slugify(title),
        summary: String::new(),
        markdown_body: String::new(),
        html_body: Html::default(),
        date_published: now,
        date_edited: now,
        author,
        tags: HashSet::new(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_tag_line_is_sorted() {
        let mut post = test_post(1, "Intro", UserId(1));
        for (id, title) in [(1, "web"), (2, "async"), (3, "rust")] {
            post.tags.insert(Tag {
                id: TagId(id),
                title: title.to_owned(),
            });
        }
        assert_eq!("async rust web", post.tag_line());
        assert!(post.has_tag(TagId(2)));
        assert!(!post.has_tag(TagId(4)));
    }

    #[test]
    fn test_newest_first() {
        let older = test_post(1, "Older", UserId(1));
        let mut newer = test_post(2, "Newer", UserId(1));
        newer.date_published = older.date_published + Duration::seconds(1);
        let mut posts = vec![older, newer];
        posts.sort_by(newest_first);
        assert_eq!(PostId(2), posts[0].id);
    }
}
