//! Support for creating Atom feeds from a list of posts.

use crate::config::Config;
use crate::post::Post;
use crate::user::{User, UserId};
use atom_syndication::{
    Content, Entry, Error as AtomError, Feed, FixedDateTime, Link, Person, Text,
};
use chrono::Utc;
use std::collections::HashMap;
use std::io::Write;
use thiserror::Error;

/// Creates a feed titled after the site from a list of [`Post`]s, newest
/// first, and writes the result to a [`std::io::Write`]. `users` supplies
/// the author names; posts whose author isn't among them have no author.
pub fn write_feed<W: Write>(
    config: &Config,
    posts: &[Post],
    users: &[User],
    w: W,
) -> Result<()> {
    feed(config, posts, users).write_to(w)?;
    Ok(())
}

fn feed(config: &Config, posts: &[Post], users: &[User]) -> Feed {
    let authors: HashMap<UserId, &User> =
        users.iter().map(|u| (u.id, u)).collect();
    let updated: FixedDateTime = posts
        .iter()
        .map(|p| p.date_edited)
        .max()
        .unwrap_or_else(Utc::now)
        .into();

    let mut feed = Feed::default();
    feed.set_title(config.title.as_str());
    feed.set_id(config.site_root.as_str());
    feed.set_updated(updated);
    feed.set_links(vec![alternate(config.site_root.as_str())]);
    feed.set_entries(
        posts
            .iter()
            .map(|post| entry(config, post, authors.get(&post.author).copied()))
            .collect::<Vec<Entry>>(),
    );
    feed
}

fn entry(config: &Config, post: &Post, author: Option<&User>) -> Entry {
    let url = config.post_url(&post.slug);

    let mut content = Content::default();
    content.set_content_type("html".to_owned());
    content.set_value(post.html_body.as_str().to_owned());

    let mut entry = Entry::default();
    entry.set_id(url.as_str());
    entry.set_title(post.title.as_str());
    entry.set_published(FixedDateTime::from(post.date_published));
    entry.set_updated(FixedDateTime::from(post.date_edited));
    entry.set_links(vec![alternate(url.as_str())]);
    entry.set_summary(Text::plain(post.summary.as_str()));
    entry.set_content(content);
    if let Some(author) = author {
        let mut person = Person::default();
        person.set_name(author.display_name());
        entry.set_authors(vec![person]);
    }
    entry
}

fn alternate(href: &str) -> Link {
    let mut link = Link::default();
    link.set_href(href);
    link.set_rel("alternate");
    link
}

/// The result of writing a feed.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem writing a feed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("writing feed: {0}")]
    Atom(#[from] AtomError),
}
