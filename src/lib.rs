//! The library code for the `quire` blogging engine. The architecture can be
//! broken down into two request paths that meet at the store:
//!
//! 1. Publishing posts ([`crate::publish`])
//! 2. Finding posts again ([`crate::search`] and [`crate::browse`])
//!
//! Of the two, the first is the more involved. A publish request is itself
//! composed of a handful of steps:
//!
//! 1. Normalizing the free-text tag field into tags ([`crate::tag`])
//! 2. Rendering the Markdown body to HTML and deriving a summary
//!    ([`crate::markdown`])
//! 3. Deriving the slug from the title ([`crate::slug`])
//! 4. Persisting the post together with any tags it introduced in a single
//!    atomic step ([`crate::store`])
//!
//! The store indexes every saved post for full-text search
//! ([`crate::index`]) as part of that same save, so a search issued after a
//! publish always sees it. Searches combine the ranked text match with a tag
//! filter and hand the ordered result to [`crate::page`] for pagination.
//!
//! Around that core sit the account flow ([`crate::accounts`]), where new
//! authors register and wait for an admin to verify them, and a few outputs
//! such as the Atom feed ([`crate::feed`]).

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod accounts;
pub mod browse;
pub mod config;
pub mod feed;
pub mod highlight;
pub mod htmlrenderer;
pub mod import;
pub mod index;
pub mod logging;
pub mod markdown;
pub mod notify;
pub mod page;
pub mod post;
pub mod publish;
pub mod search;
pub mod slug;
pub mod store;
pub mod tag;
pub mod user;
