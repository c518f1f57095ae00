//! Combines full-text search with tag filtering into one paginated result.

use crate::page::Page;
use crate::post::{Post, PostId};
use crate::store::{Result, Store};
use crate::tag::TagId;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// How the requested tags combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagMode {
    /// Posts must carry every requested tag.
    All,

    /// Posts must carry at least one requested tag.
    Any,
}

impl Default for TagMode {
    fn default() -> Self {
        TagMode::All
    }
}

impl FromStr for TagMode {
    type Err = UnknownTagMode;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(TagMode::All)
        } else if s.eq_ignore_ascii_case("any") {
            Ok(TagMode::Any)
        } else {
            Err(UnknownTagMode(s.to_owned()))
        }
    }
}

/// Returned when parsing a [`TagMode`] that is neither `All` nor `Any`.
#[derive(Debug, thiserror::Error)]
#[error("unknown tag mode `{0}`, expected `All` or `Any`")]
pub struct UnknownTagMode(String);

/// The criteria of a search.
#[derive(Clone, Debug)]
pub struct SearchRequest {
    /// Full-text query; see [`crate::index`] for the syntax.
    pub query: String,

    /// Whitespace-separated tag titles.
    pub tags: String,

    pub mode: TagMode,
    pub page: usize,
    pub per_page: usize,
}

impl Default for SearchRequest {
    fn default() -> Self {
        SearchRequest {
            query: String::new(),
            tags: String::new(),
            mode: TagMode::default(),
            page: 1,
            per_page: 5,
        }
    }
}

/// The outcome of [`search`].
#[derive(Clone, Debug)]
pub enum SearchOutcome {
    /// Neither a query nor tags were given.
    NoCriteria,

    /// Nothing matched, including the case of filtering by unknown tags.
    NoResults,

    Results(Page<Post>),
}

impl SearchOutcome {
    pub fn page(&self) -> Option<&Page<Post>> {
        match self {
            SearchOutcome::Results(page) => Some(page),
            _ => None,
        }
    }
}

impl fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SearchOutcome::NoCriteria => {
                f.write_str("Enter a search query or tags.")
            }
            SearchOutcome::NoResults => f.write_str("No results."),
            SearchOutcome::Results(page) => write!(
                f,
                "Page {} of {} ({} results)",
                page.number,
                page.pages(),
                page.total
            ),
        }
    }
}

/// Searches the posts in `store`. Results are ranked by relevance when there
/// is a text query and otherwise ordered newest first.
///
/// Bad input never fails: unknown tags are dropped, and a filter that can't
/// match anything yields [`SearchOutcome::NoResults`]. Only store failures
/// are errors.
pub fn search<S: Store + ?Sized>(
    store: &S,
    request: &SearchRequest,
) -> Result<SearchOutcome> {
    let query = request.query.trim();
    let mut tokens: Vec<&str> = Vec::new();
    for token in request.tags.split_whitespace() {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    if query.is_empty() && tokens.is_empty() {
        return Ok(SearchOutcome::NoCriteria);
    }

    let mut tags: Vec<TagId> = Vec::with_capacity(tokens.len());
    for token in &tokens {
        match store.find_tag_by_title(token)? {
            Some(tag) => tags.push(tag.id),
            None => tracing::debug!(tag = token, "dropping unknown tag"),
        }
    }

    let all_unknown = request.mode == TagMode::All && !tokens.is_empty();
    if tags.is_empty() && (all_unknown || query.is_empty()) {
        tracing::debug!(
            tokens = tokens.len(),
            "no valid tags left to filter by"
        );
        return Ok(SearchOutcome::NoResults);
    }

    let base: Vec<Post> = if query.is_empty() {
        store.posts_newest_first()?
    } else {
        store
            .full_text_search(query)?
            .into_iter()
            .map(|ranked| ranked.post)
            .collect()
    };

    let filter: Option<HashSet<PostId>> =
        match (tags.is_empty(), request.mode) {
            (true, _) => None,
            (false, TagMode::Any) => Some(store.posts_with_any_tag(&tags)?),
            (false, TagMode::All) => {
                Some(store.posts_with_all_tags(&tags, tags.len())?)
            }
        };
    let matches = base.into_iter().filter(|post| {
        filter.as_ref().map_or(true, |ids| ids.contains(&post.id))
    });

    let page = Page::paginate(matches, request.page, request.per_page);
    tracing::debug!(
        query,
        tags = tags.len(),
        mode = ?request.mode,
        total = page.total,
        "searched posts"
    );
    if page.is_empty() {
        Ok(SearchOutcome::NoResults)
    } else {
        Ok(SearchOutcome::Results(page))
    }
}
