//! The full-text search index. Every post is indexed over three weighted
//! fields: the title weighs the most, then the summary, then the Markdown
//! body. The store updates the index explicitly whenever it saves a post, so
//! there is no hidden global registration of indexing hooks.
//!
//! Queries are a list of whitespace-separated terms:
//!
//! * terms are AND-ed together: `rust async` matches posts containing both;
//! * the word `or` between terms OR-s them instead: `rust or go`;
//! * a leading `-` excludes a term: `rust -async`;
//! * every term matches as a prefix: `asy` matches `async`.
//!
//! As in most query languages, AND binds tighter than OR, so `a b or c`
//! means `(a AND b) OR c`.

use crate::post::{Post, PostId};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// The indexed fields of a post.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Title,
    Summary,
    Body,
}

impl Field {
    const ALL: [Field; 3] = [Field::Title, Field::Summary, Field::Body];

    /// The weight of a single occurrence of a term in this field.
    pub fn weight(self) -> f32 {
        match self {
            Field::Title => 1.0,
            Field::Summary => 0.4,
            Field::Body => 0.2,
        }
    }

    fn slot(self) -> usize {
        match self {
            Field::Title => 0,
            Field::Summary => 1,
            Field::Body => 2,
        }
    }

    fn text(self, post: &Post) -> &str {
        match self {
            Field::Title => &post.title,
            Field::Summary => &post.summary,
            Field::Body => &post.markdown_body,
        }
    }
}

/// Occurrence counts of a term in each [`Field`] of one post.
type Counts = [u32; 3];

/// Splits text into lowercase words. Anything that isn't a letter or digit
/// separates words.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

/// A parsed search query. See the module documentation for the syntax.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    /// The OR-ed groups of the query.
    groups: Vec<Group>,
}

/// An AND-ed group of terms.
#[derive(Clone, Debug, Default, PartialEq)]
struct Group {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl Query {
    pub fn parse(input: &str) -> Query {
        let mut groups = Vec::new();
        let mut group = Group::default();
        for raw in input.split_whitespace() {
            if raw.eq_ignore_ascii_case("or") {
                groups.push(std::mem::take(&mut group));
                continue;
            }
            match raw.strip_prefix('-') {
                Some(negated) => group.exclude.extend(tokenize(negated)),
                None => group.include.extend(tokenize(raw)),
            }
        }
        groups.push(group);

        // A group without positive terms would match every post that lacks
        // the excluded terms; such groups are dropped instead.
        groups.retain(|g| !g.include.is_empty());
        Query { groups }
    }

    /// Whether the query can match anything at all.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// An inverted index from words to the posts containing them.
#[derive(Debug, Default)]
pub struct SearchIndex {
    /// word -> post -> occurrences per field
    words: BTreeMap<String, HashMap<PostId, Counts>>,

    /// post -> the words indexed for it, so a post can be re-indexed
    documents: HashMap<PostId, Vec<String>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index over `posts`.
    pub fn build<'a>(posts: impl IntoIterator<Item = &'a Post>) -> Self {
        let mut index = Self::new();
        for post in posts {
            index.update(post);
        }
        index
    }

    /// Indexes `post`, replacing whatever was indexed for it before.
    pub fn update(&mut self, post: &Post) {
        self.remove(post.id);

        let mut counts: HashMap<String, Counts> = HashMap::new();
        for field in Field::ALL.iter().copied() {
            for word in tokenize(field.text(post)) {
                counts.entry(word).or_default()[field.slot()] += 1;
            }
        }

        let mut words = Vec::with_capacity(counts.len());
        for (word, counts) in counts {
            self.words
                .entry(word.clone())
                .or_default()
                .insert(post.id, counts);
            words.push(word);
        }
        self.documents.insert(post.id, words);
    }

    /// Removes `id` from the index. Removing an unknown post is a no-op.
    pub fn remove(&mut self, id: PostId) {
        if let Some(words) = self.documents.remove(&id) {
            for word in words {
                if let Some(postings) = self.words.get_mut(&word) {
                    postings.remove(&id);
                    if postings.is_empty() {
                        self.words.remove(&word);
                    }
                }
            }
        }
    }

    /// The number of indexed posts.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Runs `query` against the index, returning every matching post with
    /// its rank. The result is in no particular order.
    pub fn search(&self, query: &Query) -> HashMap<PostId, f32> {
        let mut ranks: HashMap<PostId, f32> = HashMap::new();
        for group in &query.groups {
            let mut matched: Option<HashMap<PostId, f32>> = None;
            for term in &group.include {
                let scores = self.prefix_scores(term);
                matched = Some(match matched {
                    None => scores,
                    Some(mut so_far) => {
                        so_far.retain(|id, _| scores.contains_key(id));
                        for (id, score) in so_far.iter_mut() {
                            *score += scores[id];
                        }
                        so_far
                    }
                });
            }

            let mut matched = matched.unwrap_or_default();
            for term in &group.exclude {
                for id in self.prefix_scores(term).keys() {
                    matched.remove(id);
                }
            }

            for (id, score) in matched {
                *ranks.entry(id).or_insert(0.0) += score;
            }
        }
        ranks
    }

    /// Scores every post containing a word that starts with `prefix`.
    fn prefix_scores(&self, prefix: &str) -> HashMap<PostId, f32> {
        let mut scores: HashMap<PostId, f32> = HashMap::new();
        let words = self
            .words
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(word, _)| word.starts_with(prefix));
        for (_, postings) in words {
            for (id, counts) in postings {
                let score: f32 = Field::ALL
                    .iter()
                    .map(|field| field.weight() * counts[field.slot()] as f32)
                    .sum();
                *scores.entry(*id).or_insert(0.0) += score;
            }
        }
        scores
    }
}
