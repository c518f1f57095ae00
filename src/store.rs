//! Defines the [`Store`] trait, the persistence boundary for posts, tags, and
//! users, and [`MemoryStore`], an implementation that keeps everything in
//! memory and optionally mirrors it to a YAML snapshot file.

use crate::index::{Query, SearchIndex};
use crate::post::{newest_first, Post, PostId};
use crate::tag::{Tag, TagId};
use crate::user::{NewUser, User, UserId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// A post returned from a full-text search together with its rank.
#[derive(Clone, Debug)]
pub struct Ranked {
    pub post: Post,
    pub rank: f32,
}

/// The persistence collaborator. Implementations must make
/// [`Store::save_atomically`] all-or-nothing and must enforce title
/// uniqueness there, since checks made before it are inherently racy.
pub trait Store: Send + Sync {
    /// Allocates an ID for a post that hasn't been saved yet. IDs that are
    /// never saved are simply skipped.
    fn next_post_id(&self) -> PostId;

    fn find_post(&self, id: PostId) -> Result<Option<Post>>;

    fn find_post_by_title(&self, title: &str) -> Result<Option<Post>>;

    fn find_post_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    fn find_tag_by_title(&self, title: &str) -> Result<Option<Tag>>;

    /// Creates a provisional tag. The tag isn't visible to anyone until it
    /// is passed to [`Store::save_atomically`].
    fn create_tag(&self, title: &str) -> Tag;

    /// Saves `post` and the provisional `new_tags` it introduced in one
    /// atomic step, and re-indexes the post for search. Fails with
    /// [`Error::Conflict`] if a different post already has the title.
    ///
    /// If one of `new_tags` was committed by someone else in the meantime,
    /// the post is attached to the committed tag instead. Returns the post
    /// as saved.
    fn save_atomically(&self, post: Post, new_tags: &[Tag]) -> Result<Post>;

    /// Posts matching `query` (see [`crate::index`]), best match first.
    /// Equal ranks are ordered newest first.
    fn full_text_search(&self, query: &str) -> Result<Vec<Ranked>>;

    /// IDs of the posts carrying at least one of `tags`.
    fn posts_with_any_tag(&self, tags: &[TagId]) -> Result<HashSet<PostId>>;

    /// IDs of the posts carrying exactly `count` of `tags`. With `count`
    /// equal to the number of distinct `tags`, these are the posts carrying
    /// all of them.
    fn posts_with_all_tags(
        &self,
        tags: &[TagId],
        count: usize,
    ) -> Result<HashSet<PostId>>;

    /// All posts, newest first.
    fn posts_newest_first(&self) -> Result<Vec<Post>>;

    /// The posts written by `author`, newest first.
    fn posts_by_author(&self, author: UserId) -> Result<Vec<Post>>;

    /// Saves a new user. Fails with [`Error::Conflict`] if the username or
    /// email is taken.
    fn insert_user(&self, user: NewUser) -> Result<User>;

    /// Replaces the stored user with the same ID.
    fn update_user(&self, user: User) -> Result<User>;

    fn find_user(&self, id: UserId) -> Result<Option<User>>;

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    fn users(&self) -> Result<Vec<User>>;
}

/// The data persisted by [`MemoryStore`].
#[derive(Default, Clone, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    next_post_id: u64,
    #[serde(default)]
    next_tag_id: u64,
    #[serde(default)]
    next_user_id: u64,
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    posts: Vec<Post>,
}

#[derive(Default)]
struct State {
    posts: BTreeMap<PostId, Post>,
    tags: HashMap<String, Tag>,
    users: BTreeMap<UserId, User>,
    index: SearchIndex,
}

/// A [`Store`] that keeps all data in memory behind a single lock. Stores
/// created with [`MemoryStore::open`] also write a snapshot file after every
/// change and read it back on the next open.
pub struct MemoryStore {
    state: RwLock<State>,
    next_post_id: AtomicU64,
    next_tag_id: AtomicU64,
    next_user_id: AtomicU64,
    path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store that isn't backed by a file.
    pub fn new() -> MemoryStore {
        MemoryStore {
            state: RwLock::new(State::default()),
            next_post_id: AtomicU64::new(1),
            next_tag_id: AtomicU64::new(1),
            next_user_id: AtomicU64::new(1),
            path: None,
        }
    }

    /// Opens the store backed by the snapshot at `path`. A missing file is
    /// an empty store; the file is created on the first change.
    pub fn open(path: &Path) -> Result<MemoryStore> {
        let snapshot: Snapshot = match File::open(path) {
            Ok(file) => {
                serde_yaml::from_reader(file).map_err(|err| Error::Snapshot {
                    path: path.to_owned(),
                    err,
                })?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Snapshot::default()
            }
            Err(err) => {
                return Err(Error::Io {
                    path: path.to_owned(),
                    err,
                })
            }
        };

        let mut store = MemoryStore::from_snapshot(snapshot);
        store.path = Some(path.to_owned());
        tracing::debug!(
            path = %path.display(),
            posts = store.state.read().posts.len(),
            "opened store"
        );
        Ok(store)
    }

    fn from_snapshot(snapshot: Snapshot) -> MemoryStore {
        let posts: BTreeMap<PostId, Post> =
            snapshot.posts.into_iter().map(|p| (p.id, p)).collect();
        let index = SearchIndex::build(posts.values());

        // Never hand out an ID that is already in use, even if the counters
        // in the snapshot are stale.
        let next_post_id = posts.keys().map(|id| id.0 + 1).max().unwrap_or(1);
        let next_tag_id =
            snapshot.tags.iter().map(|t| t.id.0 + 1).max().unwrap_or(1);
        let next_user_id =
            snapshot.users.iter().map(|u| u.id.0 + 1).max().unwrap_or(1);

        MemoryStore {
            state: RwLock::new(State {
                tags: snapshot
                    .tags
                    .into_iter()
                    .map(|t| (t.title.clone(), t))
                    .collect(),
                users: snapshot.users.into_iter().map(|u| (u.id, u)).collect(),
                posts,
                index,
            }),
            next_post_id: AtomicU64::new(
                next_post_id.max(snapshot.next_post_id),
            ),
            next_tag_id: AtomicU64::new(next_tag_id.max(snapshot.next_tag_id)),
            next_user_id: AtomicU64::new(
                next_user_id.max(snapshot.next_user_id),
            ),
            path: None,
        }
    }

    fn snapshot(&self, state: &State) -> Snapshot {
        let mut tags: Vec<Tag> = state.tags.values().cloned().collect();
        tags.sort_by_key(|t| t.id);
        Snapshot {
            next_post_id: self.next_post_id.load(Ordering::SeqCst),
            next_tag_id: self.next_tag_id.load(Ordering::SeqCst),
            next_user_id: self.next_user_id.load(Ordering::SeqCst),
            users: state.users.values().cloned().collect(),
            tags,
            posts: state.posts.values().cloned().collect(),
        }
    }

    /// Writes the snapshot file, if this store has one. The snapshot is
    /// written next to the target and renamed over it so readers never see
    /// a partial file.
    fn flush(&self, state: &State) -> Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };

        let tmp = path.with_extension("tmp");
        let io_err = |err| Error::Io {
            path: tmp.clone(),
            err,
        };
        let file = File::create(&tmp).map_err(io_err)?;
        serde_yaml::to_writer(&file, &self.snapshot(state)).map_err(|err| {
            Error::Snapshot {
                path: tmp.clone(),
                err,
            }
        })?;
        file.sync_all().map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(|err| Error::Io {
            path: path.to_owned(),
            err,
        })
    }
}

impl Store for MemoryStore {
    fn next_post_id(&self) -> PostId {
        PostId(self.next_post_id.fetch_add(1, Ordering::SeqCst))
    }

    fn find_post(&self, id: PostId) -> Result<Option<Post>> {
        Ok(self.state.read().posts.get(&id).cloned())
    }

    fn find_post_by_title(&self, title: &str) -> Result<Option<Post>> {
        Ok(self
            .state
            .read()
            .posts
            .values()
            .find(|p| p.title == title)
            .cloned())
    }

    fn find_post_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        Ok(self
            .state
            .read()
            .posts
            .values()
            .find(|p| p.slug == slug)
            .cloned())
    }

    fn find_tag_by_title(&self, title: &str) -> Result<Option<Tag>> {
        Ok(self.state.read().tags.get(title).cloned())
    }

    fn create_tag(&self, title: &str) -> Tag {
        Tag {
            id: TagId(self.next_tag_id.fetch_add(1, Ordering::SeqCst)),
            title: title.to_owned(),
        }
    }

    fn save_atomically(
        &self,
        mut post: Post,
        new_tags: &[Tag],
    ) -> Result<Post> {
        let mut state = self.state.write();

        if state
            .posts
            .values()
            .any(|p| p.id != post.id && p.title == post.title)
        {
            return Err(Error::Conflict {
                field: "title",
                value: post.title,
            });
        }

        // Tags that lost a race to an identical tag committed by someone
        // else are dropped in favor of the committed one.
        let inserted: Vec<Tag> = new_tags
            .iter()
            .filter(|t| !state.tags.contains_key(&t.title))
            .cloned()
            .collect();
        let mut tags = HashSet::with_capacity(post.tags.len());
        for tag in post.tags.drain() {
            let resolved = match state.tags.get(&tag.title) {
                Some(committed) => committed.clone(),
                None if inserted.contains(&tag) => tag,
                None => return Err(Error::UnknownTag(tag.title)),
            };
            tags.insert(resolved);
        }
        post.tags = tags;

        for tag in &inserted {
            state.tags.insert(tag.title.clone(), tag.clone());
        }
        let previous = state.posts.insert(post.id, post.clone());
        state.index.update(&post);

        if let Err(err) = self.flush(&state) {
            for tag in &inserted {
                state.tags.remove(&tag.title);
            }
            match previous {
                Some(previous) => {
                    state.index.update(&previous);
                    state.posts.insert(previous.id, previous);
                }
                None => {
                    state.index.remove(post.id);
                    state.posts.remove(&post.id);
                }
            }
            return Err(err);
        }
        Ok(post)
    }

    fn full_text_search(&self, query: &str) -> Result<Vec<Ranked>> {
        let query = Query::parse(query);
        let state = self.state.read();
        let mut ranked: Vec<Ranked> = state
            .index
            .search(&query)
            .into_iter()
            .filter_map(|(id, rank)| {
                state.posts.get(&id).map(|post| Ranked {
                    post: post.clone(),
                    rank,
                })
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.rank
                .partial_cmp(&a.rank)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| newest_first(&a.post, &b.post))
        });
        Ok(ranked)
    }

    fn posts_with_any_tag(&self, tags: &[TagId]) -> Result<HashSet<PostId>> {
        Ok(self
            .state
            .read()
            .posts
            .values()
            .filter(|p| tags.iter().any(|id| p.has_tag(*id)))
            .map(|p| p.id)
            .collect())
    }

    fn posts_with_all_tags(
        &self,
        tags: &[TagId],
        count: usize,
    ) -> Result<HashSet<PostId>> {
        let wanted: HashSet<TagId> = tags.iter().copied().collect();
        let matching = |p: &Post| {
            p.tags.iter().filter(|t| wanted.contains(&t.id)).count()
        };
        Ok(self
            .state
            .read()
            .posts
            .values()
            .filter(|p| matching(*p) == count)
            .map(|p| p.id)
            .collect())
    }

    fn posts_newest_first(&self) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> =
            self.state.read().posts.values().cloned().collect();
        posts.sort_by(newest_first);
        Ok(posts)
    }

    fn posts_by_author(&self, author: UserId) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = self
            .state
            .read()
            .posts
            .values()
            .filter(|p| p.author == author)
            .cloned()
            .collect();
        posts.sort_by(newest_first);
        Ok(posts)
    }

    fn insert_user(&self, user: NewUser) -> Result<User> {
        let mut state = self.state.write();
        check_user_unique(&state, None, &user.username, &user.email)?;

        let id = UserId(self.next_user_id.fetch_add(1, Ordering::SeqCst));
        let user = user.with_id(id);
        state.users.insert(user.id, user.clone());
        if let Err(err) = self.flush(&state) {
            state.users.remove(&user.id);
            return Err(err);
        }
        Ok(user)
    }

    fn update_user(&self, user: User) -> Result<User> {
        let mut state = self.state.write();
        if !state.users.contains_key(&user.id) {
            return Err(Error::UnknownUser(user.id));
        }
        check_user_unique(&state, Some(user.id), &user.username, &user.email)?;

        let previous = state.users.insert(user.id, user.clone());
        if let Err(err) = self.flush(&state) {
            if let Some(previous) = previous {
                state.users.insert(previous.id, previous);
            }
            return Err(err);
        }
        Ok(user)
    }

    fn find_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().users.get(&id).cloned())
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .state
            .read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .state
            .read()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    fn users(&self) -> Result<Vec<User>> {
        Ok(self.state.read().users.values().cloned().collect())
    }
}

fn check_user_unique(
    state: &State,
    id: Option<UserId>,
    username: &str,
    email: &str,
) -> Result<()> {
    for other in state.users.values().filter(|u| Some(u.id) != id) {
        if other.username == username {
            return Err(Error::Conflict {
                field: "username",
                value: username.to_owned(),
            });
        }
        if other.email == email {
            return Err(Error::Conflict {
                field: "email",
                value: email.to_owned(),
            });
        }
    }
    Ok(())
}

/// The result of a fallible store operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a store operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when a unique field would be duplicated, e.g. when a racing
    /// save committed the same post title first.
    #[error("{field} `{value}` is already taken")]
    Conflict { field: &'static str, value: String },

    /// Returned when a post names a tag that is neither stored nor staged.
    #[error("tag `{0}` does not exist")]
    UnknownTag(String),

    #[error("user {0} does not exist")]
    UnknownUser(UserId),

    #[error("accessing `{}`: {err}", path.display())]
    Io { path: PathBuf, err: std::io::Error },

    #[error("reading or writing snapshot `{}`: {err}", path.display())]
    Snapshot {
        path: PathBuf,
        err: serde_yaml::Error,
    },
}
