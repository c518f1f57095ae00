//! The post publishing pipeline. Every post is created and edited through
//! [`Publisher::publish`], which keeps the derived fields of a post in step
//! with its source fields and saves the post and its new tags in one atomic
//! step.

use crate::markdown;
use crate::post::{Post, PostId};
use crate::slug::slugify;
use crate::store::{self, Store};
use crate::tag;
use crate::user::User;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A post form as submitted by an author. Nothing has been checked yet; see
/// [`PostForm::validate`].
#[derive(Clone, Debug, Default)]
pub struct PostForm {
    pub title: String,
    pub body: String,

    /// Whitespace-separated tag titles.
    pub tags: String,

    /// Left blank to derive the summary from the body.
    pub summary: String,
}

/// A validated [`PostForm`].
#[derive(Clone, Debug)]
pub struct PublishRequest {
    title: String,
    body: String,
    tags: String,
    summary: Option<String>,
}

impl PostForm {
    /// Checks that the title and body are present.
    pub fn validate(self) -> Result<PublishRequest> {
        if self.title.trim().is_empty() {
            return Err(Error::Invalid {
                field: "title",
                reason: "this field is required",
            });
        }
        if self.body.trim().is_empty() {
            return Err(Error::Invalid {
                field: "body",
                reason: "this field is required",
            });
        }
        let summary = match self.summary.trim() {
            "" => None,
            _ => Some(self.summary),
        };
        Ok(PublishRequest {
            title: self.title,
            body: self.body,
            tags: self.tags,
            summary,
        })
    }
}

impl PublishRequest {
    pub fn title(&self) -> &str {
        &self.title
    }
}

/// The post a [`Publisher::publish`] call writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    New,
    Existing(PostId),
}

/// Supplies the current time to the pipeline.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Creates and edits posts in a [`Store`].
pub struct Publisher<'a> {
    store: &'a dyn Store,
    clock: Box<dyn Clock + 'a>,
}

impl<'a> Publisher<'a> {
    pub fn new(store: &'a dyn Store) -> Publisher<'a> {
        Publisher::with_clock(store, SystemClock)
    }

    pub fn with_clock<C: Clock + 'a>(
        store: &'a dyn Store,
        clock: C,
    ) -> Publisher<'a> {
        Publisher {
            store,
            clock: Box::new(clock),
        }
    }

    pub fn store(&self) -> &'a dyn Store {
        self.store
    }

    /// Creates a post or edits an existing one on behalf of `user`, returning
    /// the post as saved.
    ///
    /// Only verified users may publish, and only the author of a post or an
    /// admin may edit it. The title must not belong to a different post;
    /// losing a race for a title surfaces as [`Error::Conflict`], which
    /// callers should treat like [`Error::DuplicateTitle`].
    pub fn publish(
        &self,
        target: Target,
        request: PublishRequest,
        user: &User,
    ) -> Result<Post> {
        if !user.is_verified {
            return Err(Error::Unauthorized {
                user: user.username.clone(),
                reason: "the account is not verified",
            });
        }

        let existing = match target {
            Target::New => None,
            Target::Existing(id) => {
                let post =
                    self.store.find_post(id)?.ok_or(Error::NotFound(id))?;
                if !user.can_edit(&post) {
                    return Err(Error::Unauthorized {
                        user: user.username.clone(),
                        reason: "only the author or an admin may edit a post",
                    });
                }
                Some(post)
            }
        };

        if let Some(other) = self.store.find_post_by_title(&request.title)? {
            if existing.as_ref().map(|p| p.id) != Some(other.id) {
                return Err(Error::DuplicateTitle(request.title));
            }
        }

        let (tags, staged) =
            tag::normalize(self.store, &request.tags)?.into_parts();
        let rendered = markdown::render(&request.body);
        let summary = request
            .summary
            .or(rendered.summary)
            .unwrap_or_default();
        let slug = slugify(&request.title);
        let now = self.clock.now();

        let post = match existing {
            Some(post) => Post {
                title: request.title,
                slug,
                summary,
                markdown_body: request.body,
                html_body: rendered.html,
                date_edited: now,
                tags,
                ..post
            },
            None => Post {
                id: self.store.next_post_id(),
                title: request.title,
                slug,
                summary,
                markdown_body: request.body,
                html_body: rendered.html,
                date_published: now,
                date_edited: now,
                author: user.id,
                tags,
            },
        };

        let post = self
            .store
            .save_atomically(post, &staged)
            .map_err(|err| match err {
                store::Error::Conflict {
                    field: "title",
                    value,
                } => Error::Conflict(value),
                err => Error::Store(err),
            })?;
        tracing::info!(
            post = %post.id,
            slug = %post.slug,
            user = %user.username,
            new_tags = staged.len(),
            edit = matches!(target, Target::Existing(_)),
            "published post"
        );
        Ok(post)
    }
}

/// The result of a fallible publishing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error publishing a post.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },

    #[error("post {0} does not exist")]
    NotFound(PostId),

    #[error("user `{user}` may not publish this post: {reason}")]
    Unauthorized { user: String, reason: &'static str },

    #[error("a post titled `{0}` already exists")]
    DuplicateTitle(String),

    /// Returned when a concurrent save claimed the title first.
    #[error("a post titled `{0}` was saved concurrently")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] store::Error),
}

impl Error {
    /// Whether the error is a title collision, detected either before saving
    /// or by the store itself.
    pub fn is_title_collision(&self) -> bool {
        matches!(self, Error::DuplicateTitle(_) | Error::Conflict(_))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::{MemoryStore, Ranked};
    use crate::tag::{Tag, TagId};
    use crate::user::{test_user, NewUser, UserId, UserLevel};
    use chrono::{Duration, TimeZone};
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::sync::Barrier;
    use std::thread;

    /// A clock that moves forward a minute every time it is read.
    struct TickingClock(Cell<DateTime<Utc>>);

    impl TickingClock {
        fn new() -> TickingClock {
            let start = Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap();
            TickingClock(Cell::new(start))
        }
    }

    impl Clock for TickingClock {
        fn now(&self) -> DateTime<Utc> {
            let now = self.0.get();
            self.0.set(now + Duration::minutes(1));
            now
        }
    }

    /// A store whose title lookups always come back empty, as if every
    /// competing save landed just after the lookup. Only the check inside
    /// `save_atomically` can catch a duplicate title.
    struct LateTitles(MemoryStore);

    impl Store for LateTitles {
        fn next_post_id(&self) -> PostId {
            self.0.next_post_id()
        }

        fn find_post(&self, id: PostId) -> store::Result<Option<Post>> {
            self.0.find_post(id)
        }

        fn find_post_by_title(&self, _: &str) -> store::Result<Option<Post>> {
            Ok(None)
        }

        fn find_post_by_slug(&self, slug: &str) -> store::Result<Option<Post>> {
            self.0.find_post_by_slug(slug)
        }

        fn find_tag_by_title(&self, title: &str) -> store::Result<Option<Tag>> {
            self.0.find_tag_by_title(title)
        }

        fn create_tag(&self, title: &str) -> Tag {
            self.0.create_tag(title)
        }

        fn save_atomically(
            &self,
            post: Post,
            new_tags: &[Tag],
        ) -> store::Result<Post> {
            self.0.save_atomically(post, new_tags)
        }

        fn full_text_search(&self, query: &str) -> store::Result<Vec<Ranked>> {
            self.0.full_text_search(query)
        }

        fn posts_with_any_tag(
            &self,
            tags: &[TagId],
        ) -> store::Result<HashSet<PostId>> {
            self.0.posts_with_any_tag(tags)
        }

        fn posts_with_all_tags(
            &self,
            tags: &[TagId],
            count: usize,
        ) -> store::Result<HashSet<PostId>> {
            self.0.posts_with_all_tags(tags, count)
        }

        fn posts_newest_first(&self) -> store::Result<Vec<Post>> {
            self.0.posts_newest_first()
        }

        fn posts_by_author(&self, author: UserId) -> store::Result<Vec<Post>> {
            self.0.posts_by_author(author)
        }

        fn insert_user(&self, user: NewUser) -> store::Result<User> {
            self.0.insert_user(user)
        }

        fn update_user(&self, user: User) -> store::Result<User> {
            self.0.update_user(user)
        }

        fn find_user(&self, id: UserId) -> store::Result<Option<User>> {
            self.0.find_user(id)
        }

        fn find_user_by_username(
            &self,
            username: &str,
        ) -> store::Result<Option<User>> {
            self.0.find_user_by_username(username)
        }

        fn find_user_by_email(
            &self,
            email: &str,
        ) -> store::Result<Option<User>> {
            self.0.find_user_by_email(email)
        }

        fn users(&self) -> store::Result<Vec<User>> {
            self.0.users()
        }
    }

    fn form(title: &str, body: &str, tags: &str) -> PublishRequest {
        PostForm {
            title: title.to_owned(),
            body: body.to_owned(),
            tags: tags.to_owned(),
            summary: String::new(),
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn test_create() -> Result<()> {
        let store = MemoryStore::new();
        let publisher = Publisher::with_clock(&store, TickingClock::new());
        let ann = test_user(1, "ann", UserLevel::Normal);

        let post = publisher.publish(
            Target::New,
            form("Hello, World!", "# Hi\n\nFirst *words*.", "rust web rust"),
            &ann,
        )?;
        assert_eq!("hello-world-", post.slug);
        assert_eq!("First words.", post.summary);
        let html = "<h1>Hi</h1><p>First <em>words</em>.</p>";
        assert_eq!(html, post.html_body.as_str());
        assert_eq!(ann.id, post.author);
        assert_eq!(post.date_published, post.date_edited);
        assert_eq!("rust web", post.tag_line());
        assert!(store.find_tag_by_title("web")?.is_some());
        Ok(())
    }

    #[test]
    fn test_duplicate_title() -> Result<()> {
        let store = MemoryStore::new();
        let publisher = Publisher::new(&store);
        let ann = test_user(1, "ann", UserLevel::Normal);

        publisher.publish(Target::New, form("Intro", "one", ""), &ann)?;
        let err = publisher
            .publish(Target::New, form("Intro", "two", "fresh"), &ann)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTitle(_)));
        assert!(err.is_title_collision());
        assert!(store.find_tag_by_title("fresh")?.is_none());
        Ok(())
    }

    #[test]
    fn test_title_taken_during_save() -> Result<()> {
        let store = LateTitles(MemoryStore::new());
        let publisher = Publisher::new(&store);
        let ann = test_user(1, "ann", UserLevel::Normal);

        publisher.publish(Target::New, form("Intro", "one", "old"), &ann)?;
        let err = publisher
            .publish(Target::New, form("Intro", "two", "old fresh"), &ann)
            .unwrap_err();
        assert!(matches!(&err, Error::Conflict(title) if title == "Intro"));
        assert!(err.is_title_collision());
        assert!(store.find_tag_by_title("fresh")?.is_none());
        assert_eq!(1, store.posts_newest_first()?.len());
        Ok(())
    }

    #[test]
    fn test_racing_publishes_of_one_title() -> Result<()> {
        let store = MemoryStore::new();
        let barrier = Barrier::new(2);
        let results: Vec<Result<Post>> = thread::scope(|scope| {
            let handles: Vec<_> = (1..=2)
                .map(|i| {
                    let (store, barrier) = (&store, &barrier);
                    scope.spawn(move || {
                        let user = test_user(i, "ann", UserLevel::Normal);
                        let tags = format!("shared own{}", i);
                        let request = form("Intro", "body", &tags);
                        barrier.wait();
                        let publisher = Publisher::new(store);
                        publisher.publish(Target::New, request, &user)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let saved: Vec<&Post> = results.iter().flatten().collect();
        assert_eq!(1, saved.len());
        let err = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(err.is_title_collision(), "found {:?}", err);

        // Only the winner's tags were committed.
        let loser = if saved[0].author == UserId(1) { 2 } else { 1 };
        let loser_tag = format!("own{}", loser);
        assert!(store.find_tag_by_title(&loser_tag)?.is_none());
        assert!(store.find_tag_by_title("shared")?.is_some());
        Ok(())
    }

    #[test]
    fn test_edit_keeps_title() -> Result<()> {
        let store = MemoryStore::new();
        let publisher = Publisher::new(&store);
        let ann = test_user(1, "ann", UserLevel::Normal);

        let intro = form("Intro", "one", "");
        let post = publisher.publish(Target::New, intro, &ann)?;
        let again = form("Intro", "two", "");
        let edited = publisher.publish(Target::Existing(post.id), again, &ann)?;
        assert_eq!(post.id, edited.id);
        assert_eq!("two", edited.markdown_body);
        Ok(())
    }

    #[test]
    fn test_edit_preserves_publication() -> Result<()> {
        let store = MemoryStore::new();
        let publisher = Publisher::with_clock(&store, TickingClock::new());
        let ann = test_user(1, "ann", UserLevel::Normal);
        let admin = test_user(2, "root", UserLevel::Admin);

        let intro = form("Intro", "one", "a");
        let post = publisher.publish(Target::New, intro, &ann)?;
        let edited = publisher.publish(
            Target::Existing(post.id),
            form("Intro again", "two", "b"),
            &admin,
        )?;
        assert_eq!(post.date_published, edited.date_published);
        assert_eq!(ann.id, edited.author);
        assert!(edited.date_edited > post.date_edited);
        assert!(edited.is_edited());
        assert_eq!("intro-again", edited.slug);
        assert_eq!("b", edited.tag_line());
        Ok(())
    }

    #[test]
    fn test_edit_authorization() -> Result<()> {
        let store = MemoryStore::new();
        let publisher = Publisher::new(&store);
        let ann = test_user(1, "ann", UserLevel::Normal);
        let bob = test_user(2, "bob", UserLevel::Normal);
        let moderator = test_user(3, "mod", UserLevel::Moderator);

        let intro = form("Intro", "one", "");
        let post = publisher.publish(Target::New, intro, &ann)?;
        for user in [&bob, &moderator] {
            let edit = form("Intro", "x", "");
            assert!(matches!(
                publisher.publish(Target::Existing(post.id), edit, user),
                Err(Error::Unauthorized { .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn test_unverified_user_cannot_publish() {
        let store = MemoryStore::new();
        let publisher = Publisher::new(&store);
        let mut ann = test_user(1, "ann", UserLevel::Admin);
        ann.is_verified = false;
        assert!(matches!(
            publisher.publish(Target::New, form("Intro", "one", ""), &ann),
            Err(Error::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_edit_missing_post() {
        let store = MemoryStore::new();
        let publisher = Publisher::new(&store);
        let ann = test_user(1, "ann", UserLevel::Normal);
        let intro = form("Intro", "one", "");
        assert!(matches!(
            publisher.publish(Target::Existing(PostId(7)), intro, &ann),
            Err(Error::NotFound(PostId(7)))
        ));
    }

    #[test]
    fn test_summary_fallback() -> Result<()> {
        let store = MemoryStore::new();
        let publisher = Publisher::new(&store);
        let ann = test_user(1, "ann", UserLevel::Normal);

        let explicit = PostForm {
            title: "Explicit".to_owned(),
            body: "Body paragraph.".to_owned(),
            tags: String::new(),
            summary: "Given summary".to_owned(),
        }
        .validate()?;
        let post = publisher.publish(Target::New, explicit, &ann)?;
        assert_eq!("Given summary", post.summary);

        let headless = form("Headless", "# Only heading", "");
        let post = publisher.publish(Target::New, headless, &ann)?;
        assert_eq!("", post.summary);
        Ok(())
    }

    #[test]
    fn test_validation() {
        let blank_title = PostForm {
            title: "  ".to_owned(),
            body: "text".to_owned(),
            ..PostForm::default()
        };
        assert!(matches!(
            blank_title.validate(),
            Err(Error::Invalid { field: "title", .. })
        ));

        let blank_body = PostForm {
            title: "Title".to_owned(),
            ..PostForm::default()
        };
        assert!(matches!(
            blank_body.validate(),
            Err(Error::Invalid { field: "body", .. })
        ));
    }
}
