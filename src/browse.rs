//! Read-only listings for visitors: the home page, member pages, single
//! posts, and the member directory.

use crate::page::Page;
use crate::post::Post;
use crate::store::{Result, Store};
use crate::user::User;

/// All posts, newest first.
pub fn home<S: Store + ?Sized>(
    store: &S,
    page: usize,
    per_page: usize,
) -> Result<Page<Post>> {
    Ok(Page::paginate(store.posts_newest_first()?, page, per_page))
}

/// The member named `username` and a page of their posts, newest first, or
/// `None` if there is no such member.
pub fn member<S: Store + ?Sized>(
    store: &S,
    username: &str,
    page: usize,
    per_page: usize,
) -> Result<Option<(User, Page<Post>)>> {
    let user = match store.find_user_by_username(username)? {
        Some(user) => user,
        None => return Ok(None),
    };
    let posts = store.posts_by_author(user.id)?;
    Ok(Some((user, Page::paginate(posts, page, per_page))))
}

/// The post with the given slug. Slugs aren't unique; the first post saved
/// with the slug wins.
pub fn post_by_slug<S: Store + ?Sized>(
    store: &S,
    slug: &str,
) -> Result<Option<Post>> {
    store.find_post_by_slug(slug)
}

/// Every member, highest level first, then by username.
pub fn members<S: Store + ?Sized>(store: &S) -> Result<Vec<User>> {
    let mut users = store.users()?;
    users.sort_by(|a, b| {
        b.level
            .cmp(&a.level)
            .then_with(|| a.username.cmp(&b.username))
    });
    Ok(users)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::post::test_post;
    use crate::store::MemoryStore;
    use crate::user::{NewUser, UserLevel};
    use chrono::Duration;

    fn add_user(
        store: &MemoryStore,
        username: &str,
        level: UserLevel,
    ) -> Result<User> {
        store.insert_user(NewUser {
            username: username.to_owned(),
            email: format!("{}@example.org", username),
            password_hash: String::new(),
            level,
            is_verified: true,
        })
    }

    fn add_post(
        store: &MemoryStore,
        title: &str,
        author: &User,
        age: i64,
    ) -> Result<Post> {
        let mut post = test_post(store.next_post_id().0, title, author.id);
        post.date_published = post.date_published - Duration::days(age);
        store.save_atomically(post, &[])
    }

    #[test]
    fn test_home_is_newest_first() -> Result<()> {
        let store = MemoryStore::new();
        let ann = add_user(&store, "ann", UserLevel::Normal)?;
        add_post(&store, "Old", &ann, 3)?;
        add_post(&store, "New", &ann, 0)?;
        add_post(&store, "Middle", &ann, 1)?;

        let page = home(&store, 1, 2)?;
        let titles: Vec<&str> =
            page.items.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(vec!["New", "Middle"], titles);
        assert!(page.has_next());
        Ok(())
    }

    #[test]
    fn test_member_page() -> Result<()> {
        let store = MemoryStore::new();
        let ann = add_user(&store, "ann", UserLevel::Normal)?;
        let bob = add_user(&store, "bob", UserLevel::Normal)?;
        add_post(&store, "Ann's", &ann, 0)?;
        add_post(&store, "Bob's", &bob, 0)?;

        let (user, page) = member(&store, "bob", 1, 5)?.unwrap();
        assert_eq!(bob.id, user.id);
        assert_eq!(1, page.total);
        assert_eq!("Bob's", page.items[0].title);
        assert!(member(&store, "nobody", 1, 5)?.is_none());
        Ok(())
    }

    #[test]
    fn test_post_by_slug() -> Result<()> {
        let store = MemoryStore::new();
        let ann = add_user(&store, "ann", UserLevel::Normal)?;
        add_post(&store, "Hello, World!", &ann, 0)?;
        assert!(post_by_slug(&store, "hello-world-")?.is_some());
        assert!(post_by_slug(&store, "hello-world")?.is_none());
        Ok(())
    }

    #[test]
    fn test_members_by_level() -> Result<()> {
        let store = MemoryStore::new();
        add_user(&store, "zed", UserLevel::Normal)?;
        add_user(&store, "amy", UserLevel::Normal)?;
        add_user(&store, "root", UserLevel::Admin)?;
        add_user(&store, "mod", UserLevel::Moderator)?;

        let names: Vec<String> =
            members(&store)?.into_iter().map(|u| u.username).collect();
        assert_eq!(vec!["root", "mod", "amy", "zed"], names);
        Ok(())
    }
}
