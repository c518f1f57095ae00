//! Imports a directory of Markdown files as posts. Each file must be
//! structured as follows:
//!
//! 1. Initial frontmatter fence (`---`)
//! 2. YAML frontmatter with the field `Title` and optionally `Tags` and
//!    `Summary`
//! 3. Terminal frontmatter fence (`---`)
//! 4. Post body
//!
//! For example:
//!
//! ```md
//! ---
//! Title: Hello, world!
//! Tags: [greet]
//! ---
//! # Hello
//!
//! World
//! ```
//!
//! Every file goes through the publishing pipeline, so importing a file
//! whose title is already taken edits that post instead.

use crate::post::Post;
use crate::publish::{self, PostForm, Publisher, Target};
use crate::store;
use crate::user::User;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

const MARKDOWN_EXTENSION: &str = "md";

#[derive(Deserialize, Clone)]
struct Frontmatter {
    #[serde(rename = "Title")]
    title: String,

    #[serde(default, rename = "Tags")]
    tags: Vec<String>,

    #[serde(default, rename = "Summary")]
    summary: String,
}

/// The posts touched by [`import_directory`].
#[derive(Debug, Default)]
pub struct Imported {
    pub created: Vec<Post>,
    pub edited: Vec<Post>,
}

/// Splits a source file into its frontmatter and body.
fn split_frontmatter(input: &str) -> Result<(&str, &str)> {
    const FENCE: &str = "---";
    if !input.starts_with(FENCE) {
        return Err(Error::FrontmatterMissingStartFence);
    }
    match input[FENCE.len()..].find(FENCE) {
        None => Err(Error::FrontmatterMissingEndFence),
        Some(offset) => {
            let yaml_stop = FENCE.len() + offset;
            let body = &input[yaml_stop + FENCE.len()..];
            let body = body
                .strip_prefix("\r\n")
                .or_else(|| body.strip_prefix('\n'))
                .unwrap_or(body);
            Ok((&input[FENCE.len()..yaml_stop], body))
        }
    }
}

fn parse_form(input: &str) -> Result<PostForm> {
    let (yaml, body) = split_frontmatter(input)?;
    let frontmatter: Frontmatter = serde_yaml::from_str(yaml)?;
    Ok(PostForm {
        title: frontmatter.title,
        body: body.to_owned(),
        tags: frontmatter.tags.join(" "),
        summary: frontmatter.summary,
    })
}

/// Publishes every `.md` file under `dir`, in path order, on behalf of
/// `user`. Stops at the first file that fails; the files before it stay
/// published.
pub fn import_directory(
    publisher: &Publisher,
    dir: &Path,
    user: &User,
) -> Result<Imported> {
    let mut imported = Imported::default();
    for result in WalkDir::new(dir).sort_by_file_name() {
        let entry = result?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().map_or(true, |ext| ext != MARKDOWN_EXTENSION)
        {
            continue;
        }
        let (post, created) =
            import_file(publisher, path, user).map_err(|err| Error::File {
                path: path.to_owned(),
                err: Box::new(err),
            })?;
        tracing::debug!(
            path = %path.display(),
            slug = %post.slug,
            created,
            "imported post"
        );
        if created {
            imported.created.push(post);
        } else {
            imported.edited.push(post);
        }
    }
    Ok(imported)
}

fn import_file(
    publisher: &Publisher,
    path: &Path,
    user: &User,
) -> Result<(Post, bool)> {
    let request = parse_form(&fs::read_to_string(path)?)?.validate()?;
    let target = match publisher.store().find_post_by_title(request.title())? {
        Some(existing) => Target::Existing(existing.id),
        None => Target::New,
    };
    let post = publisher.publish(target, request, user)?;
    Ok((post, target == Target::New))
}

/// Represents the result of an import.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error importing posts.
#[derive(Debug, Error)]
pub enum Error {
    #[error("post must begin with `---`")]
    FrontmatterMissingStartFence,

    #[error("missing closing `---`")]
    FrontmatterMissingEndFence,

    #[error("parsing frontmatter: {0}")]
    DeserializeYaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),

    #[error(transparent)]
    Publish(#[from] publish::Error),

    #[error(transparent)]
    Store(#[from] store::Error),

    /// An error in a specific file.
    #[error("importing `{}`: {err}", path.display())]
    File { path: PathBuf, err: Box<Error> },
}
