//! Loads the project configuration from `quire.yaml`.

use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// The name of the project file [`Config::from_directory`] looks for.
pub const PROJECT_FILE: &str = "quire.yaml";

#[derive(Deserialize)]
struct PageSize(usize);
impl Default for PageSize {
    fn default() -> Self {
        PageSize(5)
    }
}

#[derive(Deserialize)]
struct LogLevel(String);
impl Default for LogLevel {
    fn default() -> Self {
        LogLevel("info".to_owned())
    }
}

#[derive(Deserialize)]
struct ThemeName(String);
impl Default for ThemeName {
    fn default() -> Self {
        ThemeName("InspiredGitHub".to_owned())
    }
}

#[derive(Deserialize)]
struct Project {
    title: String,
    site_root: Url,
    secret: String,

    #[serde(default)]
    database: Option<PathBuf>,

    #[serde(default)]
    posts_per_page: PageSize,

    #[serde(default)]
    admins: Vec<String>,

    #[serde(default)]
    mail_sender: Option<String>,

    #[serde(default)]
    log_level: LogLevel,

    #[serde(default)]
    highlight_theme: ThemeName,
}

/// The resolved project configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The site title, used in mail subjects and the feed.
    pub title: String,

    /// The public URL of the site. Post URLs are `{site_root}/blog/{slug}`.
    pub site_root: Url,

    /// The key verification tokens are signed with.
    pub secret: String,

    /// The store snapshot file. Relative paths in the project file are
    /// relative to the project file's directory.
    pub database: PathBuf,

    pub posts_per_page: usize,

    /// The addresses that receive account verification requests.
    pub admins: Vec<String>,

    pub mail_sender: String,

    /// The default log filter, used when `RUST_LOG` isn't set.
    pub log_level: String,

    pub highlight_theme: String,
}

impl Config {
    /// Looks for `quire.yaml` in `dir` and then in each of its ancestors,
    /// and loads the first one found.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        let path = dir.join(PROJECT_FILE);
        if path.exists() {
            Config::from_project_file(&path)
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent),
                None => Err(Error::NotFound),
            }
        }
    }

    pub fn from_project_file(path: &Path) -> Result<Config> {
        let file = File::open(path).map_err(|err| Error::Open {
            path: path.to_owned(),
            err,
        })?;
        let project: Project =
            serde_yaml::from_reader(file).map_err(|err| Error::Parse {
                path: path.to_owned(),
                err,
            })?;
        let project_root = path
            .parent()
            .ok_or_else(|| Error::NoParent(path.to_owned()))?;

        let mail_sender = match project.mail_sender {
            Some(sender) => sender,
            None => format!(
                "noreply@{}",
                project.site_root.host_str().unwrap_or("localhost")
            ),
        };
        Ok(Config {
            title: project.title,
            database: project_root.join(
                project
                    .database
                    .unwrap_or_else(|| PathBuf::from("quire.db.yaml")),
            ),
            site_root: project.site_root,
            secret: project.secret,
            posts_per_page: project.posts_per_page.0.max(1),
            admins: project.admins,
            mail_sender,
            log_level: project.log_level.0,
            highlight_theme: project.highlight_theme.0,
        })
    }

    /// The public URL of the post with the given slug.
    pub fn post_url(&self, slug: &str) -> Url {
        self.site_url(&["blog", slug])
    }

    /// The URL an admin follows to verify an account.
    pub fn verification_url(&self, token: &str) -> Url {
        self.site_url(&["cms", "verify_account", token])
    }

    fn site_url(&self, segments: &[&str]) -> Url {
        let mut url = self.site_root.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// The result of loading configuration.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading configuration.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not find `quire.yaml` in any parent directory")]
    NotFound,

    #[error("opening project file `{}`: {err}", path.display())]
    Open { path: PathBuf, err: std::io::Error },

    #[error("parsing project file `{}`: {err}", path.display())]
    Parse {
        path: PathBuf,
        err: serde_yaml::Error,
    },

    #[error("can't get parent directory for project file `{}`", .0.display())]
    NoParent(PathBuf),
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    const MINIMAL: &str = "title: Simply Precise\n\
                           site_root: https://example.org/\n\
                           secret: s3cret\n";

    #[test]
    fn test_defaults() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PROJECT_FILE), MINIMAL).unwrap();

        let config = Config::from_directory(dir.path())?;
        assert_eq!("Simply Precise", config.title);
        assert_eq!(5, config.posts_per_page);
        assert_eq!(dir.path().join("quire.db.yaml"), config.database);
        assert_eq!("noreply@example.org", config.mail_sender);
        assert_eq!("info", config.log_level);
        assert!(config.admins.is_empty());
        Ok(())
    }

    #[test]
    fn test_found_in_ancestor() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let project = format!(
            "{}database: data/blog.yaml\n\
             posts_per_page: 10\n\
             admins: [root@example.org]\n",
            MINIMAL
        );
        fs::write(dir.path().join(PROJECT_FILE), project).unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::from_directory(&nested)?;
        assert_eq!(dir.path().join("data").join("blog.yaml"), config.database);
        assert_eq!(10, config.posts_per_page);
        assert_eq!(vec!["root@example.org".to_owned()], config.admins);
        Ok(())
    }

    #[test]
    fn test_invalid_project_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROJECT_FILE);
        fs::write(path, "title: [unterminated").unwrap();
        assert!(matches!(
            Config::from_directory(dir.path()),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_urls() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let project =
            MINIMAL.replace("https://example.org/", "https://example.org/site");
        fs::write(dir.path().join(PROJECT_FILE), project).unwrap();

        let config = Config::from_directory(dir.path())?;
        assert_eq!(
            "https://example.org/site/blog/hello-world-",
            config.post_url("hello-world-").as_str()
        );
        assert_eq!(
            "https://example.org/site/cms/verify_account/abc",
            config.verification_url("abc").as_str()
        );
        Ok(())
    }
}
