use anyhow::{anyhow, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use quire::accounts::{self, Registration, Verification};
use quire::config::Config;
use quire::import::import_directory;
use quire::notify::LogMailer;
use quire::page::Page;
use quire::post::{Post, PostId};
use quire::publish::{PostForm, Publisher, Target};
use quire::search::{search, SearchOutcome, SearchRequest, TagMode};
use quire::store::{MemoryStore, Store};
use quire::user::User;
use quire::{browse, feed, highlight, logging};
use std::io::Read;
use std::path::Path;

const PASSWORD_VAR: &str = "QUIRE_PASSWORD";
const FEED_LENGTH: usize = 20;

fn app() -> App<'static, 'static> {
    let user = Arg::with_name("user")
        .long("user")
        .short("u")
        .takes_value(true)
        .required(true)
        .help("Username to act as; the password is read from QUIRE_PASSWORD");
    let page = Arg::with_name("page")
        .long("page")
        .short("p")
        .takes_value(true)
        .default_value("1")
        .help("1-based page number");

    App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("create-admin")
                .about("Creates a verified admin account")
                .arg(Arg::with_name("USERNAME").required(true).index(1))
                .arg(Arg::with_name("EMAIL").required(true).index(2)),
        )
        .subcommand(
            SubCommand::with_name("register")
                .about("Registers an account and asks the admins to verify it")
                .arg(Arg::with_name("USERNAME").required(true).index(1))
                .arg(Arg::with_name("EMAIL").required(true).index(2)),
        )
        .subcommand(
            SubCommand::with_name("verify")
                .about("Verifies the account named by a verification token")
                .arg(Arg::with_name("TOKEN").required(true).index(1)),
        )
        .subcommand(
            SubCommand::with_name("publish")
                .about(
                    "Publishes a post; the Markdown body is read from --file \
                     or stdin",
                )
                .arg(user.clone())
                .arg(
                    Arg::with_name("title")
                        .long("title")
                        .takes_value(true)
                        .required(true),
                )
                .arg(Arg::with_name("tags").long("tags").takes_value(true))
                .arg(
                    Arg::with_name("summary")
                        .long("summary")
                        .takes_value(true),
                )
                .arg(Arg::with_name("file").long("file").takes_value(true))
                .arg(
                    Arg::with_name("edit")
                        .long("edit")
                        .takes_value(true)
                        .help("ID of the post to edit"),
                ),
        )
        .subcommand(
            SubCommand::with_name("show")
                .about("Prints the post with the given slug")
                .arg(Arg::with_name("SLUG").required(true).index(1)),
        )
        .subcommand(
            SubCommand::with_name("list")
                .about("Lists posts, newest first")
                .arg(Arg::with_name("member").long("member").takes_value(true))
                .arg(page.clone()),
        )
        .subcommand(SubCommand::with_name("members").about("Lists members"))
        .subcommand(
            SubCommand::with_name("search")
                .about("Searches posts by text and tags")
                .arg(
                    Arg::with_name("query")
                        .long("query")
                        .short("q")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("tags")
                        .long("tags")
                        .short("t")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("any")
                        .long("any")
                        .help(
                            "Match posts with any of the tags instead of all \
                             of them",
                        ),
                )
                .arg(page),
        )
        .subcommand(
            SubCommand::with_name("feed")
                .about("Writes the Atom feed to stdout"),
        )
        .subcommand(
            SubCommand::with_name("import")
                .about("Publishes every Markdown file in a directory")
                .arg(user)
                .arg(Arg::with_name("DIR").required(true).index(1)),
        )
        .subcommand(
            SubCommand::with_name("css")
                .about("Prints the syntax highlighting stylesheet")
                .arg(Arg::with_name("THEME").index(1)),
        )
}

fn main() -> Result<()> {
    let matches = app().get_matches();
    let cwd = std::env::current_dir().context("getting the working directory")?;
    let config = Config::from_directory(&cwd).context("loading configuration")?;
    logging::init(&config.log_level).context("initializing logging")?;

    // `css` doesn't touch the store
    if let ("css", Some(m)) = matches.subcommand() {
        let theme = m.value_of("THEME").unwrap_or(&config.highlight_theme);
        let css = highlight::stylesheet(theme).map_err(|err| match err {
            highlight::Error::UnknownTheme(_) => anyhow!(
                "{}; available themes: {}",
                err,
                highlight::themes().join(", ")
            ),
            err => err.into(),
        })?;
        print!("{}", css);
        return Ok(());
    }

    let store = MemoryStore::open(&config.database).with_context(|| {
        format!("opening store `{}`", config.database.display())
    })?;
    match matches.subcommand() {
        ("create-admin", Some(m)) => {
            let user = accounts::create_admin(
                &store,
                required(m, "USERNAME")?,
                required(m, "EMAIL")?,
                &password()?,
            )?;
            println!("Created admin {} (id {})", user.username, user.id);
        }
        ("register", Some(m)) => {
            let password = password()?;
            let user = accounts::register(
                &store,
                &LogMailer,
                &config,
                Registration {
                    username: required(m, "USERNAME")?.to_owned(),
                    email: required(m, "EMAIL")?.to_owned(),
                    password: password.clone(),
                    password2: password,
                },
            )?;
            println!(
                "Registered {}; the account must be verified by an admin",
                user.username
            );
        }
        ("verify", Some(m)) => {
            let token = required(m, "TOKEN")?;
            match accounts::verify_account(&store, &config.secret, token)? {
                Verification::Verified(user) => {
                    println!("Verified {}", user.username)
                }
                Verification::AlreadyVerified(user) => {
                    println!("{} is already verified", user.username)
                }
            }
        }
        ("publish", Some(m)) => {
            let user = sign_in(&store, m)?;
            let body = match m.value_of("file") {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("reading `{}`", path))?,
                None => {
                    let mut body = String::new();
                    std::io::stdin()
                        .read_to_string(&mut body)
                        .context("reading the post body from stdin")?;
                    body
                }
            };
            let target = match m.value_of("edit") {
                Some(id) => Target::Existing(PostId(id.parse().with_context(
                    || format!("invalid post id `{}`", id),
                )?)),
                None => Target::New,
            };
            let request = PostForm {
                title: required(m, "title")?.to_owned(),
                body,
                tags: m.value_of("tags").unwrap_or_default().to_owned(),
                summary: m.value_of("summary").unwrap_or_default().to_owned(),
            }
            .validate()?;
            let post = Publisher::new(&store).publish(target, request, &user)?;
            let url = config.post_url(&post.slug);
            println!("Published {} at {}", post.id, url);
        }
        ("show", Some(m)) => {
            let slug = required(m, "SLUG")?;
            let post = browse::post_by_slug(&store, slug)?
                .ok_or_else(|| anyhow!("no post with slug `{}`", slug))?;
            let author = store.find_user(post.author)?;
            print_post(&post, author.as_ref());
            println!();
            println!("{}", post.html_body);
        }
        ("list", Some(m)) => {
            let number = page_number(m)?;
            let page = match m.value_of("member") {
                Some(username) => {
                    let (user, page) = browse::member(
                        &store,
                        username,
                        number,
                        config.posts_per_page,
                    )?
                    .ok_or_else(|| anyhow!("no member named `{}`", username))?;
                    println!("{} ({})", user.display_name(), user.level);
                    if let Some(about) = &user.about_me {
                        println!("{}", about);
                    }
                    page
                }
                None => browse::home(&store, number, config.posts_per_page)?,
            };
            print_page(&store, &page)?;
        }
        ("members", Some(_)) => {
            for user in browse::members(&store)? {
                let status = if user.is_verified {
                    ""
                } else {
                    " (unverified)"
                };
                println!(
                    "{}\t{}\t{}{}",
                    user.username,
                    user.level,
                    user.display_name(),
                    status
                );
            }
        }
        ("search", Some(m)) => {
            let request = SearchRequest {
                query: m.value_of("query").unwrap_or_default().to_owned(),
                tags: m.value_of("tags").unwrap_or_default().to_owned(),
                mode: if m.is_present("any") {
                    TagMode::Any
                } else {
                    TagMode::All
                },
                page: page_number(m)?,
                per_page: config.posts_per_page,
            };
            match search(&store, &request)? {
                SearchOutcome::Results(page) => print_page(&store, &page)?,
                outcome => println!("{}", outcome),
            }
        }
        ("feed", Some(_)) => {
            let posts: Vec<Post> = store
                .posts_newest_first()?
                .into_iter()
                .take(FEED_LENGTH)
                .collect();
            let users = store.users()?;
            feed::write_feed(&config, &posts, &users, std::io::stdout())?;
        }
        ("import", Some(m)) => {
            let user = sign_in(&store, m)?;
            let dir = required(m, "DIR")?;
            let publisher = Publisher::new(&store);
            let imported = import_directory(&publisher, Path::new(dir), &user)?;
            println!(
                "Imported {} new and {} edited posts",
                imported.created.len(),
                imported.edited.len()
            );
        }
        (name, _) => return Err(anyhow!("unknown command `{}`", name)),
    }
    Ok(())
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .value_of(name)
        .ok_or_else(|| anyhow!("missing argument `{}`", name))
}

fn page_number(matches: &ArgMatches) -> Result<usize> {
    let page = required(matches, "page")?;
    page.parse()
        .with_context(|| format!("invalid page number `{}`", page))
}

fn password() -> Result<String> {
    std::env::var(PASSWORD_VAR)
        .with_context(|| format!("{} must be set", PASSWORD_VAR))
}

fn sign_in(store: &MemoryStore, matches: &ArgMatches) -> Result<User> {
    let username = required(matches, "user")?;
    accounts::login(store, username, &password()?)
        .with_context(|| format!("signing in as `{}`", username))
}

fn print_post(post: &Post, author: Option<&User>) {
    let author = author.map_or("unknown", User::display_name);
    let edited = if post.is_edited() {
        format!(", edited {}", post.date_edited.format("%Y-%m-%d %H:%M"))
    } else {
        String::new()
    };
    println!("{} [{}] {}", post.id, post.slug, post.title);
    println!(
        "    by {} on {}{}",
        author,
        post.date_published.format("%Y-%m-%d %H:%M"),
        edited
    );
    if !post.tags.is_empty() {
        println!("    tags: {}", post.tag_line());
    }
    if !post.summary.is_empty() {
        println!("    {}", post.summary.replace('\n', " "));
    }
}

fn print_page(store: &MemoryStore, page: &Page<Post>) -> Result<()> {
    for post in &page.items {
        print_post(post, store.find_user(post.author)?.as_ref());
    }
    println!(
        "-- page {} of {} ({} posts){}{}",
        page.number,
        page.pages().max(1),
        page.total,
        page.prev_num()
            .map(|n| format!(", previous: {}", n))
            .unwrap_or_default(),
        page.next_num()
            .map(|n| format!(", next: {}", n))
            .unwrap_or_default(),
    );
    Ok(())
}
