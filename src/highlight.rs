//! Syntax highlighting for code blocks. Code is highlighted into spans that
//! carry CSS classes rather than inline styles, so the look of a post is up to
//! the site's stylesheet (see [`stylesheet`]).

use once_cell::sync::Lazy;
use pulldown_cmark::escape::escape_html;
use syntect::highlighting::ThemeSet;
use syntect::html::{
    css_for_theme_with_class_style, ClassStyle, ClassedHTMLGenerator,
};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use thiserror::Error;

static SYNTAX_SET: Lazy<SyntaxSet> =
    Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

/// The class style shared by the highlighter and the stylesheet.
const CLASS_STYLE: ClassStyle = ClassStyle::Spaced;

/// Highlights `code` as `lang` and returns HTML suitable for the inside of a
/// `<pre><code>` element. `lang` may be a language name or a file extension.
/// Unknown languages are highlighted as plain text, and if highlighting fails
/// the code is returned escaped but otherwise untouched.
pub fn highlight(code: &str, lang: Option<&str>) -> String {
    let syntax = lang
        .and_then(|lang| SYNTAX_SET.find_syntax_by_token(lang))
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());

    let mut generator = ClassedHTMLGenerator::new_with_class_style(
        syntax,
        &SYNTAX_SET,
        CLASS_STYLE,
    );
    for line in LinesWithEndings::from(code) {
        let parsed = generator.parse_html_for_line_which_includes_newline(line);
        if let Err(err) = parsed {
            tracing::debug!(
                error = %err,
                "highlighting failed; emitting plain code"
            );
            return escape(code);
        }
    }
    generator.finalize()
}

fn escape(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    // writing into a `String` can't fail
    let _ = escape_html(&mut out, code);
    out
}

/// Produces the CSS for highlighted code from one of the bundled themes
/// (e.g., `InspiredGitHub` or `base16-ocean.dark`).
pub fn stylesheet(theme: &str) -> Result<String, Error> {
    let theme = THEME_SET
        .themes
        .get(theme)
        .ok_or_else(|| Error::UnknownTheme(theme.to_owned()))?;
    Ok(css_for_theme_with_class_style(theme, CLASS_STYLE)?)
}

/// The names of the bundled themes, sorted.
pub fn themes() -> Vec<&'static str> {
    let mut names: Vec<&str> =
        THEME_SET.themes.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown highlighting theme `{0}`")]
    UnknownTheme(String),

    #[error("generating stylesheet: {0}")]
    Css(#[from] syntect::Error),
}
