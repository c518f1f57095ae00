//! Derives URL slugs from post titles.

use once_cell::sync::Lazy;
use regex::Regex;

/// Converts a title into its slug: the title is lowercased and every maximal
/// run of non-word characters (anything other than letters, numbers, and
/// `_`) becomes a single `-`.
///
/// Leading and trailing runs are not stripped, so `"Hello, World!"` becomes
/// `"hello-world-"`. Two different titles may produce the same slug; only
/// titles are unique.
pub fn slugify(title: &str) -> String {
    NON_WORD
        .replace_all(&title.to_lowercase(), "-")
        .into_owned()
}

/// A run of characters outside the letter and number categories, other than
/// `_`. Combining marks are not word characters.
static NON_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\p{L}\p{N}_]+").expect("NON_WORD: invalid regex pattern")
});
