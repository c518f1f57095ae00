use crate::htmlrenderer::push_html;
use pulldown_cmark::{Event, Options, Parser, Tag};
use serde::{Deserialize, Serialize};
use std::fmt;

/// HTML produced by [`render`]. The renderer is the trust boundary for post
/// content: authors are verified accounts, so their Markdown (including any
/// raw HTML in it) is embedded as-is and this type marks the result as safe
/// to drop into a page without further escaping.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Html(String);

impl Html {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Html {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The output of [`render`].
#[derive(Clone, Debug, PartialEq)]
pub struct Rendered {
    pub html: Html,

    /// The text of the first paragraph, with markup stripped, or `None` if
    /// the document has no paragraph.
    pub summary: Option<String>,
}

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Converts markdown to HTML and extracts a default summary.
///
/// This never fails: syntax that isn't recognized as Markdown is passed
/// through as text, which is the usual Markdown behavior.
pub fn render(markdown: &str) -> Rendered {
    let mut html = String::with_capacity(markdown.len() * 3 / 2);
    let mut summary = SummaryCollector::default();
    let events = Parser::new_ext(markdown, options())
        .inspect(|event| summary.on_event(event));
    // writing into a `String` can't fail
    let _ = push_html(&mut html, events);

    Rendered {
        html: Html(html),
        summary: summary.finish(),
    }
}

/// Collects the text content of the first paragraph.
#[derive(Default)]
struct SummaryCollector {
    state: SummaryState,
    text: String,
}

#[derive(Clone, Copy, PartialEq)]
enum SummaryState {
    Searching,
    Collecting,
    Done,
}

impl Default for SummaryState {
    fn default() -> Self {
        SummaryState::Searching
    }
}

impl SummaryCollector {
    fn on_event(&mut self, event: &Event) {
        match (self.state, event) {
            (SummaryState::Searching, Event::Start(Tag::Paragraph)) => {
                self.state = SummaryState::Collecting;
            }
            (SummaryState::Collecting, Event::End(Tag::Paragraph)) => {
                self.state = SummaryState::Done;
            }
            (SummaryState::Collecting, Event::Text(text))
            | (SummaryState::Collecting, Event::Code(text)) => {
                self.text.push_str(text)
            }
            (SummaryState::Collecting, Event::SoftBreak)
            | (SummaryState::Collecting, Event::HardBreak) => {
                self.text.push('\n')
            }
            _ => {}
        }
    }

    fn finish(self) -> Option<String> {
        match self.state {
            SummaryState::Searching => None,
            _ => Some(self.text),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_summary_from_first_paragraph() {
        let rendered = render("# Title\n\nFirst paragraph text.");
        assert_eq!(Some("First paragraph text.".to_owned()), rendered.summary);
        assert_eq!(
            "<h1>Title</h1><p>First paragraph text.</p>",
            rendered.html.as_str()
        );
    }

    #[test]
    fn test_summary_strips_markup() {
        let rendered =
            render("Some *emphasis* and `code` and [a link](x).\n\nSecond.");
        assert_eq!(
            Some("Some emphasis and code and a link.".to_owned()),
            rendered.summary
        );
    }

    #[test]
    fn test_summary_keeps_line_breaks() {
        let rendered = render("one\ntwo");
        assert_eq!(Some("one\ntwo".to_owned()), rendered.summary);
    }

    #[test]
    fn test_no_paragraph_no_summary() {
        let rendered = render("# Only a heading\n\n```\ncode\n```\n");
        assert_eq!(None, rendered.summary);
    }

    #[test]
    fn test_empty_document() {
        let rendered = render("");
        assert_eq!("", rendered.html.as_str());
        assert_eq!(None, rendered.summary);
    }

    #[test]
    fn test_malformed_markdown_degrades() {
        let rendered = render("**unclosed [link( `tick");
        assert_eq!(
            Some("**unclosed [link( `tick".to_owned()),
            rendered.summary
        );
    }

    #[test]
    fn test_fenced_code_is_highlighted() {
        let rendered = render("```python\nprint('hi')\n```\n");
        let open =
            "<div class=\"highlight\"><pre><code class=\"language-python\">";
        assert!(rendered.html.as_str().starts_with(open));
    }

    #[test]
    fn test_raw_html_passes_through() {
        let rendered = render("<div class=\"note\">kept</div>\n");
        let html = rendered.html.as_str();
        assert!(html.contains("<div class=\"note\">kept</div>"));
    }
}
